//! # Seatkeeper Core
//!
//! The small set of abstractions the booking engine is written against.
//!
//! - **State**: the record a reducer owns (a booking, a waitlist scope)
//! - **Action**: every input to a reducer, commands and the facts they produce
//! - **Reducer**: `(State, Action, Environment) → Effects`, pure and synchronous
//! - **Effect**: a description of a side effect, executed after the state change commits
//! - **Environment**: injected dependencies (clock, notifier, policy)
//!
//! Reducers never touch storage or the network. The shell around them loads a
//! record, runs the reducer inside the storage transaction, commits, and only
//! then executes the returned effects with [`effect::execute`].
//!
//! ```ignore
//! use seatkeeper_core::{effect::Effect, reducer::Reducer, SmallVec, smallvec};
//!
//! impl Reducer for DoorReducer {
//!     type State = DoorState;
//!     type Action = DoorAction;
//!     type Environment = DoorEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut DoorState,
//!         action: DoorAction,
//!         env: &DoorEnvironment,
//!     ) -> SmallVec<[Effect<DoorAction>; 4]> {
//!         match action {
//!             DoorAction::Open => {
//!                 state.open = true;
//!                 smallvec![Effect::None]
//!             }
//!         }
//!     }
//! }
//! ```

#![forbid(unsafe_code)]

pub mod effect;
pub mod environment;
pub mod reducer;

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};
