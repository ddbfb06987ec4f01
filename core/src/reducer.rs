//! The [`Reducer`] trait.

use crate::effect::Effect;
use smallvec::SmallVec;

/// Business logic as a pure function: `(State, Action, Environment) → Effects`.
///
/// A reducer validates the action against the current state, mutates the
/// state in place when the action is allowed, and returns the effects the
/// shell should run once the change is durable. Rejections are recorded on
/// the state rather than returned, so the shell decides whether to commit.
///
/// Most actions produce at most a couple of effects, so the return type keeps
/// up to four inline without allocating.
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The injected dependencies this reducer needs
    type Environment;

    /// Reduce an action into state changes and effects.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]>;
}
