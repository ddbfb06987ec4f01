//! # Seatkeeper Testing
//!
//! Testing utilities for code written against `seatkeeper-core`:
//!
//! - [`FixedClock`] and [`ManualClock`] for deterministic time
//! - [`ReducerTest`] for Given-When-Then reducer tests
//! - [`assertions`] over returned effects
//!
//! ```ignore
//! use seatkeeper_testing::{ManualClock, ReducerTest};
//!
//! let clock = ManualClock::starting_at(test_time());
//! ReducerTest::new(WaitlistReducer::new())
//!     .with_env(environment(&clock))
//!     .given_state(scope_with_three_waiting())
//!     .when_action(WaitlistAction::Promote { available: Some(1) })
//!     .then_state(|state| assert_eq!(state.live_offers(clock.now()), 1))
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use seatkeeper_core::environment::Clock;
use std::sync::{Arc, Mutex, PoisonError};


pub use reducer_test::{ReducerTest, assertions};

/// Mock clocks for deterministic tests.
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, Mutex, PoisonError, Utc};

    /// Clock frozen at one instant.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test advances it.
    ///
    /// Clones share the same instant, so a test can keep one handle while the
    /// code under test holds another behind `Arc<dyn Clock>`.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock reading `time` until advanced.
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts at: 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock, test_time};
