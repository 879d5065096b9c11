//! # Raffle Testing
//!
//! Testing utilities and helpers for the raffle draw engine.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clock, randomness)
//! - An in-memory record store with failure injection
//! - A Given-When-Then builder for reducers
//!
//! ## Example
//!
//! ```ignore
//! use raffle_testing::{InMemoryRecordStore, ScriptedRandom, test_clock};
//!
//! #[tokio::test]
//! async fn draws_second_participant() {
//!     let records = InMemoryRecordStore::new();
//!     let env = RaffleEnvironment::new(
//!         Arc::new(test_clock()),
//!         Arc::new(ScriptedRandom::new([1])),
//!         Arc::new(records.clone()),
//!         DrawPacing::instant(),
//!     );
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use raffle_core::environment::{Clock, RandomSource};

/// In-memory record store with failure injection
pub mod record_store;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, RandomSource, Utc};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use raffle_testing::mocks::FixedClock;
    /// use raffle_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Randomness that replays a fixed script of indices.
    ///
    /// Each `pick(len)` consumes the next scripted value and reduces it modulo
    /// `len`. Once the script is exhausted every pick returns `0`.
    ///
    /// ```
    /// use raffle_testing::mocks::ScriptedRandom;
    /// use raffle_core::environment::RandomSource;
    ///
    /// let random = ScriptedRandom::new([1, 5]);
    /// assert_eq!(random.pick(3), 1);
    /// assert_eq!(random.pick(3), 2);
    /// assert_eq!(random.pick(3), 0);
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedRandom {
        script: Arc<Mutex<VecDeque<usize>>>,
        picks: Arc<Mutex<Vec<(usize, usize)>>>,
    }

    impl ScriptedRandom {
        /// Create a source replaying `script`
        #[must_use]
        pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into_iter().collect())),
                picks: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Append more values to the script
        pub fn push(&self, values: impl IntoIterator<Item = usize>) {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(values);
        }

        /// Every `(len, result)` pair handed out so far
        #[must_use]
        pub fn picks(&self) -> Vec<(usize, usize)> {
            self.picks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl RandomSource for ScriptedRandom {
        fn pick(&self, len: usize) -> usize {
            let next = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(0);
            let result = if len == 0 { 0 } else { next % len };
            self.picks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((len, result));
            result
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ScriptedRandom, test_clock};
pub use record_store::InMemoryRecordStore;
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn scripted_random_wraps_and_records() {
        let random = ScriptedRandom::new([4, 2]);
        assert_eq!(random.pick(3), 1);
        random.push([7]);
        assert_eq!(random.pick(5), 2);
        assert_eq!(random.pick(4), 3);
        assert_eq!(random.pick(4), 0);
        assert_eq!(random.picks(), vec![(3, 1), (5, 2), (4, 3), (4, 0)]);
    }
}
