//! # CAS Testing
//!
//! Testing utilities for the CAS ticket crates.
//!
//! This crate provides:
//! - Deterministic [`Clock`] implementations (`FixedClock`, `ManualClock`)
//! - A shared test epoch (`test_clock`)
//! - Opt-in log capture for debugging failing tests (`init_tracing`)
//!
//! ## Example
//!
//! ```
//! use cas_testing::ManualClock;
//! use cas_core::environment::Clock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::default();
//! let start = clock.now();
//! clock.advance(Duration::seconds(30));
//! assert_eq!(clock.now() - start, Duration::seconds(30));
//! ```

use cas_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use cas_testing::mocks::FixedClock;
    /// use cas_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

    /// Clock that only moves when a test tells it to.
    ///
    /// Clones share the same instant, so a clock handed to a factory can be
    /// advanced from the test body to drive expiration.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, for negative durations).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_epoch())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC, the instant every test clock starts from.
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }
}

/// Install a test-friendly `tracing` subscriber.
///
/// Safe to call from many tests; only the first call installs anything.
/// Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
