//! # CAS Core
//!
//! Environment traits shared by the CAS ticket crates.
//!
//! Anything that touches the outside world (the wall clock today) is
//! abstracted behind a trait and injected, so ticket logic can run against
//! deterministic doubles in tests.
//!
//! ## Example
//!
//! ```
//! use cas_core::environment::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let before = clock.now();
//! assert!(clock.now() >= before);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Duration, Utc};

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// into factories and lifecycle helpers.
pub mod environment {
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// struct SystemClock;
    /// impl Clock for SystemClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         Utc::now()
    ///     }
    /// }
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    impl<C: Clock + ?Sized> Clock for Arc<C> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }

    impl<C: Clock + ?Sized> Clock for &C {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }
}
