//! Constant policies.

use super::{ExpirationPolicy, ExpirationReason, TicketState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every ticket is expired as soon as it exists.
///
/// Used to shut a ticket kind off, or as the fallback when no usable
/// timeout was configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlwaysExpiresExpirationPolicy;

impl ExpirationPolicy for AlwaysExpiresExpirationPolicy {
    fn validate(
        &self,
        _state: &dyn TicketState,
        _now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        Err(ExpirationReason::Always)
    }

    fn time_to_live(&self) -> Option<i64> {
        Some(0)
    }
}

/// No ticket ever expires on time alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeverExpiresExpirationPolicy;

impl ExpirationPolicy for NeverExpiresExpirationPolicy {
    fn validate(
        &self,
        _state: &dyn TicketState,
        _now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        Ok(())
    }

    fn time_to_live(&self) -> Option<i64> {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::expiration::StateSnapshot;
    use cas_testing::test_epoch;
    use chrono::Duration;

    #[test]
    fn test_always_expires() {
        let state = StateSnapshot::created_at(test_epoch());
        assert!(AlwaysExpiresExpirationPolicy.is_expired(&state, test_epoch()));
    }

    #[test]
    fn test_never_expires() {
        let state = StateSnapshot::created_at(test_epoch());
        let far_future = test_epoch() + Duration::days(365 * 100);
        assert!(!NeverExpiresExpirationPolicy.is_expired(&state, far_future));
        assert_eq!(NeverExpiresExpirationPolicy.time_to_live(), None);
    }
}
