//! Time based policies.

use super::{ExpirationPolicy, ExpirationReason, TicketState, deadline_after};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn check_deadline(
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    reason: impl FnOnce(DateTime<Utc>) -> ExpirationReason,
) -> Result<(), ExpirationReason> {
    match deadline {
        Some(deadline) if now > deadline => Err(reason(deadline)),
        _ => Ok(()),
    }
}

/// Absolute lifetime counted from creation, regardless of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardTimeoutExpirationPolicy {
    time_to_kill_in_seconds: i64,
}

impl HardTimeoutExpirationPolicy {
    /// Tickets die `time_to_kill_in_seconds` after creation.
    #[must_use]
    pub const fn new(time_to_kill_in_seconds: i64) -> Self {
        Self {
            time_to_kill_in_seconds,
        }
    }

    /// Lifetime in seconds.
    #[must_use]
    pub const fn time_to_kill_in_seconds(&self) -> i64 {
        self.time_to_kill_in_seconds
    }
}

impl ExpirationPolicy for HardTimeoutExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        let deadline = deadline_after(state.creation_time(), self.time_to_kill_in_seconds);
        check_deadline(deadline, now, |deadline| ExpirationReason::HardTimeout {
            deadline,
        })
    }

    fn time_to_live(&self) -> Option<i64> {
        Some(self.time_to_kill_in_seconds)
    }
}

/// Sliding idle window: every use pushes the deadline out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutExpirationPolicy {
    max_time_to_live_in_seconds: i64,
}

impl TimeoutExpirationPolicy {
    /// Tickets die after `max_time_to_live_in_seconds` without use.
    #[must_use]
    pub const fn new(max_time_to_live_in_seconds: i64) -> Self {
        Self {
            max_time_to_live_in_seconds,
        }
    }
}

impl ExpirationPolicy for TimeoutExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        let deadline = deadline_after(state.last_time_used(), self.max_time_to_live_in_seconds);
        check_deadline(deadline, now, |deadline| ExpirationReason::IdleTimeout {
            deadline,
        })
    }

    fn time_to_live(&self) -> Option<i64> {
        Some(self.max_time_to_live_in_seconds)
    }

    fn time_to_idle(&self) -> Option<i64> {
        Some(self.max_time_to_live_in_seconds)
    }
}

/// Default SSO session policy: a hard cap on total lifetime plus an idle
/// window that each use resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketGrantingTicketExpirationPolicy {
    max_time_to_live_in_seconds: i64,
    time_to_kill_in_seconds: i64,
}

impl TicketGrantingTicketExpirationPolicy {
    /// Hard cap `max_time_to_live_in_seconds`, idle window `time_to_kill_in_seconds`.
    #[must_use]
    pub const fn new(max_time_to_live_in_seconds: i64, time_to_kill_in_seconds: i64) -> Self {
        Self {
            max_time_to_live_in_seconds,
            time_to_kill_in_seconds,
        }
    }
}

impl ExpirationPolicy for TicketGrantingTicketExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        let hard = deadline_after(state.creation_time(), self.max_time_to_live_in_seconds);
        check_deadline(hard, now, |deadline| ExpirationReason::HardTimeout {
            deadline,
        })?;

        let idle = deadline_after(state.last_time_used(), self.time_to_kill_in_seconds);
        check_deadline(idle, now, |deadline| ExpirationReason::IdleTimeout {
            deadline,
        })
    }

    fn time_to_live(&self) -> Option<i64> {
        Some(self.max_time_to_live_in_seconds)
    }

    fn time_to_idle(&self) -> Option<i64> {
        Some(self.time_to_kill_in_seconds)
    }
}
