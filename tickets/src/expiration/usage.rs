//! Use-count based policies.

use super::{ExpirationPolicy, ExpirationReason, TicketState, deadline_after};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Expires after a fixed number of uses or an idle window, whichever
/// comes first. Service and proxy tickets use this with one use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTimeUseOrTimeoutExpirationPolicy {
    number_of_uses: u32,
    time_to_kill_in_seconds: i64,
}

impl MultiTimeUseOrTimeoutExpirationPolicy {
    /// Allow `number_of_uses` uses within `time_to_kill_in_seconds` of the last one.
    #[must_use]
    pub const fn new(number_of_uses: u32, time_to_kill_in_seconds: i64) -> Self {
        Self {
            number_of_uses,
            time_to_kill_in_seconds,
        }
    }

    /// Permitted number of uses.
    #[must_use]
    pub const fn number_of_uses(&self) -> u32 {
        self.number_of_uses
    }
}

impl ExpirationPolicy for MultiTimeUseOrTimeoutExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        let count = state.count_of_uses();
        if count >= self.number_of_uses {
            return Err(ExpirationReason::UsageExhausted {
                count,
                limit: self.number_of_uses,
            });
        }

        let idle = deadline_after(state.last_time_used(), self.time_to_kill_in_seconds);
        if let Some(deadline) = idle.filter(|deadline| now > *deadline) {
            return Err(ExpirationReason::IdleTimeout { deadline });
        }
        Ok(())
    }

    fn time_to_live(&self) -> Option<i64> {
        Some(self.time_to_kill_in_seconds)
    }
}

/// Idle timeout that also refuses bursts: a use that lands within
/// `time_in_between_uses_in_seconds` of the last one expires the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottledUseAndTimeoutExpirationPolicy {
    time_to_kill_in_seconds: i64,
    time_in_between_uses_in_seconds: i64,
}

impl ThrottledUseAndTimeoutExpirationPolicy {
    /// Idle window `time_to_kill_in_seconds`, minimum spacing `time_in_between_uses_in_seconds`.
    #[must_use]
    pub const fn new(time_to_kill_in_seconds: i64, time_in_between_uses_in_seconds: i64) -> Self {
        Self {
            time_to_kill_in_seconds,
            time_in_between_uses_in_seconds,
        }
    }
}

impl ExpirationPolicy for ThrottledUseAndTimeoutExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        let last_used = state.last_time_used();
        let idle = deadline_after(last_used, self.time_to_kill_in_seconds);
        if let Some(deadline) = idle.filter(|deadline| now >= *deadline) {
            return Err(ExpirationReason::IdleTimeout { deadline });
        }

        if state.count_of_uses() == 0 {
            return Ok(());
        }

        let throttle = deadline_after(last_used, self.time_in_between_uses_in_seconds);
        if let Some(next_allowed) = throttle.filter(|next_allowed| now < *next_allowed) {
            tracing::warn!(%next_allowed, "Ticket is being used too frequently");
            return Err(ExpirationReason::Throttled { next_allowed });
        }
        Ok(())
    }

    fn time_to_live(&self) -> Option<i64> {
        Some(self.time_to_kill_in_seconds)
    }

    fn time_to_idle(&self) -> Option<i64> {
        Some(self.time_to_kill_in_seconds)
    }
}
