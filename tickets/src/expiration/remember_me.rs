//! Remember-me aware delegation.

use super::{ExpirationPolicy, ExpirationReason, TicketExpirationPolicy, TicketState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Picks between two policies depending on whether the ticket's
/// authentication asked to be remembered.
///
/// Tickets without an authentication (service tickets) use the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberMeDelegatingExpirationPolicy {
    remember_me: Box<TicketExpirationPolicy>,
    default: Box<TicketExpirationPolicy>,
}

impl RememberMeDelegatingExpirationPolicy {
    /// Use `remember_me` for remembered logins and `default` otherwise.
    #[must_use]
    pub fn new(remember_me: TicketExpirationPolicy, default: TicketExpirationPolicy) -> Self {
        Self {
            remember_me: Box::new(remember_me),
            default: Box::new(default),
        }
    }

    fn select(&self, state: &dyn TicketState) -> &TicketExpirationPolicy {
        if state
            .authentication()
            .is_some_and(crate::authentication::Authentication::is_remember_me)
        {
            &self.remember_me
        } else {
            &self.default
        }
    }
}

impl ExpirationPolicy for RememberMeDelegatingExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> Result<(), ExpirationReason> {
        self.select(state).validate(state, now)
    }

    fn time_to_live(&self) -> Option<i64> {
        match (self.remember_me.time_to_live(), self.default.time_to_live()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        }
    }

    fn time_to_idle(&self) -> Option<i64> {
        self.default.time_to_idle()
    }
}
