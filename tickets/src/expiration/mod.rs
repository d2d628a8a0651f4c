//! Expiration policies.
//!
//! A policy is a pure predicate over a ticket's use-tracking state. It never
//! looks at the granting chain; cascading expiration is layered on top by
//! [`crate::lifecycle`].
//!
//! Every policy implements [`ExpirationPolicy`]. Tickets carry the closed,
//! serializable [`TicketExpirationPolicy`] so a ticket can travel through a
//! registry and come back with its policy intact.

mod basic;
mod remember_me;
mod timeout;
mod usage;

pub use basic::{AlwaysExpiresExpirationPolicy, NeverExpiresExpirationPolicy};
pub use remember_me::RememberMeDelegatingExpirationPolicy;
pub use timeout::{
    HardTimeoutExpirationPolicy, TicketGrantingTicketExpirationPolicy, TimeoutExpirationPolicy,
};
pub use usage::{MultiTimeUseOrTimeoutExpirationPolicy, ThrottledUseAndTimeoutExpirationPolicy};

use crate::authentication::Authentication;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Use-tracking state a policy evaluates.
pub trait TicketState {
    /// Number of times the ticket was used.
    fn count_of_uses(&self) -> u32;

    /// When the ticket was created.
    fn creation_time(&self) -> DateTime<Utc>;

    /// When the ticket was last used (creation time if never used).
    fn last_time_used(&self) -> DateTime<Utc>;

    /// When the ticket was used before the last use.
    fn previous_time_used(&self) -> Option<DateTime<Utc>>;

    /// Authentication carried by the ticket, if it carries one.
    fn authentication(&self) -> Option<&Authentication>;
}

/// Why a ticket is considered expired.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpirationReason {
    /// The policy expires every ticket.
    #[error("ticket expires immediately")]
    Always,

    /// Absolute lifetime exceeded.
    #[error("hard timeout reached at {deadline}")]
    HardTimeout {
        /// Instant the lifetime ended
        deadline: DateTime<Utc>,
    },

    /// Unused for longer than the idle window.
    #[error("idle timeout reached at {deadline}")]
    IdleTimeout {
        /// Instant the idle window closed
        deadline: DateTime<Utc>,
    },

    /// All permitted uses were spent.
    #[error("used {count} of {limit} permitted times")]
    UsageExhausted {
        /// Uses so far
        count: u32,
        /// Uses permitted
        limit: u32,
    },

    /// Used again before the throttle window elapsed.
    #[error("used too frequently, next use allowed after {next_allowed}")]
    Throttled {
        /// Earliest instant the next use would have been accepted
        next_allowed: DateTime<Utc>,
    },

    /// Single-use ticket was already validated.
    #[error("ticket was already consumed")]
    Consumed,

    /// Granting ticket was explicitly expired (logout).
    #[error("ticket was explicitly expired")]
    MarkedExpired,

    /// An ancestor in the granting chain is expired.
    #[error("granting ticket {ticket_id} is expired")]
    GrantingTicketExpired {
        /// Expired ancestor
        ticket_id: String,
    },

    /// An ancestor in the granting chain is no longer in the registry.
    #[error("granting ticket {ticket_id} no longer exists")]
    GrantingTicketMissing {
        /// Missing ancestor
        ticket_id: String,
    },
}

/// `start` shifted by `seconds`, `None` when that instant is not
/// representable. An unrepresentable deadline never elapses.
pub(crate) fn deadline_after(start: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(seconds).and_then(|delta| start.checked_add_signed(delta))
}

/// Decides whether a ticket is expired.
pub trait ExpirationPolicy {
    /// Evaluate the ticket at `now`.
    ///
    /// # Errors
    ///
    /// Returns the [`ExpirationReason`] when the ticket is expired.
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ExpirationReason>;

    /// Whether the ticket is expired at `now`.
    fn is_expired(&self, state: &dyn TicketState, now: DateTime<Utc>) -> bool {
        self.validate(state, now).is_err()
    }

    /// Maximum lifetime in seconds, used by registries as a storage TTL.
    /// `None` means unbounded.
    fn time_to_live(&self) -> Option<i64>;

    /// Idle window in seconds, if the policy has one.
    fn time_to_idle(&self) -> Option<i64> {
        None
    }
}

/// The policies a ticket can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketExpirationPolicy {
    /// See [`AlwaysExpiresExpirationPolicy`].
    AlwaysExpires(AlwaysExpiresExpirationPolicy),
    /// See [`NeverExpiresExpirationPolicy`].
    NeverExpires(NeverExpiresExpirationPolicy),
    /// See [`HardTimeoutExpirationPolicy`].
    HardTimeout(HardTimeoutExpirationPolicy),
    /// See [`TimeoutExpirationPolicy`].
    Timeout(TimeoutExpirationPolicy),
    /// See [`TicketGrantingTicketExpirationPolicy`].
    TicketGrantingTicket(TicketGrantingTicketExpirationPolicy),
    /// See [`MultiTimeUseOrTimeoutExpirationPolicy`].
    MultiTimeUseOrTimeout(MultiTimeUseOrTimeoutExpirationPolicy),
    /// See [`ThrottledUseAndTimeoutExpirationPolicy`].
    ThrottledUseAndTimeout(ThrottledUseAndTimeoutExpirationPolicy),
    /// See [`RememberMeDelegatingExpirationPolicy`].
    RememberMeDelegating(RememberMeDelegatingExpirationPolicy),
}

impl TicketExpirationPolicy {
    fn inner(&self) -> &dyn ExpirationPolicy {
        match self {
            Self::AlwaysExpires(p) => p,
            Self::NeverExpires(p) => p,
            Self::HardTimeout(p) => p,
            Self::Timeout(p) => p,
            Self::TicketGrantingTicket(p) => p,
            Self::MultiTimeUseOrTimeout(p) => p,
            Self::ThrottledUseAndTimeout(p) => p,
            Self::RememberMeDelegating(p) => p,
        }
    }

    /// Short policy name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AlwaysExpires(_) => "always_expires",
            Self::NeverExpires(_) => "never_expires",
            Self::HardTimeout(_) => "hard_timeout",
            Self::Timeout(_) => "timeout",
            Self::TicketGrantingTicket(_) => "ticket_granting_ticket",
            Self::MultiTimeUseOrTimeout(_) => "multi_time_use_or_timeout",
            Self::ThrottledUseAndTimeout(_) => "throttled_use_and_timeout",
            Self::RememberMeDelegating(_) => "remember_me_delegating",
        }
    }
}

impl ExpirationPolicy for TicketExpirationPolicy {
    fn validate(
        &self,
        state: &dyn TicketState,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ExpirationReason> {
        self.inner().validate(state, now)
    }

    fn time_to_live(&self) -> Option<i64> {
        self.inner().time_to_live()
    }

    fn time_to_idle(&self) -> Option<i64> {
        self.inner().time_to_idle()
    }
}

macro_rules! impl_from_policy {
    ($($variant:ident => $policy:ty),* $(,)?) => {
        $(
            impl From<$policy> for TicketExpirationPolicy {
                fn from(policy: $policy) -> Self {
                    Self::$variant(policy)
                }
            }
        )*
    };
}

impl_from_policy! {
    AlwaysExpires => AlwaysExpiresExpirationPolicy,
    NeverExpires => NeverExpiresExpirationPolicy,
    HardTimeout => HardTimeoutExpirationPolicy,
    Timeout => TimeoutExpirationPolicy,
    TicketGrantingTicket => TicketGrantingTicketExpirationPolicy,
    MultiTimeUseOrTimeout => MultiTimeUseOrTimeoutExpirationPolicy,
    ThrottledUseAndTimeout => ThrottledUseAndTimeoutExpirationPolicy,
    RememberMeDelegating => RememberMeDelegatingExpirationPolicy,
}

/// Plain [`TicketState`] snapshot, handy for evaluating policies directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// See [`TicketState::count_of_uses`].
    pub count_of_uses: u32,
    /// See [`TicketState::creation_time`].
    pub creation_time: DateTime<Utc>,
    /// See [`TicketState::last_time_used`].
    pub last_time_used: DateTime<Utc>,
    /// See [`TicketState::previous_time_used`].
    pub previous_time_used: Option<DateTime<Utc>>,
    /// See [`TicketState::authentication`].
    pub authentication: Option<Authentication>,
}

impl StateSnapshot {
    /// Fresh, never-used state created at `at`.
    #[must_use]
    pub const fn created_at(at: DateTime<Utc>) -> Self {
        Self {
            count_of_uses: 0,
            creation_time: at,
            last_time_used: at,
            previous_time_used: None,
            authentication: None,
        }
    }
}

impl TicketState for StateSnapshot {
    fn count_of_uses(&self) -> u32 {
        self.count_of_uses
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn last_time_used(&self) -> DateTime<Utc> {
        self.last_time_used
    }

    fn previous_time_used(&self) -> Option<DateTime<Utc>> {
        self.previous_time_used
    }

    fn authentication(&self) -> Option<&Authentication> {
        self.authentication.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use cas_testing::test_epoch;
    use chrono::Duration;

    #[test]
    fn test_enum_delegates_to_inner_policy() {
        let policy: TicketExpirationPolicy = HardTimeoutExpirationPolicy::new(10).into();
        let state = StateSnapshot::created_at(test_epoch());

        assert!(!policy.is_expired(&state, test_epoch() + Duration::seconds(10)));
        assert_eq!(
            policy.validate(&state, test_epoch() + Duration::seconds(11)),
            Err(ExpirationReason::HardTimeout {
                deadline: test_epoch() + Duration::seconds(10)
            })
        );
        assert_eq!(policy.time_to_live(), Some(10));
        assert_eq!(policy.name(), "hard_timeout");
    }

    #[test]
    fn test_policy_survives_json() {
        let policy: TicketExpirationPolicy = RememberMeDelegatingExpirationPolicy::new(
            HardTimeoutExpirationPolicy::new(1_209_600).into(),
            TicketGrantingTicketExpirationPolicy::new(28_800, 7_200).into(),
        )
        .into();

        let json = serde_json::to_string(&policy).unwrap();
        let back: TicketExpirationPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }
}
