//! Test fixtures.
//!
//! Deterministic id generation and ready-made authentications, services and
//! sessions for tests. Enabled by the `test-utils` feature.

use crate::authentication::{Authentication, Principal};
use crate::expiration::NeverExpiresExpirationPolicy;
use crate::id::UniqueTicketIdGenerator;
use crate::service::Service;
use crate::ticket::{TicketGrantingTicket, TicketId};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Instant fixtures are created at: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn fixture_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

/// Authentication of `principal` at [`fixture_time`].
#[must_use]
pub fn test_authentication(principal: &str) -> Authentication {
    Authentication::new(Principal::new(principal), fixture_time())
}

/// A web application service.
#[must_use]
pub fn test_service(url: &str) -> Service {
    Service::new(url)
}

/// A never-expiring root session created at [`fixture_time`].
#[must_use]
pub fn test_ticket_granting_ticket(
    id: &str,
    authentication: Authentication,
) -> TicketGrantingTicket {
    TicketGrantingTicket::new(
        TicketId::unchecked(id),
        authentication,
        NeverExpiresExpirationPolicy.into(),
        fixture_time(),
    )
}

/// Predictable `<PREFIX>-<n>` ids.
#[derive(Debug, Default)]
pub struct SequentialTicketIdGenerator {
    next: AtomicU64,
}

impl SequentialTicketIdGenerator {
    /// Start counting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl UniqueTicketIdGenerator for SequentialTicketIdGenerator {
    fn new_ticket_id(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let generator = SequentialTicketIdGenerator::new();
        assert_eq!(generator.new_ticket_id("TGT"), "TGT-1");
        assert_eq!(generator.new_ticket_id("ST"), "ST-2");
        assert_eq!(generator.issued(), 2);
    }
}
