//! Ticket-granting ticket factory.

use super::produce_ticket_id;
use crate::authentication::Authentication;
use crate::cipher::NoOpCipherExecutor;
use crate::error::Result;
use crate::expiration::TicketExpirationPolicy;
use crate::id::UniqueTicketIdGenerator;
use crate::ticket::{TICKET_GRANTING_TICKET_PREFIX, TicketGrantingTicket};
use cas_core::environment::Clock;
use std::sync::Arc;

/// Creates root sessions after a successful primary authentication.
#[derive(Clone)]
pub struct TicketGrantingTicketFactory {
    id_generator: Arc<dyn UniqueTicketIdGenerator>,
    expiration_policy: TicketExpirationPolicy,
    clock: Arc<dyn Clock>,
}

impl TicketGrantingTicketFactory {
    /// Create a factory.
    #[must_use]
    pub fn new(
        id_generator: Arc<dyn UniqueTicketIdGenerator>,
        expiration_policy: TicketExpirationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id_generator,
            expiration_policy,
            clock,
        }
    }

    /// Policy attached to new tickets.
    #[must_use]
    pub const fn expiration_policy(&self) -> &TicketExpirationPolicy {
        &self.expiration_policy
    }

    /// Create a ticket-granting ticket for `authentication`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TicketError::InvalidTicketId`] if the generator
    /// produced an unusable id.
    pub fn create(&self, authentication: Authentication) -> Result<TicketGrantingTicket> {
        let id = produce_ticket_id(
            self.id_generator.as_ref(),
            &NoOpCipherExecutor,
            TICKET_GRANTING_TICKET_PREFIX,
        )?;
        tracing::info!(
            ticket_id = %id,
            principal = %authentication.principal.id,
            policy = self.expiration_policy.name(),
            "Created ticket-granting ticket"
        );
        Ok(TicketGrantingTicket::new(
            id,
            authentication,
            self.expiration_policy.clone(),
            self.clock.now(),
        ))
    }
}

impl std::fmt::Debug for TicketGrantingTicketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketGrantingTicketFactory")
            .field("id_generator", &self.id_generator)
            .field("expiration_policy", &self.expiration_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::expiration::{ExpirationPolicy, TicketGrantingTicketExpirationPolicy};
    use crate::mocks::{SequentialTicketIdGenerator, test_authentication};
    use cas_testing::{test_clock, test_epoch};

    #[test]
    fn test_create_attaches_policy_and_clock_time() {
        let factory = TicketGrantingTicketFactory::new(
            Arc::new(SequentialTicketIdGenerator::new()),
            TicketGrantingTicketExpirationPolicy::new(28_800, 7_200).into(),
            Arc::new(test_clock()),
        );

        let tgt = factory.create(test_authentication("casuser")).unwrap();

        assert_eq!(tgt.id().as_str(), "TGT-1");
        assert!(tgt.is_root());
        assert_eq!(tgt.core().expiration_policy().time_to_live(), Some(28_800));
        assert_eq!(
            crate::expiration::TicketState::creation_time(tgt.core()),
            test_epoch()
        );
        assert_eq!(tgt.authentication().principal.id, "casuser");
    }
}
