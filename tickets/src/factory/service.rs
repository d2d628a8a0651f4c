//! Service ticket factory.

use super::produce_ticket_id;
use crate::cipher::{CipherExecutor, NoOpCipherExecutor};
use crate::error::Result;
use crate::expiration::TicketExpirationPolicy;
use crate::id::ServiceTicketIdGenerators;
use crate::service::Service;
use crate::ticket::{SERVICE_TICKET_PREFIX, ServiceTicket, TicketGrantingTicket};
use cas_core::environment::Clock;
use std::sync::Arc;

/// Issues service tickets from a ticket-granting ticket.
#[derive(Clone)]
pub struct ServiceTicketFactory {
    id_generators: ServiceTicketIdGenerators,
    expiration_policy: TicketExpirationPolicy,
    cipher: Arc<dyn CipherExecutor>,
    only_track_most_recent_session: bool,
    clock: Arc<dyn Clock>,
}

impl ServiceTicketFactory {
    /// Create a factory with clear ids that tracks only the latest session
    /// per service.
    #[must_use]
    pub fn new(
        id_generators: ServiceTicketIdGenerators,
        expiration_policy: TicketExpirationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id_generators,
            expiration_policy,
            cipher: Arc::new(NoOpCipherExecutor),
            only_track_most_recent_session: true,
            clock,
        }
    }

    /// Encode generated ids before they leave the server.
    #[must_use]
    pub fn with_cipher(mut self, cipher: Arc<dyn CipherExecutor>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Whether a re-grant for the same service replaces the earlier session.
    #[must_use]
    pub fn with_only_track_most_recent_session(mut self, enabled: bool) -> Self {
        self.only_track_most_recent_session = enabled;
        self
    }

    /// Issue a service ticket for `service` under `ticket_granting_ticket`.
    ///
    /// The granting ticket is touched and records the session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TicketError::Cipher`] if encoding fails, or
    /// [`crate::TicketError::InvalidTicketId`] for an unusable id.
    pub fn create(
        &self,
        ticket_granting_ticket: &mut TicketGrantingTicket,
        service: &Service,
        credential_provided: bool,
    ) -> Result<ServiceTicket> {
        let id = produce_ticket_id(
            self.id_generators.for_service(service),
            self.cipher.as_ref(),
            SERVICE_TICKET_PREFIX,
        )?;

        let ticket = ticket_granting_ticket.grant_service_ticket(
            id,
            service.clone(),
            self.expiration_policy.clone(),
            credential_provided,
            self.only_track_most_recent_session,
            self.clock.now(),
        );
        tracing::info!(
            ticket_id = %ticket.id(),
            granting_ticket = %ticket_granting_ticket.id(),
            service = %service,
            from_new_login = ticket.is_from_new_login(),
            "Granted service ticket"
        );
        Ok(ticket)
    }
}

impl std::fmt::Debug for ServiceTicketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTicketFactory")
            .field("id_generators", &self.id_generators)
            .field("expiration_policy", &self.expiration_policy)
            .field("cipher", &self.cipher)
            .field(
                "only_track_most_recent_session",
                &self.only_track_most_recent_session,
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::expiration::{MultiTimeUseOrTimeoutExpirationPolicy, TicketState};
    use crate::id::UniqueTicketIdGenerator;
    use crate::mocks::{
        SequentialTicketIdGenerator, test_authentication, test_service,
        test_ticket_granting_ticket,
    };
    use cas_testing::test_clock;

    fn factory() -> ServiceTicketFactory {
        ServiceTicketFactory::new(
            ServiceTicketIdGenerators::new(Arc::new(SequentialTicketIdGenerator::new())),
            MultiTimeUseOrTimeoutExpirationPolicy::new(1, 10).into(),
            Arc::new(test_clock()),
        )
    }

    #[test]
    fn test_create_records_session_and_credential_flag() {
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));
        let st = factory()
            .create(&mut tgt, &test_service("https://app.example.org"), true)
            .unwrap();

        assert_eq!(st.id().as_str(), "ST-1");
        assert!(st.is_credential_provided());
        assert!(st.is_from_new_login());
        assert_eq!(tgt.count_of_uses(), 1);
        assert!(tgt.services().contains_key("ST-1"));
    }

    #[test]
    fn test_sso_ticket_is_not_from_new_login() {
        let factory = factory();
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));
        factory
            .create(&mut tgt, &test_service("https://one.example.org"), true)
            .unwrap();
        let st = factory
            .create(&mut tgt, &test_service("https://two.example.org"), false)
            .unwrap();
        assert!(!st.is_from_new_login());
    }

    #[test]
    fn test_tracking_all_sessions() {
        let factory = factory().with_only_track_most_recent_session(false);
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));
        let service = test_service("https://app.example.org");
        factory.create(&mut tgt, &service, false).unwrap();
        factory.create(&mut tgt, &service, false).unwrap();
        assert_eq!(tgt.services().len(), 2);
    }

    #[test]
    fn test_service_type_selects_generator() {
        #[derive(Debug)]
        struct Fixed;
        impl UniqueTicketIdGenerator for Fixed {
            fn new_ticket_id(&self, prefix: &str) -> String {
                format!("{prefix}-oauth")
            }
        }

        let factory = ServiceTicketFactory::new(
            ServiceTicketIdGenerators::new(Arc::new(SequentialTicketIdGenerator::new()))
                .with_generator("OAuthService", Arc::new(Fixed)),
            MultiTimeUseOrTimeoutExpirationPolicy::new(1, 10).into(),
            Arc::new(test_clock()),
        );
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));

        let oauth = factory
            .create(&mut tgt, &Service::with_type("https://client", "OAuthService"), false)
            .unwrap();
        let web = factory
            .create(&mut tgt, &test_service("https://app.example.org"), false)
            .unwrap();

        assert_eq!(oauth.id().as_str(), "ST-oauth");
        assert_eq!(web.id().as_str(), "ST-1");
    }
}
