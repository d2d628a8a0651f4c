//! Proxy-granting and proxy ticket factories.

use super::produce_ticket_id;
use crate::authentication::Authentication;
use crate::cipher::{CipherExecutor, NoOpCipherExecutor};
use crate::error::Result;
use crate::expiration::TicketExpirationPolicy;
use crate::id::{ServiceTicketIdGenerators, UniqueTicketIdGenerator};
use crate::service::Service;
use crate::ticket::{
    PROXY_GRANTING_TICKET_PREFIX, PROXY_TICKET_PREFIX, ProxyGrantingTicket, ProxyTicket,
    ServiceTicket,
};
use cas_core::environment::Clock;
use std::fmt;
use std::sync::Arc;

/// Issues proxy-granting tickets to services that validated a ticket and
/// asked to proxy.
#[derive(Clone)]
pub struct ProxyGrantingTicketFactory {
    id_generator: Arc<dyn UniqueTicketIdGenerator>,
    expiration_policy: TicketExpirationPolicy,
    cipher: Arc<dyn CipherExecutor>,
    clock: Arc<dyn Clock>,
}

impl ProxyGrantingTicketFactory {
    /// Create a factory with clear ids.
    #[must_use]
    pub fn new(
        id_generator: Arc<dyn UniqueTicketIdGenerator>,
        expiration_policy: TicketExpirationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id_generator,
            expiration_policy,
            cipher: Arc::new(NoOpCipherExecutor),
            clock,
        }
    }

    /// Encode generated ids before they leave the server.
    #[must_use]
    pub fn with_cipher(mut self, cipher: Arc<dyn CipherExecutor>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Issue the proxy-granting ticket for `service_ticket`.
    ///
    /// Pass `proxy_ticket.as_service_ticket_mut()` to extend a proxy chain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TicketError::InvalidProxyGrantingTicket`] if the
    /// ticket already granted one.
    pub fn create(
        &self,
        service_ticket: &mut ServiceTicket,
        authentication: Authentication,
    ) -> Result<ProxyGrantingTicket> {
        let id = produce_ticket_id(
            self.id_generator.as_ref(),
            self.cipher.as_ref(),
            PROXY_GRANTING_TICKET_PREFIX,
        )?;

        let ticket = service_ticket
            .grant_proxy_granting_ticket(
                id,
                authentication,
                self.expiration_policy.clone(),
                self.clock.now(),
            )
            .inspect_err(|err| {
                tracing::warn!(
                    ticket_id = %service_ticket.id(),
                    error = %err,
                    "Proxy granting refused"
                );
            })?;

        tracing::info!(
            ticket_id = %ticket.id(),
            service_ticket = %service_ticket.id(),
            proxied_by = %ticket.proxied_by(),
            "Granted proxy-granting ticket"
        );
        Ok(ticket)
    }
}

impl fmt::Debug for ProxyGrantingTicketFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyGrantingTicketFactory")
            .field("id_generator", &self.id_generator)
            .field("expiration_policy", &self.expiration_policy)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

/// Issues proxy tickets from a proxy-granting ticket.
#[derive(Clone)]
pub struct ProxyTicketFactory {
    id_generators: ServiceTicketIdGenerators,
    expiration_policy: TicketExpirationPolicy,
    cipher: Arc<dyn CipherExecutor>,
    only_track_most_recent_session: bool,
    clock: Arc<dyn Clock>,
}

impl ProxyTicketFactory {
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

    /// Issue a proxy ticket for the back-end `service`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TicketError::Cipher`] if encoding fails, or
    /// [`crate::TicketError::InvalidTicketId`] for an unusable id.
    pub fn create(
        &self,
        proxy_granting_ticket: &mut ProxyGrantingTicket,
        service: &Service,
    ) -> Result<ProxyTicket> {
        let id = produce_ticket_id(
            self.id_generators.for_service(service),
            self.cipher.as_ref(),
            PROXY_TICKET_PREFIX,
        )?;

        let ticket = proxy_granting_ticket.grant_proxy_ticket(
            id,
            service.clone(),
            self.expiration_policy.clone(),
            self.only_track_most_recent_session,
            self.clock.now(),
        );
        tracing::info!(
            ticket_id = %ticket.id(),
            proxy_granting_ticket = %proxy_granting_ticket.id(),
            service = %service,
            "Granted proxy ticket"
        );
        Ok(ticket)
    }
}

impl fmt::Debug for ProxyTicketFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyTicketFactory")
            .field("id_generators", &self.id_generators)
            .field("expiration_policy", &self.expiration_policy)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::TicketError;
    use crate::expiration::{MultiTimeUseOrTimeoutExpirationPolicy, NeverExpiresExpirationPolicy};
    use crate::factory::ServiceTicketFactory;
    use crate::mocks::{
        SequentialTicketIdGenerator, test_authentication, test_service,
        test_ticket_granting_ticket,
    };
    use crate::ticket::TicketId;
    use cas_testing::test_clock;

    struct Factories {
        service: ServiceTicketFactory,
        proxy_granting: ProxyGrantingTicketFactory,
        proxy: ProxyTicketFactory,
    }

    fn factories() -> Factories {
        let generator: Arc<dyn UniqueTicketIdGenerator> =
            Arc::new(SequentialTicketIdGenerator::new());
        let generators = ServiceTicketIdGenerators::new(Arc::clone(&generator));
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        Factories {
            service: ServiceTicketFactory::new(
                generators.clone(),
                MultiTimeUseOrTimeoutExpirationPolicy::new(1, 10).into(),
                Arc::clone(&clock),
            ),
            proxy_granting: ProxyGrantingTicketFactory::new(
                generator,
                NeverExpiresExpirationPolicy.into(),
                Arc::clone(&clock),
            ),
            proxy: ProxyTicketFactory::new(
                generators,
                MultiTimeUseOrTimeoutExpirationPolicy::new(1, 10).into(),
                clock,
            ),
        }
    }

    #[test]
    fn test_proxy_chain() {
        let f = factories();
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));
        let proxy = test_service("https://proxy.example.org");
        let mut st = f.service.create(&mut tgt, &proxy, false).unwrap();

        let mut pgt = f
            .proxy_granting
            .create(&mut st, test_authentication("https://proxy.example.org/pgtUrl"))
            .unwrap();
        assert_eq!(pgt.id().as_str(), "PGT-2");
        assert_eq!(pgt.granting_ticket().map(TicketId::as_str), Some("TGT-1"));
        assert_eq!(pgt.proxied_by(), &proxy);

        let pt = f
            .proxy
            .create(&mut pgt, &test_service("https://backend.example.org"))
            .unwrap();
        assert_eq!(pt.id().as_str(), "PT-3");
        assert_eq!(pt.granting_ticket().map(TicketId::as_str), Some("PGT-2"));
        assert!(pgt.as_granting().services().contains_key("PT-3"));
    }

    #[test]
    fn test_second_proxy_granting_ticket_is_refused() {
        let f = factories();
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));
        let mut st = f
            .service
            .create(&mut tgt, &test_service("https://proxy.example.org"), false)
            .unwrap();

        f.proxy_granting
            .create(&mut st, test_authentication("https://proxy.example.org/pgtUrl"))
            .unwrap();
        let err = f
            .proxy_granting
            .create(&mut st, test_authentication("https://proxy.example.org/pgtUrl"))
            .unwrap_err();
        assert!(matches!(err, TicketError::InvalidProxyGrantingTicket { .. }));
    }

    #[test]
    fn test_proxy_ticket_can_extend_chain() {
        let f = factories();
        let mut tgt = test_ticket_granting_ticket("TGT-1", test_authentication("casuser"));
        let mut st = f
            .service
            .create(&mut tgt, &test_service("https://proxy.example.org"), false)
            .unwrap();
        let mut pgt = f
            .proxy_granting
            .create(&mut st, test_authentication("https://proxy.example.org/pgtUrl"))
            .unwrap();
        let mut pt = f
            .proxy
            .create(&mut pgt, &test_service("https://second.example.org"))
            .unwrap();

        let nested = f
            .proxy_granting
            .create(
                pt.as_service_ticket_mut(),
                test_authentication("https://second.example.org/pgtUrl"),
            )
            .unwrap();
        assert_eq!(nested.granting_ticket(), Some(pgt.id()));
    }
}
