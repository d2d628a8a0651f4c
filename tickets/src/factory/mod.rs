//! Ticket factories.
//!
//! One factory per kind generates the id, picks the expiration policy and
//! has the parent ticket (if any) mint the child. [`TicketFactory`] puts all
//! of them behind a single lookup keyed by the ticket type they produce:
//!
//! ```
//! # use cas_tickets::factory::TicketFactory;
//! # use cas_tickets::config::TicketsConfig;
//! # use cas_tickets::mocks::{test_authentication, test_service};
//! # use cas_tickets::{ServiceTicket, TicketGrantingTicket};
//! # use cas_core::environment::SystemClock;
//! # use std::sync::Arc;
//! let factory = TicketFactory::from_config(&TicketsConfig::default(), Arc::new(SystemClock))?;
//!
//! let mut tgt = factory
//!     .get::<TicketGrantingTicket>()?
//!     .create(test_authentication("casuser"))?;
//! let st = factory
//!     .get::<ServiceTicket>()?
//!     .create(&mut tgt, &test_service("https://app.example.org"), true)?;
//! assert!(st.id().as_str().starts_with("ST-"));
//! # Ok::<(), cas_tickets::TicketError>(())
//! ```

mod granting;
mod proxy;
mod service;

pub use granting::TicketGrantingTicketFactory;
pub use proxy::{ProxyGrantingTicketFactory, ProxyTicketFactory};
pub use service::ServiceTicketFactory;

use crate::cipher::{CipherExecutor, ProtocolTicketCipherExecutor};
use crate::config::TicketsConfig;
use crate::error::{Result, TicketError};
use crate::id::{DefaultUniqueTicketIdGenerator, ServiceTicketIdGenerators, UniqueTicketIdGenerator};
use crate::ticket::{
    ProxyGrantingTicket, ProxyTicket, ServiceTicket, TicketGrantingTicket, TicketId, TicketKind,
    TicketType,
};
use cas_core::environment::Clock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Links a ticket type to the factory that produces it.
pub trait ProducedBy: TicketType {
    /// The factory for this ticket type.
    type Factory: Send + Sync + 'static;
}

impl ProducedBy for TicketGrantingTicket {
    type Factory = TicketGrantingTicketFactory;
}

impl ProducedBy for ServiceTicket {
    type Factory = ServiceTicketFactory;
}

impl ProducedBy for ProxyGrantingTicket {
    type Factory = ProxyGrantingTicketFactory;
}

impl ProducedBy for ProxyTicket {
    type Factory = ProxyTicketFactory;
}

/// Generate an id, encode it, and check it carries `prefix`.
pub(crate) fn produce_ticket_id(
    generator: &dyn UniqueTicketIdGenerator,
    cipher: &dyn CipherExecutor,
    prefix: &str,
) -> Result<TicketId> {
    let id = generator.new_ticket_id(prefix);
    let id = if cipher.is_enabled() {
        cipher.encode(&id)?
    } else {
        id
    };
    if !id.starts_with(prefix) {
        return Err(TicketError::InvalidTicketId {
            reason: format!("generated id does not start with {prefix}"),
        });
    }
    TicketId::new(id)
}

/// Factory dispatcher: "the factory that produces `T`".
///
/// Built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct TicketFactory {
    factories: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl TicketFactory {
    /// Start building a dispatcher.
    #[must_use]
    pub fn builder() -> TicketFactoryBuilder {
        TicketFactoryBuilder::default()
    }

    /// Wire all four core factories from configuration, with the default
    /// id generator.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidConfiguration`] for a bad crypto setup.
    pub fn from_config(config: &TicketsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let generator = match &config.suffix {
            Some(suffix) => DefaultUniqueTicketIdGenerator::new().with_suffix(suffix.as_str()),
            None => DefaultUniqueTicketIdGenerator::new(),
        };
        Self::from_config_with_generator(config, Arc::new(generator), clock)
    }

    /// Wire all four core factories around one id generator.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidConfiguration`] for a bad crypto setup.
    pub fn from_config_with_generator(
        config: &TicketsConfig,
        generator: Arc<dyn UniqueTicketIdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cipher = ProtocolTicketCipherExecutor::from_config(&config.crypto)?;
        let service_generators = ServiceTicketIdGenerators::new(Arc::clone(&generator));
        let only_track = config.only_track_most_recent_session;

        Self::builder()
            .with_factory::<TicketGrantingTicket>(TicketGrantingTicketFactory::new(
                Arc::clone(&generator),
                config.ticket_granting.expiration_policy(),
                Arc::clone(&clock),
            ))
            .with_factory::<ServiceTicket>(
                ServiceTicketFactory::new(
                    service_generators.clone(),
                    config.service.expiration_policy(),
                    Arc::clone(&clock),
                )
                .with_cipher(Arc::clone(&cipher))
                .with_only_track_most_recent_session(only_track),
            )
            .with_factory::<ProxyGrantingTicket>(
                ProxyGrantingTicketFactory::new(
                    Arc::clone(&generator),
                    config.proxy_granting.expiration_policy(&config.ticket_granting),
                    Arc::clone(&clock),
                )
                .with_cipher(Arc::clone(&cipher)),
            )
            .with_factory::<ProxyTicket>(
                ProxyTicketFactory::new(
                    service_generators,
                    config.proxy.expiration_policy(),
                    clock,
                )
                .with_cipher(cipher)
                .with_only_track_most_recent_session(only_track),
            )
            .build()
    }

    /// The factory producing `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::FactoryNotConfigured`] if none was registered.
    pub fn get<T: ProducedBy>(&self) -> Result<&T::Factory> {
        self.factories
            .get(&TypeId::of::<T>())
            .and_then(|factory| factory.downcast_ref::<T::Factory>())
            .ok_or_else(|| TicketError::FactoryNotConfigured {
                kind: T::KIND.name().to_string(),
            })
    }
}

impl std::fmt::Debug for TicketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketFactory")
            .field("factories", &self.factories.len())
            .finish()
    }
}

/// Builder for [`TicketFactory`].
#[derive(Default)]
pub struct TicketFactoryBuilder {
    factories: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl TicketFactoryBuilder {
    /// Register the factory producing `T`, replacing any earlier one.
    #[must_use]
    pub fn with_factory<T: ProducedBy>(mut self, factory: T::Factory) -> Self {
        tracing::debug!(kind = %T::KIND, "Registering ticket factory");
        self.factories.insert(TypeId::of::<T>(), Arc::new(factory));
        self
    }

    /// Finish, requiring a factory for each of the four core kinds.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::FactoryNotConfigured`] naming the first kind
    /// without a factory.
    pub fn build(self) -> Result<TicketFactory> {
        let required = [
            (TypeId::of::<TicketGrantingTicket>(), TicketKind::TicketGrantingTicket),
            (TypeId::of::<ServiceTicket>(), TicketKind::ServiceTicket),
            (TypeId::of::<ProxyGrantingTicket>(), TicketKind::ProxyGrantingTicket),
            (TypeId::of::<ProxyTicket>(), TicketKind::ProxyTicket),
        ];
        if let Some((_, kind)) = required
            .iter()
            .find(|(type_id, _)| !self.factories.contains_key(type_id))
        {
            tracing::warn!(kind = %kind, "Ticket factory missing");
            return Err(TicketError::FactoryNotConfigured {
                kind: kind.name().to_string(),
            });
        }

        tracing::info!(factories = self.factories.len(), "Ticket factory ready");
        Ok(TicketFactory {
            factories: self.factories,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::cipher::NoOpCipherExecutor;
    use crate::mocks::{SequentialTicketIdGenerator, test_authentication, test_service};
    use cas_testing::test_clock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(test_clock())
    }

    #[test]
    fn test_build_fails_fast_on_missing_factory() {
        let generator: Arc<dyn UniqueTicketIdGenerator> =
            Arc::new(SequentialTicketIdGenerator::new());
        let err = TicketFactory::builder()
            .with_factory::<TicketGrantingTicket>(TicketGrantingTicketFactory::new(
                generator,
                crate::expiration::NeverExpiresExpirationPolicy.into(),
                clock(),
            ))
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            TicketError::FactoryNotConfigured {
                kind: "ServiceTicket".into()
            }
        );
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_dispatch_by_ticket_type() {
        let factory = TicketFactory::from_config_with_generator(
            &TicketsConfig::default(),
            Arc::new(SequentialTicketIdGenerator::new()),
            clock(),
        )
        .unwrap();

        let mut tgt = factory
            .get::<TicketGrantingTicket>()
            .unwrap()
            .create(test_authentication("casuser"))
            .unwrap();
        assert_eq!(tgt.id().as_str(), "TGT-1");

        let st = factory
            .get::<ServiceTicket>()
            .unwrap()
            .create(&mut tgt, &test_service("https://app.example.org"), true)
            .unwrap();
        assert_eq!(st.id().as_str(), "ST-2");
        assert_eq!(st.granting_ticket(), Some(tgt.id()));
    }

    #[test]
    fn test_encrypted_ids_keep_prefix() {
        let key = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [1u8; 32]);
        let config =
            TicketsConfig::default().with_crypto(crate::config::CryptoConfig::enabled(key));
        let decoder = ProtocolTicketCipherExecutor::new(&[1u8; 32]).unwrap();
        let factory = TicketFactory::from_config(&config, clock()).unwrap();

        let mut tgt = factory
            .get::<TicketGrantingTicket>()
            .unwrap()
            .create(test_authentication("casuser"))
            .unwrap();
        let st = factory
            .get::<ServiceTicket>()
            .unwrap()
            .create(&mut tgt, &test_service("https://app.example.org"), false)
            .unwrap();

        assert!(st.id().as_str().starts_with("ST-"));
        let clear = decoder.decode(st.id().as_str()).unwrap();
        assert!(clear.starts_with("ST-2-"));
        assert_ne!(clear, st.id().as_str());
    }

    #[test]
    fn test_produced_id_must_carry_prefix() {
        #[derive(Debug)]
        struct Broken;
        impl UniqueTicketIdGenerator for Broken {
            fn new_ticket_id(&self, _prefix: &str) -> String {
                "XYZ-1".to_string()
            }
        }

        assert!(matches!(
            produce_ticket_id(&Broken, &NoOpCipherExecutor, "ST"),
            Err(TicketError::InvalidTicketId { .. })
        ));
    }
}
