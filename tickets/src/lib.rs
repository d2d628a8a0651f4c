//! # CAS Tickets
//!
//! The ticket model of a CAS single sign-on server: the four ticket kinds,
//! their granting relationships, pluggable expiration policies, the
//! prefix-based catalog and the factories that mint tickets.
//!
//! ## Ticket hierarchy
//!
//! ```text
//! TicketGrantingTicket ──grants──▶ ServiceTicket ──grants──▶ ProxyGrantingTicket
//!                                                                  │
//!                                                                  └──grants──▶ ProxyTicket
//! ```
//!
//! A child only stores its parent's id. Expiration cascades down the chain
//! and use-tracking cascades up it, both resolved through a
//! [`registry::TicketRegistry`] by [`lifecycle::TicketLifecycle`].
//!
//! ## Example: login, then validate
//!
//! ```
//! use cas_tickets::config::TicketsConfig;
//! use cas_tickets::factory::TicketFactory;
//! use cas_tickets::lifecycle::TicketLifecycle;
//! use cas_tickets::mocks::{test_authentication, test_service};
//! use cas_tickets::registry::{DefaultTicketRegistry, TicketRegistry};
//! use cas_tickets::{ServiceTicket, TicketGrantingTicket};
//! use cas_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let factory = TicketFactory::from_config(&TicketsConfig::default(), Arc::new(SystemClock))?;
//! let lifecycle = TicketLifecycle::new(DefaultTicketRegistry::new(), SystemClock);
//! let service = test_service("https://app.example.org");
//!
//! let mut tgt = factory.get::<TicketGrantingTicket>()?.create(test_authentication("casuser"))?;
//! let st = factory.get::<ServiceTicket>()?.create(&mut tgt, &service, true)?;
//! let st_id = st.id().clone();
//! lifecycle.registry().add_ticket(tgt.into())?;
//! lifecycle.registry().add_ticket(st.into())?;
//!
//! assert!(lifecycle.validate_service_ticket(st_id.as_str(), &service).is_ok());
//! assert!(lifecycle.validate_service_ticket(st_id.as_str(), &service).is_err());
//! # Ok::<(), cas_tickets::TicketError>(())
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod authentication;
pub mod catalog;
pub mod cipher;
pub mod config;
pub mod error;
pub mod expiration;
pub mod factory;
pub mod id;
pub mod lifecycle;
pub mod registry;
pub mod serialization;
pub mod service;
pub mod ticket;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use authentication::{Authentication, Principal};
pub use catalog::{TicketCatalog, TicketDefinition};
pub use error::{Result, TicketError};
pub use expiration::{ExpirationPolicy, ExpirationReason, TicketExpirationPolicy};
pub use factory::TicketFactory;
pub use lifecycle::TicketLifecycle;
pub use registry::{DefaultTicketRegistry, TicketRegistry};
pub use service::Service;
pub use ticket::{
    ProxyGrantingTicket, ProxyTicket, ServiceTicket, Ticket, TicketGrantingTicket, TicketId,
    TicketKind,
};
