//! Ticket entities.
//!
//! Four kinds exist, forming a shallow tree:
//!
//! ```text
//! TicketGrantingTicket (root of an SSO session)
//! ├── ServiceTicket            single use, one relying service
//! └── ProxyGrantingTicket      issued when a service asks to proxy
//!     └── ProxyTicket          single use, one back-end service
//! ```
//!
//! Children never own their parent. They store the parent's [`TicketId`]
//! and cascading checks resolve it through a registry (see
//! [`crate::lifecycle`]). Everything here is plain data: no locking, no I/O,
//! and "now" is always passed in.

mod granting;
mod service;

pub use granting::{ProxyGrantingTicket, TicketGrantingTicket};
pub use service::{ProxyTicket, ServiceTicket};

use crate::authentication::Authentication;
use crate::error::{Result, TicketError};
use crate::expiration::{
    ExpirationPolicy, ExpirationReason, TicketExpirationPolicy, TicketState,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix of ticket-granting ticket ids.
pub const TICKET_GRANTING_TICKET_PREFIX: &str = "TGT";
/// Prefix of service ticket ids.
pub const SERVICE_TICKET_PREFIX: &str = "ST";
/// Prefix of proxy-granting ticket ids.
pub const PROXY_GRANTING_TICKET_PREFIX: &str = "PGT";
/// Prefix of proxy ticket ids.
pub const PROXY_TICKET_PREFIX: &str = "PT";

// ═══════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════

/// Opaque ticket identifier, e.g. `ST-42-k2Jd9...-cas01`.
///
/// Ordering is lexicographic, which gives tickets their natural order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    /// Wrap a generated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidTicketId`] if the id is blank or
    /// contains whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TicketError::InvalidTicketId {
                reason: "ticket id must not be empty".to_string(),
            });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(TicketError::InvalidTicketId {
                reason: format!("ticket id {id:?} contains whitespace"),
            });
        }
        Ok(Self(id))
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TicketId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TicketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TicketId {
    type Error = TicketError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.0
    }
}

/// The four ticket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketKind {
    /// Root of an SSO session.
    TicketGrantingTicket,
    /// Single-use proof of authentication for one service.
    ServiceTicket,
    /// Session root handed to a proxying service.
    ProxyGrantingTicket,
    /// Single-use proof derived from a proxy-granting ticket.
    ProxyTicket,
}

impl TicketKind {
    /// Every kind, in catalog order.
    pub const ALL: [Self; 4] = [
        Self::TicketGrantingTicket,
        Self::ServiceTicket,
        Self::ProxyGrantingTicket,
        Self::ProxyTicket,
    ];

    /// Protocol-reserved id prefix for this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::TicketGrantingTicket => TICKET_GRANTING_TICKET_PREFIX,
            Self::ServiceTicket => SERVICE_TICKET_PREFIX,
            Self::ProxyGrantingTicket => PROXY_GRANTING_TICKET_PREFIX,
            Self::ProxyTicket => PROXY_TICKET_PREFIX,
        }
    }

    /// Type name, as used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TicketGrantingTicket => "TicketGrantingTicket",
            Self::ServiceTicket => "ServiceTicket",
            Self::ProxyGrantingTicket => "ProxyGrantingTicket",
            Self::ProxyTicket => "ProxyTicket",
        }
    }

    /// Whether tickets of this kind can grant children.
    #[must_use]
    pub const fn is_granting(self) -> bool {
        matches!(self, Self::TicketGrantingTicket | Self::ProxyGrantingTicket)
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Shared state
// ═══════════════════════════════════════════════════════════════════════

/// Identity and use-tracking state shared by every ticket kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCore {
    id: TicketId,
    creation_time: DateTime<Utc>,
    last_time_used: DateTime<Utc>,
    #[serde(default)]
    previous_time_used: Option<DateTime<Utc>>,
    #[serde(default)]
    count_of_uses: u32,
    expiration_policy: TicketExpirationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    granting_ticket: Option<TicketId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
}

impl TicketCore {
    pub(crate) const fn new(
        id: TicketId,
        granting_ticket: Option<TicketId>,
        expiration_policy: TicketExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creation_time: now,
            last_time_used: now,
            previous_time_used: None,
            count_of_uses: 0,
            expiration_policy,
            granting_ticket,
            properties: BTreeMap::new(),
        }
    }

    /// Ticket id.
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        &self.id
    }

    /// Id of the granting (parent) ticket, if any.
    #[must_use]
    pub const fn granting_ticket(&self) -> Option<&TicketId> {
        self.granting_ticket.as_ref()
    }

    /// The policy this ticket was issued with.
    #[must_use]
    pub const fn expiration_policy(&self) -> &TicketExpirationPolicy {
        &self.expiration_policy
    }

    /// Record one use at `now`.
    ///
    /// `last_time_used` never moves backwards, even if the clock does.
    pub fn update(&mut self, now: DateTime<Utc>) {
        self.previous_time_used = Some(self.last_time_used);
        self.last_time_used = self.last_time_used.max(now);
        self.count_of_uses = self.count_of_uses.saturating_add(1);
    }

    /// Side-channel metadata attached by policies and protocol layers.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Attach side-channel metadata.
    pub fn put_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }
}

impl TicketState for TicketCore {
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
        None
    }
}

/// Implements identity-based equality, hashing, ordering and `Display` for a
/// ticket struct exposing `core()`.
macro_rules! ticket_identity {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.core().id() == other.core().id()
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.core().id().hash(state);
            }
        }

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.core().id().cmp(other.core().id())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(self.core().id(), f)
            }
        }
    };
}

pub(crate) use ticket_identity;

// ═══════════════════════════════════════════════════════════════════════
// Closed ticket family
// ═══════════════════════════════════════════════════════════════════════

/// Any ticket.
///
/// Equality, hashing and ordering look only at the id.
#[derive(Debug, Clone)]
pub enum Ticket {
    /// See [`TicketGrantingTicket`].
    TicketGranting(TicketGrantingTicket),
    /// See [`ServiceTicket`].
    Service(ServiceTicket),
    /// See [`ProxyGrantingTicket`].
    ProxyGranting(ProxyGrantingTicket),
    /// See [`ProxyTicket`].
    Proxy(ProxyTicket),
}

impl Ticket {
    /// Shared identity and use-tracking state.
    #[must_use]
    pub const fn core(&self) -> &TicketCore {
        match self {
            Self::TicketGranting(t) => t.core(),
            Self::Service(t) => t.core(),
            Self::ProxyGranting(t) => t.core(),
            Self::Proxy(t) => t.core(),
        }
    }

    /// Mutable access to the shared state.
    pub fn core_mut(&mut self) -> &mut TicketCore {
        match self {
            Self::TicketGranting(t) => t.core_mut(),
            Self::Service(t) => t.core_mut(),
            Self::ProxyGranting(t) => t.core_mut(),
            Self::Proxy(t) => t.core_mut(),
        }
    }

    /// Ticket id.
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        self.core().id()
    }

    /// Which of the four kinds this is.
    #[must_use]
    pub const fn kind(&self) -> TicketKind {
        match self {
            Self::TicketGranting(_) => TicketKind::TicketGrantingTicket,
            Self::Service(_) => TicketKind::ServiceTicket,
            Self::ProxyGranting(_) => TicketKind::ProxyGrantingTicket,
            Self::Proxy(_) => TicketKind::ProxyTicket,
        }
    }

    /// Catalog prefix for this ticket's kind.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        self.kind().prefix()
    }

    /// Id of the granting ticket, `None` for a root TGT.
    #[must_use]
    pub const fn granting_ticket(&self) -> Option<&TicketId> {
        self.core().granting_ticket()
    }

    /// Record one use of this ticket only. Ancestors are touched by
    /// [`crate::lifecycle::TicketLifecycle::update`].
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.core_mut().update(now);
    }

    /// Expiration hook independent of time: logout for granting tickets,
    /// consumption for service and proxy tickets.
    #[must_use]
    pub const fn is_expired_internal(&self) -> bool {
        match self {
            Self::TicketGranting(t) => t.is_marked_expired(),
            Self::ProxyGranting(t) => t.as_granting().is_marked_expired(),
            Self::Service(t) => t.is_consumed(),
            Self::Proxy(t) => t.as_service_ticket().is_consumed(),
        }
    }

    /// Check the ticket's own policy and internal hook, ignoring ancestors.
    ///
    /// # Errors
    ///
    /// Returns the reason the ticket is expired.
    pub fn check_local_expiration(
        &self,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ExpirationReason> {
        self.core().expiration_policy().validate(self, now)?;
        if self.is_expired_internal() {
            return Err(if self.kind().is_granting() {
                ExpirationReason::MarkedExpired
            } else {
                ExpirationReason::Consumed
            });
        }
        Ok(())
    }

    /// Borrow as a granting ticket (TGT or the TGT part of a PGT).
    #[must_use]
    pub const fn as_granting(&self) -> Option<&TicketGrantingTicket> {
        match self {
            Self::TicketGranting(t) => Some(t),
            Self::ProxyGranting(t) => Some(t.as_granting()),
            Self::Service(_) | Self::Proxy(_) => None,
        }
    }

    /// Mutably borrow as a granting ticket.
    pub fn as_granting_mut(&mut self) -> Option<&mut TicketGrantingTicket> {
        match self {
            Self::TicketGranting(t) => Some(t),
            Self::ProxyGranting(t) => Some(t.as_granting_mut()),
            Self::Service(_) | Self::Proxy(_) => None,
        }
    }

    /// Borrow as a service ticket (ST or the ST part of a PT).
    #[must_use]
    pub const fn as_service_ticket(&self) -> Option<&ServiceTicket> {
        match self {
            Self::Service(t) => Some(t),
            Self::Proxy(t) => Some(t.as_service_ticket()),
            Self::TicketGranting(_) | Self::ProxyGranting(_) => None,
        }
    }

    /// Mutably borrow as a service ticket.
    pub fn as_service_ticket_mut(&mut self) -> Option<&mut ServiceTicket> {
        match self {
            Self::Service(t) => Some(t),
            Self::Proxy(t) => Some(t.as_service_ticket_mut()),
            Self::TicketGranting(_) | Self::ProxyGranting(_) => None,
        }
    }

    /// Convert into a concrete ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::WrongTicketKind`] if the variant does not match.
    pub fn downcast<T: TicketType>(self) -> Result<T> {
        let actual = self.kind();
        T::try_from_ticket(self).map_err(|ticket| TicketError::WrongTicketKind {
            ticket_id: ticket.id().to_string(),
            expected: T::KIND,
            actual,
        })
    }
}

impl TicketState for Ticket {
    fn count_of_uses(&self) -> u32 {
        self.core().count_of_uses()
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.core().creation_time()
    }

    fn last_time_used(&self) -> DateTime<Utc> {
        self.core().last_time_used()
    }

    fn previous_time_used(&self) -> Option<DateTime<Utc>> {
        self.core().previous_time_used()
    }

    fn authentication(&self) -> Option<&Authentication> {
        self.as_granting().map(TicketGrantingTicket::authentication)
    }
}

impl PartialEq for Ticket {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Ticket {}

impl Hash for Ticket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(other.id())
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.id(), f)
    }
}

/// A concrete ticket struct that is one variant of [`Ticket`].
pub trait TicketType: Into<Ticket> + Serialize + DeserializeOwned + 'static {
    /// The kind this type represents.
    const KIND: TicketKind;

    /// Shared identity and use-tracking state.
    fn core(&self) -> &TicketCore;

    /// Unwrap the matching variant, handing the ticket back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the original ticket when it is of another kind.
    fn try_from_ticket(ticket: Ticket) -> std::result::Result<Self, Ticket>;
}

macro_rules! ticket_variant {
    ($ty:ty, $variant:ident, $kind:ident) => {
        impl From<$ty> for Ticket {
            fn from(ticket: $ty) -> Self {
                Self::$variant(ticket)
            }
        }

        impl TicketType for $ty {
            const KIND: TicketKind = TicketKind::$kind;

            fn core(&self) -> &TicketCore {
                <$ty>::core(self)
            }

            fn try_from_ticket(ticket: Ticket) -> std::result::Result<Self, Ticket> {
                match ticket {
                    Ticket::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

ticket_variant!(TicketGrantingTicket, TicketGranting, TicketGrantingTicket);
ticket_variant!(ServiceTicket, Service, ServiceTicket);
ticket_variant!(ProxyGrantingTicket, ProxyGranting, ProxyGrantingTicket);
ticket_variant!(ProxyTicket, Proxy, ProxyTicket);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::expiration::NeverExpiresExpirationPolicy;
    use cas_testing::test_epoch;
    use chrono::Duration;

    fn core(id: &str) -> TicketCore {
        TicketCore::new(
            TicketId::new(id).unwrap(),
            None,
            NeverExpiresExpirationPolicy.into(),
            test_epoch(),
        )
    }

    #[test]
    fn test_ticket_id_rejects_blank() {
        assert!(matches!(
            TicketId::new(""),
            Err(TicketError::InvalidTicketId { .. })
        ));
        assert!(TicketId::new("ST 1").is_err());
        assert_eq!(TicketId::new("ST-1").unwrap().as_str(), "ST-1");
    }

    #[test]
    fn test_ticket_id_deserialization_is_validated() {
        assert!(serde_json::from_str::<TicketId>("\"\"").is_err());
        let id: TicketId = serde_json::from_str("\"TGT-1\"").unwrap();
        assert_eq!(id.as_str(), "TGT-1");
    }

    #[test]
    fn test_update_shifts_use_times() {
        let mut core = core("TGT-1");
        core.update(test_epoch() + Duration::seconds(5));
        core.update(test_epoch() + Duration::seconds(9));

        assert_eq!(core.count_of_uses(), 2);
        assert_eq!(core.last_time_used(), test_epoch() + Duration::seconds(9));
        assert_eq!(
            core.previous_time_used(),
            Some(test_epoch() + Duration::seconds(5))
        );
    }

    #[test]
    fn test_update_never_moves_last_use_backwards() {
        let mut core = core("TGT-1");
        core.update(test_epoch() + Duration::seconds(10));
        core.update(test_epoch());
        assert_eq!(core.last_time_used(), test_epoch() + Duration::seconds(10));
    }

    #[test]
    fn test_properties() {
        let mut core = core("TGT-1");
        assert_eq!(core.property("mfa"), None);
        core.put_property("mfa", "duo");
        assert_eq!(core.property("mfa"), Some("duo"));
    }

    #[test]
    fn test_kind_prefixes() {
        let prefixes: Vec<_> = TicketKind::ALL.iter().map(|k| k.prefix()).collect();
        assert_eq!(prefixes, ["TGT", "ST", "PGT", "PT"]);
        assert!(TicketKind::ProxyGrantingTicket.is_granting());
        assert!(!TicketKind::ProxyTicket.is_granting());
    }
}
