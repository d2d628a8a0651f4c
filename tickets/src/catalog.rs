//! Ticket catalog: resolves ticket ids to ticket kinds by prefix.
//!
//! The catalog is built once at startup (usually through
//! [`TicketCatalog::from_configurers`]) and read concurrently afterwards.
//!
//! # Precedence
//!
//! [`TicketCatalog::find`] returns the first definition, in
//! [`TicketCatalog::find_all`] order, whose prefix starts the id. That order
//! is `order` ascending with ties broken by registration order, so lookups
//! are deterministic even when prefixes overlap. Catalog builders should
//! still avoid overlapping prefixes.

use crate::config::TicketsConfig;
use crate::expiration::ExpirationPolicy;
use crate::ticket::{Ticket, TicketKind};

/// Storage hints for a ticket kind.
///
/// These are consumed by registries only; the ticket model ignores them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketDefinitionProperties {
    /// Remove descendants when a ticket of this kind is deleted.
    pub cascade_removals: bool,

    /// Name of the backing store (cache, table, map).
    pub storage_name: String,

    /// Storage time-to-live in seconds, 0 for unbounded.
    pub storage_timeout: i64,
}

impl TicketDefinitionProperties {
    /// Properties for the named store.
    #[must_use]
    pub fn new(storage_name: impl Into<String>) -> Self {
        Self {
            cascade_removals: false,
            storage_name: storage_name.into(),
            storage_timeout: 0,
        }
    }

    /// Set whether deletions cascade to descendants.
    #[must_use]
    pub const fn with_cascade_removals(mut self, cascade: bool) -> Self {
        self.cascade_removals = cascade;
        self
    }

    /// Set the storage time-to-live.
    #[must_use]
    pub const fn with_storage_timeout(mut self, seconds: i64) -> Self {
        self.storage_timeout = seconds;
        self
    }
}

/// Static metadata for one ticket kind.
///
/// Two definitions are equal when kind, prefix and properties match; `order`
/// only affects lookup precedence.
#[derive(Debug, Clone)]
pub struct TicketDefinition {
    kind: TicketKind,
    prefix: String,
    order: i32,
    properties: TicketDefinitionProperties,
}

impl TicketDefinition {
    /// Create a definition with default properties.
    #[must_use]
    pub fn new(kind: TicketKind, prefix: impl Into<String>, order: i32) -> Self {
        Self {
            kind,
            prefix: prefix.into(),
            order,
            properties: TicketDefinitionProperties::default(),
        }
    }

    /// Set storage properties.
    #[must_use]
    pub fn with_properties(mut self, properties: TicketDefinitionProperties) -> Self {
        self.properties = properties;
        self
    }

    /// The ticket kind this definition describes.
    #[must_use]
    pub const fn kind(&self) -> TicketKind {
        self.kind
    }

    /// Id prefix, unique within a catalog.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lookup precedence, lower first.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Storage hints.
    #[must_use]
    pub const fn properties(&self) -> &TicketDefinitionProperties {
        &self.properties
    }

    /// Mutable storage hints.
    pub fn properties_mut(&mut self) -> &mut TicketDefinitionProperties {
        &mut self.properties
    }
}

impl PartialEq for TicketDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.prefix == other.prefix
            && self.properties == other.properties
    }
}

impl Eq for TicketDefinition {}

/// Registry of ticket definitions keyed by prefix.
#[derive(Debug, Clone, Default)]
pub struct TicketCatalog {
    // registration order
    definitions: Vec<TicketDefinition>,
}

impl TicketCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    /// Build a catalog by running each configurer in turn.
    #[must_use]
    pub fn from_configurers(configurers: &[&dyn TicketCatalogConfigurer]) -> Self {
        let mut catalog = Self::new();
        for configurer in configurers {
            configurer.configure_ticket_catalog(&mut catalog);
        }
        tracing::info!(definitions = catalog.definitions.len(), "Ticket catalog built");
        catalog
    }

    /// Register a definition. A definition with the same prefix is replaced
    /// in place, keeping its registration position.
    pub fn register(&mut self, definition: TicketDefinition) {
        tracing::debug!(
            prefix = %definition.prefix,
            kind = %definition.kind,
            order = definition.order,
            "Registering ticket definition"
        );
        if let Some(existing) = self.position(&definition.prefix) {
            self.definitions[existing] = definition;
        } else {
            self.definitions.push(definition);
        }
    }

    /// Replace the definition registered under the same prefix.
    ///
    /// Returns `false` (and registers nothing) if the prefix is unknown.
    pub fn update(&mut self, definition: TicketDefinition) -> bool {
        match self.position(&definition.prefix) {
            Some(existing) => {
                tracing::debug!(prefix = %definition.prefix, "Updating ticket definition");
                self.definitions[existing] = definition;
                true
            }
            None => {
                tracing::warn!(
                    prefix = %definition.prefix,
                    "Cannot update unregistered ticket definition"
                );
                false
            }
        }
    }

    /// Resolve a ticket id to its definition.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cas_tickets::catalog::{CoreTicketCatalogConfigurer, TicketCatalog};
    /// # use cas_tickets::TicketKind;
    /// let catalog = TicketCatalog::from_configurers(&[&CoreTicketCatalogConfigurer::default()]);
    /// let definition = catalog.find("PGT-1-abc").unwrap();
    /// assert_eq!(definition.kind(), TicketKind::ProxyGrantingTicket);
    /// assert!(catalog.find("XYZ-1").is_none());
    /// ```
    #[must_use]
    pub fn find(&self, ticket_id: &str) -> Option<&TicketDefinition> {
        self.find_all()
            .into_iter()
            .find(|definition| ticket_id.starts_with(definition.prefix.as_str()))
    }

    /// Resolve a ticket instance to its definition.
    #[must_use]
    pub fn find_ticket(&self, ticket: &Ticket) -> Option<&TicketDefinition> {
        self.find(ticket.prefix())
    }

    /// Every definition for a kind, in precedence order.
    #[must_use]
    pub fn find_by_kind(&self, kind: TicketKind) -> Vec<&TicketDefinition> {
        self.find_all()
            .into_iter()
            .filter(|definition| definition.kind == kind)
            .collect()
    }

    /// Every definition, `order` ascending, ties in registration order.
    #[must_use]
    pub fn find_all(&self) -> Vec<&TicketDefinition> {
        let mut all: Vec<_> = self.definitions.iter().collect();
        all.sort_by_key(|definition| definition.order);
        all
    }

    /// Whether a definition is registered under exactly this prefix.
    #[must_use]
    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn position(&self, prefix: &str) -> Option<usize> {
        self.definitions
            .iter()
            .position(|definition| definition.prefix == prefix)
    }
}

/// Contributes ticket definitions to a catalog.
///
/// Protocol modules (OAuth, SAML, ...) implement this to add their own kinds.
pub trait TicketCatalogConfigurer {
    /// Register this module's definitions.
    fn configure_ticket_catalog(&self, catalog: &mut TicketCatalog);
}

/// Registers the four core kinds: TGT (0), ST (1), PGT (2), PT (3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreTicketCatalogConfigurer {
    ticket_granting_timeout: i64,
    service_timeout: i64,
    proxy_granting_timeout: i64,
    proxy_timeout: i64,
}

impl CoreTicketCatalogConfigurer {
    /// Storage timeouts derived from the configured policies' lifetimes.
    #[must_use]
    pub fn from_config(config: &TicketsConfig) -> Self {
        let tgt = config.ticket_granting.expiration_policy();
        let pgt = config.proxy_granting.expiration_policy(&config.ticket_granting);
        Self {
            ticket_granting_timeout: tgt.time_to_live().unwrap_or(0),
            service_timeout: config.service.expiration_policy().time_to_live().unwrap_or(0),
            proxy_granting_timeout: pgt.time_to_live().unwrap_or(0),
            proxy_timeout: config.proxy.expiration_policy().time_to_live().unwrap_or(0),
        }
    }
}

impl Default for CoreTicketCatalogConfigurer {
    fn default() -> Self {
        Self::from_config(&TicketsConfig::default())
    }
}

impl TicketCatalogConfigurer for CoreTicketCatalogConfigurer {
    fn configure_ticket_catalog(&self, catalog: &mut TicketCatalog) {
        let core = [
            (
                TicketKind::TicketGrantingTicket,
                "ticketGrantingTicketsCache",
                true,
                self.ticket_granting_timeout,
            ),
            (
                TicketKind::ServiceTicket,
                "serviceTicketsCache",
                false,
                self.service_timeout,
            ),
            (
                TicketKind::ProxyGrantingTicket,
                "proxyGrantingTicketsCache",
                true,
                self.proxy_granting_timeout,
            ),
            (
                TicketKind::ProxyTicket,
                "proxyTicketsCache",
                false,
                self.proxy_timeout,
            ),
        ];

        for (order, (kind, storage_name, cascade, timeout)) in (0..).zip(core) {
            catalog.register(
                TicketDefinition::new(kind, kind.prefix(), order).with_properties(
                    TicketDefinitionProperties::new(storage_name)
                        .with_cascade_removals(cascade)
                        .with_storage_timeout(timeout),
                ),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn core_catalog() -> TicketCatalog {
        TicketCatalog::from_configurers(&[&CoreTicketCatalogConfigurer::default()])
    }

    #[test]
    fn test_core_kinds_resolve_by_prefix() {
        let catalog = core_catalog();
        assert_eq!(catalog.len(), 4);
        for (id, kind) in [
            ("TGT-1-abc-node", TicketKind::TicketGrantingTicket),
            ("ST-2-def", TicketKind::ServiceTicket),
            ("PGT-3-ghi", TicketKind::ProxyGrantingTicket),
            ("PT-4-jkl", TicketKind::ProxyTicket),
        ] {
            assert_eq!(catalog.find(id).map(TicketDefinition::kind), Some(kind));
        }
    }

    #[test]
    fn test_unknown_prefix_is_absent() {
        assert!(core_catalog().find("OC-1-abc").is_none());
        assert!(TicketCatalog::new().find("TGT-1").is_none());
    }

    #[test]
    fn test_find_all_is_ordered() {
        let catalog = core_catalog();
        let prefixes: Vec<_> = catalog.find_all().iter().map(|d| d.prefix()).collect();
        assert_eq!(prefixes, ["TGT", "ST", "PGT", "PT"]);
    }

    #[test]
    fn test_overlapping_prefixes_resolve_by_order() {
        let mut catalog = TicketCatalog::new();
        catalog.register(TicketDefinition::new(TicketKind::ServiceTicket, "T", 5));
        catalog.register(TicketDefinition::new(
            TicketKind::TicketGrantingTicket,
            "TGT",
            0,
        ));

        for _ in 0..10 {
            assert_eq!(
                catalog.find("TGT-1").map(TicketDefinition::kind),
                Some(TicketKind::TicketGrantingTicket)
            );
        }
        assert_eq!(
            catalog.find("TX-1").map(TicketDefinition::kind),
            Some(TicketKind::ServiceTicket)
        );
    }

    #[test]
    fn test_equal_order_falls_back_to_registration_order() {
        let mut catalog = TicketCatalog::new();
        catalog.register(TicketDefinition::new(TicketKind::ServiceTicket, "S", 1));
        catalog.register(TicketDefinition::new(TicketKind::ProxyTicket, "ST", 1));
        assert_eq!(
            catalog.find("ST-1").map(TicketDefinition::kind),
            Some(TicketKind::ServiceTicket)
        );
    }

    #[test]
    fn test_register_replaces_same_prefix() {
        let mut catalog = core_catalog();
        catalog.register(TicketDefinition::new(TicketKind::ProxyTicket, "ST", 1));
        assert_eq!(catalog.len(), 4);
        assert_eq!(
            catalog.find("ST-1").map(TicketDefinition::kind),
            Some(TicketKind::ProxyTicket)
        );
    }

    #[test]
    fn test_update_requires_existing_prefix() {
        let mut catalog = core_catalog();
        assert!(!catalog.update(TicketDefinition::new(TicketKind::ServiceTicket, "OC", 9)));
        assert!(!catalog.contains("OC"));

        let mut definition = catalog.find("ST").cloned().unwrap();
        definition.properties_mut().storage_timeout = 99;
        assert!(catalog.update(definition));
        assert_eq!(catalog.find("ST").unwrap().properties().storage_timeout, 99);
    }

    #[test]
    fn test_definition_equality_ignores_order() {
        let one = TicketDefinition::new(TicketKind::ServiceTicket, "ST", 1);
        let two = TicketDefinition::new(TicketKind::ServiceTicket, "ST", 7);
        assert_eq!(one, two);
        let three = two
            .clone()
            .with_properties(TicketDefinitionProperties::new("cache"));
        assert_ne!(one, three);
    }

    #[test]
    fn test_core_storage_properties() {
        let catalog = core_catalog();
        let tgt = catalog.find("TGT").unwrap().properties();
        assert!(tgt.cascade_removals);
        assert_eq!(tgt.storage_name, "ticketGrantingTicketsCache");
        assert_eq!(tgt.storage_timeout, 28_800);

        let st = catalog.find("ST").unwrap().properties();
        assert!(!st.cascade_removals);
        assert_eq!(st.storage_timeout, 10);

        assert_eq!(catalog.find_by_kind(TicketKind::ProxyTicket).len(), 1);
    }
}
