//! Ticket-granting and proxy-granting tickets.

use super::{ProxyTicket, ServiceTicket, TicketCore, TicketId};
use crate::authentication::Authentication;
use crate::expiration::{TicketExpirationPolicy, TicketState};
use crate::service::Service;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of an SSO session.
///
/// Tracks which service sessions it granted (service ticket id → service)
/// without owning the tickets themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketGrantingTicket {
    core: TicketCore,
    authentication: Authentication,
    #[serde(default)]
    services: BTreeMap<TicketId, Service>,
    #[serde(default)]
    proxy_granting_tickets: BTreeMap<TicketId, Service>,
    #[serde(default)]
    expired: bool,
}

super::ticket_identity!(TicketGrantingTicket);

impl TicketGrantingTicket {
    /// Create a root ticket-granting ticket.
    #[must_use]
    pub const fn new(
        id: TicketId,
        authentication: Authentication,
        expiration_policy: TicketExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_parent(id, None, authentication, expiration_policy, now)
    }

    pub(super) const fn with_parent(
        id: TicketId,
        parent: Option<TicketId>,
        authentication: Authentication,
        expiration_policy: TicketExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            core: TicketCore::new(id, parent, expiration_policy, now),
            authentication,
            services: BTreeMap::new(),
            proxy_granting_tickets: BTreeMap::new(),
            expired: false,
        }
    }

    /// Shared identity and use-tracking state.
    #[must_use]
    pub const fn core(&self) -> &TicketCore {
        &self.core
    }

    /// Mutable access to the shared state.
    pub fn core_mut(&mut self) -> &mut TicketCore {
        &mut self.core
    }

    /// Ticket id.
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        self.core.id()
    }

    /// The authentication this session was established with.
    #[must_use]
    pub const fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// `true` unless this ticket was itself granted by another ticket.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.core.granting_ticket().is_none()
    }

    /// Service sessions granted so far, keyed by service ticket id.
    #[must_use]
    pub const fn services(&self) -> &BTreeMap<TicketId, Service> {
        &self.services
    }

    /// Forget every tracked service session, returning the ticket ids.
    pub fn remove_all_services(&mut self) -> Vec<TicketId> {
        std::mem::take(&mut self.services).into_keys().collect()
    }

    /// Proxy-granting tickets issued under this session, keyed by id, with
    /// the service that proxies.
    #[must_use]
    pub const fn proxy_granting_tickets(&self) -> &BTreeMap<TicketId, Service> {
        &self.proxy_granting_tickets
    }

    /// Record a proxy-granting ticket issued under this session.
    pub fn record_proxy_granting_ticket(&mut self, id: TicketId, proxied_by: Service) {
        self.proxy_granting_tickets.insert(id, proxied_by);
    }

    /// Every ticket id this session knows it granted.
    pub fn descendant_tickets(&self) -> impl Iterator<Item = &TicketId> {
        self.services
            .keys()
            .chain(self.proxy_granting_tickets.keys())
    }

    /// Expire the session immediately (logout). Irreversible.
    pub fn mark_expired(&mut self) {
        self.expired = true;
    }

    /// Whether [`mark_expired`](Self::mark_expired) was called.
    #[must_use]
    pub const fn is_marked_expired(&self) -> bool {
        self.expired
    }

    /// Issue a service ticket under this session and track the session.
    ///
    /// The new ticket counts as a fresh login if credentials were just
    /// presented or this session was never used before. With
    /// `only_track_most_recent_session`, an earlier session for the same
    /// service (compared by [`Service::normalized_path`]) is replaced.
    pub fn grant_service_ticket(
        &mut self,
        id: TicketId,
        service: Service,
        expiration_policy: TicketExpirationPolicy,
        credential_provided: bool,
        only_track_most_recent_session: bool,
        now: DateTime<Utc>,
    ) -> ServiceTicket {
        let from_new_login = credential_provided || self.core.count_of_uses() == 0;
        let ticket = ServiceTicket::new(
            id.clone(),
            self.id().clone(),
            service.clone(),
            expiration_policy,
            credential_provided,
            from_new_login,
            now,
        );
        self.track_service_session(id, service, only_track_most_recent_session, now);
        ticket
    }

    fn track_service_session(
        &mut self,
        id: TicketId,
        mut service: Service,
        only_track_most_recent_session: bool,
        now: DateTime<Utc>,
    ) {
        self.core.update(now);
        service.principal = Some(self.authentication.principal.id.clone());

        if only_track_most_recent_session {
            let path = service.normalized_path().to_string();
            self.services
                .retain(|_, existing| existing.normalized_path() != path);
        }
        self.services.insert(id, service);
    }
}

impl TicketState for TicketGrantingTicket {
    fn count_of_uses(&self) -> u32 {
        self.core.count_of_uses()
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.core.creation_time()
    }

    fn last_time_used(&self) -> DateTime<Utc> {
        self.core.last_time_used()
    }

    fn previous_time_used(&self) -> Option<DateTime<Utc>> {
        self.core.previous_time_used()
    }

    fn authentication(&self) -> Option<&Authentication> {
        Some(&self.authentication)
    }
}

/// A ticket-granting ticket handed to a proxying service.
///
/// Its granting ticket is the session the proxying service's ticket came
/// from, so it lives and dies with that session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyGrantingTicket {
    granting: TicketGrantingTicket,
    proxied_by: Service,
}

super::ticket_identity!(ProxyGrantingTicket);

impl ProxyGrantingTicket {
    pub(super) const fn new(
        id: TicketId,
        parent: TicketId,
        proxied_by: Service,
        authentication: Authentication,
        expiration_policy: TicketExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            granting: TicketGrantingTicket::with_parent(
                id,
                Some(parent),
                authentication,
                expiration_policy,
                now,
            ),
            proxied_by,
        }
    }

    /// Shared identity and use-tracking state.
    #[must_use]
    pub const fn core(&self) -> &TicketCore {
        self.granting.core()
    }

    /// Mutable access to the shared state.
    pub fn core_mut(&mut self) -> &mut TicketCore {
        self.granting.core_mut()
    }

    /// Ticket id.
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        self.granting.id()
    }

    /// Id of the session this ticket was granted under.
    #[must_use]
    pub const fn granting_ticket(&self) -> Option<&TicketId> {
        self.core().granting_ticket()
    }

    /// The service acting on the user's behalf.
    #[must_use]
    pub const fn proxied_by(&self) -> &Service {
        &self.proxied_by
    }

    /// Granting behavior shared with ticket-granting tickets.
    #[must_use]
    pub const fn as_granting(&self) -> &TicketGrantingTicket {
        &self.granting
    }

    /// Mutable granting behavior.
    pub fn as_granting_mut(&mut self) -> &mut TicketGrantingTicket {
        &mut self.granting
    }

    /// Issue a proxy ticket for a back-end service.
    pub fn grant_proxy_ticket(
        &mut self,
        id: TicketId,
        service: Service,
        expiration_policy: TicketExpirationPolicy,
        only_track_most_recent_session: bool,
        now: DateTime<Utc>,
    ) -> ProxyTicket {
        let ticket = self.granting.grant_service_ticket(
            id,
            service,
            expiration_policy,
            false,
            only_track_most_recent_session,
            now,
        );
        ProxyTicket::from_service_ticket(ticket)
    }
}
