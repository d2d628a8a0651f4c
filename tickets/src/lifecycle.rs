//! Lifecycle operations that span the granting chain.
//!
//! Tickets only know their parent's id. Everything that has to look at
//! ancestors (cascading expiration, cascading touch, cascading deletion)
//! resolves them through a [`TicketRegistry`] here, reading "now" from an
//! injected [`Clock`].

use crate::authentication::Authentication;
use crate::error::{Result, TicketError};
use crate::expiration::ExpirationReason;
use crate::registry::TicketRegistry;
use crate::service::Service;
use crate::ticket::{ProxyGrantingTicket, Ticket, TicketId, TicketKind};
use cas_core::environment::Clock;
use std::collections::HashSet;

/// Lifecycle operations over a registry and a clock.
#[derive(Debug, Clone)]
pub struct TicketLifecycle<R, C> {
    registry: R,
    clock: C,
}

impl<R: TicketRegistry, C: Clock> TicketLifecycle<R, C> {
    /// Create lifecycle operations over `registry`.
    pub const fn new(registry: R, clock: C) -> Self {
        Self { registry, clock }
    }

    /// The underlying registry.
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Whether the ticket is expired: its own policy, its internal state
    /// (logout, consumption) or any expired or missing ancestor.
    ///
    /// Evaluated fresh on every call.
    pub fn is_expired(&self, ticket: &Ticket) -> bool {
        self.expiration_reason(ticket).is_some()
    }

    /// Why the ticket is expired, `None` if it is usable.
    pub fn expiration_reason(&self, ticket: &Ticket) -> Option<ExpirationReason> {
        let now = self.clock.now();
        if let Err(reason) = ticket.check_local_expiration(now) {
            return Some(reason);
        }

        let mut visited = HashSet::from([ticket.id().clone()]);
        let mut next = ticket.granting_ticket().cloned();
        while let Some(parent_id) = next {
            if !visited.insert(parent_id.clone()) {
                break;
            }
            let Ok(parent) = self.registry.get_ticket(parent_id.as_str()) else {
                return Some(ExpirationReason::GrantingTicketMissing {
                    ticket_id: parent_id.to_string(),
                });
            };
            if parent.check_local_expiration(now).is_err() {
                return Some(ExpirationReason::GrantingTicketExpired {
                    ticket_id: parent_id.to_string(),
                });
            }
            next = parent.granting_ticket().cloned();
        }
        None
    }

    /// Record one use of `ticket` and touch every non-expired ancestor.
    ///
    /// Ancestors are updated in the registry; `ticket` itself is only
    /// modified in place. The walk stops quietly at the first expired or
    /// missing ancestor.
    ///
    /// # Errors
    ///
    /// Returns registry errors other than a vanished ancestor.
    pub fn update(&self, ticket: &mut Ticket) -> Result<()> {
        ticket.touch(self.clock.now());
        self.touch_ancestors(ticket.id(), ticket.granting_ticket().cloned())
    }

    fn touch_ancestors(&self, origin: &TicketId, mut next: Option<TicketId>) -> Result<()> {
        let now = self.clock.now();
        let mut visited = HashSet::from([origin.clone()]);
        while let Some(parent_id) = next {
            if !visited.insert(parent_id.clone()) {
                tracing::warn!(
                    ticket_id = %origin,
                    granting_ticket = %parent_id,
                    "Granting chain loops back on itself"
                );
                return Ok(());
            }
            let parent = match self.registry.get_ticket(parent_id.as_str()) {
                Ok(parent) => parent,
                Err(TicketError::TicketNotFound { .. }) => return Ok(()),
                Err(err) => return Err(err),
            };
            if let Some(reason) = self.expiration_reason(&parent) {
                tracing::debug!(
                    ticket_id = %parent_id,
                    reason = %reason,
                    "Not touching expired granting ticket"
                );
                return Ok(());
            }

            let parent = match self
                .registry
                .update_ticket_with(parent_id.as_str(), &mut |ticket| {
                    ticket.touch(now);
                    Ok(())
                }) {
                Ok(parent) => parent,
                Err(TicketError::TicketNotFound { .. }) => return Ok(()),
                Err(err) => return Err(err),
            };
            next = parent.granting_ticket().cloned();
        }
        Ok(())
    }

    /// Validate and consume a service or proxy ticket presented by `service`.
    ///
    /// Consumption is atomic in the registry, so of two concurrent
    /// validations at most one succeeds. The ticket is removed afterwards,
    /// as is any ticket found expired or presented by the wrong service.
    ///
    /// # Errors
    ///
    /// - [`TicketError::TicketNotFound`] if the id is unknown
    /// - [`TicketError::WrongTicketKind`] for granting tickets
    /// - [`TicketError::InvalidTicket`] if expired or already consumed
    /// - [`TicketError::UnrecognizableService`] if issued for another service
    pub fn validate_service_ticket(&self, id: &str, service: &Service) -> Result<Ticket> {
        let ticket = self.registry.get_ticket(id)?;
        if ticket.as_service_ticket().is_none() {
            return Err(TicketError::WrongTicketKind {
                ticket_id: id.to_string(),
                expected: TicketKind::ServiceTicket,
                actual: ticket.kind(),
            });
        }

        if let Some(reason) = self.expiration_reason(&ticket) {
            tracing::warn!(ticket_id = %id, reason = %reason, "Service ticket expired");
            self.registry.delete_single_ticket(id)?;
            return Err(TicketError::invalid(id));
        }

        let now = self.clock.now();
        let consumed = self.registry.update_ticket_with(id, &mut |ticket| {
            if ticket.check_local_expiration(now).is_err() {
                return Err(TicketError::invalid(ticket.id().as_str()));
            }
            let ticket_id = ticket.id().to_string();
            let st = ticket
                .as_service_ticket_mut()
                .ok_or_else(|| TicketError::invalid(ticket_id.as_str()))?;
            if !st.is_valid_for(service, now) {
                return Err(TicketError::UnrecognizableService {
                    ticket_id,
                    service: service.id.clone(),
                });
            }
            st.mark_consumed();
            Ok(())
        });

        match consumed {
            Ok(ticket) => {
                self.touch_ancestors(ticket.id(), ticket.granting_ticket().cloned())?;
                self.registry.delete_single_ticket(id)?;
                tracing::info!(
                    ticket_id = %id,
                    service = %service,
                    kind = %ticket.kind(),
                    "Validated service ticket"
                );
                Ok(ticket)
            }
            Err(err @ TicketError::UnrecognizableService { .. }) => {
                tracing::warn!(ticket_id = %id, service = %service, "Service mismatch");
                self.registry.delete_single_ticket(id)?;
                Err(err)
            }
            Err(TicketError::TicketNotFound { .. }) => Err(TicketError::invalid(id)),
            Err(err) => Err(err),
        }
    }

    /// Store a proxy-granting ticket and record it on its granting ticket.
    ///
    /// # Errors
    ///
    /// - [`TicketError::TicketNotFound`] if the granting ticket is gone
    /// - [`TicketError::InvalidTicket`] if the ticket names no granting ticket
    pub fn add_proxy_granting_ticket(&self, pgt: ProxyGrantingTicket) -> Result<()> {
        let id = pgt.id().clone();
        let proxied_by = pgt.proxied_by().clone();
        let granting_ticket = pgt
            .granting_ticket()
            .cloned()
            .ok_or_else(|| TicketError::invalid(id.as_str()))?;
        self.registry
            .update_ticket_with(granting_ticket.as_str(), &mut |parent| {
                if let Some(granting) = parent.as_granting_mut() {
                    granting.record_proxy_granting_ticket(id.clone(), proxied_by.clone());
                }
                Ok(())
            })?;
        tracing::debug!(
            ticket_id = %id,
            granting_ticket = %granting_ticket,
            proxied_by = %proxied_by,
            "Recorded proxy-granting ticket"
        );
        self.registry.add_ticket(pgt.into())
    }

    /// Delete a ticket and, for granting tickets, everything it granted.
    ///
    /// Returns the number of tickets removed.
    ///
    /// # Errors
    ///
    /// Returns registry failures.
    pub fn delete_ticket(&self, id: &str) -> Result<usize> {
        self.delete_cascade(id, &mut HashSet::new())
    }

    fn delete_cascade(&self, id: &str, visited: &mut HashSet<TicketId>) -> Result<usize> {
        let ticket = match self.registry.get_ticket(id) {
            Ok(ticket) => ticket,
            Err(TicketError::TicketNotFound { .. }) => return Ok(0),
            Err(err) => return Err(err),
        };
        if !visited.insert(ticket.id().clone()) {
            return Ok(0);
        }

        let mut removed = 0;
        if let Some(granting) = ticket.as_granting() {
            let descendants: Vec<TicketId> = granting.descendant_tickets().cloned().collect();
            for descendant in descendants {
                removed += self.delete_cascade(descendant.as_str(), visited)?;
            }
        }
        if self.registry.delete_single_ticket(id)? {
            removed += 1;
        }

        tracing::info!(ticket_id = %id, removed, "Deleted ticket");
        Ok(removed)
    }

    /// Log out: expire a granting ticket, then delete it with its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::WrongTicketKind`] for non-granting tickets.
    pub fn destroy_ticket_granting_ticket(&self, id: &str) -> Result<usize> {
        self.registry.update_ticket_with(id, &mut |ticket| {
            let kind = ticket.kind();
            let granting = ticket
                .as_granting_mut()
                .ok_or_else(|| TicketError::WrongTicketKind {
                    ticket_id: id.to_string(),
                    expected: TicketKind::TicketGrantingTicket,
                    actual: kind,
                })?;
            granting.mark_expired();
            Ok(())
        })?;
        self.delete_ticket(id)
    }

    /// The ticket-granting ticket at the top of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TicketNotFound`] if an ancestor is missing.
    pub fn root(&self, ticket: &Ticket) -> Result<Ticket> {
        let mut current = ticket.clone();
        let mut visited = HashSet::from([current.id().clone()]);
        while let Some(parent_id) = current.granting_ticket().cloned() {
            if !visited.insert(parent_id.clone()) {
                break;
            }
            current = self.registry.get_ticket(parent_id.as_str())?;
        }
        Ok(current)
    }

    /// Authentications along the granting chain, from the nearest granting
    /// ticket up to the root (whose authentication comes last).
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TicketNotFound`] if an ancestor is missing.
    pub fn chained_authentications(&self, ticket: &Ticket) -> Result<Vec<Authentication>> {
        let mut authentications = Vec::new();
        let mut current = ticket.clone();
        let mut visited = HashSet::from([current.id().clone()]);
        loop {
            if let Some(granting) = current.as_granting() {
                authentications.push(granting.authentication().clone());
            }
            let Some(parent_id) = current.granting_ticket().cloned() else {
                break;
            };
            if !visited.insert(parent_id.clone()) {
                break;
            }
            current = self.registry.get_ticket(parent_id.as_str())?;
        }
        Ok(authentications)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::expiration::{
        HardTimeoutExpirationPolicy, NeverExpiresExpirationPolicy, TicketState,
    };
    use crate::mocks::{test_authentication, test_ticket_granting_ticket};
    use crate::registry::DefaultTicketRegistry;
    use crate::ticket::TicketGrantingTicket;
    use cas_testing::{ManualClock, test_epoch};
    use chrono::Duration;

    fn id(value: &str) -> TicketId {
        TicketId::new(value).unwrap()
    }

    struct Fixture {
        lifecycle: TicketLifecycle<DefaultTicketRegistry, ManualClock>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::default();
        let registry = DefaultTicketRegistry::new();
        registry
            .add_ticket(test_ticket_granting_ticket("TGT-1", test_authentication("casuser")).into())
            .unwrap();
        Fixture {
            lifecycle: TicketLifecycle::new(registry, clock.clone()),
            clock,
        }
    }

    fn grant_st(fixture: &Fixture, st_id: &str, url: &str) -> Ticket {
        let registry = fixture.lifecycle.registry();
        let mut issued = None;
        registry
            .update_ticket_with("TGT-1", &mut |ticket| {
                let tgt = ticket.as_granting_mut().unwrap();
                issued = Some(tgt.grant_service_ticket(
                    id(st_id),
                    Service::new(url),
                    HardTimeoutExpirationPolicy::new(10).into(),
                    false,
                    true,
                    fixture.clock.now(),
                ));
                Ok(())
            })
            .unwrap();
        let st: Ticket = issued.unwrap().into();
        registry.add_ticket(st.clone()).unwrap();
        st
    }

    #[test]
    fn test_child_of_expired_parent_is_expired() {
        let fixture = fixture();
        let st = grant_st(&fixture, "ST-1", "https://app.example.org");
        assert!(!fixture.lifecycle.is_expired(&st));

        fixture
            .lifecycle
            .registry()
            .update_ticket_with("TGT-1", &mut |t| {
                t.as_granting_mut().unwrap().mark_expired();
                Ok(())
            })
            .unwrap();

        assert_eq!(
            fixture.lifecycle.expiration_reason(&st),
            Some(ExpirationReason::GrantingTicketExpired {
                ticket_id: "TGT-1".into()
            })
        );
    }

    #[test]
    fn test_missing_parent_counts_as_expired() {
        let fixture = fixture();
        let st = grant_st(&fixture, "ST-1", "https://app.example.org");
        fixture.lifecycle.registry().delete_single_ticket("TGT-1").unwrap();
        assert!(matches!(
            fixture.lifecycle.expiration_reason(&st),
            Some(ExpirationReason::GrantingTicketMissing { .. })
        ));
    }

    #[test]
    fn test_update_touches_live_parent() {
        let fixture = fixture();
        let mut st = grant_st(&fixture, "ST-1", "https://app.example.org");
        fixture.clock.advance(Duration::seconds(3));

        fixture.lifecycle.update(&mut st).unwrap();

        let tgt = fixture.lifecycle.registry().get_ticket("TGT-1").unwrap();
        // one use from granting, one from the cascade
        assert_eq!(tgt.core().count_of_uses(), 2);
        assert_eq!(tgt.core().last_time_used(), test_epoch() + Duration::seconds(3));
        assert_eq!(st.core().count_of_uses(), 1);
    }

    #[test]
    fn test_update_skips_expired_parent() {
        let fixture = fixture();
        let mut st = grant_st(&fixture, "ST-1", "https://app.example.org");
        fixture
            .lifecycle
            .registry()
            .update_ticket_with("TGT-1", &mut |t| {
                t.as_granting_mut().unwrap().mark_expired();
                Ok(())
            })
            .unwrap();

        fixture.lifecycle.update(&mut st).unwrap();
        let tgt = fixture.lifecycle.registry().get_ticket("TGT-1").unwrap();
        assert_eq!(tgt.core().count_of_uses(), 1);
    }

    /// A granting ticket whose stored parent is `parent`, as a tampered or
    /// corrupted payload would restore it.
    fn reparented(ticket_id: &str, parent: &str) -> Ticket {
        let tgt = test_ticket_granting_ticket(ticket_id, test_authentication("casuser"));
        let mut json = serde_json::to_value(&tgt).unwrap();
        json["core"]["granting_ticket"] = serde_json::json!(parent);
        serde_json::from_value::<TicketGrantingTicket>(json)
            .unwrap()
            .into()
    }

    #[test]
    fn test_update_of_self_granted_ticket_terminates() {
        let fixture = fixture();
        let mut pgt = reparented("PGT-1", "PGT-1");
        fixture.lifecycle.registry().add_ticket(pgt.clone()).unwrap();

        fixture.lifecycle.update(&mut pgt).unwrap();
        assert_eq!(pgt.core().count_of_uses(), 1);
        let stored = fixture.lifecycle.registry().get_ticket("PGT-1").unwrap();
        assert_eq!(stored.core().count_of_uses(), 0);
    }

    #[test]
    fn test_update_stops_when_parents_loop() {
        let fixture = fixture();
        let registry = fixture.lifecycle.registry();
        let mut first = reparented("TGT-2", "TGT-3");
        registry.add_ticket(first.clone()).unwrap();
        registry.add_ticket(reparented("TGT-3", "TGT-2")).unwrap();

        fixture.lifecycle.update(&mut first).unwrap();
        let second = registry.get_ticket("TGT-3").unwrap();
        assert_eq!(second.core().count_of_uses(), 1);
        let first = registry.get_ticket("TGT-2").unwrap();
        assert_eq!(first.core().count_of_uses(), 0);
    }

    #[test]
    fn test_delete_of_self_recording_ticket_terminates() {
        let fixture = fixture();
        fixture
            .lifecycle
            .registry()
            .update_ticket_with("TGT-1", &mut |t| {
                let proxy = Service::new("https://proxy.example.org");
                t.as_granting_mut()
                    .unwrap()
                    .record_proxy_granting_ticket(id("TGT-1"), proxy);
                Ok(())
            })
            .unwrap();

        assert_eq!(fixture.lifecycle.delete_ticket("TGT-1").unwrap(), 1);
        assert!(fixture.lifecycle.registry().tickets().unwrap().is_empty());
    }

    #[test]
    fn test_delete_of_mutually_recording_tickets_terminates() {
        let fixture = fixture();
        let registry = fixture.lifecycle.registry();
        for (owner, other) in [("TGT-2", "TGT-3"), ("TGT-3", "TGT-2")] {
            let mut tgt = test_ticket_granting_ticket(owner, test_authentication("casuser"));
            tgt.record_proxy_granting_ticket(id(other), Service::new("https://proxy.example.org"));
            registry.add_ticket(tgt.into()).unwrap();
        }

        assert_eq!(fixture.lifecycle.delete_ticket("TGT-2").unwrap(), 2);
        let left: Vec<_> = registry
            .tickets()
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(left, ["TGT-1"]);
    }

    #[test]
    fn test_validation_consumes_once() {
        let fixture = fixture();
        grant_st(&fixture, "ST-1", "https://app.example.org");
        let service = Service::new("https://app.example.org");

        let validated = fixture
            .lifecycle
            .validate_service_ticket("ST-1", &service)
            .unwrap();
        assert!(validated.is_expired_internal());

        let again = fixture.lifecycle.validate_service_ticket("ST-1", &service);
        assert!(again.unwrap_err().is_invalid_ticket());
    }

    #[test]
    fn test_validation_rejects_other_service() {
        let fixture = fixture();
        grant_st(&fixture, "ST-1", "https://app.example.org");

        let err = fixture
            .lifecycle
            .validate_service_ticket("ST-1", &Service::new("https://evil.example.org"))
            .unwrap_err();
        assert!(matches!(err, TicketError::UnrecognizableService { .. }));
        assert!(fixture.lifecycle.registry().get_ticket("ST-1").is_err());
    }

    #[test]
    fn test_validation_rejects_timed_out_ticket() {
        let fixture = fixture();
        grant_st(&fixture, "ST-1", "https://app.example.org");
        fixture.clock.advance(Duration::seconds(11));

        let err = fixture
            .lifecycle
            .validate_service_ticket("ST-1", &Service::new("https://app.example.org"))
            .unwrap_err();
        assert_eq!(err, TicketError::invalid("ST-1"));
    }

    #[test]
    fn test_validation_rejects_granting_ticket() {
        let fixture = fixture();
        let err = fixture
            .lifecycle
            .validate_service_ticket("TGT-1", &Service::new("https://app.example.org"))
            .unwrap_err();
        assert!(matches!(err, TicketError::WrongTicketKind { .. }));
    }

    #[test]
    fn test_delete_cascades_to_services() {
        let fixture = fixture();
        grant_st(&fixture, "ST-1", "http://host.com/webapp1");
        grant_st(&fixture, "ST-2", "http://host.com/webapp2");

        assert_eq!(fixture.lifecycle.delete_ticket("TGT-1").unwrap(), 3);
        assert!(fixture.lifecycle.registry().tickets().unwrap().is_empty());
        assert_eq!(fixture.lifecycle.delete_ticket("TGT-1").unwrap(), 0);
    }

    #[test]
    fn test_destroy_requires_granting_ticket() {
        let fixture = fixture();
        grant_st(&fixture, "ST-1", "https://app.example.org");
        assert!(fixture.lifecycle.destroy_ticket_granting_ticket("ST-1").is_err());
        assert_eq!(
            fixture.lifecycle.destroy_ticket_granting_ticket("TGT-1").unwrap(),
            2
        );
    }

    #[test]
    fn test_root_and_chained_authentications() {
        let fixture = fixture();
        let now = fixture.clock.now();
        let registry = fixture.lifecycle.registry();
        let mut st = grant_st(&fixture, "ST-1", "https://proxy.example.org")
            .downcast::<crate::ticket::ServiceTicket>()
            .unwrap();
        let pgt = st
            .grant_proxy_granting_ticket(
                id("PGT-1"),
                test_authentication("https://proxy.example.org/pgtUrl"),
                NeverExpiresExpirationPolicy.into(),
                now,
            )
            .unwrap();
        fixture.lifecycle.add_proxy_granting_ticket(pgt.clone()).unwrap();

        let tgt: TicketGrantingTicket = registry.get_typed_ticket("TGT-1").unwrap();
        assert!(tgt.proxy_granting_tickets().contains_key("PGT-1"));

        let pgt = Ticket::from(pgt);
        assert_eq!(fixture.lifecycle.root(&pgt).unwrap().id().as_str(), "TGT-1");
        let principals: Vec<_> = fixture
            .lifecycle
            .chained_authentications(&pgt)
            .unwrap()
            .into_iter()
            .map(|auth| auth.principal.id)
            .collect();
        assert_eq!(principals, ["https://proxy.example.org/pgtUrl", "casuser"]);
    }
}
