//! Service and proxy tickets.

use super::{ProxyGrantingTicket, TicketCore, TicketId};
use crate::authentication::Authentication;
use crate::error::{Result, TicketError};
use crate::expiration::TicketExpirationPolicy;
use crate::service::Service;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single-use proof of authentication for one service.
///
/// Once consumed by a successful validation it stays expired, whatever its
/// time-based policy says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTicket {
    core: TicketCore,
    service: Service,
    #[serde(default)]
    credential_provided: bool,
    #[serde(default)]
    from_new_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxy_granted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    consumed: bool,
}

super::ticket_identity!(ServiceTicket);

impl ServiceTicket {
    pub(super) const fn new(
        id: TicketId,
        granting_ticket: TicketId,
        service: Service,
        expiration_policy: TicketExpirationPolicy,
        credential_provided: bool,
        from_new_login: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            core: TicketCore::new(id, Some(granting_ticket), expiration_policy, now),
            service,
            credential_provided,
            from_new_login,
            proxy_granted_at: None,
            consumed: false,
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

    /// Id of the ticket that granted this one. `None` only for a ticket
    /// restored from a payload that lost its parent.
    #[must_use]
    pub const fn granting_ticket(&self) -> Option<&TicketId> {
        self.core.granting_ticket()
    }

    /// The service this ticket was issued for.
    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    /// Whether the ticket was issued right after credentials were presented.
    #[must_use]
    pub const fn is_credential_provided(&self) -> bool {
        self.credential_provided
    }

    /// Whether the ticket stems from a fresh login rather than SSO.
    #[must_use]
    pub const fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// Record a use and check the presenting service.
    pub fn is_valid_for(&mut self, service: &Service, now: DateTime<Utc>) -> bool {
        self.core.update(now);
        self.service.matches(service)
    }

    /// Enter the consumed state. Irreversible.
    pub fn mark_consumed(&mut self) {
        self.consumed = true;
    }

    /// Whether the ticket was consumed by a validation.
    #[must_use]
    pub const fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Whether a proxy-granting ticket was already issued from this ticket.
    #[must_use]
    pub const fn has_granted_proxy_granting_ticket(&self) -> bool {
        self.proxy_granted_at.is_some()
    }

    /// Issue the one proxy-granting ticket this ticket may grant.
    ///
    /// The new ticket hangs off this ticket's granting ticket and is proxied
    /// by this ticket's service.
    ///
    /// # Errors
    ///
    /// - [`TicketError::InvalidProxyGrantingTicket`] on a second call
    /// - [`TicketError::InvalidTicket`] if this ticket has no granting ticket
    pub fn grant_proxy_granting_ticket(
        &mut self,
        id: TicketId,
        authentication: Authentication,
        expiration_policy: TicketExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Result<ProxyGrantingTicket> {
        if self.proxy_granted_at.is_some() {
            return Err(TicketError::InvalidProxyGrantingTicket {
                ticket_id: self.id().to_string(),
            });
        }
        let granting_ticket = self
            .granting_ticket()
            .cloned()
            .ok_or_else(|| TicketError::invalid(self.id().as_str()))?;
        self.proxy_granted_at = Some(now);

        Ok(ProxyGrantingTicket::new(
            id,
            granting_ticket,
            self.service.clone(),
            authentication,
            expiration_policy,
            now,
        ))
    }
}

/// Single-use proof derived from a proxy-granting ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyTicket {
    service_ticket: ServiceTicket,
}

super::ticket_identity!(ProxyTicket);

impl ProxyTicket {
    pub(super) const fn from_service_ticket(service_ticket: ServiceTicket) -> Self {
        Self { service_ticket }
    }

    /// Shared identity and use-tracking state.
    #[must_use]
    pub const fn core(&self) -> &TicketCore {
        self.service_ticket.core()
    }

    /// Mutable access to the shared state.
    pub fn core_mut(&mut self) -> &mut TicketCore {
        self.service_ticket.core_mut()
    }

    /// Ticket id.
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        self.service_ticket.id()
    }

    /// Id of the proxy-granting ticket this ticket came from.
    #[must_use]
    pub const fn granting_ticket(&self) -> Option<&TicketId> {
        self.service_ticket.granting_ticket()
    }

    /// The back-end service this ticket was issued for.
    #[must_use]
    pub const fn service(&self) -> &Service {
        self.service_ticket.service()
    }

    /// Service-ticket behavior shared by proxy tickets.
    #[must_use]
    pub const fn as_service_ticket(&self) -> &ServiceTicket {
        &self.service_ticket
    }

    /// Mutable service-ticket behavior, e.g. to grant a further
    /// proxy-granting ticket down a proxy chain.
    pub fn as_service_ticket_mut(&mut self) -> &mut ServiceTicket {
        &mut self.service_ticket
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::authentication::Principal;
    use crate::expiration::{
        MultiTimeUseOrTimeoutExpirationPolicy, NeverExpiresExpirationPolicy, TicketState,
    };
    use crate::ticket::Ticket;
    use cas_testing::test_epoch;
    use chrono::Duration;

    fn id(value: &str) -> TicketId {
        TicketId::new(value).unwrap()
    }

    fn service_ticket() -> ServiceTicket {
        ServiceTicket::new(
            id("ST-1"),
            id("TGT-1"),
            Service::new("https://app.example.org"),
            MultiTimeUseOrTimeoutExpirationPolicy::new(1, 10).into(),
            true,
            true,
            test_epoch(),
        )
    }

    fn authentication() -> Authentication {
        Authentication::new(Principal::new("https://app.example.org/pgtUrl"), test_epoch())
    }

    #[test]
    fn test_is_valid_for_records_use() {
        let mut st = service_ticket();
        assert!(st.is_valid_for(&Service::new("https://app.example.org"), test_epoch()));
        assert_eq!(st.core().count_of_uses(), 1);
        assert!(!st.is_valid_for(&Service::new("https://evil.example.org"), test_epoch()));
    }

    #[test]
    fn test_consumed_ticket_is_expired_even_if_policy_allows() {
        let mut st = ServiceTicket::new(
            id("ST-1"),
            id("TGT-1"),
            Service::new("https://app.example.org"),
            NeverExpiresExpirationPolicy.into(),
            false,
            false,
            test_epoch(),
        );
        st.mark_consumed();

        let ticket = Ticket::from(st);
        assert!(ticket.is_expired_internal());
        assert!(ticket.check_local_expiration(test_epoch()).is_err());
    }

    #[test]
    fn test_single_use_policy_expires_after_validation() {
        let mut ticket = Ticket::from(service_ticket());
        assert!(ticket.check_local_expiration(test_epoch()).is_ok());
        ticket.touch(test_epoch() + Duration::seconds(1));
        assert!(ticket.check_local_expiration(test_epoch() + Duration::seconds(1)).is_err());
    }

    #[test]
    fn test_parentless_ticket_cannot_grant_proxy_granting_ticket() {
        let mut json = serde_json::to_value(service_ticket()).unwrap();
        json["core"].as_object_mut().unwrap().remove("granting_ticket");
        let mut st: ServiceTicket = serde_json::from_value(json).unwrap();
        assert_eq!(st.granting_ticket(), None);

        let err = st
            .grant_proxy_granting_ticket(
                id("PGT-1"),
                authentication(),
                NeverExpiresExpirationPolicy.into(),
                test_epoch(),
            )
            .unwrap_err();
        assert_eq!(err, TicketError::invalid("ST-1"));
        assert!(!st.has_granted_proxy_granting_ticket());
    }

    #[test]
    fn test_grants_one_proxy_granting_ticket() {
        let mut st = service_ticket();
        let pgt = st
            .grant_proxy_granting_ticket(
                id("PGT-1"),
                authentication(),
                NeverExpiresExpirationPolicy.into(),
                test_epoch(),
            )
            .unwrap();

        assert_eq!(pgt.granting_ticket(), Some(&id("TGT-1")));
        assert_eq!(pgt.proxied_by(), st.service());
        assert!(st.has_granted_proxy_granting_ticket());

        let second = st.grant_proxy_granting_ticket(
            id("PGT-2"),
            authentication(),
            NeverExpiresExpirationPolicy.into(),
            test_epoch(),
        );
        assert_eq!(
            second.unwrap_err(),
            TicketError::InvalidProxyGrantingTicket {
                ticket_id: "ST-1".into()
            }
        );
    }
}
