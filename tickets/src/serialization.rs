//! String form of tickets for transport and storage.

use crate::catalog::TicketCatalog;
use crate::error::{Result, TicketError};
use crate::ticket::{
    ProxyGrantingTicket, ProxyTicket, ServiceTicket, Ticket, TicketGrantingTicket, TicketKind,
    TicketType,
};
use std::sync::Arc;

/// Converts tickets to and from JSON.
///
/// The payload carries no type tag: on the way back the concrete kind comes
/// from the catalog definition matching the ticket id.
#[derive(Debug, Clone)]
pub struct TicketSerializer {
    catalog: Arc<TicketCatalog>,
}

impl TicketSerializer {
    /// Create a serializer resolving kinds through `catalog`.
    #[must_use]
    pub const fn new(catalog: Arc<TicketCatalog>) -> Self {
        Self { catalog }
    }

    /// Serialize a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::UnrecognizedTicket`] if the catalog does not
    /// know the ticket's kind, or [`TicketError::Serialization`].
    pub fn serialize(&self, ticket: &Ticket) -> Result<String> {
        if self.catalog.find_ticket(ticket).is_none() {
            return Err(TicketError::UnrecognizedTicket {
                ticket_id: ticket.id().to_string(),
            });
        }
        let json = match ticket {
            Ticket::TicketGranting(t) => serde_json::to_string(t),
            Ticket::Service(t) => serde_json::to_string(t),
            Ticket::ProxyGranting(t) => serde_json::to_string(t),
            Ticket::Proxy(t) => serde_json::to_string(t),
        }?;
        Ok(json)
    }

    /// Deserialize the ticket stored under `ticket_id`.
    ///
    /// # Errors
    ///
    /// - [`TicketError::UnrecognizedTicket`] if no definition matches the id
    /// - [`TicketError::Serialization`] if the payload is malformed or
    ///   carries a different id
    pub fn deserialize(&self, ticket_id: &str, json: &str) -> Result<Ticket> {
        let definition =
            self.catalog
                .find(ticket_id)
                .ok_or_else(|| TicketError::UnrecognizedTicket {
                    ticket_id: ticket_id.to_string(),
                })?;

        let ticket = match definition.kind() {
            TicketKind::TicketGrantingTicket => decode::<TicketGrantingTicket>(json)?,
            TicketKind::ServiceTicket => decode::<ServiceTicket>(json)?,
            TicketKind::ProxyGrantingTicket => decode::<ProxyGrantingTicket>(json)?,
            TicketKind::ProxyTicket => decode::<ProxyTicket>(json)?,
        };

        if ticket.id().as_str() != ticket_id {
            return Err(TicketError::Serialization(format!(
                "payload holds ticket {}, expected {ticket_id}",
                ticket.id()
            )));
        }
        Ok(ticket)
    }
}

fn decode<T: TicketType>(json: &str) -> Result<Ticket> {
    Ok(serde_json::from_str::<T>(json)?.into())
}
