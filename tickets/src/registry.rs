//! Ticket registry contract and the in-memory registry.
//!
//! Registries own tickets and provide the linearizable read-modify-write
//! that single-use enforcement relies on
//! ([`TicketRegistry::update_ticket_with`]).

use crate::error::{Result, TicketError};
use crate::ticket::{Ticket, TicketId, TicketType};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Ticket storage.
pub trait TicketRegistry: Send + Sync {
    /// Store a new ticket, replacing any ticket with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Registry`] if the backing store fails.
    fn add_ticket(&self, ticket: Ticket) -> Result<()>;

    /// Fetch a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TicketNotFound`] if no ticket is stored under
    /// `id`.
    fn get_ticket(&self, id: &str) -> Result<Ticket>;

    /// Overwrite an existing ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TicketNotFound`] if the ticket was deleted in
    /// the meantime.
    fn update_ticket(&self, ticket: Ticket) -> Result<()>;

    /// Atomically modify a stored ticket and return the updated copy.
    ///
    /// If `modify` fails the stored ticket is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TicketNotFound`] if absent, or the error from
    /// `modify`.
    fn update_ticket_with(
        &self,
        id: &str,
        modify: &mut dyn FnMut(&mut Ticket) -> Result<()>,
    ) -> Result<Ticket>;

    /// Remove one ticket, without cascading. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Registry`] if the backing store fails.
    fn delete_single_ticket(&self, id: &str) -> Result<bool>;

    /// Snapshot of every stored ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Registry`] if the backing store fails.
    fn tickets(&self) -> Result<Vec<Ticket>>;

    /// Fetch a ticket and convert it to a concrete kind.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TicketNotFound`] or
    /// [`TicketError::WrongTicketKind`].
    fn get_typed_ticket<T: TicketType>(&self, id: &str) -> Result<T>
    where
        Self: Sized,
    {
        self.get_ticket(id)?.downcast()
    }
}

/// In-memory registry for a single node.
#[derive(Debug, Clone, Default)]
pub struct DefaultTicketRegistry {
    tickets: Arc<RwLock<HashMap<TicketId, Ticket>>>,
}

fn poisoned<T>(_: PoisonError<T>) -> TicketError {
    TicketError::Registry("RwLock poisoned".to_string())
}

impl DefaultTicketRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tickets.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn ticket_count(&self) -> Result<usize> {
        Ok(self.tickets.read().map_err(poisoned)?.len())
    }
}

impl TicketRegistry for DefaultTicketRegistry {
    fn add_ticket(&self, ticket: Ticket) -> Result<()> {
        tracing::debug!(ticket_id = %ticket.id(), kind = %ticket.kind(), "Adding ticket");
        self.tickets
            .write()
            .map_err(poisoned)?
            .insert(ticket.id().clone(), ticket);
        Ok(())
    }

    fn get_ticket(&self, id: &str) -> Result<Ticket> {
        self.tickets
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| TicketError::not_found(id))
    }

    fn update_ticket(&self, ticket: Ticket) -> Result<()> {
        let mut tickets = self.tickets.write().map_err(poisoned)?;
        let stored = tickets
            .get_mut(ticket.id().as_str())
            .ok_or_else(|| TicketError::not_found(ticket.id().as_str()))?;
        *stored = ticket;
        Ok(())
    }

    fn update_ticket_with(
        &self,
        id: &str,
        modify: &mut dyn FnMut(&mut Ticket) -> Result<()>,
    ) -> Result<Ticket> {
        let mut tickets = self.tickets.write().map_err(poisoned)?;
        let stored = tickets.get_mut(id).ok_or_else(|| TicketError::not_found(id))?;

        let mut updated = stored.clone();
        modify(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    fn delete_single_ticket(&self, id: &str) -> Result<bool> {
        let removed = self.tickets.write().map_err(poisoned)?.remove(id).is_some();
        if removed {
            tracing::debug!(ticket_id = %id, "Deleted ticket");
        }
        Ok(removed)
    }

    fn tickets(&self) -> Result<Vec<Ticket>> {
        Ok(self.tickets.read().map_err(poisoned)?.values().cloned().collect())
    }
}
