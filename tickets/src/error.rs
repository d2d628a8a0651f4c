//! Error types for ticket issuance, lookup and validation.

use crate::ticket::TicketKind;
use thiserror::Error;

/// Result type alias for ticket operations.
pub type Result<T> = std::result::Result<T, TicketError>;

/// Error taxonomy for the ticket subsystem.
///
/// Expiration on its own is not an error: callers discover it through
/// `is_expired`. The variants below are the conditions that terminate the
/// surrounding protocol request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketError {
    // ═══════════════════════════════════════════════════════════
    // Construction Errors
    // ═══════════════════════════════════════════════════════════

    /// A ticket was constructed with an empty or malformed identifier.
    #[error("Invalid ticket id: {reason}")]
    InvalidTicketId {
        /// Why the identifier was rejected
        reason: String,
    },

    /// The service ticket already granted its one proxy-granting ticket.
    #[error("Service ticket {ticket_id} has already granted a proxy-granting ticket")]
    InvalidProxyGrantingTicket {
        /// Service (or proxy) ticket that was asked to grant twice
        ticket_id: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Lookup Errors
    // ═══════════════════════════════════════════════════════════

    /// No catalog definition matches the ticket id.
    #[error("Unrecognized ticket type for {ticket_id}")]
    UnrecognizedTicket {
        /// Ticket id whose prefix matched nothing
        ticket_id: String,
    },

    /// The registry holds no ticket under this id.
    #[error("Ticket {ticket_id} not found")]
    TicketNotFound {
        /// Requested ticket id
        ticket_id: String,
    },

    /// The ticket exists but is of a different kind than requested.
    #[error("Ticket {ticket_id} is a {actual}, expected a {expected}")]
    WrongTicketKind {
        /// Requested ticket id
        ticket_id: String,
        /// Kind the caller asked for
        expected: TicketKind,
        /// Kind actually stored
        actual: TicketKind,
    },

    // ═══════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════

    /// The ticket is expired or was already consumed.
    #[error("Ticket {ticket_id} is no longer valid")]
    InvalidTicket {
        /// Rejected ticket id
        ticket_id: String,
    },

    /// The ticket was presented by a service it was not issued to.
    #[error("Ticket {ticket_id} was not issued for service {service}")]
    UnrecognizableService {
        /// Rejected ticket id
        ticket_id: String,
        /// Service that presented the ticket
        service: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════

    /// The factory dispatcher was built without a factory for this kind.
    #[error("No ticket factory configured for {kind}")]
    FactoryNotConfigured {
        /// Ticket kind without a factory
        kind: String,
    },

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Encoding or decoding a protocol ticket id failed.
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// A ticket could not be converted to or from its string form.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The ticket registry failed.
    #[error("Registry error: {0}")]
    Registry(String),
}

impl TicketError {
    /// Returns `true` for the terminal ticket conditions a protocol layer
    /// reports as an invalid ticket.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cas_tickets::TicketError;
    /// let err = TicketError::TicketNotFound { ticket_id: "ST-1".into() };
    /// assert!(err.is_invalid_ticket());
    /// assert!(!TicketError::Registry("down".into()).is_invalid_ticket());
    /// ```
    #[must_use]
    pub const fn is_invalid_ticket(&self) -> bool {
        matches!(
            self,
            Self::InvalidTicket { .. }
                | Self::TicketNotFound { .. }
                | Self::UnrecognizedTicket { .. }
                | Self::WrongTicketKind { .. }
        )
    }

    /// Returns `true` if this error comes from wiring rather than a request.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cas_tickets::TicketError;
    /// let err = TicketError::FactoryNotConfigured { kind: "ServiceTicket".into() };
    /// assert!(err.is_configuration_error());
    /// ```
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::FactoryNotConfigured { .. } | Self::InvalidConfiguration(_)
        )
    }

    pub(crate) fn not_found(ticket_id: impl Into<String>) -> Self {
        Self::TicketNotFound {
            ticket_id: ticket_id.into(),
        }
    }

    pub(crate) fn invalid(ticket_id: impl Into<String>) -> Self {
        Self::InvalidTicket {
            ticket_id: ticket_id.into(),
        }
    }
}

impl From<serde_json::Error> for TicketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ticket_classification() {
        assert!(TicketError::invalid("ST-1").is_invalid_ticket());
        assert!(TicketError::not_found("ST-1").is_invalid_ticket());
        assert!(
            !TicketError::InvalidProxyGrantingTicket {
                ticket_id: "ST-1".into()
            }
            .is_invalid_ticket()
        );
    }

    #[test]
    fn test_wrong_kind_message_names_both_kinds() {
        let err = TicketError::WrongTicketKind {
            ticket_id: "PT-1".into(),
            expected: TicketKind::ServiceTicket,
            actual: TicketKind::ProxyTicket,
        };
        let message = err.to_string();
        assert!(message.contains("ServiceTicket"));
        assert!(message.contains("ProxyTicket"));
    }
}
