//! Relying services that tickets are issued for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service type used for plain CAS web applications.
pub const WEB_APPLICATION_SERVICE: &str = "WebApplicationService";

/// A relying party requesting authentication.
///
/// `service_type` stands in for the runtime service class: per-service
/// ticket id generators are looked up by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    /// Service identifier, usually the callback URL.
    pub id: String,

    /// Type name used to pick a ticket id generator.
    pub service_type: String,

    /// Principal the service was granted to, stamped when a session is tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl Service {
    /// Create a web application service.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_type(id, WEB_APPLICATION_SERVICE)
    }

    /// Create a service of an explicit type (e.g. an OAuth or SAML service).
    #[must_use]
    pub fn with_type(id: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service_type: service_type.into(),
            principal: None,
        }
    }

    /// Whether `other` identifies the same service.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Service identity used for session tracking: the id with query,
    /// matrix and fragment parts removed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cas_tickets::Service;
    /// let service = Service::new("https://app.example.org/path;jsessionid=1?x=y#top");
    /// assert_eq!(service.normalized_path(), "https://app.example.org/path");
    /// ```
    #[must_use]
    pub fn normalized_path(&self) -> &str {
        let path = self.id.as_str();
        let path = path.split_once('?').map_or(path, |(head, _)| head);
        let path = path.split_once(';').map_or(path, |(head, _)| head);
        path.split_once('#').map_or(path, |(head, _)| head)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
