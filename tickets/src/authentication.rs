//! Authenticated principals as seen by the ticket subsystem.
//!
//! Authentication itself happens elsewhere; tickets only carry the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute recording that the user asked to be remembered at login.
pub const REMEMBER_ME_ATTRIBUTE: &str = "org.apereo.cas.authentication.principal.REMEMBER_ME";

/// Multi-valued attribute map.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// The authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (typically the username).
    pub id: String,

    /// Principal attributes released by the attribute repository.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Principal {
    /// Create a principal without attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }
}

/// Outcome of a successful primary authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// Who authenticated.
    pub principal: Principal,

    /// Authentication metadata (method, remember-me flag, ...).
    #[serde(default)]
    pub attributes: Attributes,

    /// When the authentication happened.
    pub authentication_date: DateTime<Utc>,
}

impl Authentication {
    /// Create an authentication for `principal` at `authentication_date`.
    #[must_use]
    pub fn new(principal: Principal, authentication_date: DateTime<Utc>) -> Self {
        Self {
            principal,
            attributes: Attributes::new(),
            authentication_date,
        }
    }

    /// Add an authentication attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Mark this authentication as remember-me.
    #[must_use]
    pub fn remembered(self) -> Self {
        self.with_attribute(REMEMBER_ME_ATTRIBUTE, "true")
    }

    /// Whether the remember-me attribute is set to `true`.
    #[must_use]
    pub fn is_remember_me(&self) -> bool {
        self.attributes
            .get(REMEMBER_ME_ATTRIBUTE)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case("true")))
    }
}
