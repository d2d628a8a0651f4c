//! Unique ticket id generation.

use crate::service::Service;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimum length of the random id segment.
pub const MIN_RANDOM_LENGTH: usize = 20;

/// Default length of the random id segment.
pub const DEFAULT_RANDOM_LENGTH: usize = 30;

/// Produces opaque, prefixed ticket ids.
///
/// Implementations are shared across request threads.
pub trait UniqueTicketIdGenerator: Send + Sync + fmt::Debug {
    /// A new id starting with `prefix`, unique with overwhelming probability.
    fn new_ticket_id(&self, prefix: &str) -> String;
}

/// `<PREFIX>-<counter>-<random>[-<suffix>]` ids.
///
/// The counter is process-wide per generator; the random segment carries the
/// unguessability.
#[derive(Debug)]
pub struct DefaultUniqueTicketIdGenerator {
    counter: AtomicU64,
    random_length: usize,
    suffix: Option<String>,
}

impl DefaultUniqueTicketIdGenerator {
    /// Generator with the default random length and no suffix.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            random_length: DEFAULT_RANDOM_LENGTH,
            suffix: None,
        }
    }

    /// Set the random segment length (at least [`MIN_RANDOM_LENGTH`]).
    #[must_use]
    pub fn with_random_length(mut self, length: usize) -> Self {
        self.random_length = length.max(MIN_RANDOM_LENGTH);
        self
    }

    /// Append a node identifier to every id.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = (!suffix.is_empty()).then_some(suffix);
        self
    }

    fn random_segment(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.random_length)
            .map(char::from)
            .collect()
    }
}

impl Default for DefaultUniqueTicketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueTicketIdGenerator for DefaultUniqueTicketIdGenerator {
    fn new_ticket_id(&self, prefix: &str) -> String {
        let number = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let random = self.random_segment();
        match &self.suffix {
            Some(suffix) => format!("{prefix}-{number}-{random}-{suffix}"),
            None => format!("{prefix}-{number}-{random}"),
        }
    }
}

/// Per-service-type id generators with a default fallback.
#[derive(Debug, Clone)]
pub struct ServiceTicketIdGenerators {
    default: Arc<dyn UniqueTicketIdGenerator>,
    by_service_type: HashMap<String, Arc<dyn UniqueTicketIdGenerator>>,
}

impl ServiceTicketIdGenerators {
    /// Use `default` for every service type not registered explicitly.
    #[must_use]
    pub fn new(default: Arc<dyn UniqueTicketIdGenerator>) -> Self {
        Self {
            default,
            by_service_type: HashMap::new(),
        }
    }

    /// Register a generator for one service type.
    #[must_use]
    pub fn with_generator(
        mut self,
        service_type: impl Into<String>,
        generator: Arc<dyn UniqueTicketIdGenerator>,
    ) -> Self {
        self.by_service_type.insert(service_type.into(), generator);
        self
    }

    /// Generator for this service's type.
    #[must_use]
    pub fn for_service(&self, service: &Service) -> &dyn UniqueTicketIdGenerator {
        match self.by_service_type.get(&service.service_type) {
            Some(generator) => generator.as_ref(),
            None => {
                tracing::trace!(
                    service_type = %service.service_type,
                    "No dedicated id generator, using default"
                );
                self.default.as_ref()
            }
        }
    }
}

impl Default for ServiceTicketIdGenerators {
    fn default() -> Self {
        Self::new(Arc::new(DefaultUniqueTicketIdGenerator::new()))
    }
}
