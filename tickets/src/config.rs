//! Ticket configuration.
//!
//! Plain configuration structures with documented defaults. Values should be
//! provided by the application; nothing here reads the environment.

use crate::error::{Result, TicketError};
use crate::expiration::{
    AlwaysExpiresExpirationPolicy, HardTimeoutExpirationPolicy,
    MultiTimeUseOrTimeoutExpirationPolicy, NeverExpiresExpirationPolicy,
    RememberMeDelegatingExpirationPolicy, ThrottledUseAndTimeoutExpirationPolicy,
    TicketExpirationPolicy, TicketGrantingTicketExpirationPolicy, TimeoutExpirationPolicy,
};
use base64::Engine;

/// Longest lifetime a configured policy is given: 100 years. Larger values
/// are clamped when the policy is built.
pub const MAX_LIFETIME_IN_SECONDS: i64 = 3_155_760_000;

fn bounded(setting: &'static str, seconds: i64) -> i64 {
    if seconds > MAX_LIFETIME_IN_SECONDS {
        tracing::warn!(
            setting,
            seconds,
            max = MAX_LIFETIME_IN_SECONDS,
            "Clamping configured lifetime"
        );
        return MAX_LIFETIME_IN_SECONDS;
    }
    seconds
}

/// Throttled ticket-granting ticket policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottledTimeoutConfig {
    /// Idle window in seconds.
    pub time_to_kill_in_seconds: i64,

    /// Minimum seconds between two uses.
    pub time_in_between_uses_in_seconds: i64,
}

/// Remember-me ("long term") session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RememberMeConfig {
    /// Hard lifetime of remembered sessions in seconds.
    ///
    /// Default: 14 days
    pub time_to_kill_in_seconds: i64,
}

impl Default for RememberMeConfig {
    fn default() -> Self {
        Self {
            time_to_kill_in_seconds: 1_209_600,
        }
    }
}

/// Ticket-granting ticket configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketGrantingTicketConfig {
    /// Absolute session lifetime in seconds.
    ///
    /// Default: 8 hours
    pub max_time_to_live_in_seconds: i64,

    /// Idle window in seconds.
    ///
    /// Default: 2 hours
    pub time_to_kill_in_seconds: i64,

    /// Sliding-timeout lifetime; overrides the hard/idle pair when set.
    pub timeout: Option<i64>,

    /// Hard-timeout lifetime, used when the hard/idle pair is disabled.
    pub hard_timeout: Option<i64>,

    /// Throttled policy, used when the hard/idle pair is disabled.
    pub throttled: Option<ThrottledTimeoutConfig>,

    /// Wrap the chosen policy for remember-me sessions.
    pub remember_me: Option<RememberMeConfig>,
}

impl TicketGrantingTicketConfig {
    /// Create configuration with the default hard/idle lifetimes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_time_to_live_in_seconds: 28_800,
            time_to_kill_in_seconds: 7_200,
            timeout: None,
            hard_timeout: None,
            throttled: None,
            remember_me: None,
        }
    }

    /// Set the absolute and idle lifetimes.
    #[must_use]
    pub const fn with_lifetimes(mut self, max_time_to_live: i64, time_to_kill: i64) -> Self {
        self.max_time_to_live_in_seconds = max_time_to_live;
        self.time_to_kill_in_seconds = time_to_kill;
        self
    }

    /// Use a sliding timeout instead.
    #[must_use]
    pub const fn with_timeout(mut self, max_time_to_live: i64) -> Self {
        self.timeout = Some(max_time_to_live);
        self
    }

    /// Set the hard timeout.
    #[must_use]
    pub const fn with_hard_timeout(mut self, time_to_kill: i64) -> Self {
        self.hard_timeout = Some(time_to_kill);
        self
    }

    /// Set the throttled policy.
    #[must_use]
    pub const fn with_throttled(mut self, throttled: ThrottledTimeoutConfig) -> Self {
        self.throttled = Some(throttled);
        self
    }

    /// Enable remember-me sessions.
    #[must_use]
    pub const fn with_remember_me(mut self, remember_me: RememberMeConfig) -> Self {
        self.remember_me = Some(remember_me);
        self
    }

    /// Build the expiration policy for new ticket-granting tickets.
    ///
    /// Precedence: a disabled hard/idle pair means never expire; then a
    /// sliding timeout; then the hard/idle pair; then throttled; then hard
    /// timeout; anything else expires immediately.
    #[must_use]
    pub fn expiration_policy(&self) -> TicketExpirationPolicy {
        let policy = self.base_policy();
        match self.remember_me {
            Some(remember_me) => {
                tracing::debug!(
                    time_to_kill = remember_me.time_to_kill_in_seconds,
                    "Remember-me sessions enabled"
                );
                let time_to_kill = bounded(
                    "remember_me.time_to_kill_in_seconds",
                    remember_me.time_to_kill_in_seconds,
                );
                RememberMeDelegatingExpirationPolicy::new(
                    HardTimeoutExpirationPolicy::new(time_to_kill).into(),
                    policy,
                )
                .into()
            }
            None => policy,
        }
    }

    fn base_policy(&self) -> TicketExpirationPolicy {
        let max_ttl = bounded("max_time_to_live_in_seconds", self.max_time_to_live_in_seconds);
        let ttk = bounded("time_to_kill_in_seconds", self.time_to_kill_in_seconds);

        if max_ttl <= 0 && ttk <= 0 {
            tracing::warn!("Ticket-granting tickets will never expire");
            return NeverExpiresExpirationPolicy.into();
        }
        if let Some(timeout) = self.timeout {
            tracing::debug!(max_time_to_live = timeout, "Using sliding timeout policy");
            return TimeoutExpirationPolicy::new(bounded("timeout", timeout)).into();
        }
        if max_ttl > 0 && ttk > 0 {
            tracing::debug!(max_ttl, ttk, "Using hard and idle timeout policy");
            return TicketGrantingTicketExpirationPolicy::new(max_ttl, ttk).into();
        }
        if let Some(throttled) = self.throttled {
            tracing::debug!("Using throttled timeout policy");
            return ThrottledUseAndTimeoutExpirationPolicy::new(
                bounded("throttled.time_to_kill_in_seconds", throttled.time_to_kill_in_seconds),
                bounded(
                    "throttled.time_in_between_uses_in_seconds",
                    throttled.time_in_between_uses_in_seconds,
                ),
            )
            .into();
        }
        if let Some(hard_timeout) = self.hard_timeout {
            tracing::debug!(time_to_kill = hard_timeout, "Using hard timeout policy");
            return HardTimeoutExpirationPolicy::new(bounded("hard_timeout", hard_timeout)).into();
        }

        tracing::warn!("Ticket-granting tickets will expire immediately");
        AlwaysExpiresExpirationPolicy.into()
    }
}

impl Default for TicketGrantingTicketConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Service ticket or proxy ticket configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTicketConfig {
    /// Permitted validations.
    ///
    /// Default: 1
    pub number_of_uses: u32,

    /// Idle window in seconds.
    ///
    /// Default: 10 seconds
    pub time_to_kill_in_seconds: i64,
}

/// Proxy tickets follow the same rules as service tickets.
pub type ProxyTicketConfig = ServiceTicketConfig;

impl ServiceTicketConfig {
    /// Single-use, ten second tickets.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            number_of_uses: 1,
            time_to_kill_in_seconds: 10,
        }
    }

    /// Set the number of permitted uses.
    #[must_use]
    pub const fn with_number_of_uses(mut self, number_of_uses: u32) -> Self {
        self.number_of_uses = number_of_uses;
        self
    }

    /// Set the idle window.
    #[must_use]
    pub const fn with_time_to_kill(mut self, seconds: i64) -> Self {
        self.time_to_kill_in_seconds = seconds;
        self
    }

    /// Policy for new tickets.
    #[must_use]
    pub fn expiration_policy(&self) -> TicketExpirationPolicy {
        MultiTimeUseOrTimeoutExpirationPolicy::new(
            self.number_of_uses,
            bounded("time_to_kill_in_seconds", self.time_to_kill_in_seconds),
        )
        .into()
    }
}

impl Default for ServiceTicketConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Proxy-granting ticket configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyGrantingTicketConfig {
    /// Hard lifetime in seconds. Unset or non-positive reuses the
    /// ticket-granting ticket policy.
    pub max_time_to_live_in_seconds: Option<i64>,
}

impl ProxyGrantingTicketConfig {
    /// Create configuration that reuses the ticket-granting ticket policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_time_to_live_in_seconds: None,
        }
    }

    /// Set a dedicated hard lifetime.
    #[must_use]
    pub const fn with_max_time_to_live(mut self, seconds: i64) -> Self {
        self.max_time_to_live_in_seconds = Some(seconds);
        self
    }

    /// Policy for new proxy-granting tickets.
    #[must_use]
    pub fn expiration_policy(
        &self,
        granting: &TicketGrantingTicketConfig,
    ) -> TicketExpirationPolicy {
        match self.max_time_to_live_in_seconds {
            Some(seconds) if seconds > 0 => {
                HardTimeoutExpirationPolicy::new(bounded("max_time_to_live_in_seconds", seconds))
                    .into()
            }
            _ => granting.expiration_policy(),
        }
    }
}

/// Encryption of protocol ticket ids (service and proxy tickets).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptoConfig {
    /// Whether ids are encrypted before leaving the server.
    pub enabled: bool,

    /// Base64 (standard alphabet) encoded 32-byte AES-256 key.
    pub encryption_key: Option<String>,
}

impl CryptoConfig {
    /// Enable encryption with the given base64 key.
    #[must_use]
    pub fn enabled(encryption_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            encryption_key: Some(encryption_key.into()),
        }
    }

    /// Decode the configured key.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidConfiguration`] if encryption is enabled
    /// without a key, or the key is not valid base64 for 32 bytes.
    pub fn key_bytes(&self) -> Result<Vec<u8>> {
        let encoded = self.encryption_key.as_deref().ok_or_else(|| {
            TicketError::InvalidConfiguration("encryption enabled without a key".to_string())
        })?;
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TicketError::InvalidConfiguration(format!("encryption key: {e}")))?;
        if key.len() != 32 {
            return Err(TicketError::InvalidConfiguration(format!(
                "encryption key must be 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(key)
    }
}

/// All ticket settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketsConfig {
    /// Ticket-granting tickets.
    pub ticket_granting: TicketGrantingTicketConfig,

    /// Service tickets.
    pub service: ServiceTicketConfig,

    /// Proxy-granting tickets.
    pub proxy_granting: ProxyGrantingTicketConfig,

    /// Proxy tickets.
    pub proxy: ProxyTicketConfig,

    /// Protocol ticket id encryption.
    pub crypto: CryptoConfig,

    /// Keep only the latest session per service on a ticket-granting ticket.
    ///
    /// Default: true
    pub only_track_most_recent_session: bool,

    /// Node identifier appended to generated ids.
    pub suffix: Option<String>,
}

impl TicketsConfig {
    /// Create configuration with defaults everywhere.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ticket_granting: TicketGrantingTicketConfig::new(),
            service: ServiceTicketConfig::new(),
            proxy_granting: ProxyGrantingTicketConfig::new(),
            proxy: ProxyTicketConfig::new(),
            crypto: CryptoConfig::default(),
            only_track_most_recent_session: true,
            suffix: None,
        }
    }

    /// Set ticket-granting ticket settings.
    #[must_use]
    pub fn with_ticket_granting(mut self, config: TicketGrantingTicketConfig) -> Self {
        self.ticket_granting = config;
        self
    }

    /// Set service ticket settings.
    #[must_use]
    pub fn with_service(mut self, config: ServiceTicketConfig) -> Self {
        self.service = config;
        self
    }

    /// Set proxy-granting ticket settings.
    #[must_use]
    pub fn with_proxy_granting(mut self, config: ProxyGrantingTicketConfig) -> Self {
        self.proxy_granting = config;
        self
    }

    /// Set proxy ticket settings.
    #[must_use]
    pub fn with_proxy(mut self, config: ProxyTicketConfig) -> Self {
        self.proxy = config;
        self
    }

    /// Set protocol ticket id encryption.
    #[must_use]
    pub fn with_crypto(mut self, crypto: CryptoConfig) -> Self {
        self.crypto = crypto;
        self
    }

    /// Track every session, not just the latest per service.
    #[must_use]
    pub fn with_only_track_most_recent_session(mut self, enabled: bool) -> Self {
        self.only_track_most_recent_session = enabled;
        self
    }

    /// Set the node identifier appended to generated ids.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self::new()
    }
}
