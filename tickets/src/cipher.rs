//! Optional encoding of protocol ticket ids.
//!
//! Service and proxy ticket ids can be encrypted before they leave the
//! server. The encoded form keeps the clear kind prefix
//! (`ST-<base64url(nonce || ciphertext)>`) so the catalog can still resolve it.

use crate::config::CryptoConfig;
use crate::error::{Result, TicketError};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use std::fmt;
use std::sync::Arc;

const NONCE_LENGTH: usize = 12;

/// Encodes and decodes ticket ids.
pub trait CipherExecutor: Send + Sync + fmt::Debug {
    /// Encode a clear ticket id.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Cipher`] if encoding fails.
    fn encode(&self, value: &str) -> Result<String>;

    /// Decode an encoded ticket id.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Cipher`] if the value was not produced by
    /// [`encode`](Self::encode) with the same key.
    fn decode(&self, value: &str) -> Result<String>;

    /// Whether this executor changes values at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Leaves ids untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCipherExecutor;

impl CipherExecutor for NoOpCipherExecutor {
    fn encode(&self, value: &str) -> Result<String> {
        Ok(value.to_string())
    }

    fn decode(&self, value: &str) -> Result<String> {
        Ok(value.to_string())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// AES-256-GCM encryption of protocol ticket ids.
#[derive(Clone)]
pub struct ProtocolTicketCipherExecutor {
    cipher: Arc<Aes256Gcm>,
}

impl ProtocolTicketCipherExecutor {
    /// Create an executor from a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidConfiguration`] if the key is not 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(TicketError::InvalidConfiguration(
                "Encryption key must be exactly 32 bytes (256 bits) for AES-256-GCM".to_string(),
            ));
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| {
            TicketError::InvalidConfiguration(format!("Failed to initialize AES-256-GCM: {e}"))
        })?;
        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Build the executor the crypto settings ask for.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::InvalidConfiguration`] if encryption is enabled
    /// with a missing or malformed key.
    pub fn from_config(config: &CryptoConfig) -> Result<Arc<dyn CipherExecutor>> {
        if !config.enabled {
            return Ok(Arc::new(NoOpCipherExecutor));
        }
        let key = config.key_bytes()?;
        tracing::info!("Protocol ticket id encryption enabled");
        Ok(Arc::new(Self::new(&key)?))
    }
}

impl fmt::Debug for ProtocolTicketCipherExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolTicketCipherExecutor")
            .finish_non_exhaustive()
    }
}

impl CipherExecutor for ProtocolTicketCipherExecutor {
    fn encode(&self, value: &str) -> Result<String> {
        let (prefix, _) = value
            .split_once('-')
            .ok_or_else(|| TicketError::Cipher(format!("ticket id {value} has no prefix")))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, value.as_bytes())
            .map_err(|e| TicketError::Cipher(format!("Encryption failed: {e}")))?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
        Ok(format!("{prefix}-{encoded}"))
    }

    fn decode(&self, value: &str) -> Result<String> {
        let (prefix, encoded) = value
            .split_once('-')
            .ok_or_else(|| TicketError::Cipher("encoded ticket id has no prefix".to_string()))?;

        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| TicketError::Cipher(format!("Invalid encoding: {e}")))?;
        if payload.len() <= NONCE_LENGTH {
            return Err(TicketError::Cipher("encoded ticket id too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LENGTH);

        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| TicketError::Cipher(format!("Decryption failed: {e}")))?;
        let decoded = String::from_utf8(plaintext)
            .map_err(|e| TicketError::Cipher(format!("Decoded id is not UTF-8: {e}")))?;

        if !decoded.starts_with(prefix) {
            return Err(TicketError::Cipher(
                "decoded ticket id does not match its prefix".to_string(),
            ));
        }
        Ok(decoded)
    }
}
