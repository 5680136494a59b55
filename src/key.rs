//! Unlock key derivation for the protected store.
//!
//! The key is a fixed obfuscation of two byte blobs compiled into the crate:
//! every secret byte is XORed with the base key, cycling over its first
//! [`BASE_KEY_SPAN`] bytes.

use crate::error::{QueryError, Result};

/// Number of base key bytes that take part in the derivation.
pub const BASE_KEY_SPAN: usize = 13;

pub const DB_BASE_KEY: [u8; 16] = [
    0xF1, 0x70, 0xCE, 0xA4, 0xDF, 0xCE, 0xA3, 0xE1, 0xA5, 0xD8, 0xC7, 0x0B, 0xD1, 0x00, 0x00, 0x00,
];

pub const DB_KEY: [u8; 32] = [
    0x6D, 0x5B, 0x65, 0x33, 0x63, 0x36, 0x63, 0x25, 0x54, 0x71, 0x2D, 0x73, 0x50, 0x53, 0x63, 0x38,
    0x6D, 0x34, 0x37, 0x7B, 0x35, 0x63, 0x70, 0x23, 0x37, 0x34, 0x53, 0x29, 0x73, 0x43, 0x36, 0x33,
];

/// Derive the unlock key: `secret[i] ^ base[i % 13]`.
///
/// Fails with a configuration error when `base` is shorter than
/// [`BASE_KEY_SPAN`] bytes.
pub fn derive_key(secret: &[u8], base: &[u8]) -> Result<Vec<u8>> {
    if base.len() < BASE_KEY_SPAN {
        return Err(QueryError::Configuration(format!(
            "base key must be at least {BASE_KEY_SPAN} bytes, got {}",
            base.len()
        )));
    }

    Ok(secret
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ base[i % BASE_KEY_SPAN])
        .collect())
}

/// The pair of byte blobs the unlock key is derived from.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    secret: Vec<u8>,
    base: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(secret: impl Into<Vec<u8>>, base: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            base: base.into(),
        }
    }

    /// The material compiled into this crate.
    pub fn embedded() -> Self {
        Self::new(DB_KEY, DB_BASE_KEY)
    }

    pub fn derive(&self) -> Result<Vec<u8>> {
        derive_key(&self.secret, &self.base)
    }
}

impl Default for KeyMaterial {
    fn default() -> Self {
        Self::embedded()
    }
}

// Keep the blobs out of logs.
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("secret_len", &self.secret.len())
            .field("base_len", &self.base.len())
            .finish()
    }
}
