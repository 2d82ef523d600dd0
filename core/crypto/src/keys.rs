//! Key types with secure memory handling.
//!
//! Key types zeroize their memory on drop to prevent sensitive data from
//! persisting in memory.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use chap_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Symmetric key for the stream cipher.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LENGTH],
}

impl CipherKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a key from a slice.
    ///
    /// # Errors
    /// - Returns `InvalidKeyLength` if `bytes` is not KEY_LENGTH long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(Error::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_checks_length() {
        assert!(CipherKey::from_slice(&[7u8; KEY_LENGTH]).is_ok());

        let err = CipherKey::from_slice(&[7u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: 16
            }
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = CipherKey::from_bytes([0x41; KEY_LENGTH]);
        let printed = format!("{:?}", key);
        assert_eq!(printed, "CipherKey([REDACTED])");
    }

    #[test]
    fn test_zeroize_clears_key() {
        let mut key = CipherKey::from_bytes([0xFF; KEY_LENGTH]);
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; KEY_LENGTH]);
    }
}
