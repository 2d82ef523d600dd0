//! Common types used throughout chap.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Raw secret bytes supplied by the caller.
///
/// The buffer is overwritten with zeros when dropped, so a `Secret` going
/// out of scope on any path (return, `?`, or panic unwinding) releases its
/// contents. This is best effort: copies made before the bytes reached this
/// type, by the allocator on reallocation, or by the OS (swap) are not
/// covered.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Take ownership of secret bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Secret {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} bytes])", self.0.len())
    }
}
