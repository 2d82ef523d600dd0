//! In-place erasure of sensitive buffers.
//!
//! Owned key material (`CipherKey`, `chap_common::Secret`) already clears
//! itself on drop. This function covers borrowed buffers that hold
//! sensitive bytes for a while, such as scratch space a caller reuses.

use zeroize::Zeroize;

/// Overwrite every byte of `buffer` with zero. `None` is a no-op.
///
/// The writes go through `zeroize`, so they are not elided by the
/// optimizer. Copies of the data that exist elsewhere are not touched.
pub fn zeroize_buffer(buffer: Option<&mut [u8]>) {
    if let Some(buffer) = buffer {
        buffer.zeroize();
    }
}
