//! Common utilities and types shared across chap crates.
//!
//! This module provides the error taxonomy used by every component and
//! the zeroizing `Secret` buffer that carries raw key material.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::Secret;
