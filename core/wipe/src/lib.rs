//! Secure file erasure for chap.
//!
//! A wipe overwrites a single regular file a fixed number of times,
//! syncing after every pass, and only then removes it. Nothing happens
//! until a [`Confirmation`] agrees.
//!
//! # Limitations
//! Overwriting in place is best effort. Copy-on-write and log-structured
//! filesystems, data journaling, snapshots, and wear-leveled flash can
//! all keep older copies of the blocks that no write from here reaches.

pub mod confirm;
pub mod eraser;

pub use confirm::{Confirmation, ForcedConfirmation, PromptConfirmation};
pub use eraser::{secure_wipe, Eraser, PassTarget, WipeReport, DEFAULT_PASSES, WIPE_BLOCK_SIZE};
