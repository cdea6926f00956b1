//! In-game chat line handling.
//!
//! This module contains:
//! - Ordered classification rules for each stream
//! - Formatting and item token cleanup
//! - The item token decoder

pub mod encoding;
pub mod patterns;
pub mod sanitizer;
