//! Platform-originated message handling.

pub mod normalize;

pub use normalize::normalize_message;
