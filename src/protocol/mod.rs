//! Client wire protocol.
//!
//! - `frames`: Event frames exchanged with mod clients
//! - `codec`: Newline-delimited JSON framing
//! - `auth`: Token authentication and mod version policy
//! - `server`: TCP listener and connection lifecycle

pub mod auth;
pub mod codec;
pub mod frames;
pub mod server;
