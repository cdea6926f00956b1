//! Relay core: election, session state and event processing.
//!
//! ## Module Structure
//!
//! - `sequence`: Per-stream election counters (`SequenceCoordinator`)
//! - `state`: Active sessions and broadcast (`SessionRegistry`)
//! - `channels`: Events sent from connection tasks to the relay task
//! - `effects`: Background execution of rule side effects
//! - `orchestrator`: The `Relay` and its task loop

pub mod channels;
pub mod effects;
pub mod orchestrator;
pub mod sequence;
pub mod state;

pub use channels::{RelayHandle, Submission};
pub use orchestrator::{run_relay_loop, Relay};
pub use state::SessionId;
