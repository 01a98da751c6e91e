//! Queue replay and the producer contract.
//!
//! [`SyncEngine::drain`] replays the queue; [`SyncEngine::perform`] is the
//! single entry point every mutating call site goes through.

mod engine;
mod producer;

pub use engine::*;
pub use producer::*;
