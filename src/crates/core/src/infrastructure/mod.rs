//! Infrastructure layer
//!
//! Host DOM access, key-value persistence, and the status/telemetry event channel.

pub mod dom;
pub mod events;
pub mod storage;
