//! Event system module
//!
//! Status lines and telemetry signals consumed by the (external) status display
//! and review-prompt features.

pub mod emitter;

pub use emitter::{EventEmitter, PowerToolsEvent};
