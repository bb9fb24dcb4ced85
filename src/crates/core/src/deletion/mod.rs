//! Deletion layer
//!
//! Drives the host's delete UI: ranged and filtered bulk runs under a
//! single-flight session, plus the controls injected into every turn.

pub mod injector;
pub mod native;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use injector::{ControlBinding, ControlRegistry, TurnControl, TurnInjector};
pub use native::{find_confirm_button, trigger_native_delete};
pub use orchestrator::DeletionOrchestrator;
pub use session::{SessionGuard, SessionSlot};
pub use types::*;
