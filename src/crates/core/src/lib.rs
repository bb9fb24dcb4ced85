// PowerTools Core Library - Host-agnostic chat transcript deletion engine
// Four-layer architecture: Util -> Infrastructure -> Service -> Deletion

pub mod deletion; // Deletion layer - Orchestrator, native delete driver, turn injector
pub mod infrastructure; // Infrastructure layer - Host DOM, storage, events
pub mod powertools;
pub mod service; // Service layer - Config, locator, boundaries, telemetry
pub mod sim; // Simulated chat host built on the in-memory DOM
pub mod util; // Utility layer - Errors, hashing

// Export main types
pub use util::errors::*;

// Export infrastructure components
pub use infrastructure::dom::{DomError, HostDom, MemoryDom, MutationFeed, MutationRecord, NodeId};
pub use infrastructure::events::{EventEmitter, PowerToolsEvent};
pub use infrastructure::storage::{JsonFileStore, KeyValueStore, MemoryStore};

// Export service layer components
pub use service::boundary::{BoundaryStore, TieredIdentity, TurnIdentity, TurnIdentityResolver};
pub use service::config::{HostSelectors, PowerToolsConfig, StorageConfig, TimingConfig};
pub use service::telemetry::ClicksSavedTracker;

// Export deletion core types
pub use deletion::{
    BulkKind, ConfirmPrompt, ControlBinding, ControlRegistry, DeletionOrchestrator,
    DeletionOutcome, DeletionReport, RunState, SessionGuard, SessionKind, SessionSlot,
    StaticConfirm, TurnControl, TurnInjector,
};
pub use powertools::{ControlOutcome, PowerTools, SidebarAction};
pub use sim::{ChatHostSim, SimAttachment, SimOptions, SimRole, SimTranscript, SimTurn};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CORE_NAME: &str = "PowerTools Core";
