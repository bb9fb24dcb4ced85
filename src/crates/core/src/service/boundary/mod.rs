//! Boundary flags
//!
//! Users mark turns where a ranged deletion must stop. Turns carry no durable
//! identifier, so flags are keyed by a derived [`TurnIdentity`].

pub mod identity;
pub mod store;

pub use identity::{TieredIdentity, TurnIdentity, TurnIdentityResolver};
pub use store::BoundaryStore;
