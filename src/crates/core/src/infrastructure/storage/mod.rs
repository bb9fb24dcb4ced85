//! Storage system
//!
//! Asynchronous key-value persistence for boundary flags and usage counters.

pub mod file;
pub mod kv;

pub use file::JsonFileStore;
pub use kv::{KeyValueStore, MemoryStore};
