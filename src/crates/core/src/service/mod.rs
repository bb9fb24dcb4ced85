//! Service layer
//!
//! Configuration, DOM location primitives, boundary flags, and telemetry.

pub mod boundary;
pub mod config;
pub mod locator;
pub mod telemetry;
