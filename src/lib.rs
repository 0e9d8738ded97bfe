//! Instrument status server
//!
//! Collects time-stamped attribute values from remote instruments, by polling
//! or by event subscription, and keeps an in-memory time series per attribute
//! that can be queried at any instant.
//!
//! # Features
//!
//! - Heavy-duty collection (full history) and light polling (last values only)
//! - Lock-free per-attribute history with concurrent readers
//! - Last, nearest and linear interpolation for point-in-time snapshots
//! - Named attribute groups for filtered queries
//! - Rolling retention through a periodic maintenance task
//! - Pluggable device clients behind a small capability trait

// Core modules
pub mod client;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod logging;
pub mod registry;
pub mod server;

// Re-export main types for convenience
pub use config::StatusServerConfig;
pub use engine::{AttributeFilter, Engine, EngineState, Scheduler};
pub use error::{Result, StatusServerError};
pub use server::StatusServer;
