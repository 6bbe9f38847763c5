// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod classify;
pub mod config;
pub mod decision;
pub mod engine;
pub mod geo;
pub mod metrics;
pub mod notify;
pub mod rolling;
pub mod runner;
pub mod signals;
pub mod sources;
pub mod state;
pub mod summary;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, RunOptions};
pub use crate::decision::{AlertDecision, Priority};
pub use crate::runner::{DataPaths, Runner};
pub use crate::signals::{SignalParams, SignalsEngine, SurgeResult};
pub use crate::state::{AlertKey, StateStore};
pub use crate::summary::RunSummary;
