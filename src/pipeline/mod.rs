//! # Ingestion pipeline
//!
//! The core of the daemon: block facts flow from the chain source through the ingestion
//! engine into the ledger and the in-memory aggregator.
//!
//! - `types` - `BlockFact`, `Reward`, `TrackingWindow`
//! - `aggregator` - per-miner aggregate and the continuity metric
//! - `distribution` - cumulative timestamp histogram
//! - `workers` - bounded backfill worker pool
//! - `engine` - backfill, live tail, recovery, reconciliation
//! - `query` - snapshot-consistent read facade
//! - `progress` - periodic progress log

pub mod aggregator;
pub mod distribution;
pub mod engine;
pub mod progress;
pub mod query;
pub mod types;
pub mod workers;

pub use engine::{EngineError, EngineMode, EngineSettings, ErrorClass, IngestionEngine};
pub use query::{MinerSummary, QueryFacade};
