//! # minerflow
//!
//! Per-miner block-reward aggregation for a ledger node.
//!
//! Two ingestion paths feed one aggregate:
//! - a bounded-parallel **backfill** over a closed epoch range
//! - a sequential **live tail** driven by the node's `epochs` pub/sub topic
//!
//! Every fact is written once to the SQLite ledger (the source of truth) and then
//! applied to the in-memory aggregator (a disposable materialized view rebuilt by
//! replay on restart). The continuity metric is reconciled from scratch at the
//! backfill → live boundary.
//!
//! ```text
//! ChainSource ──► IngestionEngine ──► Ledger (dedup + checkpoint)
//!   EpochFeed ──┘        │
//!                        └──────────► Aggregator ──► QueryFacade ──► rpc_server
//! ```

pub mod chain;
pub mod config;
pub mod ledger;
pub mod pipeline;
pub mod rpc_server;
pub mod sqlite_pragma;
