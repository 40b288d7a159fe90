//! Read-only facade over the aggregate
//!
//! Each call takes the engine lock once, copies out what it needs and releases it.
//! Errors never surface here: a poisoned lock still yields the last written state, and
//! unknown addresses yield empty results.

use super::distribution::{timestamp_distribution, TimestampDistribution};
use super::engine::EngineState;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One row of `list_miners`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinerSummary {
    /// Address without the `0x` prefix
    pub address: String,
    pub block_count: usize,
    #[serde(rename = "active_period")]
    pub active_period_hours: i64,
    /// Coins (base units × 1e-18)
    pub mining_reward: f64,
    pub latest_mined_block: i64,
}

#[derive(Clone)]
pub struct QueryFacade {
    state: Arc<Mutex<EngineState>>,
}

impl QueryFacade {
    pub(crate) fn new(state: Arc<Mutex<EngineState>>) -> Self {
        Self { state }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Miners with at least one in-window block, sorted by address.
    pub fn list_miners(&self) -> Vec<MinerSummary> {
        let mut miners: Vec<MinerSummary> = {
            let state = self.lock();
            state
                .aggregator
                .miners()
                .filter(|miner| miner.block_count() > 0)
                .map(|miner| MinerSummary {
                    address: strip_address_prefix(&miner.address).to_string(),
                    block_count: miner.block_count(),
                    active_period_hours: miner.active_period_hours(),
                    mining_reward: miner.total_reward.as_coins(),
                    latest_mined_block: miner.latest_mined,
                })
                .collect()
        };

        miners.sort_by(|a, b| a.address.cmp(&b.address));
        miners
    }

    /// Cumulative timestamp histogram over every fact of `address`.
    ///
    /// The address matches with or without its `0x` prefix. `None` when unknown.
    pub fn miner_timestamp_distribution(&self, address: &str) -> Option<TimestampDistribution> {
        let timestamps = {
            let state = self.lock();
            let candidates = address_candidates(address);
            let miner = candidates
                .iter()
                .find_map(|candidate| state.aggregator.miner(candidate));
            miner.map(|miner| miner.all_timestamps.clone())
        }?;

        timestamp_distribution(&timestamps)
    }
}

fn strip_address_prefix(address: &str) -> &str {
    address.strip_prefix("0x").unwrap_or(address)
}

fn address_candidates(address: &str) -> [String; 2] {
    match address.strip_prefix("0x") {
        Some(bare) => [address.to_string(), bare.to_string()],
        None => [address.to_string(), format!("0x{}", address)],
    }
}
