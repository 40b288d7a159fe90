//! Per-miner aggregate and the continuity metric
//!
//! The continuity metric approximates how long a miner kept producing blocks without a
//! long pause: the sum of inter-block gaps over its sorted chain timestamps, counting only
//! gaps in `(0, GAP_LIMIT_SECS]`.
//!
//! Two forms exist:
//! - **recompute** (`recompute_continuity`), O(n) over the sorted sequence; ground truth
//! - **incremental** (`MinerAggregate::add_fact` once `Known`): add `ts - max(existing)`
//!   before inserting `ts`
//!
//! The incremental form is exact only when a miner's facts arrive in non-decreasing
//! chain-timestamp order. That holds on the sequential live tail but not during the
//! parallel backfill, so miners stay `Unknown` until `reconcile_and_activate` recomputes
//! every miner from scratch at the backfill → live boundary.

use super::types::{BlockFact, Reward};
use std::collections::HashMap;

/// Largest gap (seconds) that still counts as continuous mining: 2 hours
pub const GAP_LIMIT_SECS: i64 = 7_200;

/// Continuity value of a miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityState {
    /// Not yet reconciled; no ordering assumption is safe
    Unknown,
    /// Reconciled value in seconds, maintained incrementally afterwards
    Known(i64),
}

impl ContinuityState {
    pub fn seconds(&self) -> Option<i64> {
        match self {
            ContinuityState::Unknown => None,
            ContinuityState::Known(secs) => Some(*secs),
        }
    }
}

/// From-scratch continuity over an ascending timestamp sequence.
pub fn recompute_continuity(sorted: &[i64]) -> i64 {
    sorted
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|gap| *gap > 0 && *gap <= GAP_LIMIT_SECS)
        .sum()
}

/// Sorted insertion after any equal elements (duplicates allowed).
fn insert_sorted(sorted: &mut Vec<i64>, ts: i64) {
    let idx = sorted.partition_point(|existing| *existing <= ts);
    sorted.insert(idx, ts);
}

/// Running aggregate for one miner address.
#[derive(Debug, Clone)]
pub struct MinerAggregate {
    pub address: String,

    /// Sum of in-window rewards (monotone)
    pub total_reward: Reward,

    /// Every chain timestamp ever seen for this miner, sorted
    pub all_timestamps: Vec<i64>,

    /// In-window chain timestamps, sorted (subset of `all_timestamps`)
    pub windowed_timestamps: Vec<i64>,

    /// Max effective timestamp of in-window facts (monotone)
    pub latest_mined: i64,

    pub continuity: ContinuityState,
}

impl MinerAggregate {
    pub fn new(address: String, activated: bool) -> Self {
        Self {
            address,
            total_reward: Reward::ZERO,
            all_timestamps: Vec::new(),
            windowed_timestamps: Vec::new(),
            latest_mined: 0,
            continuity: if activated {
                ContinuityState::Known(0)
            } else {
                ContinuityState::Unknown
            },
        }
    }

    /// Apply one fact.
    ///
    /// The timestamp always joins `all_timestamps`. In-window facts also add to the
    /// reward total, raise the latest-mined watermark, advance the continuity value (only
    /// when `Known`) and join `windowed_timestamps`.
    pub fn add_fact(&mut self, fact: &BlockFact, in_window: bool) {
        debug_assert_eq!(self.address, fact.miner);
        insert_sorted(&mut self.all_timestamps, fact.chain_timestamp);

        if !in_window {
            return;
        }

        self.total_reward += fact.reward;
        self.latest_mined = self.latest_mined.max(fact.effective_timestamp());

        if let (ContinuityState::Known(current), Some(last)) =
            (self.continuity, self.windowed_timestamps.last())
        {
            let gap = fact.chain_timestamp - last;
            if gap > 0 && gap <= GAP_LIMIT_SECS {
                self.continuity = ContinuityState::Known(current + gap);
            }
        }

        insert_sorted(&mut self.windowed_timestamps, fact.chain_timestamp);
    }

    /// Overwrite the continuity value with the from-scratch recompute and switch to `Known`.
    pub fn activate(&mut self) {
        self.continuity = ContinuityState::Known(recompute_continuity(&self.windowed_timestamps));
    }

    /// Number of in-window blocks.
    pub fn block_count(&self) -> usize {
        self.windowed_timestamps.len()
    }

    /// `floor(continuity / 3600)` when `Known`, else 0.
    pub fn active_period_hours(&self) -> i64 {
        self.continuity.seconds().map(|secs| secs / 3_600).unwrap_or(0)
    }
}

/// All miner aggregates plus the global activation flag.
#[derive(Debug, Default)]
pub struct Aggregator {
    miners: HashMap<String, MinerAggregate>,
    /// New miners start `Known(0)` once set
    activated: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fact(&mut self, fact: &BlockFact, in_window: bool) {
        let activated = self.activated;
        self.miners
            .entry(fact.miner.clone())
            .or_insert_with(|| MinerAggregate::new(fact.miner.clone(), activated))
            .add_fact(fact, in_window);
    }

    /// Recompute every miner from scratch and enable incremental mode.
    pub fn reconcile_and_activate(&mut self) {
        for miner in self.miners.values_mut() {
            miner.activate();
        }
        self.activated = true;
        log::debug!("Reconciled continuity for {} miners", self.miners.len());
    }

    /// Stop creating new miners as `Known` (backfill re-entered after activation).
    ///
    /// Existing miners keep their value until the next `reconcile_and_activate`.
    pub fn suspend_activation(&mut self) {
        self.activated = false;
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn miner(&self, address: &str) -> Option<&MinerAggregate> {
        self.miners.get(address)
    }

    pub fn miners(&self) -> impl Iterator<Item = &MinerAggregate> {
        self.miners.values()
    }

    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }
}
