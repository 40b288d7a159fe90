//! Core data model: block facts, reward amounts and the tracking window.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Node base units per coin (rewards are reported in base units).
pub const UNITS_PER_COIN: u128 = 1_000_000_000_000_000_000;

/// Non-negative reward amount, held exactly in base units.
///
/// Sums are exact and order-independent; conversion to a decimal coin amount
/// (`× 1e-18`) happens only at presentation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reward(u128);

impl Reward {
    pub const ZERO: Reward = Reward(0);

    pub fn from_units(units: u128) -> Self {
        Reward(units)
    }

    /// Whole coins, for tests and fixtures.
    pub fn from_coins(coins: u64) -> Self {
        Reward(coins as u128 * UNITS_PER_COIN)
    }

    pub fn units(&self) -> u128 {
        self.0
    }

    /// Decimal coin amount (`units × 1e-18`).
    pub fn as_coins(&self) -> f64 {
        let whole = (self.0 / UNITS_PER_COIN) as f64;
        let frac = (self.0 % UNITS_PER_COIN) as f64 / UNITS_PER_COIN as f64;
        whole + frac
    }
}

impl Add for Reward {
    type Output = Reward;

    fn add(self, rhs: Reward) -> Reward {
        Reward(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Reward {
    fn add_assign(&mut self, rhs: Reward) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sum for Reward {
    fn sum<I: Iterator<Item = Reward>>(iter: I) -> Reward {
        iter.fold(Reward::ZERO, |acc, r| acc + r)
    }
}

impl fmt::Display for Reward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Reward {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>().map(Reward)
    }
}

/// One block's reward fact. Immutable once written; identity is `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFact {
    pub hash: String,
    pub miner: String,
    pub reward: Reward,
    /// Seconds, as reported by the node
    pub chain_timestamp: i64,
    pub epoch: u64,
    /// Local wall-clock seconds when the fact was first seen
    pub observed_at: i64,
}

impl BlockFact {
    /// `min(chain_timestamp, observed_at)`.
    ///
    /// Guards the "latest mined" watermark against future-skewed node clocks. Never
    /// used for the continuity metric, which must compare raw chain timestamps.
    pub fn effective_timestamp(&self) -> i64 {
        self.chain_timestamp.min(self.observed_at)
    }
}

/// Range of facts that count toward reward and continuity.
///
/// Facts outside the window still land in `all_timestamps` (the distribution query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingWindow {
    /// Lowest epoch counted (the configured initial epoch)
    pub min_epoch: u64,
    /// Inclusive chain-timestamp bounds
    pub start_ts: i64,
    pub end_ts: i64,
}

impl TrackingWindow {
    pub fn new(min_epoch: u64, start_ts: i64, end_ts: i64) -> Self {
        Self {
            min_epoch,
            start_ts,
            end_ts,
        }
    }

    /// Window that accepts every fact.
    pub fn unbounded() -> Self {
        Self::new(0, 0, i64::MAX)
    }

    pub fn contains(&self, fact: &BlockFact) -> bool {
        fact.epoch >= self.min_epoch
            && self.start_ts <= fact.chain_timestamp
            && fact.chain_timestamp <= self.end_ts
    }
}

impl Default for TrackingWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Current wall-clock time in Unix seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
