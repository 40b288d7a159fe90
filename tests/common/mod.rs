//! In-process fakes for driving the ingestion engine without a node.

#![allow(dead_code)]

use async_trait::async_trait;
use minerflow::chain::{ChainSource, EpochFeed, EpochSubscription, FeedError, RewardRecord, SourceError};
use minerflow::ledger::SqliteLedger;
use minerflow::pipeline::types::Reward;
use minerflow::pipeline::{EngineSettings, IngestionEngine};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockBlock {
    pub hash: String,
    pub miner: String,
    pub coins: u64,
    pub timestamp: i64,
}

/// Scriptable `ChainSource`.
///
/// - `not_executed(epoch, n)`: the next `n` reward queries for `epoch` come back empty
/// - `fail_epoch(epoch, n)`: the next `n` reward queries for `epoch` return an RPC error
/// - `delay_epoch(epoch, d)`: reward queries for `epoch` sleep `d` first
#[derive(Default)]
pub struct MockChain {
    blocks: Mutex<HashMap<u64, Vec<MockBlock>>>,
    empty_polls: Mutex<HashMap<u64, usize>>,
    failures: Mutex<HashMap<u64, usize>>,
    delays: Mutex<HashMap<u64, Duration>>,
    current_epoch: Mutex<Option<u64>>,
    pub reward_calls: AtomicUsize,
    pub timestamp_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_block(&self, epoch: u64, hash: &str, miner: &str, coins: u64, timestamp: i64) {
        self.blocks.lock().unwrap().entry(epoch).or_default().push(MockBlock {
            hash: hash.to_string(),
            miner: miner.to_string(),
            coins,
            timestamp,
        });
    }

    pub fn not_executed(&self, epoch: u64, polls: usize) {
        self.empty_polls.lock().unwrap().insert(epoch, polls);
    }

    pub fn fail_epoch(&self, epoch: u64, times: usize) {
        self.failures.lock().unwrap().insert(epoch, times);
    }

    pub fn delay_epoch(&self, epoch: u64, delay: Duration) {
        self.delays.lock().unwrap().insert(epoch, delay);
    }

    pub fn set_current_epoch(&self, epoch: u64) {
        *self.current_epoch.lock().unwrap() = Some(epoch);
    }

    pub fn reward_calls(&self) -> usize {
        self.reward_calls.load(Ordering::SeqCst)
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    fn take_one(counter: &Mutex<HashMap<u64, usize>>, epoch: u64) -> bool {
        let mut counter = counter.lock().unwrap();
        match counter.get_mut(&epoch) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn current_epoch(&self) -> Result<u64, SourceError> {
        if let Some(epoch) = *self.current_epoch.lock().unwrap() {
            return Ok(epoch);
        }
        Ok(self.blocks.lock().unwrap().keys().copied().max().unwrap_or(0))
    }

    async fn block_rewards(&self, epoch: u64) -> Result<Vec<RewardRecord>, SourceError> {
        self.reward_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&epoch).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if Self::take_one(&self.failures, epoch) {
            return Err(SourceError::Rpc {
                method: "cfx_getBlockRewardInfo",
                code: -32000,
                message: format!("epoch {} unavailable", epoch),
            });
        }

        if Self::take_one(&self.empty_polls, epoch) {
            return Ok(Vec::new());
        }

        let blocks = self.blocks.lock().unwrap().get(&epoch).cloned().unwrap_or_default();
        Ok(blocks
            .into_iter()
            .map(|block| RewardRecord {
                block_hash: block.hash,
                miner: block.miner,
                reward: Reward::from_coins(block.coins),
            })
            .collect())
    }

    async fn block_timestamp(&self, block_hash: &str) -> Result<i64, SourceError> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);

        self.blocks
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|block| block.hash == block_hash)
            .map(|block| block.timestamp)
            .ok_or_else(|| SourceError::BlockNotFound(block_hash.to_string()))
    }
}

/// What one `next_epoch` call yields.
#[derive(Debug, Clone, Copy)]
pub enum FeedEvent {
    Epoch(u64),
    /// Stay silent for the full timeout
    Silence,
    /// Drop the connection
    Disconnect,
}

/// Scriptable `EpochFeed`: each `subscribe` consumes the next script.
///
/// An exhausted script (or a subscribe with no scripts left) stays silent. The first
/// `hung_subscribes` calls never complete, like a node that accepts the connection but
/// never answers the subscribe request.
#[derive(Default)]
pub struct MockFeed {
    scripts: Mutex<VecDeque<Vec<FeedEvent>>>,
    hung_subscribes: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
}

impl MockFeed {
    pub fn new(scripts: Vec<Vec<FeedEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            hung_subscribes: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        })
    }

    pub fn hang_subscribes(&self, count: usize) {
        self.hung_subscribes.store(count, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EpochFeed for MockFeed {
    async fn subscribe(&self) -> Result<Box<dyn EpochSubscription>, FeedError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let hung = self
            .hung_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hung {
            std::future::pending::<()>().await;
        }

        let events = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::new(MockSubscription {
            events: events.into_iter().collect(),
        }))
    }
}

struct MockSubscription {
    events: VecDeque<FeedEvent>,
}

#[async_trait]
impl EpochSubscription for MockSubscription {
    async fn next_epoch(&mut self, timeout: Duration) -> Result<u64, FeedError> {
        match self.events.pop_front() {
            Some(FeedEvent::Epoch(epoch)) => Ok(epoch),
            Some(FeedEvent::Disconnect) => Err(FeedError::Closed),
            Some(FeedEvent::Silence) | None => {
                tokio::time::sleep(timeout).await;
                Err(FeedError::Timeout(timeout))
            }
        }
    }
}

/// Fast timings for tests.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        worker_count: 4,
        retry_interval: Duration::from_millis(10),
        feed_timeout: Duration::from_millis(50),
        progress_interval: Duration::from_secs(60),
        ..EngineSettings::default()
    }
}

pub fn in_memory_engine(chain: Arc<MockChain>, settings: EngineSettings) -> (IngestionEngine, Arc<SqliteLedger>) {
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let engine = IngestionEngine::new(chain, ledger.clone(), settings);
    (engine, ledger)
}

/// 20-byte hex address.
pub fn miner(n: u8) -> String {
    format!("0x{:040x}", n)
}

/// 32-byte hex block hash, unique per `(epoch, index)`.
pub fn block_hash(epoch: u64, index: u64) -> String {
    format!("0x{:064x}", epoch * 1_000 + index)
}

/// Poll `condition` every 5ms, panicking after 5s.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
