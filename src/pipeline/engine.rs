//! Ingestion engine: backfill, live tail, recovery and reconciliation
//!
//! ## Architecture
//!
//! ```text
//! backfill(from, to)                 live_tail(feed)
//!   WorkerPool (N epoch tasks)         one epoch at a time
//!        │                                  │
//!        └──── fetch_epoch (no lock) ◄──────┘
//!                     │
//!              apply_epoch (engine lock)
//!                     ├─ Ledger::put        (write-once)
//!                     ├─ Aggregator::add_fact
//!                     └─ Ledger::set_checkpoint (live, Live mode only)
//! ```
//!
//! Fetching happens outside the lock, so backfill workers overlap their network calls.
//! Every mutation of the ledger and the aggregator happens inside `apply_epoch` under the
//! single engine lock, which is also what the query facade takes for its snapshots.
//!
//! ## Modes
//!
//! `Backfilling` → `Live` when a backfill run completes: the run ends with a global
//! reconcile-and-activate pass, then flips the mode and advances the checkpoint to the end
//! of the range. A later `backfill` call (manual re-sync) switches back to `Backfilling`
//! and repeats the same sequence.
//!
//! ## Scaling limit
//!
//! Aggregates live only in memory. Every restart replays the whole ledger.

use super::aggregator::Aggregator;
use super::progress::ProgressSnapshot;
use super::query::QueryFacade;
use super::types::{current_timestamp, BlockFact, TrackingWindow};
use super::workers::WorkerPool;
use crate::chain::{ChainSource, EpochFeed, EpochSubscription, FeedError, SourceError};
use crate::ledger::{Ledger, LedgerError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Backfilling,
    Live,
}

/// Everything behind the engine lock.
#[derive(Debug)]
pub struct EngineState {
    pub(crate) aggregator: Aggregator,
    pub(crate) mode: EngineMode,
}

impl EngineState {
    fn new() -> Self {
        Self {
            aggregator: Aggregator::new(),
            mode: EngineMode::Backfilling,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Backfill worker-pool size
    pub worker_count: usize,
    /// Delay between not-yet-executed retries, and before a re-subscribe
    pub retry_interval: Duration,
    /// Live feed inactivity window
    pub feed_timeout: Duration,
    /// Backfill start when the ledger has no checkpoint
    pub initial_epoch: u64,
    pub window: TrackingWindow,
    pub progress_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            retry_interval: Duration::from_secs(1),
            feed_timeout: Duration::from_secs(3_600),
            initial_epoch: 0,
            window: TrackingWindow::unbounded(),
            progress_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Chain source error: {0}")]
    Source(#[from] SourceError),

    #[error("Epoch feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Backfill worker failed: {0}")]
    Worker(#[from] JoinError),

    #[error("Engine state lock poisoned")]
    Poisoned,
}

/// Retry policy bucket of an `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network or feed disruption; the live tail re-subscribes
    Transient,
    /// Storage or internal state failure; the engine stops
    Fatal,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Source(_) | EngineError::Feed(_) => ErrorClass::Transient,
            EngineError::Ledger(_) | EngineError::Worker(_) | EngineError::Poisoned => {
                ErrorClass::Fatal
            }
        }
    }
}

/// Which path an epoch came from. Only live epochs advance the checkpoint one by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochOrigin {
    Backfill,
    Live,
}

/// Orchestrator owning the chain source, the ledger and the aggregate.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct IngestionEngine {
    source: Arc<dyn ChainSource>,
    ledger: Arc<dyn Ledger>,
    state: Arc<Mutex<EngineState>>,
    settings: EngineSettings,
}

impl IngestionEngine {
    pub fn new(
        source: Arc<dyn ChainSource>,
        ledger: Arc<dyn Ledger>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            source,
            ledger,
            state: Arc::new(Mutex::new(EngineState::new())),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Read-only view for the presentation layer.
    pub fn query(&self) -> QueryFacade {
        QueryFacade::new(self.state.clone())
    }

    pub fn mode(&self) -> Result<EngineMode, EngineError> {
        Ok(self.lock_state()?.mode)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.state.lock().map_err(|_| EngineError::Poisoned)
    }

    /// Rebuild the aggregate from the ledger and pick the first epoch to backfill.
    ///
    /// Every stored fact is replayed into a fresh aggregator (all miners `Unknown`), with
    /// `in_window` computed per fact. Runs before any network fetch so that the resumed
    /// backfill's dedup checks see the whole ledger. Calling it again yields the same
    /// aggregate.
    ///
    /// # Returns
    /// `checkpoint + 1`, or the configured initial epoch when no checkpoint exists.
    pub fn recover(&self) -> Result<u64, EngineError> {
        let checkpoint = self.ledger.get_checkpoint()?;
        let facts = self.ledger.all_facts()?;

        let mut state = self.lock_state()?;
        state.aggregator = Aggregator::new();
        state.mode = EngineMode::Backfilling;
        for fact in &facts {
            let in_window = self.settings.window.contains(fact);
            state.aggregator.add_fact(fact, in_window);
        }

        let resume_from = match checkpoint {
            Some(epoch) => epoch + 1,
            None => self.settings.initial_epoch,
        };

        log::info!("♻️  Recovered ledger state");
        log::info!("   ├─ Facts replayed: {}", facts.len());
        log::info!("   ├─ Miners: {}", state.aggregator.len());
        log::info!("   ├─ Checkpoint: {:?}", checkpoint);
        log::info!("   └─ Resume from epoch: {}", resume_from);

        Ok(resume_from)
    }

    /// Fetch one epoch's new facts. Never touches the engine lock.
    ///
    /// Retries the reward query every `retry_interval` for as long as it comes back empty
    /// (epoch not executed yet). Hashes already in the ledger skip the timestamp fetch.
    async fn fetch_epoch(&self, epoch: u64) -> Result<BTreeMap<String, BlockFact>, EngineError> {
        let records = loop {
            let records = self.source.block_rewards(epoch).await?;
            if !records.is_empty() {
                break records;
            }
            log::debug!(
                "⏳ Epoch {} not executed yet, retrying in {:?}",
                epoch,
                self.settings.retry_interval
            );
            tokio::time::sleep(self.settings.retry_interval).await;
        };

        let mut facts = BTreeMap::new();
        for record in records {
            if facts.contains_key(&record.block_hash) || self.ledger.exists(&record.block_hash)? {
                continue;
            }

            let chain_timestamp = self.source.block_timestamp(&record.block_hash).await?;
            let fact = BlockFact {
                hash: record.block_hash.clone(),
                miner: record.miner,
                reward: record.reward,
                chain_timestamp,
                epoch,
                observed_at: current_timestamp(),
            };
            facts.insert(record.block_hash, fact);
        }

        Ok(facts)
    }

    /// Write and aggregate one epoch's facts under the engine lock.
    ///
    /// Re-checks `exists` first: the backfill and the live tail may both have fetched the
    /// same epoch. Facts reach the aggregator in `(chain_timestamp, hash)` order. Returns
    /// the number of facts actually applied.
    fn apply_epoch(
        &self,
        epoch: u64,
        facts: BTreeMap<String, BlockFact>,
        origin: EpochOrigin,
    ) -> Result<usize, EngineError> {
        let mut state = self.lock_state()?;

        let mut fresh = BTreeMap::new();
        for (hash, fact) in facts {
            if !self.ledger.exists(&hash)? {
                fresh.insert(hash, fact);
            }
        }

        if !fresh.is_empty() {
            self.ledger.put(&fresh)?;
        }

        // Incremental continuity is only exact for non-decreasing timestamps
        let mut ordered: Vec<&BlockFact> = fresh.values().collect();
        ordered.sort_by(|a, b| (a.chain_timestamp, &a.hash).cmp(&(b.chain_timestamp, &b.hash)));

        for fact in ordered {
            let in_window = self.settings.window.contains(fact);
            state.aggregator.add_fact(fact, in_window);
        }

        if origin == EpochOrigin::Live && state.mode == EngineMode::Live {
            self.ledger.set_checkpoint(epoch)?;
        }

        Ok(fresh.len())
    }

    async fn process_epoch(&self, epoch: u64, origin: EpochOrigin) -> Result<usize, EngineError> {
        let facts = self.fetch_epoch(epoch).await?;
        self.apply_epoch(epoch, facts, origin)
    }

    /// Ingest the closed range `[max(1, from), to]` on the worker pool.
    ///
    /// Epoch tasks may apply out of order. Once all of them completed, every miner's
    /// continuity is recomputed from scratch, the mode becomes `Live` and the checkpoint
    /// advances to `to`. Any task error aborts the run and is returned; the checkpoint is
    /// left untouched in that case.
    pub async fn backfill(&self, from: u64, to: u64) -> Result<(), EngineError> {
        let from = from.max(1);

        {
            let mut state = self.lock_state()?;
            state.mode = EngineMode::Backfilling;
            state.aggregator.suspend_activation();
        }

        if from <= to {
            let pool = WorkerPool::new(self.settings.worker_count);
            log::info!("🔄 Backfilling epochs {}..={}", from, to);
            log::info!("   ├─ Epochs: {}", to - from + 1);
            log::info!("   └─ Workers: {}", pool.size());

            let started = std::time::Instant::now();
            let engine = self.clone();
            let result = pool
                .run_all(from..=to, move |epoch| {
                    let engine = engine.clone();
                    async move {
                        let applied = engine.process_epoch(epoch, EpochOrigin::Backfill).await?;
                        log::debug!("Backfilled epoch {} ({} new facts)", epoch, applied);
                        Ok::<(), EngineError>(())
                    }
                })
                .await;

            match result {
                Ok(completed) => log::info!(
                    "✅ Backfill complete: {} epochs in {:.1}s",
                    completed,
                    started.elapsed().as_secs_f64()
                ),
                Err(e) => {
                    log::error!("❌ Backfill {}..={} failed: {}", from, to, e);
                    return Err(e);
                }
            }
        } else {
            log::info!("✅ Nothing to backfill (next epoch {}, node at {})", from, to);
        }

        let mut state = self.lock_state()?;
        state.aggregator.reconcile_and_activate();
        state.mode = EngineMode::Live;
        if from <= to {
            self.ledger.set_checkpoint(to)?;
        }
        log::info!("🟢 Live mode ({} miners reconciled)", state.aggregator.len());

        Ok(())
    }

    /// Open a subscription. The whole handshake, including the wait for the subscribe
    /// reply, is bounded by `feed_timeout`.
    async fn subscribe(
        &self,
        feed: &dyn EpochFeed,
    ) -> Result<Box<dyn EpochSubscription>, FeedError> {
        let timeout = self.settings.feed_timeout;
        tokio::time::timeout(timeout, feed.subscribe())
            .await
            .map_err(|_| FeedError::Timeout(timeout))?
    }

    /// Sequentially ingest epochs from the feed for the lifetime of the process.
    ///
    /// Transient failures (feed disruption, inactivity timeout, a failed fetch) discard
    /// the subscription, wait `retry_interval` and re-subscribe. Only returns on a fatal
    /// error.
    ///
    /// Epochs sealed while no subscription is held are not fetched here.
    ///
    /// # Arguments
    /// * `feed` - Subscription source
    /// * `subscription` - Already-established subscription to start from, if any
    pub async fn live_tail(
        &self,
        feed: Arc<dyn EpochFeed>,
        mut subscription: Option<Box<dyn EpochSubscription>>,
    ) -> Result<(), EngineError> {
        let retry = self.settings.retry_interval;

        loop {
            if subscription.is_none() {
                match self.subscribe(feed.as_ref()).await {
                    Ok(sub) => subscription = Some(sub),
                    Err(e) => {
                        log::warn!("⚠️  Epoch subscription failed: {} (retrying in {:?})", e, retry);
                        tokio::time::sleep(retry).await;
                        continue;
                    }
                }
            }

            let Some(sub) = subscription.as_mut() else {
                continue;
            };

            let result = match sub.next_epoch(self.settings.feed_timeout).await {
                Ok(epoch) => self
                    .process_epoch(epoch, EpochOrigin::Live)
                    .await
                    .map(|applied| log::debug!("Live epoch {} ({} new facts)", epoch, applied)),
                Err(e) => Err(EngineError::from(e)),
            };

            if let Err(e) = result {
                if e.class() == ErrorClass::Fatal {
                    log::error!("❌ Live tail stopped: {}", e);
                    return Err(e);
                }
                log::warn!("⚠️  Live feed disrupted: {} (re-subscribing in {:?})", e, retry);
                subscription = None;
                tokio::time::sleep(retry).await;
            }
        }
    }

    /// Full daemon lifecycle: recover, subscribe, backfill to the node's current epoch,
    /// then keep tailing.
    ///
    /// The subscription is established before the backfill range is read, so epochs sealed
    /// during the backfill are picked up by the live tail. Returns only on a fatal error
    /// (including any backfill failure).
    pub async fn run(&self, feed: Arc<dyn EpochFeed>) -> Result<(), EngineError> {
        let resume_from = self.recover()?;

        let subscription = match self.subscribe(feed.as_ref()).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                log::warn!("⚠️  Initial epoch subscription failed: {}", e);
                None
            }
        };

        let current_epoch = self.source.current_epoch().await?;
        log::info!("📡 Node at epoch {}", current_epoch);

        let live = {
            let engine = self.clone();
            tokio::spawn(async move { engine.live_tail(feed, subscription).await })
        };
        let progress = tokio::spawn(super::progress::progress_reporter_task(
            self.clone(),
            self.settings.progress_interval,
        ));

        if let Err(e) = self.backfill(resume_from, current_epoch).await {
            live.abort();
            progress.abort();
            return Err(e);
        }

        let result = match live.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::Worker(e)),
        };
        progress.abort();
        result
    }

    /// Counters for the progress reporter.
    pub fn progress_snapshot(&self) -> Result<ProgressSnapshot, EngineError> {
        let (miners, mode) = {
            let state = self.lock_state()?;
            (state.aggregator.len(), state.mode)
        };

        Ok(ProgressSnapshot {
            facts: self.ledger.fact_count()?,
            miners,
            mode,
            checkpoint: self.ledger.get_checkpoint()?,
        })
    }
}
