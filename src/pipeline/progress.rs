//! Periodic progress reporter

use super::engine::{EngineMode, IngestionEngine};
use tokio::time::{interval, Duration};

/// Point-in-time counters logged by the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub facts: u64,
    pub miners: usize,
    pub mode: EngineMode,
    pub checkpoint: Option<u64>,
}

/// Log ledger and aggregate counters every `every`.
///
/// Runs until the task is aborted.
pub async fn progress_reporter_task(engine: IngestionEngine, every: Duration) {
    let mut timer = interval(every);
    // First tick completes immediately
    timer.tick().await;

    loop {
        timer.tick().await;

        match engine.progress_snapshot() {
            Ok(snapshot) => {
                log::info!("📊 Progress ({:?})", snapshot.mode);
                log::info!("   ├─ Facts: {}", snapshot.facts);
                log::info!("   ├─ Miners: {}", snapshot.miners);
                match snapshot.checkpoint {
                    Some(epoch) => log::info!("   └─ Checkpoint: epoch {}", epoch),
                    None => log::info!("   └─ Checkpoint: none"),
                }
            }
            Err(e) => {
                log::warn!("⚠️  Progress snapshot failed: {}", e);
            }
        }
    }
}
