//! Integration tests for the bounded-parallel backfill
//!
//! Key behaviors tested:
//! - Facts land in the ledger once and the aggregate is reconciled at the end
//! - Not-yet-executed epochs are retried until rewards appear
//! - Out-of-order epoch completion does not affect the final aggregate
//! - A failing epoch aborts the whole run without advancing the checkpoint
//! - Re-entered backfill after activation reconciles again

mod common;

#[cfg(test)]
mod backfill_tests {
    use super::common::*;
    use minerflow::ledger::Ledger;
    use minerflow::pipeline::types::TrackingWindow;
    use minerflow::pipeline::{EngineError, EngineMode, EngineSettings, MinerSummary};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_two_fact_scenario() {
        // Test: two facts for one miner in epoch 100 → reward 3.0, 2 blocks, 1 hour
        let chain = MockChain::new();
        chain.add_block(100, &block_hash(100, 0), &miner(0xa), 1, 1_000);
        chain.add_block(100, &block_hash(100, 1), &miner(0xa), 2, 5_000);
        let (engine, ledger) = in_memory_engine(chain.clone(), test_settings());

        engine.backfill(100, 100).await.unwrap();

        let miners = engine.query().list_miners();
        assert_eq!(
            miners,
            vec![MinerSummary {
                address: miner(0xa).trim_start_matches("0x").to_string(),
                block_count: 2,
                active_period_hours: 1,
                mining_reward: 3.0,
                latest_mined_block: 5_000,
            }]
        );
        assert_eq!(ledger.get_checkpoint().unwrap(), Some(100));
        assert_eq!(engine.mode().unwrap(), EngineMode::Live);
    }

    #[tokio::test]
    async fn test_retries_until_rewards_appear() {
        // Test: epoch 1 is empty for 3 polls; backfill must not complete before that
        let chain = MockChain::new();
        chain.add_block(1, &block_hash(1, 0), &miner(1), 2, 1_000);
        chain.not_executed(1, 3);

        let settings = EngineSettings {
            retry_interval: Duration::from_millis(40),
            ..test_settings()
        };
        let (engine, ledger) = in_memory_engine(chain.clone(), settings);

        let started = Instant::now();
        let handle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.backfill(1, 1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(ledger.get_checkpoint().unwrap(), None);
        assert_eq!(engine.mode().unwrap(), EngineMode::Backfilling);
        assert!(engine.query().list_miners().is_empty());

        handle.await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(120));
        assert_eq!(chain.reward_calls(), 4);
        assert_eq!(ledger.get_checkpoint().unwrap(), Some(1));
        assert_eq!(engine.query().list_miners()[0].mining_reward, 2.0);
    }

    #[tokio::test]
    async fn test_out_of_order_completion_is_reconciled() {
        // Test: the earliest epoch finishes last; continuity still matches the recompute
        let chain = MockChain::new();
        for i in 0..6u64 {
            let epoch = i + 1;
            chain.add_block(epoch, &block_hash(epoch, 0), &miner(7), 1, 1_000 + i as i64 * 3_000);
        }
        chain.delay_epoch(1, Duration::from_millis(80));
        chain.delay_epoch(2, Duration::from_millis(40));

        let (engine, _ledger) = in_memory_engine(chain.clone(), test_settings());
        engine.backfill(1, 6).await.unwrap();

        let miners = engine.query().list_miners();
        assert_eq!(miners.len(), 1);
        assert_eq!(miners[0].block_count, 6);
        // 5 gaps of 3000s = 15000s
        assert_eq!(miners[0].active_period_hours, 4);
        assert_eq!(miners[0].mining_reward, 6.0);
        assert_eq!(miners[0].latest_mined_block, 16_000);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_backfill() {
        // Test: an RPC error in one epoch fails the run and leaves the checkpoint alone
        let chain = MockChain::new();
        for epoch in 1..=6 {
            chain.add_block(epoch, &block_hash(epoch, 0), &miner(1), 1, 1_000 * epoch as i64);
        }
        chain.fail_epoch(3, 1);

        let (engine, ledger) = in_memory_engine(chain.clone(), test_settings());
        let result = engine.backfill(1, 6).await;

        assert!(matches!(result, Err(EngineError::Source(_))));
        assert_eq!(ledger.get_checkpoint().unwrap(), None);
        assert_eq!(engine.mode().unwrap(), EngineMode::Backfilling);
        assert!(ledger.fact_count().unwrap() < 6);
    }

    #[tokio::test]
    async fn test_second_run_skips_known_hashes() {
        // Test: dedup gates the timestamp fetch; nothing is counted twice
        let chain = MockChain::new();
        chain.add_block(1, &block_hash(1, 0), &miner(1), 1, 1_000);
        chain.add_block(2, &block_hash(2, 0), &miner(1), 1, 2_000);
        chain.add_block(2, &block_hash(2, 1), &miner(2), 4, 2_000);

        let (engine, ledger) = in_memory_engine(chain.clone(), test_settings());
        engine.backfill(1, 2).await.unwrap();
        let first = engine.query().list_miners();
        assert_eq!(chain.timestamp_calls(), 3);

        engine.backfill(1, 2).await.unwrap();
        assert_eq!(chain.timestamp_calls(), 3);
        assert_eq!(ledger.fact_count().unwrap(), 3);
        assert_eq!(engine.query().list_miners(), first);
    }

    #[tokio::test]
    async fn test_duplicate_hash_within_epoch_counted_once() {
        // Test: a reward record repeated in one response is a single fact
        let chain = MockChain::new();
        chain.add_block(1, &block_hash(1, 0), &miner(1), 5, 1_000);
        chain.add_block(1, &block_hash(1, 0), &miner(1), 5, 1_000);

        let (engine, ledger) = in_memory_engine(chain.clone(), test_settings());
        engine.backfill(1, 1).await.unwrap();

        assert_eq!(ledger.fact_count().unwrap(), 1);
        assert_eq!(engine.query().list_miners()[0].mining_reward, 5.0);
    }

    #[tokio::test]
    async fn test_reentered_backfill_reconciles_again() {
        // Test: a manual re-backfill after going live leaves every miner reconciled
        let chain = MockChain::new();
        chain.add_block(1, &block_hash(1, 0), &miner(1), 1, 10_000);
        chain.add_block(2, &block_hash(2, 0), &miner(1), 1, 13_600);

        let (engine, ledger) = in_memory_engine(chain.clone(), test_settings());
        engine.backfill(1, 2).await.unwrap();
        assert_eq!(engine.query().list_miners()[0].active_period_hours, 1);

        // Missed range: an older block for miner 1 and a new miner 2
        chain.add_block(3, &block_hash(3, 0), &miner(1), 1, 6_400);
        chain.add_block(4, &block_hash(4, 0), &miner(2), 1, 20_000);
        chain.add_block(4, &block_hash(4, 1), &miner(2), 1, 27_200);
        chain.delay_epoch(4, Duration::from_millis(30));

        engine.backfill(3, 4).await.unwrap();

        assert_eq!(engine.mode().unwrap(), EngineMode::Live);
        assert_eq!(ledger.get_checkpoint().unwrap(), Some(4));

        let miners = engine.query().list_miners();
        assert_eq!(miners.len(), 2);
        // 6400 → 10000 → 13600: 7200s
        assert_eq!(miners[0].active_period_hours, 2);
        assert_eq!(miners[1].active_period_hours, 2);
    }

    #[tokio::test]
    async fn test_tracking_window_limits_rewards_not_distribution() {
        // Test: out-of-window facts reach the distribution but not the totals
        let chain = MockChain::new();
        chain.add_block(1, &block_hash(1, 0), &miner(3), 1, 500);
        chain.add_block(2, &block_hash(2, 0), &miner(3), 2, 1_500);
        chain.add_block(3, &block_hash(3, 0), &miner(3), 4, 2_500);

        let settings = EngineSettings {
            window: TrackingWindow::new(0, 1_000, 2_000),
            ..test_settings()
        };
        let (engine, _ledger) = in_memory_engine(chain.clone(), settings);
        engine.backfill(1, 3).await.unwrap();

        let miners = engine.query().list_miners();
        assert_eq!(miners[0].block_count, 1);
        assert_eq!(miners[0].mining_reward, 2.0);

        let distribution = engine.query().miner_timestamp_distribution(&miner(3)).unwrap();
        assert_eq!(distribution.min_timestamp, 500);
        assert_eq!(distribution.max_timestamp, 2_500);
        assert_eq!(distribution.cumulative_count.len(), 2_000);
        assert_eq!(distribution.cumulative_count.last(), Some(&3));
    }
}
