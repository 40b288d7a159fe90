//! Cumulative timestamp histogram for a miner's block history.

use serde::{Deserialize, Serialize};

/// Fixed bucket count of the distribution
pub const BUCKET_COUNT: usize = 2_000;

/// `cumulative_count[i]` = number of timestamps `t < min + (i + 1) * bucket_width`.
///
/// A timestamp exactly on a bucket boundary belongs to the next bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampDistribution {
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    #[serde(rename = "accumulative_count")]
    pub cumulative_count: Vec<u64>,
}

/// Build the distribution over an ascending timestamp sequence.
///
/// Returns `None` for an empty sequence. A zero span puts every timestamp in bucket 0.
/// Indices that round up to `BUCKET_COUNT` fold into the last bucket.
pub fn timestamp_distribution(sorted: &[i64]) -> Option<TimestampDistribution> {
    let (min, max) = match (sorted.first(), sorted.last()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return None,
    };

    let mut counts = vec![0u64; BUCKET_COUNT];
    let span = (max - min) as f64;

    if span == 0.0 {
        counts[0] = sorted.len() as u64;
    } else {
        let bucket_width = span / BUCKET_COUNT as f64;
        for ts in sorted {
            let idx = ((*ts - min) as f64 / bucket_width).floor() as usize;
            counts[idx.min(BUCKET_COUNT - 1)] += 1;
        }
    }

    for i in 1..BUCKET_COUNT {
        counts[i] += counts[i - 1];
    }

    Some(TimestampDistribution {
        min_timestamp: min,
        max_timestamp: max,
        cumulative_count: counts,
    })
}
