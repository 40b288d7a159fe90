//! Node wire formats and hex decoding
//!
//! The node transmits integers (epochs, rewards, timestamps) as `0x`-prefixed hex
//! strings. Everything is decoded here, before it reaches the engine.

use crate::pipeline::types::Reward;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Invalid hex integer for {field}: {value:?}")]
    InvalidHex { field: &'static str, value: String },

    #[error("Invalid block hash: {0:?}")]
    InvalidHash(String),
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

pub fn parse_hex_u128(field: &'static str, value: &str) -> Result<u128, WireError> {
    let digits = strip_hex_prefix(value);
    if digits.is_empty() {
        return Err(WireError::InvalidHex {
            field,
            value: value.to_string(),
        });
    }
    u128::from_str_radix(digits, 16).map_err(|_| WireError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

pub fn parse_hex_u64(field: &'static str, value: &str) -> Result<u64, WireError> {
    let parsed = parse_hex_u128(field, value)?;
    u64::try_from(parsed).map_err(|_| WireError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

pub fn parse_hex_i64(field: &'static str, value: &str) -> Result<i64, WireError> {
    let parsed = parse_hex_u128(field, value)?;
    i64::try_from(parsed).map_err(|_| WireError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

/// Epoch number as the node expects it in params (`0x..`).
pub fn epoch_param(epoch: u64) -> String {
    format!("{:#x}", epoch)
}

/// Block hashes must be 32 bytes of hex.
pub fn validate_block_hash(hash: &str) -> Result<(), WireError> {
    match hex::decode(strip_hex_prefix(hash)) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => Err(WireError::InvalidHash(hash.to_string())),
    }
}

/// One decoded entry of `cfx_getBlockRewardInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRecord {
    pub block_hash: String,
    pub miner: String,
    pub reward: Reward,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRewardInfo {
    pub block_hash: String,
    pub author: String,
    pub total_reward: String,
}

impl RawRewardInfo {
    pub fn decode(self) -> Result<RewardRecord, WireError> {
        validate_block_hash(&self.block_hash)?;
        let units = parse_hex_u128("totalReward", &self.total_reward)?;
        Ok(RewardRecord {
            block_hash: self.block_hash,
            miner: self.author,
            reward: Reward::from_units(units),
        })
    }
}

/// The only field read from `cfx_getBlockByHash`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlockHeader {
    pub timestamp: String,
}

impl RawBlockHeader {
    pub fn timestamp(&self) -> Result<i64, WireError> {
        parse_hex_i64("timestamp", &self.timestamp)
    }
}

/// Payload of an `epochs` pub/sub notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEpochNotification {
    pub epoch_number: String,
}

impl RawEpochNotification {
    pub fn epoch(&self) -> Result<u64, WireError> {
        parse_hex_u64("epochNumber", &self.epoch_number)
    }
}
