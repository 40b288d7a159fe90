//! JSON-RPC over HTTP client for the ledger node
//!
//! One explicitly declared method per remote call:
//! - `cfx_epochNumber` → current epoch
//! - `cfx_getBlockRewardInfo(epoch)` → reward records
//! - `cfx_getBlockByHash(hash, false)` → block timestamp

use super::protocol::{RpcRequest, RpcResponse};
use super::wire::{epoch_param, parse_hex_u64, RawBlockHeader, RawRewardInfo};
use super::{ChainSource, RewardRecord, SourceError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct HttpChainClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpChainClient {
    /// `timeout` bounds each individual request.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, Some(params), id);

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(SourceError::Rpc {
                method,
                code: err.code,
                message: err.message,
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).map_err(|source| SourceError::Json { method, source })
    }
}

#[async_trait]
impl ChainSource for HttpChainClient {
    async fn current_epoch(&self) -> Result<u64, SourceError> {
        let raw: String = self.call("cfx_epochNumber", json!([])).await?;
        Ok(parse_hex_u64("epochNumber", &raw)?)
    }

    async fn block_rewards(&self, epoch: u64) -> Result<Vec<RewardRecord>, SourceError> {
        let raw: Option<Vec<RawRewardInfo>> = self
            .call("cfx_getBlockRewardInfo", json!([epoch_param(epoch)]))
            .await?;

        raw.unwrap_or_default()
            .into_iter()
            .map(|info| info.decode().map_err(SourceError::from))
            .collect()
    }

    async fn block_timestamp(&self, block_hash: &str) -> Result<i64, SourceError> {
        let raw: Option<RawBlockHeader> = self
            .call("cfx_getBlockByHash", json!([block_hash, false]))
            .await?;

        let header = raw.ok_or_else(|| SourceError::BlockNotFound(block_hash.to_string()))?;
        Ok(header.timestamp()?)
    }
}
