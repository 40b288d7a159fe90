//! Ledger-node collaborators: the request/response `ChainSource` and the `EpochFeed`
//! subscription.
//!
//! Both are traits so the engine can be driven by in-process fakes in tests. The
//! production implementations are `HttpChainClient` (JSON-RPC over HTTP, reqwest) and
//! `WsEpochFeed` (JSON-RPC pub/sub over WebSocket, tokio-tungstenite).

pub mod http_client;
pub mod protocol;
pub mod pubsub;
pub mod wire;

pub use http_client::HttpChainClient;
pub use pubsub::{EpochFeed, EpochSubscription, FeedError, WsEpochFeed};
pub use wire::RewardRecord;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code} from {method}: {message}")]
    Rpc {
        method: &'static str,
        code: i32,
        message: String,
    },

    #[error("Malformed {method} result: {source}")]
    Json {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Decode error: {0}")]
    Decode(#[from] wire::WireError),

    #[error("Block not found: {0}")]
    BlockNotFound(String),
}

/// Request/response view of the ledger node.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Latest epoch number known to the node.
    async fn current_epoch(&self) -> Result<u64, SourceError>;

    /// Reward records of every block in `epoch`.
    ///
    /// Empty while the epoch is not yet executed; that is not an error.
    async fn block_rewards(&self, epoch: u64) -> Result<Vec<RewardRecord>, SourceError>;

    /// Chain timestamp (seconds) of the block with `block_hash`.
    async fn block_timestamp(&self, block_hash: &str) -> Result<i64, SourceError>;
}
