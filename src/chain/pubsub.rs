//! Epoch subscription over the node's WebSocket pub/sub endpoint
//!
//! The feed yields newly sealed epoch numbers. It may go silent without closing, so
//! every read is bounded by an inactivity timeout; the engine treats a timeout like any
//! other feed failure and re-subscribes.

use super::protocol::{RpcNotification, RpcRequest, RpcResponse};
use super::wire::RawEpochNotification;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Topic carrying newly sealed epochs
pub const EPOCHS_TOPIC: &str = "epochs";

const SUBSCRIBE_ID: u64 = 1;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Subscribe rejected: {0}")]
    Subscribe(String),

    #[error("No epoch received for {0:?}")]
    Timeout(Duration),

    #[error("Feed connection closed")]
    Closed,

    #[error("Malformed feed message: {0}")]
    Decode(String),
}

/// Source of epoch subscriptions.
#[async_trait]
pub trait EpochFeed: Send + Sync {
    async fn subscribe(&self) -> Result<Box<dyn EpochSubscription>, FeedError>;
}

/// A live subscription. Dropping it discards the underlying connection.
#[async_trait]
pub trait EpochSubscription: Send {
    /// Next sealed epoch number, or `FeedError::Timeout` after `timeout` of silence.
    async fn next_epoch(&mut self, timeout: Duration) -> Result<u64, FeedError>;
}

/// `EpochFeed` backed by `cfx_subscribe("epochs")` over WebSocket.
#[derive(Debug, Clone)]
pub struct WsEpochFeed {
    url: String,
}

impl WsEpochFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl EpochFeed for WsEpochFeed {
    async fn subscribe(&self) -> Result<Box<dyn EpochSubscription>, FeedError> {
        let (mut ws, _) = connect_async(self.url.as_str()).await?;

        let request = RpcRequest::new("cfx_subscribe", Some(json!([EPOCHS_TOPIC])), SUBSCRIBE_ID);
        let payload =
            serde_json::to_string(&request).map_err(|e| FeedError::Decode(e.to_string()))?;
        ws.send(Message::Text(payload)).await?;

        let subscription_id = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let response = match serde_json::from_str::<RpcResponse>(&text) {
                        Ok(r) if r.id == json!(SUBSCRIBE_ID) => r,
                        _ => continue,
                    };
                    if let Some(err) = response.error {
                        return Err(FeedError::Subscribe(err.message));
                    }
                    match response.result {
                        Some(serde_json::Value::String(id)) => break id,
                        other => {
                            return Err(FeedError::Subscribe(format!(
                                "unexpected subscribe result: {:?}",
                                other
                            )))
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => ws.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        };

        log::info!("📡 Subscribed to '{}' (id: {})", EPOCHS_TOPIC, subscription_id);

        Ok(Box::new(WsSubscription {
            ws,
            subscription_id,
        }))
    }
}

struct WsSubscription {
    ws: WsStream,
    subscription_id: String,
}

impl WsSubscription {
    async fn read_epoch(&mut self) -> Result<u64, FeedError> {
        loop {
            let text = match self.ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(data))) => {
                    self.ws.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            let notification: RpcNotification = match serde_json::from_str(&text) {
                Ok(n) => n,
                Err(_) => {
                    log::debug!("Ignoring non-notification feed message: {}", text);
                    continue;
                }
            };

            if notification.params.subscription != self.subscription_id {
                continue;
            }

            let payload: RawEpochNotification =
                serde_json::from_value(notification.params.result)
                    .map_err(|e| FeedError::Decode(e.to_string()))?;
            return payload.epoch().map_err(|e| FeedError::Decode(e.to_string()));
        }
    }
}

#[async_trait]
impl EpochSubscription for WsSubscription {
    async fn next_epoch(&mut self, timeout: Duration) -> Result<u64, FeedError> {
        tokio::time::timeout(timeout, self.read_epoch())
            .await
            .map_err(|_| FeedError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_to_unreachable_node_fails() {
        // Port 9 (discard) is closed on test machines
        let feed = WsEpochFeed::new("ws://127.0.0.1:9");
        let result = feed.subscribe().await;
        assert!(matches!(result, Err(FeedError::Transport(_))));
    }

    #[test]
    fn test_timeout_error_message() {
        let err = FeedError::Timeout(Duration::from_secs(3600));
        assert_eq!(err.to_string(), "No epoch received for 3600s");
    }
}
