//! JSON-RPC 2.0 over WebSocket query adapter
//!
//! Republishes `QueryFacade` results; holds no state of its own.
//!
//! Methods:
//! - `miner_list` → array of miner summaries
//! - `miner_block_timestamps [address]` → `{min_timestamp, max_timestamp,
//!   accumulative_count}`, or `[]` for an unknown address

use crate::chain::protocol::{
    RpcRequest, RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::pipeline::QueryFacade;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Dispatch one request to the facade.
///
/// # Returns
/// The `result` value, or `(code, message)` for the error object.
pub fn handle(facade: &QueryFacade, method: &str, params: Option<Value>) -> Result<Value, (i32, String)> {
    match method {
        "miner_list" => serde_json::to_value(facade.list_miners())
            .map_err(|e| (INTERNAL_ERROR, e.to_string())),

        "miner_block_timestamps" => {
            let address = params
                .as_ref()
                .and_then(|p| p.get(0))
                .and_then(Value::as_str)
                .ok_or_else(|| (INVALID_PARAMS, "expected [address]".to_string()))?;

            match facade.miner_timestamp_distribution(address) {
                Some(distribution) => serde_json::to_value(distribution)
                    .map_err(|e| (INTERNAL_ERROR, e.to_string())),
                None => Ok(json!([])),
            }
        }

        other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
    }
}

/// Serve the facade on `0.0.0.0:port` until the task is dropped.
pub async fn serve(port: u16, facade: QueryFacade) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("🌐 Query server listening on ws://0.0.0.0:{}", port);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let facade = facade.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, facade).await;
                });
            }
            Err(e) => {
                log::error!("❌ Failed to accept query connection: {}", e);
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, facade: QueryFacade) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::debug!("WebSocket handshake failed from {}: {}", peer, e);
            return;
        }
    };
    log::debug!("Query client connected: {}", peer);

    let (mut sink, mut stream) = ws.split();

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                log::debug!("WebSocket read error from {}: {}", peer, e);
                break;
            }
        };

        let reply = match msg {
            Message::Text(text) => {
                let response = respond(&facade, &text);
                match serde_json::to_string(&response) {
                    Ok(json) => Message::Text(json),
                    Err(e) => {
                        log::warn!("⚠️  Failed to encode response for {}: {}", peer, e);
                        continue;
                    }
                }
            }
            Message::Ping(data) => Message::Pong(data),
            Message::Close(_) => break,
            _ => continue,
        };

        if sink.send(reply).await.is_err() {
            break;
        }
    }

    log::debug!("Query client disconnected: {}", peer);
}

fn respond(facade: &QueryFacade, text: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(text) {
        Ok(req) => match handle(facade, &req.method, req.params) {
            Ok(result) => RpcResponse::success(req.id, result),
            Err((code, message)) => RpcResponse::error(req.id, code, message),
        },
        Err(e) => RpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)),
    }
}
