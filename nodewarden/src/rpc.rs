//! JSON-RPC client for local daemons

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, WardenError};
use crate::node::NodeConfig;

const CLIENT_ID: &str = "nodewarden";

/// Per-request limit when none is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// Authenticated JSON-RPC over HTTP to `<host>:<rpcPort>`
///
/// Calls are single attempts; polling and retries are up to the caller.
#[derive(Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    host: String,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client whose requests fail with `RpcTransport` after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = match reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build RPC client, requests will not time out: {}", e);
                reqwest::Client::new()
            }
        };

        Self {
            client,
            host: "127.0.0.1".to_string(),
        }
    }

    /// Call `method` and deserialize its result
    pub async fn call<T: DeserializeOwned>(
        &self,
        node: &NodeConfig,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        let result = self.call_value(node, method, params).await?;
        serde_json::from_value(result).map_err(|e| {
            WardenError::RpcProtocol(format!("unexpected result for {}: {}", method, e))
        })
    }

    /// Call `method` returning the raw result
    pub async fn call_value(&self, node: &NodeConfig, method: &str, params: Vec<Value>) -> Result<Value> {
        let url = format!("http://{}:{}/", self.host, node.rpc_port);
        let body = json!({
            "jsonrpc": "1.0",
            "id": CLIENT_ID,
            "method": method,
            "params": params,
        });

        debug!("RPC {} -> {}:{}", method, node.id, node.rpc_port);

        let response = self
            .client
            .post(&url)
            .basic_auth(&node.rpc_user, Some(&node.rpc_password))
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::RpcTransport(format!("{}: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| WardenError::RpcTransport(e.to_string()))?;

        let parsed = serde_json::from_str::<RpcResponse>(&text);

        // Bitcoin-style daemons report RPC errors with HTTP 500 and a JSON body
        if let Ok(resp) = &parsed {
            if !resp.error.is_null() {
                return Err(WardenError::RpcProtocol(error_message(&resp.error)));
            }
        }

        if !status.is_success() {
            return Err(WardenError::RpcTransport(format!("HTTP {} from {}", status, url)));
        }

        parsed
            .map(|resp| resp.result)
            .map_err(|e| WardenError::RpcProtocol(format!("malformed response: {}", e)))
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string())
}
