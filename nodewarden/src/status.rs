//! Read-only node queries
//!
//! The raw calls propagate RPC failures. The report variants fold them into
//! an `online: false` result, since a stopped or syncing daemon is routine.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Result, WardenError};
use crate::manager::NodeManager;
use crate::node::OwnerId;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub online: bool,
    pub balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsReport {
    pub online: bool,
    pub transactions: Vec<Value>,
    pub count: u32,
    pub skip: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeersReport {
    pub online: bool,
    pub peers: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasternodeReport {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Split RPC failures from everything else
///
/// `Ok(Err(message))` means the daemon could not be queried.
fn rpc_outcome<T>(result: Result<T>) -> Result<std::result::Result<T, String>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.is_rpc() => Ok(Err(e.to_string())),
        Err(e) => Err(e),
    }
}

impl NodeManager {
    pub async fn get_block_count(&self, owner: OwnerId, id: &str) -> Result<u64> {
        let (node, chain) = self.node_and_chain(owner, id).await?;
        self.rpc()
            .call(&node, &chain.rpc().block_count, Vec::new())
            .await
    }

    pub async fn get_blockchain_info(&self, owner: OwnerId, id: &str) -> Result<Value> {
        self.call(owner, id, "getblockchaininfo", Vec::new()).await
    }

    pub async fn get_balance(&self, owner: OwnerId, id: &str) -> Result<f64> {
        self.call(owner, id, "getbalance", Vec::new()).await
    }

    pub async fn list_transactions(
        &self,
        owner: OwnerId,
        id: &str,
        count: u32,
        skip: u32,
    ) -> Result<Vec<Value>> {
        self.call(owner, id, "listtransactions", vec![json!("*"), json!(count), json!(skip)])
            .await
    }

    pub async fn get_peer_info(&self, owner: OwnerId, id: &str) -> Result<Vec<Value>> {
        self.call(owner, id, "getpeerinfo", Vec::new()).await
    }

    pub async fn get_masternode_status(&self, owner: OwnerId, id: &str) -> Result<Value> {
        let (node, chain) = self.node_and_chain(owner, id).await?;
        let method = chain
            .rpc()
            .masternode_status
            .clone()
            .unwrap_or_else(|| "getmasternodestatus".to_string());

        self.rpc().call(&node, &method, Vec::new()).await
    }

    /// Block count plus sync details, or an offline marker
    pub async fn status(&self, owner: OwnerId, id: &str) -> Result<NodeStatus> {
        let block_count = match rpc_outcome(self.get_block_count(owner, id).await)? {
            Ok(count) => count,
            Err(error) => return Ok(offline(error)),
        };

        let info = match rpc_outcome(self.get_blockchain_info(owner, id).await)? {
            Ok(info) => info,
            Err(error) => return Ok(offline(error)),
        };

        Ok(NodeStatus {
            online: true,
            block_count: Some(block_count),
            verification_progress: info.get("verificationprogress").and_then(Value::as_f64),
            headers: info.get("headers").and_then(Value::as_u64),
            blocks: info.get("blocks").and_then(Value::as_u64),
            chain: info.get("chain").and_then(Value::as_str).map(String::from),
            error: None,
        })
    }

    pub async fn balance(&self, owner: OwnerId, id: &str) -> Result<BalanceReport> {
        Ok(match rpc_outcome(self.get_balance(owner, id).await)? {
            Ok(balance) => BalanceReport {
                online: true,
                balance,
                error: None,
            },
            Err(error) => BalanceReport {
                online: false,
                balance: 0.0,
                error: Some(error),
            },
        })
    }

    pub async fn transactions(
        &self,
        owner: OwnerId,
        id: &str,
        count: u32,
        skip: u32,
    ) -> Result<TransactionsReport> {
        let (transactions, online, error) =
            match rpc_outcome(self.list_transactions(owner, id, count, skip).await)? {
                Ok(transactions) => (transactions, true, None),
                Err(error) => (Vec::new(), false, Some(error)),
            };

        Ok(TransactionsReport {
            online,
            transactions,
            count,
            skip,
            error,
        })
    }

    pub async fn peers(&self, owner: OwnerId, id: &str) -> Result<PeersReport> {
        Ok(match rpc_outcome(self.get_peer_info(owner, id).await)? {
            Ok(peers) => PeersReport {
                online: true,
                peers,
                error: None,
            },
            Err(error) => PeersReport {
                online: false,
                peers: Vec::new(),
                error: Some(error),
            },
        })
    }

    pub async fn masternode(&self, owner: OwnerId, id: &str) -> Result<MasternodeReport> {
        Ok(match rpc_outcome(self.get_masternode_status(owner, id).await)? {
            Ok(status) => MasternodeReport {
                online: true,
                status: Some(status),
                error: None,
            },
            Err(error) => MasternodeReport {
                online: false,
                status: None,
                error: Some(error),
            },
        })
    }
}

fn offline(error: String) -> NodeStatus {
    NodeStatus {
        online: false,
        error: Some(error),
        ..Default::default()
    }
}
