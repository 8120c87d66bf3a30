//! Chain-wide queries served by the most synced node

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{Result, WardenError};
use crate::manager::NodeManager;
use crate::node::{NodeConfig, OwnerId};
use crate::wallet::ReceivedByAddress;

/// Default number of transactions fetched per node when aggregating
pub const PER_NODE_TX_LIMIT: u32 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSummary {
    pub address: String,
    pub amount: f64,
    pub confirmations: u64,
    pub txids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAddress {
    pub address: String,
    pub priv_key: String,
}

/// Wallet transaction tagged with the node it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxEntry {
    pub node_id: String,
    pub chain: String,
    /// `<chain>-<nodeId>`
    pub label: String,
    pub txid: String,
    pub category: String,
    pub amount: f64,
    pub confirmations: Option<i64>,
    pub blockhash: Option<String>,
    pub blockheight: Option<u64>,
    pub time: Option<i64>,
    pub address: Option<String>,
}

impl TxEntry {
    fn from_rpc(node: &NodeConfig, tx: &Value) -> Self {
        let text = |key: &str| tx.get(key).and_then(Value::as_str).map(String::from);

        Self {
            node_id: node.id.clone(),
            chain: node.chain.clone(),
            label: format!("{}-{}", node.chain, node.id),
            txid: text("txid").unwrap_or_default(),
            category: text("category").unwrap_or_default(),
            amount: tx.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
            confirmations: tx.get("confirmations").and_then(Value::as_i64),
            blockhash: text("blockhash"),
            blockheight: None,
            time: tx.get("time").and_then(Value::as_i64),
            address: text("address"),
        }
    }

    fn matches(&self, term: &str) -> bool {
        let height = self.blockheight.map(|h| h.to_string());
        let amount = format_amount(self.amount);

        [
            Some(self.txid.as_str()),
            self.address.as_deref(),
            Some(self.category.as_str()),
            Some(amount.as_str()),
            height.as_deref(),
            Some(self.label.as_str()),
            Some(self.node_id.as_str()),
            Some(self.chain.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|field| !field.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .contains(term)
    }
}

/// Shortest decimal form, `10` rather than `10.0`
fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        amount.to_string()
    }
}

impl NodeManager {
    /// Node of `chain_id` reporting the highest block count, across all owners
    ///
    /// Unreachable nodes are skipped. If none answers, the first registered
    /// node is returned.
    pub async fn best_node_for_chain(&self, chain_id: &str) -> Result<NodeConfig> {
        let chain = self.registry().get(chain_id)?;
        let nodes: Vec<NodeConfig> = self
            .store()
            .list_all_nodes()
            .await?
            .into_iter()
            .map(|(_, node)| node)
            .filter(|node| node.chain == chain_id)
            .collect();

        let mut best: Option<(u64, &NodeConfig)> = None;
        for node in &nodes {
            match self
                .rpc()
                .call::<u64>(node, &chain.rpc().block_count, Vec::new())
                .await
            {
                Ok(height) => {
                    if best.map(|(h, _)| height > h).unwrap_or(true) {
                        best = Some((height, node));
                    }
                }
                Err(e) => debug!("Skipping {} for {}: {}", node.id, chain_id, e),
            }
        }

        best.map(|(_, node)| node.clone())
            .or_else(|| nodes.first().cloned())
            .ok_or_else(|| WardenError::NoNodesForChain(chain_id.to_string()))
    }

    pub async fn explorer_block_count(&self, chain_id: &str) -> Result<u64> {
        let chain = self.registry().get(chain_id)?;
        let node = self.best_node_for_chain(chain_id).await?;
        self.rpc()
            .call(&node, &chain.rpc().block_count, Vec::new())
            .await
    }

    pub async fn explorer_best_block_hash(&self, chain_id: &str) -> Result<String> {
        let node = self.best_node_for_chain(chain_id).await?;
        self.rpc().call(&node, "getbestblockhash", Vec::new()).await
    }

    pub async fn explorer_mempool(&self, chain_id: &str) -> Result<Vec<String>> {
        let node = self.best_node_for_chain(chain_id).await?;
        self.rpc().call(&node, "getrawmempool", Vec::new()).await
    }

    /// Verbose block by hash or height
    pub async fn explorer_block(&self, chain_id: &str, id: &str) -> Result<Value> {
        let node = self.best_node_for_chain(chain_id).await?;

        let hash = match id.trim().parse::<u64>() {
            Ok(height) => {
                self.rpc()
                    .call::<String>(&node, "getblockhash", vec![json!(height)])
                    .await?
            }
            Err(_) => id.to_string(),
        };

        self.rpc()
            .call(&node, "getblock", vec![json!(hash), json!(2)])
            .await
    }

    pub async fn explorer_tx(&self, chain_id: &str, txid: &str) -> Result<Value> {
        let node = self.best_node_for_chain(chain_id).await?;
        self.rpc()
            .call(&node, "getrawtransaction", vec![json!(txid), json!(true)])
            .await
    }

    /// Received totals of `address` as seen by the serving node's wallet
    pub async fn explorer_address(&self, chain_id: &str, address: &str) -> Result<AddressSummary> {
        let node = self.best_node_for_chain(chain_id).await?;
        let rows: Vec<ReceivedByAddress> = self
            .rpc()
            .call(
                &node,
                "listreceivedbyaddress",
                vec![json!(0), json!(true), json!(true)],
            )
            .await?;

        let row = rows.into_iter().find(|row| row.address == address);
        Ok(AddressSummary {
            address: address.to_string(),
            amount: row.as_ref().map(|r| r.amount).unwrap_or(0.0),
            confirmations: row.as_ref().map(|r| r.confirmations).unwrap_or(0),
            txids: row.map(|r| r.txids).unwrap_or_default(),
        })
    }

    /// Fresh address and its key from the best node of a chain
    pub async fn create_payment_address(&self, chain_id: &str) -> Result<PaymentAddress> {
        let node = self.best_node_for_chain(chain_id).await?;
        let address: String = self.rpc().call(&node, "getnewaddress", Vec::new()).await?;
        let priv_key: String = self
            .rpc()
            .call(&node, "dumpprivkey", vec![json!(address)])
            .await?;

        Ok(PaymentAddress { address, priv_key })
    }

    /// Transactions of all the owner's nodes, newest first
    ///
    /// Nodes that fail to answer are skipped. `search` filters
    /// case-insensitively over ids, addresses, amounts and labels.
    pub async fn list_all_transactions(
        &self,
        owner: OwnerId,
        search: &str,
        per_node_limit: u32,
    ) -> Result<Vec<TxEntry>> {
        let nodes = self.list_nodes(owner).await?;
        let term = search.trim().to_lowercase();
        let mut heights: HashMap<String, u64> = HashMap::new();
        let mut entries = Vec::new();

        for node in &nodes {
            let transactions: Vec<Value> = match self
                .rpc()
                .call(
                    node,
                    "listtransactions",
                    vec![json!("*"), json!(per_node_limit), json!(0)],
                )
                .await
            {
                Ok(txs) => txs,
                Err(e) => {
                    warn!("Skipping transactions of {}: {}", node.id, e);
                    continue;
                }
            };

            for tx in &transactions {
                let mut entry = TxEntry::from_rpc(node, tx);

                if let Some(hash) = &entry.blockhash {
                    entry.blockheight = match heights.get(hash) {
                        Some(height) => Some(*height),
                        None => {
                            let height = self.block_height(node, hash).await;
                            if let Some(h) = height {
                                heights.insert(hash.clone(), h);
                            }
                            height
                        }
                    };
                }

                if term.is_empty() || entry.matches(&term) {
                    entries.push(entry);
                }
            }
        }

        entries.sort_by(|a, b| b.time.unwrap_or(0).cmp(&a.time.unwrap_or(0)));
        Ok(entries)
    }

    async fn block_height(&self, node: &NodeConfig, hash: &str) -> Option<u64> {
        self.rpc()
            .call::<Value>(node, "getblockheader", vec![json!(hash)])
            .await
            .ok()?
            .get("height")
            .and_then(Value::as_u64)
    }
}
