//! Wallet, masternode and cold staking operations
//!
//! These mutate daemon state, so RPC failures are returned to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::manager::NodeManager;
use crate::node::{NodeConfig, OwnerId};

/// One wallet address with its private key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedKey {
    pub address: String,
    pub balance: f64,
    pub priv_key: String,
    pub has_balance: bool,
}

/// Row of `listreceivedbyaddress`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReceivedByAddress {
    pub address: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub txids: Vec<String>,
}

impl NodeManager {
    /// Returns the txid
    pub async fn send_to_address(
        &self,
        owner: OwnerId,
        id: &str,
        address: &str,
        amount: f64,
    ) -> Result<String> {
        let txid: String = self
            .call(owner, id, "sendtoaddress", vec![json!(address), json!(amount)])
            .await?;
        info!("Node {} sent {} to {} ({})", id, amount, address, txid);
        Ok(txid)
    }

    pub async fn get_new_address(&self, owner: OwnerId, id: &str) -> Result<String> {
        self.call(owner, id, "getnewaddress", Vec::new()).await
    }

    pub async fn import_priv_key(
        &self,
        owner: OwnerId,
        id: &str,
        priv_key: &str,
        label: &str,
        rescan: bool,
    ) -> Result<()> {
        let _: Value = self
            .call(owner, id, "importprivkey", vec![json!(priv_key), json!(label), json!(rescan)])
            .await?;
        Ok(())
    }

    pub async fn dump_priv_key(&self, owner: OwnerId, id: &str, address: &str) -> Result<String> {
        self.call(owner, id, "dumpprivkey", vec![json!(address)]).await
    }

    /// Private keys of every receiving address, optionally only funded ones
    pub async fn export_all_keys(
        &self,
        owner: OwnerId,
        id: &str,
        include_zero: bool,
    ) -> Result<Vec<ExportedKey>> {
        let node = self.get_node(owner, id).await?;
        let rows: Vec<ReceivedByAddress> = self
            .rpc()
            .call(&node, "listreceivedbyaddress", vec![json!(0), json!(true)])
            .await?;

        let mut keys = Vec::new();
        for row in rows {
            if !include_zero && row.amount <= 0.0 {
                continue;
            }

            let priv_key: String = self
                .rpc()
                .call(&node, "dumpprivkey", vec![json!(row.address)])
                .await?;

            keys.push(ExportedKey {
                has_balance: row.amount > 0.0,
                balance: row.amount,
                address: row.address,
                priv_key,
            });
        }

        Ok(keys)
    }

    pub async fn start_masternode(&self, owner: OwnerId, id: &str) -> Result<Value> {
        info!("Starting masternode on {}", id);
        self.call(owner, id, "startmasternode", vec![json!("local"), json!(false)])
            .await
    }

    pub async fn get_cold_staking_balance(&self, owner: OwnerId, id: &str) -> Result<Value> {
        self.call(owner, id, "getcoldstakingbalance", Vec::new()).await
    }

    pub async fn get_new_staking_address(&self, owner: OwnerId, id: &str) -> Result<String> {
        self.call(owner, id, "getnewstakingaddress", Vec::new()).await
    }

    pub async fn get_staking_status(&self, owner: OwnerId, id: &str) -> Result<Value> {
        self.call(owner, id, "getstakingstatus", Vec::new()).await
    }

    pub async fn list_cold_utxos(&self, owner: OwnerId, id: &str) -> Result<Vec<Value>> {
        self.call(owner, id, "listcoldutxos", Vec::new()).await
    }

    /// Whitelist the owners of all cold utxos not yet whitelisted
    ///
    /// Returns how many delegators were added.
    pub async fn whitelist_cold_staking_delegators(&self, owner: OwnerId, id: &str) -> Result<usize> {
        let node = self.get_node(owner, id).await?;
        self.whitelist_delegators_for(&node).await
    }

    async fn whitelist_delegators_for(&self, node: &NodeConfig) -> Result<usize> {
        let utxos: Vec<Value> = self.rpc().call(node, "listcoldutxos", Vec::new()).await?;

        let mut added = 0;
        for delegator in pending_delegators(&utxos) {
            let _: Value = self
                .rpc()
                .call(node, "delegatoradd", vec![json!(delegator)])
                .await?;
            added += 1;
        }

        if added > 0 {
            info!("Whitelisted {} delegators on {}", added, node.id);
        }
        Ok(added)
    }
}

/// Coin owners of utxos whose `whitelisted` flag is neither `true` nor `"true"`
fn pending_delegators(utxos: &[Value]) -> Vec<String> {
    utxos
        .iter()
        .filter(|utxo| {
            let flag = utxo.get("whitelisted");
            !(flag == Some(&Value::Bool(true)) || flag.and_then(Value::as_str) == Some("true"))
        })
        .filter_map(|utxo| utxo.get("coin-owner").and_then(Value::as_str))
        .filter(|owner| !owner.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_delegators() {
        let utxos = vec![
            json!({"coin-owner": "Downer1", "whitelisted": false}),
            json!({"coin-owner": "Downer2", "whitelisted": true}),
            json!({"coin-owner": "Downer3", "whitelisted": "true"}),
            json!({"coin-owner": "Downer4", "whitelisted": "false"}),
            json!({"coin-owner": "Downer5"}),
            json!({"whitelisted": false}),
        ];

        assert_eq!(pending_delegators(&utxos), vec!["Downer1", "Downer4", "Downer5"]);
    }

    #[test]
    fn test_received_row_defaults() {
        let row: ReceivedByAddress = serde_json::from_value(json!({"address": "D1"})).unwrap();
        assert_eq!(row.amount, 0.0);
        assert!(row.txids.is_empty());
    }
}
