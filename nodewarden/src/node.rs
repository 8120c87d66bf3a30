//! Node records and their public views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Owning user id
pub type OwnerId = u64;

/// Persisted state of one provisioned daemon
///
/// This is the full record including credentials. Use [`NodeConfig::summary`]
/// for anything leaving the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub id: String,
    pub chain: String,
    pub datadir: PathBuf,
    pub p2p_port: u16,
    pub rpc_port: u16,
    pub rpc_user: String,
    pub rpc_password: String,
    pub masternode_key: String,
    pub external_ip: String,
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub core_version: Option<String>,
    /// Lazily resolved daemon binary, cleared on core version change
    #[serde(default)]
    pub daemon_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl NodeConfig {
    /// Path of the daemon config file inside the data directory
    pub fn conf_path(&self) -> PathBuf {
        conf_path(&self.datadir, &self.chain)
    }

    /// Externally serializable view without credentials
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            chain: self.chain.clone(),
            datadir: self.datadir.clone(),
            p2p_port: self.p2p_port,
            rpc_port: self.rpc_port,
            external_ip: self.external_ip.clone(),
            snapshot_url: self.snapshot_url.clone(),
            core_version: self.core_version.clone(),
            created_at: self.created_at,
        }
    }

    /// Reveal the daemon credentials and masternode key
    pub fn secrets(&self) -> NodeSecrets {
        NodeSecrets {
            rpc_user: self.rpc_user.clone(),
            rpc_password: self.rpc_password.clone(),
            masternode_key: self.masternode_key.clone(),
        }
    }
}

/// `<datadir>/<chain>.conf`
pub fn conf_path(datadir: &Path, chain_id: &str) -> PathBuf {
    datadir.join(format!("{}.conf", chain_id))
}

/// Redacted node view for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub id: String,
    pub chain: String,
    pub datadir: PathBuf,
    pub p2p_port: u16,
    pub rpc_port: u16,
    pub external_ip: String,
    pub snapshot_url: Option<String>,
    pub core_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSecrets {
    pub rpc_user: String,
    pub rpc_password: String,
    pub masternode_key: String,
}

/// Request to provision a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreateInput {
    pub id: String,
    pub chain: String,
    pub external_ip: String,
    pub masternode_key: String,
    #[serde(default)]
    pub p2p_port: Option<u16>,
    #[serde(default)]
    pub rpc_port: Option<u16>,
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub core_version: Option<String>,
}

/// Partial update of a stored node
///
/// `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub core_version: Option<Option<String>>,
    pub daemon_path: Option<Option<PathBuf>>,
}

impl NodeUpdate {
    pub fn daemon_path(path: PathBuf) -> Self {
        Self {
            daemon_path: Some(Some(path)),
            ..Default::default()
        }
    }

    /// Switch core version and drop the cached binary with it
    pub fn core_version(version: &str) -> Self {
        Self {
            core_version: Some(Some(version.to_string())),
            daemon_path: Some(None),
        }
    }

    pub fn apply(&self, node: &mut NodeConfig) {
        if let Some(version) = &self.core_version {
            node.core_version = version.clone();
        }
        if let Some(path) = &self.daemon_path {
            node.daemon_path = path.clone();
        }
    }
}

/// Credential record of a dashboard user, opaque to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: OwnerId,
    pub username: String,
    pub password_hash: String,
}

#[cfg(test)]
pub(crate) fn sample_node(id: &str, chain: &str, p2p: u16, rpc: u16) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        chain: chain.to_string(),
        datadir: PathBuf::from(format!("/tmp/nodewarden-test/{}", id)),
        p2p_port: p2p,
        rpc_port: rpc,
        rpc_user: "abc".to_string(),
        rpc_password: "xyz".to_string(),
        masternode_key: "mnkey".to_string(),
        external_ip: "203.0.113.7".to_string(),
        snapshot_url: None,
        core_version: Some("1.0.0".to_string()),
        daemon_path: None,
        created_at: Utc::now(),
    }
}
