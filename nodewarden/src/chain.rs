//! Chain plugins and the chain registry

use libwarden_platform::{BasePlatform, PlatformKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Result, WardenError};
use crate::node::NodeConfig;

/// Archive format of a release or snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveKind {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
        }
    }

    /// Infer from a URL or file name, anything not gzip-tar is zip
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Zip
        }
    }
}

/// One downloadable release archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub url: String,
    pub sha256: String,
    pub archive: ArchiveKind,
}

/// Daemon file name per OS family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonNames {
    pub win32: String,
    pub linux: String,
    #[serde(default)]
    pub darwin: Option<String>,
}

impl DaemonNames {
    pub fn for_platform(&self, base: BasePlatform) -> Option<&str> {
        match base {
            BasePlatform::Win32 => Some(&self.win32),
            BasePlatform::Linux => Some(&self.linux),
            BasePlatform::Darwin => self.darwin.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub p2p: u16,
    pub rpc: u16,
}

/// RPC method names that differ between daemons
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcAliases {
    #[serde(default = "default_stop")]
    pub stop: String,
    #[serde(default = "default_block_count")]
    pub block_count: String,
    #[serde(default)]
    pub masternode_status: Option<String>,
}

impl Default for RpcAliases {
    fn default() -> Self {
        Self {
            stop: default_stop(),
            block_count: default_block_count(),
            masternode_status: None,
        }
    }
}

fn default_stop() -> String {
    "stop".to_string()
}

fn default_block_count() -> String {
    "getblockcount".to_string()
}

/// Capabilities every supported chain provides
pub trait ChainPlugin: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn symbol(&self) -> &str;
    fn daemon_name(&self, platform: BasePlatform) -> Option<&str>;
    fn default_ports(&self) -> PortPair;
    /// Registered version strings, unordered
    fn versions(&self) -> Vec<&str>;
    fn release(&self, version: &str, platform: PlatformKey) -> Option<&ReleaseAsset>;
    /// Render the daemon config file for a node
    fn render_config(&self, node: &NodeConfig) -> String;
    fn rpc(&self) -> &RpcAliases;

    fn info(&self) -> ChainInfo {
        let mut versions: Vec<String> = self.versions().into_iter().map(String::from).collect();
        versions.sort_by(|a, b| compare_versions(a, b));

        ChainInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            symbol: self.symbol().to_string(),
            default_ports: self.default_ports(),
            versions,
        }
    }
}

/// Serializable chain description for listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub default_ports: PortPair,
    pub versions: Vec<String>,
}

/// Bitcoin-derived masternode chain described entirely by data
///
/// Built-in chains are instances of this, and `[[chains]]` tables in the
/// settings file deserialize into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardChain {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub daemon: DaemonNames,
    pub default_ports: PortPair,
    /// version -> platform key -> asset
    #[serde(default)]
    pub releases: BTreeMap<String, BTreeMap<String, ReleaseAsset>>,
    /// Lines appended after the standard config block
    #[serde(default)]
    pub extra_config: Vec<String>,
    #[serde(default)]
    pub rpc: RpcAliases,
}

impl ChainPlugin for StandardChain {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn daemon_name(&self, platform: BasePlatform) -> Option<&str> {
        self.daemon.for_platform(platform)
    }

    fn default_ports(&self) -> PortPair {
        self.default_ports
    }

    fn versions(&self) -> Vec<&str> {
        self.releases.keys().map(String::as_str).collect()
    }

    fn release(&self, version: &str, platform: PlatformKey) -> Option<&ReleaseAsset> {
        self.releases.get(version)?.get(platform.as_str())
    }

    fn render_config(&self, node: &NodeConfig) -> String {
        let mut out = format!(
            "server=1\n\
             daemon=1\n\
             listen=1\n\
             \n\
             port={p2p}\n\
             rpcport={rpc}\n\
             rpcuser={user}\n\
             rpcpassword={password}\n\
             rpcallowip=127.0.0.1\n\
             rpcbind=127.0.0.1\n\
             txindex=1\n\
             \n\
             masternode=1\n\
             masternodeprivkey={key}\n\
             externalip={ip}:{p2p}\n",
            p2p = node.p2p_port,
            rpc = node.rpc_port,
            user = node.rpc_user,
            password = node.rpc_password,
            key = node.masternode_key,
            ip = node.external_ip,
        );

        if !self.extra_config.is_empty() {
            out.push('\n');
            for line in &self.extra_config {
                out.push_str(line);
                out.push('\n');
            }
        }

        out
    }

    fn rpc(&self) -> &RpcAliases {
        &self.rpc
    }
}

/// Keyed collection of chain plugins
#[derive(Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<String, Arc<dyn ChainPlugin>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the built-in chains
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for chain in crate::chains::builtin() {
            registry.register(chain);
        }
        registry
    }

    /// Register a chain, replacing any chain with the same id
    pub fn register(&mut self, chain: Arc<dyn ChainPlugin>) {
        self.chains.insert(chain.id().to_string(), chain);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ChainPlugin>> {
        self.chains
            .get(id)
            .cloned()
            .ok_or_else(|| WardenError::UnknownChain(id.to_string()))
    }

    /// All chains sorted by id
    pub fn list(&self) -> Vec<Arc<dyn ChainPlugin>> {
        let mut chains: Vec<_> = self.chains.values().cloned().collect();
        chains.sort_by(|a, b| a.id().cmp(b.id()));
        chains
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Highest registered version by numeric component comparison
pub fn latest_version(chain: &dyn ChainPlugin) -> Result<String> {
    let mut versions = chain.versions();
    if versions.is_empty() {
        return Err(WardenError::NoReleases(chain.id().to_string()));
    }

    // Stable sort, so among equal versions the last registered wins
    versions.sort_by(|a, b| compare_versions(a, b));
    Ok(versions[versions.len() - 1].to_string())
}

/// Compare dot-separated numeric versions, missing or non-numeric parts count as 0
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |value: &str| -> Vec<u64> {
        value.split('.').map(|part| part.parse().unwrap_or(0)).collect()
    };

    let a_parts = parse(a);
    let b_parts = parse(b);
    let len = a_parts.len().max(b_parts.len());

    for i in 0..len {
        let x = a_parts.get(i).copied().unwrap_or(0);
        let y = b_parts.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

#[cfg(test)]
pub(crate) fn test_chain(id: &str, versions: &[&str]) -> StandardChain {
    let mut releases = BTreeMap::new();
    for version in versions {
        releases.insert(version.to_string(), BTreeMap::new());
    }

    StandardChain {
        id: id.to_string(),
        name: id.to_uppercase(),
        symbol: id.to_uppercase(),
        daemon: DaemonNames {
            win32: format!("{}d.exe", id),
            linux: format!("{}d", id),
            darwin: None,
        },
        default_ports: PortPair { p2p: 51472, rpc: 51473 },
        releases,
        extra_config: Vec::new(),
        rpc: RpcAliases::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_writer::parse_config;
    use crate::node::sample_node;

    #[test]
    fn test_latest_version_is_numeric() {
        let chain = test_chain("coin", &["1.2.0", "1.10.0", "1.9.5"]);
        assert_eq!(latest_version(&chain).unwrap(), "1.10.0");
    }

    #[test]
    fn test_latest_version_missing_components() {
        let chain = test_chain("coin", &["2", "1.9.9", "2.0.1"]);
        assert_eq!(latest_version(&chain).unwrap(), "2.0.1");
        assert_eq!(compare_versions("2", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.x", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_no_releases() {
        let chain = test_chain("empty", &[]);
        assert!(matches!(latest_version(&chain), Err(WardenError::NoReleases(id)) if id == "empty"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ChainRegistry::with_builtins();
        assert!(registry.get("pivx").is_ok());
        assert!(registry.get("dogecash").is_ok());
        assert!(registry.get("zenzo").is_ok());
        assert!(matches!(registry.get("btc"), Err(WardenError::UnknownChain(_))));

        let ids: Vec<String> = registry.list().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["dogecash", "pivx", "zenzo"]);
    }

    #[test]
    fn test_register_replaces_builtin() {
        let mut registry = ChainRegistry::with_builtins();
        let mut custom = test_chain("pivx", &["9.9.9"]);
        custom.name = "Custom PIVX".to_string();
        registry.register(Arc::new(custom));

        let chain = registry.get("pivx").unwrap();
        assert_eq!(chain.name(), "Custom PIVX");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_render_standard_config() {
        let chain = test_chain("pivx", &["5.6.1"]);
        let node = sample_node("mn1", "pivx", 51472, 51473);
        let values = parse_config(&chain.render_config(&node));

        assert_eq!(values.get("port").map(String::as_str), Some("51472"));
        assert_eq!(values.get("rpcport").map(String::as_str), Some("51473"));
        assert_eq!(values.get("masternodeprivkey").map(String::as_str), Some("mnkey"));
        assert_eq!(values.get("externalip").map(String::as_str), Some("203.0.113.7:51472"));
    }

    #[test]
    fn test_archive_kind_from_url() {
        assert_eq!(ArchiveKind::from_url("https://x/snap.tar.gz"), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_url("https://x/SNAP.TGZ"), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_url("https://x/snap.zip"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::from_url("https://x/snap"), ArchiveKind::Zip);
    }

    #[test]
    fn test_daemon_names() {
        let chain = test_chain("coin", &[]);
        assert_eq!(chain.daemon_name(BasePlatform::Linux), Some("coind"));
        assert_eq!(chain.daemon_name(BasePlatform::Win32), Some("coind.exe"));
        assert_eq!(chain.daemon_name(BasePlatform::Darwin), None);
    }
}
