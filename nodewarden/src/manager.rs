//! Node lifecycle orchestration

use chrono::Utc;
use libwarden_platform::PlatformKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::archive::{find_file, Downloader};
use crate::chain::{latest_version, ChainInfo, ChainPlugin, ChainRegistry, PortPair};
use crate::config_writer::write_config;
use crate::error::{Result, WardenError};
use crate::installer::Installer;
use crate::lock::NodeLocks;
use crate::node::{NodeConfig, NodeCreateInput, NodeUpdate, OwnerId};
use crate::process::start_daemon;
use crate::rpc::RpcClient;
use crate::settings::Settings;
use crate::snapshot::{apply_snapshot, clear_chain_data, remove_dir_if_exists};
use crate::store::NodeStore;

/// Outcome of comparing a node's core against the newest release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub latest: String,
    pub current: Option<String>,
    pub update_available: bool,
}

/// Owns the node lifecycle: provisioning, daemon control and RPC access
pub struct NodeManager {
    registry: ChainRegistry,
    store: Arc<dyn NodeStore>,
    installer: Installer,
    downloader: Downloader,
    rpc: RpcClient,
    locks: NodeLocks,
    provisioning: Mutex<()>,
    base_dir: PathBuf,
    ready_timeout: Duration,
    ready_interval: Duration,
}

impl NodeManager {
    pub fn new(settings: &Settings, base_dir: &Path, store: Arc<dyn NodeStore>) -> Self {
        let downloader = Downloader::new(settings.show_progress);
        let installer = Installer::new(base_dir, downloader.clone(), !settings.skip_verify);

        if settings.skip_verify {
            warn!("Release checksum verification is disabled");
        }

        Self {
            registry: settings.registry(),
            store,
            installer,
            downloader,
            rpc: RpcClient::with_timeout(settings.rpc_timeout()),
            locks: NodeLocks::new(),
            provisioning: Mutex::new(()),
            base_dir: base_dir.to_path_buf(),
            ready_timeout: settings.ready_timeout(),
            ready_interval: settings.ready_interval(),
        }
    }

    /// Pin the release platform instead of detecting the host
    pub fn with_platform(mut self, platform: Option<PlatformKey>) -> Self {
        self.installer = self.installer.with_platform(platform);
        self
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub(crate) fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base>/nodes/<owner>/<id>`
    pub fn node_datadir(&self, owner: OwnerId, id: &str) -> PathBuf {
        self.base_dir.join("nodes").join(owner.to_string()).join(id)
    }

    pub fn list_chains(&self) -> Vec<ChainInfo> {
        self.registry.list().iter().map(|chain| chain.info()).collect()
    }

    pub async fn list_nodes(&self, owner: OwnerId) -> Result<Vec<NodeConfig>> {
        self.store.list_nodes(owner).await
    }

    pub async fn get_node(&self, owner: OwnerId, id: &str) -> Result<NodeConfig> {
        self.store.get_node(owner, id).await
    }

    pub(crate) async fn node_and_chain(
        &self,
        owner: OwnerId,
        id: &str,
    ) -> Result<(NodeConfig, Arc<dyn ChainPlugin>)> {
        let node = self.store.get_node(owner, id).await?;
        let chain = self.registry.get(&node.chain)?;
        Ok((node, chain))
    }

    /// RPC call against one of the owner's nodes
    pub async fn call<T: serde::de::DeserializeOwned>(
        &self,
        owner: OwnerId,
        id: &str,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        let node = self.store.get_node(owner, id).await?;
        self.rpc.call(&node, method, params).await
    }

    /// Install a chain core, defaulting to the latest version
    pub async fn install(&self, chain_id: &str, version: Option<&str>) -> Result<PathBuf> {
        let chain = self.registry.get(chain_id)?;
        let version = match version {
            Some(v) => v.to_string(),
            None => latest_version(chain.as_ref())?,
        };
        self.installer.install(chain.as_ref(), &version).await
    }

    /// Provision, start and await a new node
    ///
    /// Fails before anything is persisted if validation, install, config or
    /// snapshot fail; the data directory is removed in that case. Once the
    /// record is stored, a failing start is returned but the record stays.
    pub async fn create(&self, owner: OwnerId, input: NodeCreateInput) -> Result<NodeConfig> {
        validate_node_id(&input.id)?;
        let chain = self.registry.get(&input.chain)?;
        let version = match &input.core_version {
            Some(v) => v.clone(),
            None => latest_version(chain.as_ref())?,
        };

        let _node_guard = self.locks.lock(&input.id).await;

        let node = {
            let _provisioning = self.provisioning.lock().await;

            let owned = self.store.list_nodes(owner).await?;
            if let Some(existing) = owned.iter().find(|n| n.chain == input.chain) {
                return Err(WardenError::ChainConflict(format!(
                    "{} (node {})",
                    input.chain, existing.id
                )));
            }

            if self.store.node_exists_globally(&input.id).await? {
                return Err(WardenError::NodeIdInUse(input.id.clone()));
            }

            let ports = self.allocate_ports(chain.as_ref(), &input).await?;

            let node = NodeConfig {
                id: input.id.clone(),
                chain: chain.id().to_string(),
                datadir: self.node_datadir(owner, &input.id),
                p2p_port: ports.p2p,
                rpc_port: ports.rpc,
                rpc_user: random_token(12),
                rpc_password: random_token(24),
                masternode_key: input.masternode_key.clone(),
                external_ip: input.external_ip.clone(),
                snapshot_url: input.snapshot_url.clone(),
                core_version: Some(version.clone()),
                daemon_path: None,
                created_at: Utc::now(),
            };

            info!(
                "Creating node {} ({} {}) on ports {}/{}",
                node.id, node.chain, version, node.p2p_port, node.rpc_port
            );

            if let Err(e) = self.provision(chain.as_ref(), &node, &version).await {
                warn!("Provisioning {} failed: {}", node.id, e);
                let _ = remove_dir_if_exists(&node.datadir).await;
                return Err(e);
            }

            self.store.add_node(owner, node.clone()).await?;
            node
        };

        self.start_node(owner, &node, chain.as_ref()).await?;

        if self.wait_ready(&node, chain.as_ref()).await {
            info!("Node {} is answering RPC", node.id);
        } else {
            warn!(
                "Node {} did not answer RPC within {:?}, continuing",
                node.id, self.ready_timeout
            );
        }

        self.store.get_node(owner, &node.id).await
    }

    async fn provision(&self, chain: &dyn ChainPlugin, node: &NodeConfig, version: &str) -> Result<()> {
        self.ensure_installed(chain, version).await?;
        write_config(chain, node).await?;

        if let Some(url) = &node.snapshot_url {
            apply_snapshot(&self.downloader, node, url).await?;
        }

        Ok(())
    }

    async fn ensure_installed(&self, chain: &dyn ChainPlugin, version: &str) -> Result<()> {
        let platform = self.installer.platform()?;
        if let Some(name) = chain.daemon_name(platform.base()) {
            let bin_dir = self.installer.bin_dir(chain.id(), version);
            if let Some(found) = find_file(&bin_dir, name).await? {
                debug!("{} {} already installed at {:?}", chain.id(), version, found);
                return Ok(());
            }
        }

        self.installer.install(chain, version).await?;
        Ok(())
    }

    async fn allocate_ports(&self, chain: &dyn ChainPlugin, input: &NodeCreateInput) -> Result<PortPair> {
        let mut used: HashSet<u16> = self
            .store
            .list_all_nodes()
            .await?
            .iter()
            .flat_map(|(_, n)| [n.p2p_port, n.rpc_port])
            .collect();

        let explicit: Vec<u16> = [input.p2p_port, input.rpc_port].into_iter().flatten().collect();
        if !explicit.is_empty() {
            let taken = self.store.ports_in_use(&explicit).await?;
            if !taken.is_empty() {
                warn!("Requested ports {:?} are already assigned to other nodes", taken);
            }
        }

        allocate_ports(chain.default_ports(), input.p2p_port, input.rpc_port, &mut used)
    }

    pub async fn start(&self, owner: OwnerId, id: &str) -> Result<u32> {
        let _guard = self.locks.lock(id).await;
        let (node, chain) = self.node_and_chain(owner, id).await?;
        self.start_node(owner, &node, chain.as_ref()).await
    }

    async fn start_node(&self, owner: OwnerId, node: &NodeConfig, chain: &dyn ChainPlugin) -> Result<u32> {
        let daemon = self.resolve_daemon_path(owner, node, chain).await?;
        info!("Starting node {}", node.id);
        start_daemon(&daemon, &node.datadir, &node.conf_path())
    }

    /// Ask the daemon to shut down; unreachable daemons are an error
    pub async fn stop(&self, owner: OwnerId, id: &str) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        let (node, chain) = self.node_and_chain(owner, id).await?;
        self.stop_node(&node, chain.as_ref()).await
    }

    async fn stop_node(&self, node: &NodeConfig, chain: &dyn ChainPlugin) -> Result<()> {
        info!("Stopping node {}", node.id);
        self.rpc
            .call_value(node, &chain.rpc().stop, Vec::new())
            .await?;
        Ok(())
    }

    pub async fn restart(&self, owner: OwnerId, id: &str) -> Result<u32> {
        let _guard = self.locks.lock(id).await;
        let (node, chain) = self.node_and_chain(owner, id).await?;

        self.stop_node(&node, chain.as_ref()).await?;
        self.start_node(owner, &node, chain.as_ref()).await
    }

    /// Stop, drop block and chain-state data, start again
    pub async fn resync(&self, owner: OwnerId, id: &str) -> Result<u32> {
        let _guard = self.locks.lock(id).await;
        let (node, chain) = self.node_and_chain(owner, id).await?;

        self.stop_node(&node, chain.as_ref()).await?;
        clear_chain_data(&node.datadir).await?;
        info!("Cleared chain data of {}", node.id);
        self.start_node(owner, &node, chain.as_ref()).await
    }

    /// Remove a node, its data directory and its record
    ///
    /// The daemon may already be gone, so a failing stop is only logged.
    pub async fn delete(&self, owner: OwnerId, id: &str) -> Result<()> {
        let guard = self.locks.lock(id).await;
        let (node, chain) = self.node_and_chain(owner, id).await?;

        if let Err(e) = self.stop_node(&node, chain.as_ref()).await {
            debug!("Ignoring stop failure for {}: {}", node.id, e);
        }

        remove_dir_if_exists(&node.datadir).await?;
        self.store.remove_node(owner, id).await?;
        info!("Deleted node {}", node.id);

        drop(guard);
        self.locks.forget(id);
        Ok(())
    }

    pub async fn check_for_update(&self, owner: OwnerId, id: &str) -> Result<UpdateCheck> {
        let (node, chain) = self.node_and_chain(owner, id).await?;
        let latest = latest_version(chain.as_ref())?;
        let update_available = node
            .core_version
            .as_deref()
            .map(|current| current != latest)
            .unwrap_or(false);

        Ok(UpdateCheck {
            latest,
            current: node.core_version,
            update_available,
        })
    }

    /// Move a node to the latest core; `false` if it already runs it
    pub async fn update_node_core(&self, owner: OwnerId, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        let (node, chain) = self.node_and_chain(owner, id).await?;
        let latest = latest_version(chain.as_ref())?;

        if node.core_version.as_deref() == Some(latest.as_str()) {
            info!("Node {} already runs {} {}", node.id, chain.id(), latest);
            return Ok(false);
        }

        self.stop_node(&node, chain.as_ref()).await?;
        self.installer.install(chain.as_ref(), &latest).await?;

        let updated = self
            .store
            .update_node(owner, id, NodeUpdate::core_version(&latest))
            .await?;
        info!("Node {} switched to {} {}", id, chain.id(), latest);

        self.start_node(owner, &updated, chain.as_ref()).await?;
        Ok(true)
    }

    /// Locate the daemon binary of a node, installing its core if needed
    ///
    /// A cached path is reused while it still names a file. Successful
    /// lookups are written back to the store.
    pub async fn resolve_daemon_path(
        &self,
        owner: OwnerId,
        node: &NodeConfig,
        chain: &dyn ChainPlugin,
    ) -> Result<PathBuf> {
        if let Some(cached) = &node.daemon_path {
            if tokio::fs::metadata(cached).await.map(|m| m.is_file()).unwrap_or(false) {
                return Ok(cached.clone());
            }

            warn!("Cached daemon {:?} for {} is gone, searching again", cached, node.id);
            let clear = NodeUpdate {
                daemon_path: Some(None),
                ..Default::default()
            };
            self.store.update_node(owner, &node.id, clear).await?;
        }

        let version = node
            .core_version
            .as_deref()
            .ok_or_else(|| WardenError::InvalidInput(format!("node {} has no core version", node.id)))?;

        let platform = self.installer.platform()?;
        let name = chain.daemon_name(platform.base()).ok_or_else(|| {
            WardenError::DaemonNotFound(format!("{} has no daemon for {}", chain.id(), platform))
        })?;

        let bin_dir = self.installer.bin_dir(chain.id(), version);
        let mut found = find_file(&bin_dir, name).await?;

        if found.is_none() {
            info!("{} not found under {:?}, installing", name, bin_dir);
            self.installer.install(chain, version).await?;
            found = find_file(&bin_dir, name).await?;
        }

        let path = found.ok_or_else(|| WardenError::DaemonNotFound(name.to_string()))?;
        ensure_executable(&path).await?;

        self.store
            .update_node(owner, &node.id, NodeUpdate::daemon_path(path.clone()))
            .await?;

        debug!("Resolved daemon for {}: {:?}", node.id, path);
        Ok(path)
    }

    /// Poll the block count until the daemon answers or the window closes
    pub async fn wait_for_rpc(&self, owner: OwnerId, id: &str) -> Result<bool> {
        let (node, chain) = self.node_and_chain(owner, id).await?;
        Ok(self.wait_ready(&node, chain.as_ref()).await)
    }

    /// Each poll is cut off at the deadline as well
    async fn wait_ready(&self, node: &NodeConfig, chain: &dyn ChainPlugin) -> bool {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let poll = self
                .rpc
                .call::<serde_json::Value>(node, &chain.rpc().block_count, Vec::new());

            match tokio::time::timeout(remaining, poll).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!("Waiting for {}: {}", node.id, e),
                Err(_) => {
                    debug!("Readiness window for {} closed during a poll", node.id);
                    return false;
                }
            }

            if tokio::time::Instant::now() + self.ready_interval > deadline {
                return false;
            }
            tokio::time::sleep(self.ready_interval).await;
        }
    }
}

/// Pick ports for a new node
///
/// Explicit ports are taken as given. Missing ones are searched upward from the
/// chain default, skipping `used`. Chosen ports are added to `used`.
pub fn allocate_ports(
    defaults: PortPair,
    p2p: Option<u16>,
    rpc: Option<u16>,
    used: &mut HashSet<u16>,
) -> Result<PortPair> {
    if let (Some(p), Some(r)) = (p2p, rpc) {
        if p == r {
            return Err(WardenError::InvalidInput(format!(
                "p2p and rpc port must differ (both {})",
                p
            )));
        }
    }

    used.extend(p2p);
    used.extend(rpc);

    let p2p = match p2p {
        Some(port) => port,
        None => next_free_port(defaults.p2p, used)?,
    };

    // p2p is already in `used`, so a shared default moves rpc up
    let rpc = match rpc {
        Some(port) => port,
        None => next_free_port(defaults.rpc, used)?,
    };

    Ok(PortPair { p2p, rpc })
}

fn next_free_port(start: u16, used: &mut HashSet<u16>) -> Result<u16> {
    let port = (start..=u16::MAX)
        .find(|port| !used.contains(port))
        .ok_or(WardenError::PortAllocationExhausted(start))?;

    used.insert(port);
    Ok(port)
}

/// Node ids name a directory, so they must be one plain path component
fn validate_node_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(WardenError::InvalidInput(format!("invalid node id: {:?}", id)))
    }
}

/// Random hex string of `bytes` random bytes
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(unix)]
async fn ensure_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = tokio::fs::metadata(path).await?.permissions().mode();
    if mode & 0o111 == 0 {
        debug!("Marking {:?} executable", path);
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn ensure_executable(_path: &Path) -> Result<()> {
    Ok(())
}
