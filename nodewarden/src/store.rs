//! Node and user persistence

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::archive::blocking;
use crate::error::{Result, WardenError};
use crate::node::{NodeConfig, NodeUpdate, OwnerId, UserRecord};

/// Store file name inside the base directory
pub const STORE_FILE: &str = "nodewarden.json";

/// CRUD interface over node and user records
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn list_nodes(&self, owner: OwnerId) -> Result<Vec<NodeConfig>>;

    /// Every node with its owner, across all owners
    async fn list_all_nodes(&self) -> Result<Vec<(OwnerId, NodeConfig)>>;

    /// Fails with `NodeNotFound`
    async fn get_node(&self, owner: OwnerId, id: &str) -> Result<NodeConfig>;

    /// Fails with `Storage` if `(owner, id)` already exists
    async fn add_node(&self, owner: OwnerId, node: NodeConfig) -> Result<()>;

    async fn update_node(&self, owner: OwnerId, id: &str, update: NodeUpdate) -> Result<NodeConfig>;

    async fn remove_node(&self, owner: OwnerId, id: &str) -> Result<()>;

    async fn node_exists_globally(&self, id: &str) -> Result<bool>;

    /// Subset of `ports` bound to any stored node in either role
    async fn ports_in_use(&self, ports: &[u16]) -> Result<Vec<u16>>;

    /// Fails with `Storage` for a taken username
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRecord>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn get_user_by_id(&self, id: OwnerId) -> Result<Option<UserRecord>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedNode {
    owner_id: OwnerId,
    #[serde(flatten)]
    node: NodeConfig,
}

/// Serialized store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    nodes: Vec<OwnedNode>,
}

impl StoreData {
    fn list_nodes(&self, owner: OwnerId) -> Vec<NodeConfig> {
        self.nodes
            .iter()
            .filter(|n| n.owner_id == owner)
            .map(|n| n.node.clone())
            .collect()
    }

    fn list_all_nodes(&self) -> Vec<(OwnerId, NodeConfig)> {
        self.nodes
            .iter()
            .map(|n| (n.owner_id, n.node.clone()))
            .collect()
    }

    fn find_mut(&mut self, owner: OwnerId, id: &str) -> Result<&mut OwnedNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.owner_id == owner && n.node.id == id)
            .ok_or_else(|| WardenError::NodeNotFound(id.to_string()))
    }

    fn get_node(&self, owner: OwnerId, id: &str) -> Result<NodeConfig> {
        self.nodes
            .iter()
            .find(|n| n.owner_id == owner && n.node.id == id)
            .map(|n| n.node.clone())
            .ok_or_else(|| WardenError::NodeNotFound(id.to_string()))
    }

    fn add_node(&mut self, owner: OwnerId, node: NodeConfig) -> Result<()> {
        if self.nodes.iter().any(|n| n.owner_id == owner && n.node.id == node.id) {
            return Err(WardenError::Storage(format!(
                "node {} already exists for owner {}",
                node.id, owner
            )));
        }

        self.nodes.push(OwnedNode { owner_id: owner, node });
        Ok(())
    }

    fn update_node(&mut self, owner: OwnerId, id: &str, update: &NodeUpdate) -> Result<NodeConfig> {
        let entry = self.find_mut(owner, id)?;
        update.apply(&mut entry.node);
        Ok(entry.node.clone())
    }

    fn remove_node(&mut self, owner: OwnerId, id: &str) -> Result<()> {
        let before = self.nodes.len();
        self.nodes.retain(|n| !(n.owner_id == owner && n.node.id == id));

        if self.nodes.len() == before {
            return Err(WardenError::NodeNotFound(id.to_string()));
        }
        Ok(())
    }

    fn node_exists_globally(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.node.id == id)
    }

    fn ports_in_use(&self, ports: &[u16]) -> Vec<u16> {
        let used: HashSet<u16> = self
            .nodes
            .iter()
            .flat_map(|n| [n.node.p2p_port, n.node.rpc_port])
            .collect();

        ports.iter().copied().filter(|p| used.contains(p)).collect()
    }

    fn create_user(&mut self, username: &str, password_hash: &str) -> Result<UserRecord> {
        if self.users.iter().any(|u| u.username == username) {
            return Err(WardenError::Storage(format!("username taken: {}", username)));
        }

        let id = self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = UserRecord {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn user_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users.iter().find(|u| u.username == username).cloned()
    }

    fn user_by_id(&self, id: OwnerId) -> Option<UserRecord> {
        self.users.iter().find(|u| u.id == id).cloned()
    }
}

/// Store kept entirely in memory
#[derive(Default)]
pub struct MemoryNodeStore {
    data: RwLock<StoreData>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn list_nodes(&self, owner: OwnerId) -> Result<Vec<NodeConfig>> {
        Ok(self.data.read().await.list_nodes(owner))
    }

    async fn list_all_nodes(&self) -> Result<Vec<(OwnerId, NodeConfig)>> {
        Ok(self.data.read().await.list_all_nodes())
    }

    async fn get_node(&self, owner: OwnerId, id: &str) -> Result<NodeConfig> {
        self.data.read().await.get_node(owner, id)
    }

    async fn add_node(&self, owner: OwnerId, node: NodeConfig) -> Result<()> {
        self.data.write().await.add_node(owner, node)
    }

    async fn update_node(&self, owner: OwnerId, id: &str, update: NodeUpdate) -> Result<NodeConfig> {
        self.data.write().await.update_node(owner, id, &update)
    }

    async fn remove_node(&self, owner: OwnerId, id: &str) -> Result<()> {
        self.data.write().await.remove_node(owner, id)
    }

    async fn node_exists_globally(&self, id: &str) -> Result<bool> {
        Ok(self.data.read().await.node_exists_globally(id))
    }

    async fn ports_in_use(&self, ports: &[u16]) -> Result<Vec<u16>> {
        Ok(self.data.read().await.ports_in_use(ports))
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRecord> {
        self.data.write().await.create_user(username, password_hash)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.data.read().await.user_by_username(username))
    }

    async fn get_user_by_id(&self, id: OwnerId) -> Result<Option<UserRecord>> {
        Ok(self.data.read().await.user_by_id(id))
    }
}

/// Store persisted as one JSON document
///
/// Writers go through a temp file and rename. An advisory lock on a sibling
/// `.lock` file serializes access from other processes.
pub struct JsonNodeStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: RwLock<()>,
}

impl JsonNodeStore {
    pub fn open(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;

        let path = base_dir.join(STORE_FILE);
        let lock_path = base_dir.join(format!("{}.lock", STORE_FILE));

        Ok(Self {
            path,
            lock_path,
            guard: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StoreData) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.guard.read().await;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        blocking(move || {
            let lock = open_lock(&lock_path)?;
            FileExt::lock_shared(&lock)?;
            let result = load(&path).and_then(|data| f(&data));
            let _ = FileExt::unlock(&lock);
            result
        })
        .await
    }

    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreData) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.guard.write().await;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        blocking(move || {
            let lock = open_lock(&lock_path)?;
            FileExt::lock_exclusive(&lock)?;
            let result = load(&path).and_then(|mut data| {
                let value = f(&mut data)?;
                save(&path, &data)?;
                Ok(value)
            });
            let _ = FileExt::unlock(&lock);
            result
        })
        .await
    }
}

fn open_lock(path: &Path) -> Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

fn load(path: &Path) -> Result<StoreData> {
    if !path.exists() {
        return Ok(StoreData::default());
    }

    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save(path: &Path, data: &StoreData) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(data)?;
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;

    debug!("Saved store {:?}", path);
    Ok(())
}

#[async_trait]
impl NodeStore for JsonNodeStore {
    async fn list_nodes(&self, owner: OwnerId) -> Result<Vec<NodeConfig>> {
        self.read(move |d| Ok(d.list_nodes(owner))).await
    }

    async fn list_all_nodes(&self) -> Result<Vec<(OwnerId, NodeConfig)>> {
        self.read(|d| Ok(d.list_all_nodes())).await
    }

    async fn get_node(&self, owner: OwnerId, id: &str) -> Result<NodeConfig> {
        let id = id.to_string();
        self.read(move |d| d.get_node(owner, &id)).await
    }

    async fn add_node(&self, owner: OwnerId, node: NodeConfig) -> Result<()> {
        self.write(move |d| d.add_node(owner, node)).await
    }

    async fn update_node(&self, owner: OwnerId, id: &str, update: NodeUpdate) -> Result<NodeConfig> {
        let id = id.to_string();
        self.write(move |d| d.update_node(owner, &id, &update)).await
    }

    async fn remove_node(&self, owner: OwnerId, id: &str) -> Result<()> {
        let id = id.to_string();
        self.write(move |d| d.remove_node(owner, &id)).await
    }

    async fn node_exists_globally(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.read(move |d| Ok(d.node_exists_globally(&id))).await
    }

    async fn ports_in_use(&self, ports: &[u16]) -> Result<Vec<u16>> {
        let ports = ports.to_vec();
        self.read(move |d| Ok(d.ports_in_use(&ports))).await
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRecord> {
        let username = username.to_string();
        let password_hash = password_hash.to_string();
        self.write(move |d| d.create_user(&username, &password_hash)).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let username = username.to_string();
        self.read(move |d| Ok(d.user_by_username(&username))).await
    }

    async fn get_user_by_id(&self, id: OwnerId) -> Result<Option<UserRecord>> {
        self.read(move |d| Ok(d.user_by_id(id))).await
    }
}
