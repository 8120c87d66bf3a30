//! Shared fixtures: a release file server, a JSON-RPC daemon stand-in and
//! archive builders

#![allow(dead_code)]

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use libwarden_platform::PlatformKey;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use nodewarden::chain::{ArchiveKind, DaemonNames, PortPair, ReleaseAsset, RpcAliases};
use nodewarden::{MemoryNodeStore, NodeConfig, NodeManager, Settings, StandardChain};

pub const CHAIN: &str = "testcoin";
pub const DAEMON: &str = "testcoind";

/// Below the Linux ephemeral range, so mock servers never land on them
pub const DEFAULT_PORTS: PortPair = PortPair { p2p: 21100, rpc: 21101 };

async fn spawn_server(listener: TcpListener, app: Router) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    })
}

/// Serves fixed files under `http://127.0.0.1:<port>/<name>`
pub struct ReleaseServer {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl ReleaseServer {
    pub async fn start(files: Vec<(String, Vec<u8>)>) -> Self {
        let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(files.into_iter().collect());

        let app = Router::new()
            .route("/*file", get(serve_file))
            .with_state(files);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = spawn_server(listener, app).await;

        Self { port, handle }
    }

    pub fn url(&self, name: &str) -> String {
        format!("http://127.0.0.1:{}/{}", self.port, name)
    }
}

impl Drop for ReleaseServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_file(
    State(files): State<Arc<HashMap<String, Vec<u8>>>>,
    UrlPath(file): UrlPath<String>,
) -> Result<Vec<u8>, StatusCode> {
    files.get(&file).cloned().ok_or(StatusCode::NOT_FOUND)
}

#[derive(Clone, Default)]
struct DaemonState {
    responses: Arc<Mutex<HashMap<String, Result<Value, String>>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

/// JSON-RPC responder standing in for a coin daemon
///
/// Unknown methods answer like bitcoind: HTTP 500 with an error body.
pub struct MockDaemon {
    pub port: u16,
    state: DaemonState,
    handle: JoinHandle<()>,
}

impl MockDaemon {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener).await
    }

    pub async fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        Self::serve(listener).await
    }

    async fn serve(listener: TcpListener) -> Self {
        let port = listener.local_addr().unwrap().port();
        let state = DaemonState::default();

        let app = Router::new()
            .route("/", post(handle_rpc))
            .with_state(state.clone());
        let handle = spawn_server(listener, app).await;

        Self { port, state, handle }
    }

    pub fn respond(&self, method: &str, result: Value) -> &Self {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(method.to_string(), Ok(result));
        self
    }

    pub fn fail(&self, method: &str, message: &str) -> &Self {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(method.to_string(), Err(message.to_string()));
        self
    }

    /// Methods called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_rpc(
    State(state): State<DaemonState>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    state.calls.lock().unwrap().push((method.clone(), params));

    let response = state.responses.lock().unwrap().get(&method).cloned();
    match response {
        Some(Ok(result)) => (
            StatusCode::OK,
            Json(json!({ "result": result, "error": null, "id": id })),
        ),
        Some(Err(message)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "result": null, "error": { "code": -1, "message": message }, "id": id })),
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "result": null,
                "error": { "code": -32601, "message": "Method not found" },
                "id": id
            })),
        ),
    }
}

/// Listener that accepts connections and never answers them
pub struct StalledDaemon {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl StalledDaemon {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        Self { port, handle }
    }
}

impl Drop for StalledDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A port nothing listens on right now
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut ar = tar::Builder::new(enc);

    for (path, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        ar.append_data(&mut header, path, *data).unwrap();
    }

    ar.into_inner().unwrap().finish().unwrap()
}

pub fn zip(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));

    for (path, data, mode) in entries {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
        writer.start_file(path.to_string(), options).unwrap();
        writer.write_all(data).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Core archive whose daemon exits right away
pub fn core_archive(version: &str) -> Vec<u8> {
    let path = format!("{}-{}/bin/{}", CHAIN, version, DAEMON);
    tar_gz(&[(path.as_str(), &b"#!/bin/sh\nexit 0\n"[..], 0o755)])
}

/// Same asset for every platform key
pub fn asset_for_all(url: &str, sha256: &str) -> BTreeMap<String, ReleaseAsset> {
    PlatformKey::ALL
        .iter()
        .map(|key| {
            (
                key.to_string(),
                ReleaseAsset {
                    url: url.to_string(),
                    sha256: sha256.to_string(),
                    archive: ArchiveKind::TarGz,
                },
            )
        })
        .collect()
}

pub fn test_chain(releases: BTreeMap<String, BTreeMap<String, ReleaseAsset>>) -> StandardChain {
    StandardChain {
        id: CHAIN.to_string(),
        name: "TestCoin".to_string(),
        symbol: "TST".to_string(),
        daemon: DaemonNames {
            win32: format!("{}.exe", DAEMON),
            linux: DAEMON.to_string(),
            darwin: Some(DAEMON.to_string()),
        },
        default_ports: DEFAULT_PORTS,
        releases,
        extra_config: vec!["addnode=10.0.0.1".to_string()],
        rpc: RpcAliases::default(),
    }
}

/// Orchestrator over a temp base dir and an in-memory store
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryNodeStore>,
    pub manager: NodeManager,
    pub releases: ReleaseServer,
}

impl Harness {
    /// Serves `core-<version>.tar.gz` for each version with correct digests
    pub async fn new(versions: &[&str]) -> Self {
        Self::build(versions, false, false, Vec::new()).await
    }

    /// Also serves `files` next to the core archives
    pub async fn with_files(versions: &[&str], files: Vec<(String, Vec<u8>)>) -> Self {
        Self::build(versions, false, false, files).await
    }

    /// Registers a wrong digest for every release
    pub async fn with_bad_checksums(versions: &[&str], skip_verify: bool) -> Self {
        Self::build(versions, true, skip_verify, Vec::new()).await
    }

    async fn build(
        versions: &[&str],
        corrupt: bool,
        skip_verify: bool,
        extra_files: Vec<(String, Vec<u8>)>,
    ) -> Self {
        let archives: Vec<(String, Vec<u8>)> = versions
            .iter()
            .map(|v| (v.to_string(), core_archive(v)))
            .collect();

        let mut files: Vec<(String, Vec<u8>)> = archives
            .iter()
            .map(|(v, data)| (format!("core-{}.tar.gz", v), data.clone()))
            .collect();
        files.extend(extra_files);
        let releases = ReleaseServer::start(files).await;

        let mut table = BTreeMap::new();
        for (version, data) in &archives {
            let digest = if corrupt { "0".repeat(64) } else { sha256(data) };
            let url = releases.url(&format!("core-{}.tar.gz", version));
            table.insert(version.clone(), asset_for_all(&url, &digest));
        }

        let settings = Settings {
            skip_verify,
            ready_timeout_secs: 1,
            ready_interval_ms: 100,
            rpc_timeout_secs: 1,
            chains: vec![test_chain(table)],
            ..Default::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryNodeStore::new());
        let manager = NodeManager::new(&settings, dir.path(), store.clone());

        Self {
            dir,
            store,
            manager,
            releases,
        }
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn bin_dir(&self, version: &str) -> PathBuf {
        self.base().join("cores").join(CHAIN).join(version).join("bin")
    }
}

/// Node record pointing at `rpc_port`, for seeding the store directly
pub fn node_record(id: &str, chain: &str, datadir: PathBuf, p2p: u16, rpc: u16) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        chain: chain.to_string(),
        datadir,
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
