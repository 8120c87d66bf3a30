//! End-to-end node lifecycle against a local release host and RPC stand-ins

#![cfg(unix)]

mod common;

use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::*;
use nodewarden::config_writer::parse_config;
use nodewarden::{NodeCreateInput, NodeStore, WardenError};

fn input(id: &str, rpc_port: Option<u16>) -> NodeCreateInput {
    NodeCreateInput {
        id: id.to_string(),
        chain: CHAIN.to_string(),
        external_ip: "203.0.113.7".to_string(),
        masternode_key: "mnkey".to_string(),
        rpc_port,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_installs_configures_and_waits() {
    let h = Harness::new(&["1.0.0"]).await;
    let daemon = MockDaemon::start().await;
    daemon.respond("getblockcount", json!(42));

    let node = h.manager.create(1, input("mn1", Some(daemon.port))).await.unwrap();

    assert_eq!(node.core_version.as_deref(), Some("1.0.0"));
    assert_eq!(node.rpc_port, daemon.port);
    assert_eq!(node.p2p_port, DEFAULT_PORTS.p2p);
    assert_eq!(node.datadir, h.base().join("nodes/1/mn1"));
    assert_eq!(node.rpc_user.len(), 24);
    assert_eq!(node.rpc_password.len(), 48);

    let daemon_path = node.daemon_path.clone().unwrap();
    assert!(daemon_path.starts_with(h.bin_dir("1.0.0")));
    assert!(daemon_path.ends_with(format!("testcoin-1.0.0/bin/{}", DAEMON)));

    let conf = node.datadir.join(format!("{}.conf", CHAIN));
    let mode = std::fs::metadata(&conf).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let values = parse_config(&std::fs::read_to_string(&conf).unwrap());
    assert_eq!(values["port"], DEFAULT_PORTS.p2p.to_string());
    assert_eq!(values["rpcport"], daemon.port.to_string());
    assert_eq!(values["rpcuser"], node.rpc_user);
    assert_eq!(values["rpcpassword"], node.rpc_password);
    assert_eq!(values["addnode"], "10.0.0.1");

    assert!(daemon.calls().contains(&"getblockcount".to_string()));
    assert_eq!(h.store.list_nodes(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_returns_when_daemon_never_answers() {
    let h = Harness::new(&["1.0.0"]).await;

    let started = Instant::now();
    let node = h.manager.create(1, input("mn1", None)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(node.rpc_port, DEFAULT_PORTS.rpc);
    assert!(h.store.get_node(1, "mn1").await.is_ok());
}

#[tokio::test]
async fn test_one_node_per_chain_per_owner() {
    let h = Harness::new(&["1.0.0"]).await;

    h.manager.create(1, input("mn1", None)).await.unwrap();

    let err = h.manager.create(1, input("mn2", None)).await.unwrap_err();
    assert!(matches!(err, WardenError::ChainConflict(_)));

    let err = h.manager.create(2, input("mn1", None)).await.unwrap_err();
    assert!(matches!(err, WardenError::NodeIdInUse(_)));

    // Another owner may run the same chain
    let second = h.manager.create(2, input("mn2", None)).await.unwrap();
    let first = h.store.get_node(1, "mn1").await.unwrap();

    let ports = [first.p2p_port, first.rpc_port, second.p2p_port, second.rpc_port];
    for (i, a) in ports.iter().enumerate() {
        for b in &ports[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(second.p2p_port, DEFAULT_PORTS.p2p + 2);
    assert_eq!(second.rpc_port, DEFAULT_PORTS.rpc + 2);
}

#[tokio::test]
async fn test_create_rejects_unknown_chain_and_bad_id() {
    let h = Harness::new(&["1.0.0"]).await;

    let mut bad_chain = input("mn1", None);
    bad_chain.chain = "nope".to_string();
    assert!(matches!(
        h.manager.create(1, bad_chain).await,
        Err(WardenError::UnknownChain(_))
    ));

    assert!(matches!(
        h.manager.create(1, input("../escape", None)).await,
        Err(WardenError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_checksum_mismatch_aborts_before_extraction() {
    let h = Harness::with_bad_checksums(&["1.0.0"], false).await;

    let err = h.manager.create(1, input("mn1", None)).await.unwrap_err();
    assert!(matches!(err, WardenError::ChecksumMismatch { .. }));

    assert!(!h.bin_dir("1.0.0").exists());
    assert!(!h.base().join("nodes/1/mn1").exists());
    assert!(h.store.list_nodes(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_skip_verify_accepts_bad_checksum() {
    let h = Harness::with_bad_checksums(&["1.0.0"], true).await;

    let node = h.manager.create(1, input("mn1", None)).await.unwrap();
    assert!(node.daemon_path.is_some());
}

#[tokio::test]
async fn test_unregistered_version_has_no_release() {
    let h = Harness::new(&["1.0.0"]).await;

    let mut request = input("mn1", None);
    request.core_version = Some("9.9.9".to_string());
    let err = h.manager.create(1, request).await.unwrap_err();
    assert!(matches!(err, WardenError::NoReleaseForPlatform { .. }));
}

#[tokio::test]
async fn test_wait_for_rpc_sees_late_responder() {
    let h = Harness::new(&["1.0.0"]).await;
    let port = free_port();
    h.store
        .add_node(1, node_record("mn1", CHAIN, h.base().join("mn1"), 1, port))
        .await
        .unwrap();

    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let daemon = MockDaemon::start_on(port).await;
        daemon.respond("getblockcount", json!(1));
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(daemon);
    });

    assert!(h.manager.wait_for_rpc(1, "mn1").await.unwrap());
    responder.abort();
}

#[tokio::test]
async fn test_wait_for_rpc_timeout_is_not_an_error() {
    let h = Harness::new(&["1.0.0"]).await;
    h.store
        .add_node(1, node_record("mn1", CHAIN, h.base().join("mn1"), 1, free_port()))
        .await
        .unwrap();

    let started = Instant::now();
    assert!(!h.manager.wait_for_rpc(1, "mn1").await.unwrap());
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_wait_for_rpc_bounded_by_silent_daemon() {
    let stalled = StalledDaemon::start().await;

    // Request timeout far beyond the readiness window
    let settings = nodewarden::Settings {
        ready_timeout_secs: 1,
        ready_interval_ms: 100,
        rpc_timeout_secs: 60,
        chains: vec![test_chain(std::collections::BTreeMap::new())],
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(nodewarden::MemoryNodeStore::new());
    let manager = nodewarden::NodeManager::new(&settings, dir.path(), store.clone());

    store
        .add_node(1, node_record("mn1", CHAIN, dir.path().join("mn1"), 1, stalled.port))
        .await
        .unwrap();

    let started = Instant::now();
    let ready = tokio::time::timeout(Duration::from_secs(5), manager.wait_for_rpc(1, "mn1"))
        .await
        .expect("readiness wait outlived its window")
        .unwrap();

    assert!(!ready);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_create_and_delete_with_silent_daemon() {
    let h = Harness::new(&["1.0.0"]).await;
    let stalled = StalledDaemon::start().await;

    let node = tokio::time::timeout(
        Duration::from_secs(10),
        h.manager.create(1, input("mn1", Some(stalled.port))),
    )
    .await
    .expect("create hung on a silent daemon")
    .unwrap();
    assert_eq!(node.rpc_port, stalled.port);

    let err = tokio::time::timeout(Duration::from_secs(10), h.manager.stop(1, "mn1"))
        .await
        .expect("stop hung on a silent daemon")
        .unwrap_err();
    assert!(matches!(err, WardenError::RpcTransport(_)));

    tokio::time::timeout(Duration::from_secs(10), h.manager.delete(1, "mn1"))
        .await
        .expect("delete hung on a silent daemon")
        .unwrap();
    assert!(!node.datadir.exists());
    assert!(h.store.list_nodes(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_applies_blocks_only_snapshot() {
    let snapshot = tar_gz(&[("blocks/blk00000.dat", &b"fresh"[..], 0o644)]);
    let h = Harness::with_files(&["1.0.0"], vec![("snapshot.tar.gz".to_string(), snapshot)]).await;

    let datadir = h.base().join("nodes/1/mn1");
    std::fs::create_dir_all(datadir.join("blocks")).unwrap();
    std::fs::write(datadir.join("blocks/stale.dat"), "stale").unwrap();
    std::fs::create_dir_all(datadir.join("chainstate")).unwrap();
    std::fs::write(datadir.join("chainstate/CURRENT"), "MANIFEST-000001").unwrap();

    let mut request = input("mn1", None);
    request.snapshot_url = Some(h.releases.url("snapshot.tar.gz"));
    let node = h.manager.create(1, request).await.unwrap();
    assert_eq!(node.datadir, datadir);

    assert_eq!(std::fs::read(datadir.join("blocks/blk00000.dat")).unwrap(), b"fresh");
    assert!(!datadir.join("blocks/stale.dat").exists());
    assert_eq!(
        std::fs::read_to_string(datadir.join("chainstate/CURRENT")).unwrap(),
        "MANIFEST-000001"
    );

    // Scratch directory and downloaded archive are gone
    assert!(!datadir.join("_snapshot_tmp").exists());
    assert!(!datadir.join("snapshot.tar.gz").exists());
    assert!(datadir.join(format!("{}.conf", CHAIN)).exists());
}

#[tokio::test]
async fn test_failed_snapshot_leaves_no_node() {
    let h = Harness::new(&["1.0.0"]).await;

    let mut request = input("mn1", None);
    request.snapshot_url = Some(h.releases.url("missing.tar.gz"));
    let err = h.manager.create(1, request).await.unwrap_err();

    assert!(matches!(err, WardenError::DownloadFailed { .. }));
    assert!(!h.base().join("nodes/1/mn1").exists());
    assert!(h.store.list_nodes(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_unreachable_node() {
    let h = Harness::new(&["1.0.0"]).await;
    let datadir = h.base().join("nodes/1/mn1");
    std::fs::create_dir_all(datadir.join("blocks")).unwrap();
    std::fs::write(datadir.join("testcoin.conf"), "server=1\n").unwrap();

    h.store
        .add_node(1, node_record("mn1", CHAIN, datadir.clone(), 1, free_port()))
        .await
        .unwrap();

    // A standalone stop does surface the failure
    let err = h.manager.stop(1, "mn1").await.unwrap_err();
    assert!(matches!(err, WardenError::RpcTransport(_)));

    h.manager.delete(1, "mn1").await.unwrap();

    assert!(!datadir.exists());
    assert!(matches!(
        h.store.get_node(1, "mn1").await,
        Err(WardenError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_running_node_sends_stop() {
    let h = Harness::new(&["1.0.0"]).await;
    let daemon = MockDaemon::start().await;
    daemon.respond("stop", json!("stopping"));

    let datadir = h.base().join("nodes/1/mn1");
    std::fs::create_dir_all(&datadir).unwrap();
    h.store
        .add_node(1, node_record("mn1", CHAIN, datadir.clone(), 1, daemon.port))
        .await
        .unwrap();

    h.manager.delete(1, "mn1").await.unwrap();
    assert_eq!(daemon.calls(), vec!["stop"]);
    assert!(!datadir.exists());
}

#[tokio::test]
async fn test_resync_clears_chain_data_only() {
    let h = Harness::new(&["1.0.0"]).await;
    let daemon = MockDaemon::start().await;
    daemon.respond("stop", json!(null));

    let datadir = h.base().join("nodes/1/mn1");
    for dir in ["blocks", "chainstate"] {
        std::fs::create_dir_all(datadir.join(dir)).unwrap();
    }
    std::fs::write(datadir.join("wallet.dat"), "wallet").unwrap();
    std::fs::write(datadir.join("testcoin.conf"), "server=1\n").unwrap();

    h.store
        .add_node(1, node_record("mn1", CHAIN, datadir.clone(), 1, daemon.port))
        .await
        .unwrap();

    h.manager.resync(1, "mn1").await.unwrap();

    assert!(!datadir.join("blocks").exists());
    assert!(!datadir.join("chainstate").exists());
    assert!(datadir.join("wallet.dat").exists());
    assert_eq!(daemon.calls(), vec!["stop"]);
}

#[tokio::test]
async fn test_restart_propagates_stop_failure() {
    let h = Harness::new(&["1.0.0"]).await;
    h.store
        .add_node(1, node_record("mn1", CHAIN, h.base().join("mn1"), 1, free_port()))
        .await
        .unwrap();

    assert!(h.manager.restart(1, "mn1").await.unwrap_err().is_rpc());
}

#[tokio::test]
async fn test_daemon_path_resolution() {
    let h = Harness::new(&["1.0.0"]).await;
    let chain = h.manager.registry().get(CHAIN).unwrap();

    // Cached and present: reused as is
    let cached = h.base().join("custom/testcoind");
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, "#!/bin/sh\n").unwrap();

    let mut node = node_record("mn1", CHAIN, h.base().join("mn1"), 1, 2);
    node.daemon_path = Some(cached.clone());
    h.store.add_node(1, node.clone()).await.unwrap();

    let resolved = h.manager.resolve_daemon_path(1, &node, chain.as_ref()).await.unwrap();
    assert_eq!(resolved, cached);
    assert!(!h.bin_dir("1.0.0").exists());

    // Stale: falls through to search, installs and caches the new path
    std::fs::remove_file(&cached).unwrap();
    let resolved = h.manager.resolve_daemon_path(1, &node, chain.as_ref()).await.unwrap();
    assert!(resolved.starts_with(h.bin_dir("1.0.0")));
    assert_eq!(
        h.store.get_node(1, "mn1").await.unwrap().daemon_path,
        Some(resolved.clone())
    );

    // Found case-insensitively, and made executable
    let upper = h.bin_dir("1.0.0").join("nested/TESTCOIND");
    std::fs::remove_dir_all(h.bin_dir("1.0.0")).unwrap();
    std::fs::create_dir_all(upper.parent().unwrap()).unwrap();
    std::fs::write(&upper, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&upper, std::fs::Permissions::from_mode(0o644)).unwrap();

    node.daemon_path = None;
    let resolved = h.manager.resolve_daemon_path(1, &node, chain.as_ref()).await.unwrap();
    assert_eq!(resolved, upper);
    let mode = std::fs::metadata(&upper).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[tokio::test]
async fn test_daemon_not_found_after_install() {
    let archive = tar_gz(&[("readme.txt", &b"no daemon here"[..], 0o644)]);
    let releases = ReleaseServer::start(vec![("core.tar.gz".to_string(), archive.clone())]).await;

    let mut table = std::collections::BTreeMap::new();
    table.insert(
        "1.0.0".to_string(),
        asset_for_all(&releases.url("core.tar.gz"), &sha256(&archive)),
    );

    let settings = nodewarden::Settings {
        chains: vec![test_chain(table)],
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(nodewarden::MemoryNodeStore::new());
    let manager = nodewarden::NodeManager::new(&settings, dir.path(), store.clone());

    let node = node_record("mn1", CHAIN, dir.path().join("mn1"), 1, 2);
    store.add_node(1, node.clone()).await.unwrap();

    let chain = manager.registry().get(CHAIN).unwrap();
    let err = manager
        .resolve_daemon_path(1, &node, chain.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::DaemonNotFound(name) if name == DAEMON));
}

#[tokio::test]
async fn test_update_core() {
    let h = Harness::new(&["1.0.0", "1.1.0"]).await;
    let daemon = MockDaemon::start().await;
    daemon.respond("stop", json!(null));

    let datadir = h.base().join("nodes/1/mn1");
    std::fs::create_dir_all(&datadir).unwrap();

    let mut node = node_record("mn1", CHAIN, datadir, 1, daemon.port);
    node.daemon_path = Some(PathBuf::from("/nonexistent/testcoind"));
    h.store.add_node(1, node).await.unwrap();

    let check = h.manager.check_for_update(1, "mn1").await.unwrap();
    assert_eq!(check.latest, "1.1.0");
    assert_eq!(check.current.as_deref(), Some("1.0.0"));
    assert!(check.update_available);

    assert!(h.manager.update_node_core(1, "mn1").await.unwrap());

    let updated = h.store.get_node(1, "mn1").await.unwrap();
    assert_eq!(updated.core_version.as_deref(), Some("1.1.0"));
    assert!(updated.daemon_path.unwrap().starts_with(h.bin_dir("1.1.0")));
    assert_eq!(daemon.calls(), vec!["stop"]);

    assert!(!h.manager.check_for_update(1, "mn1").await.unwrap().update_available);
    assert!(!h.manager.update_node_core(1, "mn1").await.unwrap());
    assert_eq!(daemon.calls().len(), 1);
}
