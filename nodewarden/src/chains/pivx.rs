//! PIVX

use std::collections::BTreeMap;

use super::{asset, linux_releases};
use crate::chain::{ArchiveKind, DaemonNames, PortPair, RpcAliases, StandardChain};

const BASE: &str = "https://github.com/PIVX-Project/PIVX/releases/download/v5.6.1";

pub fn chain() -> StandardChain {
    let mut v5_6_1 = linux_releases(
        BASE,
        "pivx-5.6.1",
        [
            "6704625c63ff73da8c57f0fbb1dab6f1e4bd8f62c17467e05f52a64012a0ee2f",
            "f865dede694de837aa57f10096dbf99efdef1dda210433d5b33111aa81085074",
            "8f1c0243f8a21da6cce51b96c5317c425b9c50e3de2949b2e838ead11426b447",
        ],
    );
    v5_6_1.insert(
        "win32-x64".to_string(),
        asset(
            &format!("{}/pivx-5.6.1-win64.zip", BASE),
            "ae3a7896dee74600665af717fb5785f52be3e2f5cab3a57873020c66bdff54fc",
            ArchiveKind::Zip,
        ),
    );

    let mut releases = BTreeMap::new();
    releases.insert("5.6.1".to_string(), v5_6_1);

    StandardChain {
        id: "pivx".to_string(),
        name: "PIVX".to_string(),
        symbol: "PIVX".to_string(),
        daemon: DaemonNames {
            win32: "pivx-qt.exe".to_string(),
            linux: "pivxd".to_string(),
            darwin: None,
        },
        default_ports: PortPair { p2p: 51472, rpc: 51473 },
        releases,
        extra_config: Vec::new(),
        rpc: RpcAliases {
            masternode_status: Some("getmasternodestatus".to_string()),
            ..RpcAliases::default()
        },
    }
}
