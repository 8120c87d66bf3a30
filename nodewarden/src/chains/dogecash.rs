//! DogeCash

use std::collections::BTreeMap;

use super::{asset, linux_releases};
use crate::chain::{ArchiveKind, DaemonNames, PortPair, RpcAliases, StandardChain};

const BASE: &str = "https://github.com/dogecash/dogecash/releases/download/5.5.1";

pub fn chain() -> StandardChain {
    let mut v5_5_1 = linux_releases(
        BASE,
        "dogecash-5.5.1",
        [
            "deab49107e8930148e24bb922b3bef6f009e3709d425619ff0044d121d7a02ef",
            "5c94f91b5e948dddda151bf1379324428d7223abaeb072a406410f6cb155d4b0",
            "5882c0e2307775e7c257c6728bd4eeef7f0112b7e42181662df4a2ffbd20e10d",
        ],
    );
    v5_5_1.insert(
        "win32-x64".to_string(),
        asset(
            &format!("{}/dogecash-5.5.1-win64.zip", BASE),
            "5e470328ee68750a2f6e86f75c83cecaeac2ad973f5573b83dcb6e3156a91591",
            ArchiveKind::Zip,
        ),
    );

    let mut releases = BTreeMap::new();
    releases.insert("5.5.1".to_string(), v5_5_1);

    StandardChain {
        id: "dogecash".to_string(),
        name: "DogeCash".to_string(),
        symbol: "DOGEC".to_string(),
        daemon: DaemonNames {
            win32: "dogecash-qt.exe".to_string(),
            linux: "dogecashd".to_string(),
            darwin: None,
        },
        default_ports: PortPair { p2p: 22556, rpc: 22555 },
        releases,
        extra_config: Vec::new(),
        rpc: RpcAliases {
            masternode_status: Some("getmasternodestatus".to_string()),
            ..RpcAliases::default()
        },
    }
}
