//! ZENZO

use std::collections::BTreeMap;

use super::{asset, linux_releases};
use crate::chain::{ArchiveKind, DaemonNames, PortPair, RpcAliases, StandardChain};

/// Seed peers shipped in every zenzo config
const SEED_PEERS: &[&str] = &[
    "109.132.146.48",
    "109.205.181.156",
    "128.0.222.192",
    "135.181.183.38",
    "144.91.100.97",
    "144.91.106.129",
    "144.91.107.207",
    "144.91.88.42",
    "161.97.127.55",
    "161.97.132.198",
    "161.97.166.81",
    "161.97.78.108",
    "161.97.79.101",
    "161.97.87.227",
    "161.97.97.43",
    "164.68.102.142",
    "164.68.102.158",
    "164.68.102.161",
    "164.68.102.162",
    "164.68.120.4",
    "164.68.124.2",
    "164.68.96.52",
    "167.86.109.168",
    "167.86.110.243",
    "167.86.111.155",
    "167.86.122.207",
    "167.86.124.240",
    "167.86.124.249",
    "167.86.67.217",
    "167.86.67.228",
    "167.86.89.215",
    "167.86.91.175",
    "167.86.95.121",
    "173.212.204.201",
    "173.212.204.94",
    "173.212.208.86",
    "173.212.209.163",
    "173.212.223.176",
    "173.212.234.14",
    "173.212.236.11",
    "173.212.239.223",
    "173.212.243.102",
    "173.212.251.138",
    "173.212.252.99",
    "173.212.253.129",
    "173.249.23.100",
    "173.249.25.155",
    "173.249.40.165",
    "178.18.244.204",
    "178.18.251.166",
    "185.135.137.92",
    "185.197.251.144",
    "185.197.251.146",
    "185.197.251.148",
    "185.249.225.155",
    "188.40.92.108",
    "207.180.204.7",
    "207.180.205.241",
    "207.180.253.183",
    "207.180.254.111",
    "209.182.216.217",
    "209.182.218.57",
    "213.136.75.61",
    "213.136.85.58",
    "213.136.88.100",
    "38.242.150.174",
    "38.242.151.69",
    "38.242.198.233",
    "38.242.204.134",
    "38.242.214.125",
    "38.242.214.141",
    "38.242.217.51",
    "5.182.33.47",
    "5.189.135.33",
    "5.189.158.224",
    "5.189.171.173",
    "51.77.116.109",
    "62.171.131.253",
    "62.171.144.144",
    "62.171.145.199",
    "62.171.147.162",
    "62.171.154.116",
    "62.171.158.197",
    "62.171.158.199",
    "62.171.164.249",
    "62.171.181.40",
    "62.171.182.92",
    "62.171.187.168",
    "62.171.190.139",
    "75.119.139.78",
    "75.119.153.109",
    "75.119.153.169",
    "75.119.153.170",
    "82.74.118.16",
    "86.48.3.82",
    "89.187.90.8",
    "95.111.230.134",
    "95.111.236.157",
    "[2a02:c207:2037:2792::1001]:26210",
    "[2a02:c207:2037:2792::1002]:26210",
    "[2a02:c207:2037:2792::1003]:26210",
    "[2a02:c207:2037:2792::1004]:26210",
    "[2a02:c207:2037:2792::1005]:26210",
    "[2a02:c207:2037:2792::1006]:26210",
    "[2a02:c207:2037:2792::1007]:26210",
    "[2a02:c207:2037:2792::1008]:26210",
    "[2a02:c207:2037:2792::1009]:26210",
    "[2a02:c207:2037:2792::1010]:26210",
    "[2a02:c207:2037:2792::1011]:26210",
    "[2a02:c207:2037:2792::1012]:26210",
    "[2a02:c207:2037:2792::1013]:26210",
    "[2a02:c207:2037:2792::1014]:26210",
    "[2a02:c207:2037:2792::1015]:26210",
    "[2a02:c207:2037:2792::1016]:26210",
    "[2a02:c207:2037:2792::1017]:26210",
    "[2a02:c207:2037:2792::1018]:26210",
    "[2a02:c207:2037:2792::1019]:26210",
    "[2a02:c207:2037:2792::1020]:26210",
    "[2a02:c207:2037:2792::1021]:26210",
    "[2a02:c207:2037:2792::1022]:26210",
    "[2a02:c207:2037:2792::1023]:26210",
    "[2a02:c207:2037:2792::1024]:26210",
    "[2a02:c207:2037:2792::1025]:26210",
    "[2a02:c207:2037:2792::1026]:26210",
    "[2a02:c207:2037:2792::1027]:26210",
    "[2a02:c207:2037:2792::1028]:26210",
    "[2a02:c207:2037:2792::1029]:26210",
    "[2a02:c207:2037:2792::1030]:26210",
    "164.68.120.4:26210",
    "185.194.217.23:26210",
    "[2605:a140:2184:6619:267d::6]:26210",
    "[2605:a142:2073:5573:b564::5]:26210",
    "161.97.182.56:26210",
    "[2001:470:1f09:a53:0:400:5:1]:26210",
    "[2a02:c207:2241:4754:1e33::5]:26210",
    "178.45.84.15:26210",
    "[2a02:c202:2191:1859:7888::3]:26210",
    "[2607:5300:201:3100::935d]:26210",
    "144.217.84.156:26210",
    "144.91.80.84",
    "207.180.246.118",
    "185.215.165.58",
    "62.171.183.112",
];

const BASE: &str = "https://github.com/ZENZO-Ecosystem/ZENZO-Core/releases/download/v2.1.0";

pub fn chain() -> StandardChain {
    let mut v2_1_0 = linux_releases(
        BASE,
        "zenzo-2.1.0",
        [
            "1f3a85d2344bd92255b438a15ed4fd04398b5a78e0ee42133798ff49a554e72d",
            "6e6b2fc49bedb04d0230de2880c8e122e6a3ab622243a7732fe595d3dbcec07c",
            "f613022307e1af7e95cf91e6940c1ad62f74b1beafcee9645b89ac43e3c4f963",
        ],
    );
    v2_1_0.insert(
        "win32-x64".to_string(),
        asset(
            &format!("{}/zenzo-2.1.0-win64.zip", BASE),
            "b57a994a236ee915443b0b7d4f19bb338235cd94e2ce9e99baf9d065b7abd6da",
            ArchiveKind::Zip,
        ),
    );

    let mut releases = BTreeMap::new();
    releases.insert("2.1.0".to_string(), v2_1_0);

    StandardChain {
        id: "zenzo".to_string(),
        name: "Zenzo".to_string(),
        symbol: "ZNZ".to_string(),
        daemon: DaemonNames {
            win32: "zenzod.exe".to_string(),
            linux: "zenzod".to_string(),
            darwin: None,
        },
        default_ports: PortPair { p2p: 26210, rpc: 26211 },
        releases,
        extra_config: SEED_PEERS
            .iter()
            .map(|peer| format!("addnode={}", peer))
            .collect(),
        rpc: RpcAliases {
            masternode_status: Some("getmasternodestatus".to_string()),
            ..RpcAliases::default()
        },
    }
}
