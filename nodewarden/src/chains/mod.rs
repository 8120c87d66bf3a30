//! Built-in chain definitions

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chain::{ArchiveKind, ChainPlugin, ReleaseAsset};

pub mod dogecash;
pub mod pivx;
pub mod zenzo;

/// Chains available without any configuration
pub fn builtin() -> Vec<Arc<dyn ChainPlugin>> {
    vec![
        Arc::new(pivx::chain()),
        Arc::new(dogecash::chain()),
        Arc::new(zenzo::chain()),
    ]
}

fn asset(url: &str, sha256: &str, archive: ArchiveKind) -> ReleaseAsset {
    ReleaseAsset {
        url: url.to_string(),
        sha256: sha256.to_string(),
        archive,
    }
}

/// Linux tarballs following the usual gitian naming scheme
///
/// Checksums are given as `[x86_64, arm, aarch64]`.
fn linux_releases(base: &str, prefix: &str, sha256: [&str; 3]) -> BTreeMap<String, ReleaseAsset> {
    let targets = [
        ("linux-x64", "x86_64-linux-gnu"),
        ("linux-arm", "arm-linux-gnueabihf"),
        ("linux-arm64", "aarch64-linux-gnu"),
    ];

    targets
        .iter()
        .zip(sha256)
        .map(|((key, triple), hash)| {
            let url = format!("{}/{}-{}.tar.gz", base, prefix, triple);
            (key.to_string(), asset(&url, hash, ArchiveKind::TarGz))
        })
        .collect()
}
