//! Release archive installation

use libwarden_platform::{host_description, PlatformKey};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive::{extract_archive, verify_sha256, Downloader};
use crate::chain::ChainPlugin;
use crate::error::{Result, WardenError};

/// Fetches, verifies and unpacks chain core releases under `<base>/cores`
#[derive(Clone)]
pub struct Installer {
    cores_dir: PathBuf,
    downloader: Downloader,
    verify: bool,
    platform: Option<PlatformKey>,
}

impl Installer {
    pub fn new(base_dir: &Path, downloader: Downloader, verify: bool) -> Self {
        Self {
            cores_dir: base_dir.join("cores"),
            downloader,
            verify,
            platform: PlatformKey::detect(),
        }
    }

    /// Override the detected platform key
    pub fn with_platform(mut self, platform: Option<PlatformKey>) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> Result<PlatformKey> {
        self.platform
            .ok_or_else(|| WardenError::UnsupportedPlatform(host_description()))
    }

    /// `<base>/cores/<chain>/<version>`
    pub fn core_dir(&self, chain_id: &str, version: &str) -> PathBuf {
        self.cores_dir.join(chain_id).join(version)
    }

    /// Directory the release archive is extracted into
    pub fn bin_dir(&self, chain_id: &str, version: &str) -> PathBuf {
        self.core_dir(chain_id, version).join("bin")
    }

    /// Download, verify and extract `version` of `chain`
    ///
    /// Always re-downloads and overwrites in place. Returns the extraction
    /// directory.
    pub async fn install(&self, chain: &dyn ChainPlugin, version: &str) -> Result<PathBuf> {
        let platform = self.platform()?;
        let asset = chain.release(version, platform).ok_or_else(|| {
            WardenError::NoReleaseForPlatform {
                chain: chain.id().to_string(),
                version: version.to_string(),
                platform: platform.to_string(),
            }
        })?;

        info!("Installing {} {} for {}", chain.id(), version, platform);

        let core_dir = self.core_dir(chain.id(), version);
        let archive = core_dir.join(format!(
            "core-{}.{}",
            platform,
            asset.archive.extension()
        ));

        self.downloader.download_to_file(&asset.url, &archive).await?;

        if self.verify {
            if let Err(e) = verify_sha256(&archive, &asset.sha256).await {
                let _ = tokio::fs::remove_file(&archive).await;
                return Err(e);
            }
        } else {
            warn!("Skipping checksum verification for {}", archive.display());
        }

        let bin_dir = self.bin_dir(chain.id(), version);
        extract_archive(&archive, &bin_dir, asset.archive).await?;

        info!("Installed {} {} into {}", chain.id(), version, bin_dir.display());
        Ok(bin_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_chain;

    fn installer(base: &Path) -> Installer {
        Installer::new(base, Downloader::new(false), true)
    }

    #[test]
    fn test_layout() {
        let installer = installer(Path::new("/srv/nw"));
        assert_eq!(
            installer.bin_dir("pivx", "5.6.1"),
            PathBuf::from("/srv/nw/cores/pivx/5.6.1/bin")
        );
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let dir = tempfile::tempdir().unwrap();
        let chain = test_chain("coin", &["1.0.0"]);

        let err = installer(dir.path())
            .with_platform(None)
            .install(&chain, "1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::UnsupportedPlatform(_)));
    }

    #[tokio::test]
    async fn test_missing_release() {
        let dir = tempfile::tempdir().unwrap();
        let chain = test_chain("coin", &["1.0.0"]);

        let err = installer(dir.path())
            .with_platform(Some(PlatformKey::LinuxArm))
            .install(&chain, "1.0.0")
            .await
            .unwrap_err();

        match err {
            WardenError::NoReleaseForPlatform { chain, version, platform } => {
                assert_eq!(chain, "coin");
                assert_eq!(version, "1.0.0");
                assert_eq!(platform, "linux-arm");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
