//! Orchestrator settings

use libwarden_platform::{HostEnvironment, PANEL_HOME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chain::{ChainRegistry, StandardChain};
use crate::error::{Result, WardenError};

/// Environment variable overriding the base directory
pub const BASEDIR_ENV: &str = "NODEWARDEN_BASEDIR";

/// Environment variable disabling release checksum verification when `1`
pub const SKIP_VERIFY_ENV: &str = "SKIP_VERIFY";

/// Settings file name inside the base directory
pub const SETTINGS_FILE: &str = "nodewarden.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root for installed cores, node data and the node store
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Skip SHA-256 verification of release archives
    #[serde(default)]
    pub skip_verify: bool,

    /// Readiness poll window after node creation (seconds)
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Readiness poll interval (milliseconds)
    #[serde(default = "default_ready_interval")]
    pub ready_interval_ms: u64,

    /// Upper bound on a single daemon RPC request (seconds)
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Render download progress bars
    #[serde(default)]
    pub show_progress: bool,

    /// Additional or overriding chain definitions
    #[serde(default)]
    pub chains: Vec<StandardChain>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: None,
            skip_verify: false,
            ready_timeout_secs: default_ready_timeout(),
            ready_interval_ms: default_ready_interval(),
            rpc_timeout_secs: default_rpc_timeout(),
            show_progress: false,
            chains: Vec::new(),
        }
    }
}

fn default_ready_timeout() -> u64 {
    15
}

fn default_ready_interval() -> u64 {
    1000
}

fn default_rpc_timeout() -> u64 {
    30
}

impl Settings {
    /// Fold `NODEWARDEN_BASEDIR` and `SKIP_VERIFY` into the settings
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = get(BASEDIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_dir = Some(PathBuf::from(dir));
        }

        if get(SKIP_VERIFY_ENV).as_deref().map(str::trim) == Some("1") {
            self.skip_verify = true;
        }
    }

    /// Resolve the base directory for the detected host environment
    pub fn resolve_base_dir(&self) -> Result<PathBuf> {
        resolve_base_dir(self.base_dir.as_deref(), HostEnvironment::detect(), dirs::home_dir())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs.max(1))
    }

    /// Built-in chains plus the ones defined here
    pub fn registry(&self) -> ChainRegistry {
        let mut registry = ChainRegistry::with_builtins();
        for chain in &self.chains {
            registry.register(Arc::new(chain.clone()));
        }
        registry
    }
}

/// Pick the base directory: explicit value, panel home, then the user home
///
/// A plain container without an explicit directory is refused since nothing
/// under it is known to survive a restart.
pub fn resolve_base_dir(
    explicit: Option<&Path>,
    environment: HostEnvironment,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    match environment {
        HostEnvironment::PanelHosted => Ok(Path::new(PANEL_HOME).join(".nodewarden")),
        HostEnvironment::Container => Err(WardenError::Config(format!(
            "running in a container without a persistent base directory; set {} or base_dir",
            BASEDIR_ENV
        ))),
        HostEnvironment::Native => home
            .map(|home| home.join(".nodewarden"))
            .ok_or_else(|| WardenError::Config("cannot determine home directory".to_string())),
    }
}

/// Load settings from `path`, falling back to defaults if it does not exist
pub async fn load_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        let contents = tokio::fs::read_to_string(path).await?;
        let settings = parse_settings(&contents)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    } else {
        info!("No settings file found, using defaults");
        Ok(Settings::default())
    }
}

pub fn parse_settings(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| WardenError::Config(e.to_string()))
}
