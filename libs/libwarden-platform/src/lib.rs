//! Platform detection for release selection
//!
//! Maps the host's OS and CPU architecture onto the platform keys used by
//! chain release tables, and classifies the runtime environment (native host,
//! hosting-panel container, plain container) for base directory selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// OS x architecture identifier of a prebuilt release archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlatformKey {
    #[serde(rename = "win32-x64")]
    Win32X64,
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "linux-arm")]
    LinuxArm,
    #[serde(rename = "linux-arm64")]
    LinuxArm64,
    #[serde(rename = "darwin-x64")]
    DarwinX64,
    #[serde(rename = "darwin-arm64")]
    DarwinArm64,
}

/// Operating system family, used to pick the daemon file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasePlatform {
    Win32,
    Linux,
    Darwin,
}

static PLATFORM_KEY: OnceLock<Option<PlatformKey>> = OnceLock::new();
static ENVIRONMENT: OnceLock<HostEnvironment> = OnceLock::new();

impl PlatformKey {
    pub const ALL: [PlatformKey; 6] = [
        PlatformKey::Win32X64,
        PlatformKey::LinuxX64,
        PlatformKey::LinuxArm,
        PlatformKey::LinuxArm64,
        PlatformKey::DarwinX64,
        PlatformKey::DarwinArm64,
    ];

    /// Detect the key of the running host, `None` if unsupported
    pub fn detect() -> Option<Self> {
        *PLATFORM_KEY.get_or_init(|| {
            Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
        })
    }

    /// Map Rust `target_os` / `target_arch` names onto a platform key
    pub fn from_os_arch(os: &str, arch: &str) -> Option<Self> {
        match (os, arch) {
            ("windows", "x86_64") => Some(PlatformKey::Win32X64),
            ("linux", "x86_64") => Some(PlatformKey::LinuxX64),
            ("linux", "arm") => Some(PlatformKey::LinuxArm),
            ("linux", "aarch64") => Some(PlatformKey::LinuxArm64),
            ("macos", "x86_64") => Some(PlatformKey::DarwinX64),
            ("macos", "aarch64") => Some(PlatformKey::DarwinArm64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKey::Win32X64 => "win32-x64",
            PlatformKey::LinuxX64 => "linux-x64",
            PlatformKey::LinuxArm => "linux-arm",
            PlatformKey::LinuxArm64 => "linux-arm64",
            PlatformKey::DarwinX64 => "darwin-x64",
            PlatformKey::DarwinArm64 => "darwin-arm64",
        }
    }

    pub fn base(&self) -> BasePlatform {
        match self {
            PlatformKey::Win32X64 => BasePlatform::Win32,
            PlatformKey::LinuxX64 | PlatformKey::LinuxArm | PlatformKey::LinuxArm64 => {
                BasePlatform::Linux
            }
            PlatformKey::DarwinX64 | PlatformKey::DarwinArm64 => BasePlatform::Darwin,
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown platform key: {}", s))
    }
}

/// Human-readable description of the running host for error messages
pub fn host_description() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Runtime environment of the orchestrator process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEnvironment {
    /// Bare metal or VM, user home directory is usable
    Native,
    /// Game-panel style container with a persistent `/home/container`
    PanelHosted,
    /// Docker or other container runtime with no known persistent volume
    Container,
}

impl HostEnvironment {
    /// Detect the current environment
    pub fn detect() -> Self {
        *ENVIRONMENT.get_or_init(|| {
            if detect_panel() {
                return HostEnvironment::PanelHosted;
            }

            if detect_container() {
                return HostEnvironment::Container;
            }

            HostEnvironment::Native
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostEnvironment::Native => "native",
            HostEnvironment::PanelHosted => "panel-hosted",
            HostEnvironment::Container => "container",
        }
    }
}

/// Persistent home of panel-hosted containers
pub const PANEL_HOME: &str = "/home/container";

fn detect_panel() -> bool {
    let by_env = ["PTERODACTYL_SERVER_UUID", "PTERODACTYL_SERVER_ID", "PTERODACTYL"]
        .iter()
        .any(|var| std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false));

    by_env || Path::new(PANEL_HOME).exists()
}

/// Detect container environment
fn detect_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    // Check cgroup for container indicators
    if let Ok(cgroup) = std::fs::read_to_string("/proc/1/cgroup") {
        if cgroup.contains("docker") || cgroup.contains("containerd") {
            return true;
        }
    }

    false
}
