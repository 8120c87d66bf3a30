//! Detached daemon launch

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::error::{Result, WardenError};

/// Launch a daemon in the background and return its pid
///
/// The child is not supervised: readiness is observed through RPC and
/// shutdown goes through the daemon's `stop` method.
pub fn start_daemon(daemon_path: &Path, datadir: &Path, conf_path: &Path) -> Result<u32> {
    let mut cmd = Command::new(daemon_path);
    cmd.arg(format!("-datadir={}", datadir.display()))
        .arg(format!("-conf={}", conf_path.display()))
        .current_dir(datadir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    // Own process group, so a Ctrl-C at the orchestrator leaves it running
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| WardenError::SpawnFailed {
        path: daemon_path.display().to_string(),
        reason: e.to_string(),
    })?;

    let pid = child.id().unwrap_or_default();
    info!("Spawned {} (pid {})", daemon_path.display(), pid);

    Ok(pid)
}
