//! Daemon config file materialization

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::chain::ChainPlugin;
use crate::error::Result;
use crate::node::NodeConfig;

/// Render and persist `<datadir>/<chain>.conf` for a node
///
/// The file carries the RPC credentials and the masternode key, so it is
/// always left readable by the owner only.
pub async fn write_config(chain: &dyn ChainPlugin, node: &NodeConfig) -> Result<PathBuf> {
    let mut contents = chain.render_config(node).trim().to_string();
    contents.push('\n');

    tokio::fs::create_dir_all(&node.datadir).await?;

    let path = node.conf_path();
    write_private(&path, contents.as_bytes()).await?;

    debug!("Wrote config {:?}", path);
    Ok(path)
}

#[cfg(unix)]
async fn write_private(path: &std::path::Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await?;

    // mode() only applies on creation
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_private(path: &std::path::Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Parse `key=value` lines, skipping blanks and `#` comments
///
/// Repeated keys keep the last value.
pub fn parse_config(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
