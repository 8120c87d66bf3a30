//! Chain-state snapshot bootstrap

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::archive::{blocking, extract_archive, Downloader};
use crate::chain::ArchiveKind;
use crate::error::Result;
use crate::node::NodeConfig;

/// Data directory subfolders a snapshot may replace
pub const CHAIN_DATA_DIRS: [&str; 2] = ["blocks", "chainstate"];

const SCRATCH_DIR: &str = "_snapshot_tmp";

/// Download `url` and swap its `blocks`/`chainstate` into the node's datadir
///
/// Returns the names of the replaced subdirectories. Scratch data is removed
/// whether or not extraction succeeded.
pub async fn apply_snapshot(
    downloader: &Downloader,
    node: &NodeConfig,
    url: &str,
) -> Result<Vec<String>> {
    let kind = ArchiveKind::from_url(url);
    let archive = node.datadir.join(format!("snapshot.{}", kind.extension()));
    let scratch = node.datadir.join(SCRATCH_DIR);

    info!("Applying snapshot {} to {}", url, node.id);

    remove_dir_if_exists(&scratch).await?;
    tokio::fs::create_dir_all(&node.datadir).await?;

    let result = replace_from_archive(downloader, node, url, &archive, &scratch, kind).await;

    let _ = tokio::fs::remove_file(&archive).await;
    let _ = remove_dir_if_exists(&scratch).await;

    let replaced = result?;
    info!("Snapshot replaced {:?} for {}", replaced, node.id);
    Ok(replaced)
}

async fn replace_from_archive(
    downloader: &Downloader,
    node: &NodeConfig,
    url: &str,
    archive: &Path,
    scratch: &Path,
    kind: ArchiveKind,
) -> Result<Vec<String>> {
    downloader.download_to_file(url, archive).await?;
    extract_archive(archive, scratch, kind).await?;

    let mut replaced = Vec::new();
    for name in CHAIN_DATA_DIRS {
        let src = scratch.join(name);
        if !src.is_dir() {
            debug!("Snapshot has no {} directory", name);
            continue;
        }

        let dest = node.datadir.join(name);
        remove_dir_if_exists(&dest).await?;
        move_dir(&src, &dest).await?;
        replaced.push(name.to_string());
    }

    Ok(replaced)
}

/// Remove the block and chain-state folders, forcing a resync
pub async fn clear_chain_data(datadir: &Path) -> Result<()> {
    for name in CHAIN_DATA_DIRS {
        remove_dir_if_exists(&datadir.join(name)).await?;
    }
    Ok(())
}

pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Rename `src` to `dest`, copying then removing across filesystems
async fn move_dir(src: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }

    debug!("Rename failed, copying {:?} to {:?}", src, dest);

    let from = src.to_path_buf();
    let to = dest.to_path_buf();
    blocking(move || copy_tree(&from, &to)).await?;
    remove_dir_if_exists(src).await
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let target: PathBuf = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
