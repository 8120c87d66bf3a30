//! Download, checksum and extraction primitives

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::chain::ArchiveKind;
use crate::error::{Result, WardenError};

/// HTTP downloader streaming straight to disk
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl Downloader {
    pub fn new(show_progress: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            show_progress,
        }
    }

    /// Fetch `url` into `dest`, creating parent directories
    ///
    /// Returns the number of bytes written.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let failed = |reason: String| WardenError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        info!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pb = self.progress_bar(response.content_length());
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }

        file.flush().await?;
        pb.finish_and_clear();

        debug!("Downloaded {} bytes to {:?}", written, dest);
        Ok(written)
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total.unwrap_or(0));
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Hex SHA-256 digest of a file
pub async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    blocking(move || {
        let mut hasher = Sha256::new();
        let mut file = std::fs::File::open(&path)?;
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
}

/// Compare a file's digest to `expected`, ignoring case
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(WardenError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum OK for {:?}", path);
    Ok(())
}

/// Unpack `archive` into `out_dir`, keeping nested paths
pub async fn extract_archive(archive: &Path, out_dir: &Path, kind: ArchiveKind) -> Result<()> {
    tokio::fs::create_dir_all(out_dir).await?;

    let archive_path = archive.to_path_buf();
    let dest = out_dir.to_path_buf();

    let result = blocking(move || match kind {
        ArchiveKind::TarGz => unpack_tar_gz(&archive_path, &dest),
        ArchiveKind::Zip => unpack_zip(&archive_path, &dest),
    })
    .await;

    result.map_err(|e| WardenError::ExtractFailed {
        path: archive.display().to_string(),
        reason: e.to_string(),
    })
}

fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let file = std::fs::File::open(archive)?;
    let mut ar = Archive::new(GzDecoder::new(file));
    ar.set_preserve_permissions(true);
    ar.unpack(dest)?;

    Ok(())
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut ar = zip::ZipArchive::new(file).map_err(|e| WardenError::ExtractFailed {
        path: archive.display().to_string(),
        reason: e.to_string(),
    })?;

    ar.extract(dest).map_err(|e| WardenError::ExtractFailed {
        path: archive.display().to_string(),
        reason: e.to_string(),
    })
}

/// Recursively search `root` for a file named `file_name`, ignoring case
pub async fn find_file(root: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let root = root.to_path_buf();
    let wanted = file_name.to_lowercase();

    blocking(move || {
        if !root.exists() {
            return Ok(None);
        }

        for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            if entry.file_type().is_file()
                && entry.file_name().to_string_lossy().to_lowercase() == wanted
            {
                return Ok(Some(entry.into_path()));
            }
        }

        Ok(None)
    })
    .await
}

/// Run blocking filesystem work off the async executor
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WardenError::Io(std::io::Error::other(e.to_string())))?
}

#[cfg(test)]
pub(crate) mod testutil {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::Path;

    /// Build a tar.gz from `(path, contents, mode)` entries
    pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let enc = GzEncoder::new(Vec::new(), Compression::default());
        let mut ar = tar::Builder::new(enc);

        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            ar.append_data(&mut header, path, *data).unwrap();
        }

        ar.into_inner().unwrap().finish().unwrap()
    }

    /// Build a zip from `(path, contents, mode)` entries
    pub fn zip(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));

        for (path, data, mode) in entries {
            let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
            writer.start_file(path.to_string(), options).unwrap();
            writer.write_all(data).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }

    pub fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, data).unwrap();
    }
}
