//! UTS release download, checksum verification, and archive extraction.
//!
//! Interface collaborator for the sync pipeline: given a release tag it
//! yields the path of an extracted `META/` directory, downloading and
//! unpacking the release archive only when it is not already present.

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use md5::{Digest, Md5};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use umls_sync_core::ReleaseVersion;

const RELEASE_API_URL: &str = "https://uts-ws.nlm.nih.gov/releases";
const DOWNLOAD_API_URL: &str = "https://uts-ws.nlm.nih.gov/download";

/// Whole-archive download attempts before giving up. Checksum mismatches are
/// never retried: a corrupt release on the server will not heal itself.
const DOWNLOAD_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("UTS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("UMLS release '{version}' not found via the UTS API; available: {available:?}")]
    ReleaseNotFound {
        version: String,
        available: Vec<String>,
    },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("failed to extract release archive: {0}")]
    Archive(String),

    #[error("archive did not contain a META directory at {0}")]
    MissingMeta(PathBuf),

    #[error("download I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ReleaseCatalog {
    #[serde(default)]
    result: Vec<ReleaseInfo>,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    name: String,
    #[serde(rename = "downloadUrl")]
    download_url: String,
    md5: Option<String>,
}

/// Downloads and unpacks UMLS full releases from the UTS API.
pub struct UtsDownloader {
    api_key: String,
    download_dir: PathBuf,
    client: reqwest::Client,
    show_progress: bool,
}

impl UtsDownloader {
    pub fn new(api_key: impl Into<String>, download_dir: impl Into<PathBuf>, show_progress: bool) -> Self {
        UtsDownloader {
            api_key: api_key.into(),
            download_dir: download_dir.into(),
            client: reqwest::Client::new(),
            show_progress,
        }
    }

    /// Yield the extracted `META/` directory for `version`, downloading the
    /// release archive when it is not already unpacked. Idempotent: an
    /// existing `META/` short-circuits everything.
    pub async fn fetch_meta_dir(&self, version: &ReleaseVersion) -> Result<PathBuf, DownloadError> {
        let release_dir = self.download_dir.join(version.as_str());
        let meta_dir = release_dir.join("META");
        if meta_dir.is_dir() {
            info!(version = %version, dir = %release_dir.display(), "release already extracted, skipping download");
            return Ok(meta_dir);
        }

        let release = self.release_info(version).await?;
        let zip_name = release
            .download_url
            .rsplit('/')
            .next()
            .unwrap_or("umls-release.zip")
            .to_string();
        let zip_path = self.download_dir.join(&zip_name);
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let mut attempt = 1u32;
        let actual_md5 = loop {
            match self.download_archive(&release.download_url, &zip_path).await {
                Ok(digest) => break digest,
                Err(DownloadError::Http(e)) if attempt < DOWNLOAD_ATTEMPTS => {
                    warn!(attempt, error = %e, "archive download failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(5 * u64::from(attempt)))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        match release.md5 {
            Some(expected) if !expected.is_empty() => {
                if !expected.eq_ignore_ascii_case(&actual_md5) {
                    tokio::fs::remove_file(&zip_path).await.ok();
                    return Err(DownloadError::ChecksumMismatch {
                        file: zip_name,
                        expected,
                        actual: actual_md5,
                    });
                }
                info!("checksum verified");
            }
            _ => warn!("no MD5 checksum in release metadata, skipping verification"),
        }

        extract_archive(&zip_path, &release_dir).await?;
        tokio::fs::remove_file(&zip_path).await?;

        if !meta_dir.is_dir() {
            return Err(DownloadError::MissingMeta(meta_dir));
        }
        Ok(meta_dir)
    }

    async fn release_info(&self, version: &ReleaseVersion) -> Result<ReleaseInfo, DownloadError> {
        info!(version = %version, "querying UTS release catalog");
        let catalog: ReleaseCatalog = self
            .client
            .get(RELEASE_API_URL)
            .query(&[("releaseType", "umls-full-release")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let available: Vec<String> = catalog.result.iter().map(|r| r.name.clone()).collect();
        catalog
            .result
            .into_iter()
            .find(|release| release.name == version.as_str())
            .ok_or_else(|| DownloadError::ReleaseNotFound {
                version: version.to_string(),
                available,
            })
    }

    /// Stream the archive to disk, hashing as it is written. Returns the
    /// hex MD5 of the downloaded bytes.
    async fn download_archive(
        &self,
        download_url: &str,
        zip_path: &Path,
    ) -> Result<String, DownloadError> {
        info!(url = %download_url, "downloading release archive");
        let response = self
            .client
            .get(DOWNLOAD_API_URL)
            .query(&[("url", download_url), ("apiKey", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let bar = if self.show_progress {
            let bar = ProgressBar::new(response.content_length().unwrap_or(0));
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})",
                )
                .expect("static template")
                .progress_chars("=> "),
            );
            bar.set_message("downloading");
            Some(bar)
        } else {
            None
        };

        let mut file = tokio::fs::File::create(zip_path).await?;
        let mut hasher = Md5::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            if let Some(bar) = &bar {
                bar.inc(chunk.len() as u64);
            }
        }
        file.flush().await?;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        Ok(hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect())
    }
}

/// Unpack the zip on a blocking thread; archive decompression is CPU-bound.
async fn extract_archive(zip_path: &Path, dest: &Path) -> Result<(), DownloadError> {
    let zip_path = zip_path.to_path_buf();
    let dest = dest.to_path_buf();
    info!(dest = %dest.display(), "extracting release archive");
    tokio::task::spawn_blocking(move || -> Result<(), DownloadError> {
        std::fs::create_dir_all(&dest)?;
        let file = std::fs::File::open(&zip_path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| DownloadError::Archive(e.to_string()))?;
        archive
            .extract(&dest)
            .map_err(|e| DownloadError::Archive(e.to_string()))
    })
    .await
    .map_err(|e| DownloadError::Archive(format!("extraction task failed: {e}")))?
}
