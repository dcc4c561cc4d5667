pub mod github;
pub mod release;

pub use github::GithubReleases;
pub use release::{version_from_url, Release, ReleaseSource, Transfer};

use crate::config::schema::{AppProfile, CacheRecord, DownloadConfig};
use crate::error::{RecoveryError, Result};
use std::path::{Path, PathBuf};

/// Whether a cached archive may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Reuse the cached archive when it matches the latest release
    PreferCache,
    /// Always download
    ForceLatest,
}

impl CachePolicy {
    #[must_use]
    pub const fn from_latest_flag(latest: bool) -> Self {
        if latest {
            Self::ForceLatest
        } else {
            Self::PreferCache
        }
    }
}

/// Archive to extract and how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub archive_path: PathBuf,
    pub version: Option<String>,
    /// False when the cached archive was reused
    pub transferred: bool,
}

impl FetchOutcome {
    /// Cache record to persist after this fetch
    #[must_use]
    pub fn cache_record(&self, previous: &CacheRecord) -> CacheRecord {
        if !self.transferred {
            return CacheRecord {
                version: self.version.clone().or_else(|| previous.version.clone()),
                archive_path: Some(self.archive_path.clone()),
                downloaded_at: previous.downloaded_at.clone(),
            };
        }
        CacheRecord {
            version: self.version.clone(),
            archive_path: Some(self.archive_path.clone()),
            downloaded_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Fetches the release archive, reusing a cached copy when allowed
pub struct Downloader<'a> {
    source: &'a dyn ReleaseSource,
    config: &'a DownloadConfig,
    profile: &'a AppProfile,
}

impl<'a> Downloader<'a> {
    #[must_use]
    pub const fn new(
        source: &'a dyn ReleaseSource,
        config: &'a DownloadConfig,
        profile: &'a AppProfile,
    ) -> Self {
        Self {
            source,
            config,
            profile,
        }
    }

    /// Archive already on disk, preferring the recorded location over `dest`
    #[must_use]
    pub fn cached_archive(cache: &CacheRecord, dest: &Path) -> Option<PathBuf> {
        cache
            .archive_path
            .as_deref()
            .filter(|p| p.is_file())
            .or_else(|| dest.is_file().then_some(dest))
            .map(Path::to_path_buf)
    }

    /// Return a usable archive, downloading into `dest` when needed
    ///
    /// With `PreferCache` only release metadata is fetched when the cached
    /// archive's version equals the latest release. A cached archive is also
    /// reused when the latest release cannot be determined.
    ///
    /// # Errors
    /// - `RecoveryError::Network` if the download fails or stays truncated
    pub async fn fetch(
        &self,
        policy: CachePolicy,
        cache: &CacheRecord,
        dest: &Path,
    ) -> Result<FetchOutcome> {
        let latest = match self.source.latest_release().await {
            Ok(release) => Some(release),
            Err(e) => {
                tracing::warn!("Could not determine latest release: {e}");
                None
            }
        };

        if policy == CachePolicy::PreferCache {
            if let Some(cached) = Self::cached_archive(cache, dest) {
                let cached_version = cache
                    .version
                    .clone()
                    .or_else(|| version_from_url(&self.profile.fallback_url));
                match &latest {
                    None => {
                        tracing::warn!(
                            "Using cached archive {} (version {}) without checking for updates",
                            cached.display(),
                            cached_version.as_deref().unwrap_or("unknown")
                        );
                        return Ok(FetchOutcome {
                            archive_path: cached,
                            version: cached_version,
                            transferred: false,
                        });
                    }
                    Some(release) if cached_version.as_deref() == Some(release.version.as_str()) => {
                        tracing::info!(
                            "Using cached archive {} (version {} is the latest)",
                            cached.display(),
                            release.version
                        );
                        return Ok(FetchOutcome {
                            archive_path: cached,
                            version: cached_version,
                            transferred: false,
                        });
                    }
                    Some(release) => {
                        tracing::info!("{}", "=".repeat(60));
                        tracing::info!("NEW VERSION AVAILABLE!");
                        tracing::info!("Current: {}", cached_version.as_deref().unwrap_or("unknown"));
                        tracing::info!("Latest:  {}", release.version);
                        tracing::info!("{}", "=".repeat(60));
                    }
                }
            }
        }

        let (url, version, size) = match latest {
            Some(release) => {
                tracing::info!("Downloading latest version: {}", release.version);
                (release.url, Some(release.version), release.size)
            }
            None => {
                tracing::warn!("Falling back to configured URL {}", self.profile.fallback_url);
                (
                    self.profile.fallback_url.clone(),
                    version_from_url(&self.profile.fallback_url),
                    None,
                )
            }
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
            if let Some(size) = size {
                check_disk_space(parent, size)?;
            }
        }

        self.download_verified(&url, dest).await?;
        Ok(FetchOutcome {
            archive_path: dest.to_path_buf(),
            version,
            transferred: true,
        })
    }

    /// Download and compare the file size with the advertised length,
    /// re-downloading a truncated file
    async fn download_verified(&self, url: &str, dest: &Path) -> Result<()> {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            tracing::info!("Download attempt {attempt}/{attempts}: {url}");
            let transfer = match self.source.download(url, dest, attempt > 1).await {
                Ok(transfer) => transfer,
                Err(e @ RecoveryError::Network(_)) if attempt < attempts => {
                    tracing::warn!("Download attempt {attempt} failed: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let actual = tokio::fs::metadata(dest).await?.len();

            match transfer.expected_len {
                Some(expected) if actual != expected => {
                    tracing::warn!(
                        "Download incomplete. Expected {expected} bytes, got {actual}"
                    );
                    if actual > expected {
                        tokio::fs::remove_file(dest).await?;
                    }
                }
                _ => {
                    tracing::info!(
                        "Download complete: {} ({})",
                        dest.display(),
                        format_bytes(actual)
                    );
                    return Ok(());
                }
            }
        }

        Err(RecoveryError::Network(format!(
            "Download of {url} still incomplete after {attempts} attempts"
        )))
    }
}

/// Check if enough disk space is available
#[cfg(unix)]
fn check_disk_space(dir: &Path, required_bytes: u64) -> Result<()> {
    let stats = nix::sys::statvfs::statvfs(dir)
        .map_err(|e| RecoveryError::Config(format!("Failed to check disk space: {e}")))?;

    #[allow(clippy::unnecessary_cast)]
    let available_bytes = stats.blocks_available() as u64 * stats.fragment_size() as u64;

    // Add 100MB buffer for safety
    let required_with_buffer = required_bytes + (100 * 1_024 * 1_024);

    if available_bytes < required_with_buffer {
        return Err(RecoveryError::Config(format!(
            "Not enough disk space in {}: {} required, {} available",
            dir.display(),
            format_bytes(required_with_buffer),
            format_bytes(available_bytes)
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn check_disk_space(_dir: &Path, _required_bytes: u64) -> Result<()> {
    Ok(())
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
