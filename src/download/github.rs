use crate::config::schema::{AppProfile, DownloadConfig};
use crate::download::format_bytes;
use crate::download::release::{Release, ReleaseSource, Transfer};
use crate::error::{RecoveryError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GhRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GhAsset>,
}

#[derive(Debug, Deserialize)]
struct GhAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Releases published on GitHub
pub struct GithubReleases {
    client: reqwest::Client,
    repo: String,
    asset_name: String,
}

impl std::fmt::Debug for GithubReleases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubReleases")
            .field("client", &"Client { ... }")
            .field("repo", &self.repo)
            .field("asset_name", &self.asset_name)
            .finish()
    }
}

impl GithubReleases {
    /// Create a client for the repository and asset named in the app profile
    pub fn new(profile: &AppProfile, config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RecoveryError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            repo: profile.release_repo.clone(),
            asset_name: profile.asset_name.clone(),
        })
    }

    fn pick_asset(&self, release: GhRelease) -> Result<Release> {
        let asset = release
            .assets
            .into_iter()
            .find(|a| a.name == self.asset_name)
            .ok_or_else(|| {
                RecoveryError::Network(format!(
                    "Release {} of {} has no asset named {}",
                    release.tag_name, self.repo, self.asset_name
                ))
            })?;

        Ok(Release {
            version: release.tag_name,
            url: asset.browser_download_url,
            size: asset.size,
        })
    }
}

fn network_error(context: &str, e: &reqwest::Error) -> RecoveryError {
    if e.is_connect() {
        RecoveryError::Network(format!("{context}: network unreachable: {e}"))
    } else if e.is_timeout() {
        RecoveryError::Network(format!("{context}: request timed out: {e}"))
    } else {
        RecoveryError::Network(format!("{context}: {e}"))
    }
}

fn progress_bar(total: Option<u64>, position: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total.unwrap_or(0));
    let style = ProgressStyle::with_template(
        "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar.set_position(position);
    bar
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_release(&self) -> Result<Release> {
        let url = format!("{API_BASE}/repos/{}/releases/latest", self.repo);
        tracing::debug!("Querying latest release: {url}");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| network_error("Failed to query latest release", &e))?;

        if !response.status().is_success() {
            return Err(RecoveryError::Network(format!(
                "Latest release query returned HTTP {}",
                response.status()
            )));
        }

        let release: GhRelease = response
            .json()
            .await
            .map_err(|e| network_error("Failed to parse release metadata", &e))?;

        self.pick_asset(release)
    }

    async fn download(&self, url: &str, dest: &Path, resume: bool) -> Result<Transfer> {
        let existing = if resume {
            tokio::fs::metadata(dest).await.map_or(0, |m| m.len())
        } else {
            0
        };

        let mut request = self.client.get(url);
        if existing > 0 {
            tracing::info!("Resuming download from byte {existing}");
            request = request.header(header::RANGE, format!("bytes={existing}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| network_error(&format!("Failed to download {url}"), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecoveryError::Network(format!(
                "Download of {url} returned HTTP {status}"
            )));
        }

        let resumed = existing > 0 && status == StatusCode::PARTIAL_CONTENT;
        if existing > 0 && !resumed {
            tracing::warn!("Server doesn't support resuming, restarting download");
        }
        let start = if resumed { existing } else { 0 };
        let expected_len = response.content_length().map(|len| len + start);

        let mut file = if resumed {
            OpenOptions::new().append(true).open(dest).await?
        } else {
            File::create(dest).await?
        };

        let label = dest
            .file_name()
            .map_or_else(|| "download".to_string(), |n| n.to_string_lossy().into_owned());
        let bar = progress_bar(expected_len, start, &label);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network_error("Download interrupted", &e))?;
            file.write_all(&chunk).await?;
            bar.inc(chunk.len() as u64);
        }
        file.flush().await?;
        bar.finish_and_clear();

        tracing::debug!(
            "Transferred {} into {}",
            format_bytes(bar.position().saturating_sub(start)),
            dest.display()
        );
        Ok(Transfer { expected_len })
    }
}
