use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// A published release of the portable archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Release tag, e.g. `v0.3.27`
    pub version: String,
    pub url: String,
    pub size: Option<u64>,
}

/// Result of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Size the finished file should have, when the server advertised one
    pub expected_len: Option<u64>,
}

/// Where releases are looked up and fetched from
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Metadata of the newest release (no archive transfer)
    async fn latest_release(&self) -> Result<Release>;

    /// Fetch `url` into `dest`
    ///
    /// With `resume`, bytes already in `dest` are kept if the server honours
    /// a range request; otherwise `dest` is overwritten.
    async fn download(&self, url: &str, dest: &Path, resume: bool) -> Result<Transfer>;
}

/// Release tag embedded in a `.../releases/download/<tag>/<asset>` URL
#[must_use]
pub fn version_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/releases/download/")?;
    let tag = rest.split('/').next()?;
    if tag.is_empty() || !rest.contains('/') {
        return None;
    }
    Some(tag.to_string())
}
