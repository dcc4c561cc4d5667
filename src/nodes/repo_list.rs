use crate::error::{RecoveryError, Result};
use std::fs;
use std::path::Path;

/// Ordered custom node repository URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoList {
    urls: Vec<String>,
}

impl RepoList {
    /// One URL per line; blank lines and `#` comments are ignored
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let urls = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();
        Self { urls }
    }

    /// Read and parse a repository list file
    ///
    /// # Errors
    /// `RecoveryError::Config` if the file can't be read
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            RecoveryError::Config(format!(
                "Failed to read repository list {}: {e}",
                path.display()
            ))
        })?;
        let list = Self::parse(&text);
        tracing::info!(
            "Loaded {} repositories from {}",
            list.len(),
            path.display()
        );
        Ok(list)
    }

    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

const SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://", "file://"];

/// Directory a repository clones into: the last path segment without `.git`
///
/// Returns `None` for anything that doesn't look like a git remote.
#[must_use]
pub fn repo_dir_name(url: &str) -> Option<String> {
    let rest = SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .or_else(|| {
            // scp-like `git@host:owner/repo.git`
            url.strip_prefix("git@")
                .and_then(|r| r.split_once(':').map(|(_, path)| path))
        })?;

    let name = rest.trim_end_matches('/').rsplit('/').next()?;
    let name = name.strip_suffix(".git").unwrap_or(name);
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['\\', ':', '?', '#', ' '])
        && rest.contains('/');
    valid.then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let list = RepoList::parse(
            "# custom nodes\n\
             https://github.com/ltdrdata/ComfyUI-Manager.git\n\
             \n\
               https://github.com/cubiq/ComfyUI_essentials  \n\
             # https://github.com/disabled/repo\n",
        );
        assert_eq!(
            list.urls(),
            &[
                "https://github.com/ltdrdata/ComfyUI-Manager.git".to_string(),
                "https://github.com/cubiq/ComfyUI_essentials".to_string(),
            ]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = RepoList::load(&temp.path().join("missing.txt"));
        assert!(matches!(result, Err(RecoveryError::Config(_))));
    }

    #[test]
    fn test_repo_dir_name() {
        assert_eq!(
            repo_dir_name("https://github.com/ltdrdata/ComfyUI-Manager.git").as_deref(),
            Some("ComfyUI-Manager")
        );
        assert_eq!(
            repo_dir_name("https://github.com/cubiq/ComfyUI_essentials/").as_deref(),
            Some("ComfyUI_essentials")
        );
        assert_eq!(
            repo_dir_name("git@github.com:owner/some-node.git").as_deref(),
            Some("some-node")
        );
        assert_eq!(
            repo_dir_name("file:///srv/git/local-node").as_deref(),
            Some("local-node")
        );
    }

    #[test]
    fn test_repo_dir_name_rejects_garbage() {
        assert_eq!(repo_dir_name("not a url"), None);
        assert_eq!(repo_dir_name("ftp://example.com/repo"), None);
        assert_eq!(repo_dir_name("https://"), None);
        assert_eq!(repo_dir_name("https://github.com"), None);
        assert_eq!(repo_dir_name("https://github.com/owner/.git"), None);
    }
}
