use crate::config::schema::AppProfile;
use crate::error::{RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Depth needed to see `<outer>/<inner>/<marker>`
const SCAN_DEPTH: usize = 3;

/// Directory nesting produced by extracting the release archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// `<root>/<outer>/<inner>/...`
    Nested,
    /// `<root>/<inner>/...`
    Direct,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nested => write!(f, "nested"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl Layout {
    /// Application base directory for this layout
    #[must_use]
    pub fn base_dir(self, root: &Path, profile: &AppProfile) -> PathBuf {
        match self {
            Self::Nested => root.join(&profile.outer_dir).join(&profile.inner_dir),
            Self::Direct => root.join(&profile.inner_dir),
        }
    }

    /// Probe an already populated install root
    pub fn resolve(root: &Path, profile: &AppProfile) -> Result<Self> {
        let listing = DirListing::scan(root, SCAN_DEPTH)?;
        detect_layout(&listing, profile).ok_or_else(|| unrecognized_layout(root, &listing, profile))
    }
}

/// Relative paths found under a directory, up to a fixed depth
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    entries: BTreeSet<PathBuf>,
}

impl DirListing {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Walk `root` without following links
    pub fn scan(root: &Path, max_depth: usize) -> Result<Self> {
        let mut entries = BTreeSet::new();
        if root.is_dir() {
            scan_into(root, Path::new(""), max_depth, &mut entries)?;
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn contains(&self, relative: &Path) -> bool {
        self.entries.contains(relative)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries at most `depth` components deep, for diagnostics
    pub fn shallow(&self, depth: usize) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(move |p| p.components().count() <= depth)
            .map(PathBuf::as_path)
    }
}

fn scan_into(
    dir: &Path,
    relative: &Path,
    depth_left: usize,
    entries: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    if depth_left == 0 {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let rel = relative.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            scan_into(&entry.path(), &rel, depth_left - 1, entries)?;
        }
        entries.insert(rel);
    }
    Ok(())
}

/// Decide the layout from a listing; nested wins when both are present
#[must_use]
pub fn detect_layout(listing: &DirListing, profile: &AppProfile) -> Option<Layout> {
    let nested = Path::new(&profile.outer_dir)
        .join(&profile.inner_dir)
        .join(&profile.marker_file);
    if listing.contains(&nested) {
        return Some(Layout::Nested);
    }

    let direct = Path::new(&profile.inner_dir).join(&profile.marker_file);
    if listing.contains(&direct) {
        return Some(Layout::Direct);
    }

    None
}

pub(crate) fn unrecognized_layout(
    root: &Path,
    listing: &DirListing,
    profile: &AppProfile,
) -> RecoveryError {
    let found = if listing.is_empty() {
        "  (empty)".to_string()
    } else {
        listing
            .shallow(2)
            .map(|p| format!("  {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    RecoveryError::Extraction(format!(
        "Unrecognized layout in {}: expected {outer}/{inner}/{marker} or {inner}/{marker}\nActual contents:\n{found}",
        root.display(),
        outer = profile.outer_dir,
        inner = profile.inner_dir,
        marker = profile.marker_file,
    ))
}

/// Every path the later stages need, derived from the detected layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub root: PathBuf,
    pub layout: Layout,
    pub base: PathBuf,
    pub launch_script: PathBuf,
    pub runtime_dir: PathBuf,
    pub runtime_exe: PathBuf,
    pub app_dir: PathBuf,
    pub models_dir: PathBuf,
    pub custom_nodes_dir: PathBuf,
}

impl InstallPaths {
    #[must_use]
    pub fn new(root: &Path, layout: Layout, profile: &AppProfile) -> Self {
        let base = layout.base_dir(root, profile);
        let runtime_dir = base.join(&profile.runtime_dir);
        let app_dir = base.join(&profile.app_dir);
        Self {
            root: root.to_path_buf(),
            layout,
            launch_script: base.join(&profile.launch_script),
            runtime_exe: runtime_dir.join(&profile.runtime_exe),
            models_dir: app_dir.join("models"),
            custom_nodes_dir: app_dir.join("custom_nodes"),
            runtime_dir,
            app_dir,
            base,
        }
    }

    /// Whether the embedded runtime has been bootstrapped
    #[must_use]
    pub fn runtime_exists(&self) -> bool {
        self.runtime_exe.exists()
    }

    /// Directory users may want on PATH
    #[must_use]
    pub fn runtime_scripts_dir(&self) -> PathBuf {
        self.runtime_dir.join("Scripts")
    }
}
