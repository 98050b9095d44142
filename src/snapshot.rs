//! Deterministic source tree snapshots
//!
//! A snapshot is a filtered description of the working tree used as a cache
//! key input: the exclusion rules drop VCS metadata and build output, the
//! remaining file list is sorted before hashing so the digest does not
//! depend on filesystem ordering. Capturing is read-only.

use crate::error::{KilnError, KilnResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Normalized exclusion rule set applied while walking the tree
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    rules: Vec<String>,
}

impl ExcludeRules {
    /// Build a rule set; trailing slashes are stripped during normalization
    pub fn new(rules: &[String]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|r| r.trim_end_matches('/').to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Whether a root-relative path is excluded. A rule matches the path
    /// itself or any of its components, so `target` also covers
    /// `demos/target/debug`.
    pub fn matches(&self, relative: &Path) -> bool {
        relative.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            self.rules.iter().any(|rule| rule.as_str() == name)
        })
    }
}

/// A deterministic, filtered view of the source tree
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    /// Working-tree root the snapshot was captured from
    pub root: PathBuf,

    /// SHA-256 over the sorted file list and contents
    pub hash: String,

    /// Included files, root-relative and sorted
    pub files: Vec<PathBuf>,
}

impl SourceSnapshot {
    /// Capture a snapshot of `root`, applying the exclusion rules.
    ///
    /// Same root content + same rules produce the same hash on any machine;
    /// any change to an included file changes it.
    pub fn capture(root: &Path, rules: &ExcludeRules) -> KilnResult<Self> {
        if !root.is_dir() {
            return Err(KilnError::SnapshotInconsistent {
                path: root.to_path_buf(),
                reason: "source root is not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| KilnError::SnapshotInconsistent {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                reason: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walked path is under its root")
                .to_path_buf();

            if rules.matches(&relative) {
                continue;
            }

            files.push(relative);
        }

        // Sort before hashing: directory iteration order is not stable
        files.sort();

        let mut hasher = Sha256::new();
        for relative in &files {
            hasher.update(portable_path(relative).as_bytes());
            hasher.update([0u8]);

            let contents = std::fs::read(root.join(relative)).map_err(|e| {
                KilnError::SnapshotInconsistent {
                    path: root.join(relative),
                    reason: e.to_string(),
                }
            })?;
            hasher.update(&contents);
            hasher.update([0u8]);
        }

        let hash = hex::encode(hasher.finalize());
        debug!("Captured snapshot of {} files, hash {}", files.len(), &hash[..12]);

        Ok(Self {
            root: root.to_path_buf(),
            hash,
            files,
        })
    }

    /// First 12 hex chars, for display and store paths
    pub fn short_hash(&self) -> &str {
        &self.hash[..12]
    }
}

/// Render a relative path with `/` separators regardless of platform
fn portable_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
