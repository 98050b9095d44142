//! Content-addressed artifact store
//!
//! Dependency artifact bundles are stored on disk keyed by derivation key:
//! `<root>/entries/<key>/` holds an `entry.json` status record and an
//! `artifacts/` directory. Entries move pending → building → ready|failed;
//! ready and failed are terminal until explicit invalidation. A `building`
//! entry found on disk is a leftover from an aborted run and is wiped, never
//! resumed.
//!
//! Concurrent requests for the same key are coalesced onto a single builder
//! through a per-key async mutex: the first caller builds while the rest
//! wait, then observe the terminal state. This is the only mutual-exclusion
//! point in the build graph.

use crate::error::{KilnError, KilnResult};
use crate::graph::key::DerivationKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Store subdirectory holding dependency cache entries
const ENTRIES_DIR: &str = "entries";

/// Store subdirectory holding per-variant build outputs
const OUTPUTS_DIR: &str = "outputs";

/// Entry metadata file name
const ENTRY_FILE: &str = "entry.json";

/// Lifecycle state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Entry directory created, build not yet started
    Pending,
    /// A builder is (or was, before an abort) producing the artifact set
    Building,
    /// Artifact set is complete and immutable
    Ready,
    /// The build failed; the recorded error is served to later requests
    Failed,
}

impl EntryStatus {
    /// Terminal states survive across runs; the rest are stale leftovers
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Building => write!(f, "building"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted cache entry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Full derivation key
    pub key: String,

    /// Current lifecycle state
    pub status: EntryStatus,

    /// When the entry was first created
    pub created_at: DateTime<Utc>,

    /// When the entry last changed state
    pub updated_at: DateTime<Utc>,

    /// Artifact file names under `artifacts/`
    pub artifacts: Vec<String>,

    /// Failure reason, present when status is `failed`
    pub error: Option<String>,
}

impl CacheEntry {
    fn new(key: &DerivationKey) -> Self {
        let now = Utc::now();
        Self {
            key: key.as_str().to_string(),
            status: EntryStatus::Pending,
            created_at: now,
            updated_at: now,
            artifacts: vec![],
            error: None,
        }
    }

    /// Check if this entry is older than the given number of days
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.created_at < cutoff
    }
}

/// A ready dependency artifact bundle. Consumers get read access only; no
/// builder mutates a ready entry.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    /// The entry's `artifacts/` directory
    pub dir: PathBuf,

    /// Absolute paths of the artifact files
    pub files: Vec<PathBuf>,
}

/// Per-platform content-addressed store
pub struct CacheStore {
    root: PathBuf,
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CacheStore {
    /// Open a store rooted at a per-platform directory. No IO happens until
    /// an entry is requested.
    pub fn open(root: PathBuf) -> Self {
        Self {
            root,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one entry
    pub fn entry_dir(&self, key: &DerivationKey) -> PathBuf {
        self.root.join(ENTRIES_DIR).join(key.as_str())
    }

    /// Return the artifact set for `key`, building it if necessary.
    ///
    /// At most one builder runs per key; concurrent callers await the first
    /// builder's outcome. A recorded failure is sticky: later calls receive
    /// the same error without re-running the build, until the entry is
    /// invalidated.
    pub async fn get_or_build<F, Fut>(&self, key: &DerivationKey, build: F) -> KilnResult<ArtifactSet>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = KilnResult<Vec<PathBuf>>>,
    {
        let slot = self.slot(key).await;
        let _guard = slot.lock().await;

        let entry_dir = self.entry_dir(key);
        let artifacts_dir = entry_dir.join("artifacts");

        match read_entry(&entry_dir)? {
            Some(entry) if entry.status == EntryStatus::Ready => {
                if let Some(set) = self.load_ready(&artifacts_dir, &entry) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache hit for key {}", key);
                    return Ok(set);
                }
                // Artifacts missing from a ready entry: rebuild under the
                // same key rather than serve a gutted bundle
                warn!("Ready entry {} lost its artifacts, rebuilding", key);
                remove_dir(&entry_dir)?;
            }
            Some(entry) if entry.status == EntryStatus::Failed => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Err(KilnError::DependencyBuildFailed {
                    key: key.short().to_string(),
                    reason: entry
                        .error
                        .unwrap_or_else(|| "unrecorded failure".to_string()),
                });
            }
            Some(entry) => {
                // pending/building with no in-process builder: aborted run
                debug!("Discarding stale {} entry for key {}", entry.status, key);
                remove_dir(&entry_dir)?;
            }
            None => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        std::fs::create_dir_all(&artifacts_dir)
            .map_err(|e| KilnError::io(format!("creating entry dir {}", entry_dir.display()), e))?;

        let mut entry = CacheEntry::new(key);
        write_entry(&entry_dir, &entry)?;

        entry.status = EntryStatus::Building;
        entry.updated_at = Utc::now();
        write_entry(&entry_dir, &entry)?;

        debug!("Building dependency artifacts for key {}", key);
        match build(artifacts_dir.clone()).await {
            Ok(files) => {
                entry.artifacts = files
                    .iter()
                    .map(|f| {
                        f.strip_prefix(&artifacts_dir)
                            .unwrap_or(f)
                            .to_string_lossy()
                            .into_owned()
                    })
                    .collect();
                entry.status = EntryStatus::Ready;
                entry.updated_at = Utc::now();
                write_entry(&entry_dir, &entry)?;

                Ok(ArtifactSet {
                    dir: artifacts_dir,
                    files,
                })
            }
            Err(e) => {
                entry.status = EntryStatus::Failed;
                entry.error = Some(e.to_string());
                entry.updated_at = Utc::now();
                write_entry(&entry_dir, &entry)?;

                Err(KilnError::DependencyBuildFailed {
                    key: key.short().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// List all persisted entries, skipping unreadable ones
    pub fn list_entries(&self) -> KilnResult<Vec<CacheEntry>> {
        let entries_root = self.root.join(ENTRIES_DIR);
        if !entries_root.is_dir() {
            return Ok(vec![]);
        }

        let mut entries = vec![];
        let dir = std::fs::read_dir(&entries_root)
            .map_err(|e| KilnError::io(format!("reading store {}", entries_root.display()), e))?;

        for item in dir {
            let item =
                item.map_err(|e| KilnError::io("reading store entry".to_string(), e))?;
            match read_entry(&item.path()) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable entry {}: {}", item.path().display(), e),
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Delete one entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &DerivationKey) -> KilnResult<bool> {
        let slot = self.slot(key).await;
        let _guard = slot.lock().await;

        let entry_dir = self.entry_dir(key);
        if !entry_dir.exists() {
            return Ok(false);
        }
        remove_dir(&entry_dir)?;
        Ok(true)
    }

    /// Delete a persisted entry by its full key string, without requiring
    /// the key to be re-derivable. Used by cache maintenance.
    pub fn remove_entry(&self, key: &str) -> KilnResult<bool> {
        let entry_dir = self.root.join(ENTRIES_DIR).join(key);
        if !entry_dir.exists() {
            return Ok(false);
        }
        remove_dir(&entry_dir)?;
        Ok(true)
    }

    /// (hits, misses) served by this store instance
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    async fn slot(&self, key: &DerivationKey) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_ready(&self, artifacts_dir: &Path, entry: &CacheEntry) -> Option<ArtifactSet> {
        let files: Vec<PathBuf> = entry
            .artifacts
            .iter()
            .map(|name| artifacts_dir.join(name))
            .collect();

        if files.iter().all(|f| f.exists()) {
            Some(ArtifactSet {
                dir: artifacts_dir.to_path_buf(),
                files,
            })
        } else {
            None
        }
    }
}

/// Per-platform store root under the configured store directory. Platform
/// graphs never share a namespace.
pub fn platform_store_root(store_root: &Path, platform: &str) -> PathBuf {
    store_root.join(platform)
}

/// Where a variant's built binary lands. Pure function of its inputs so
/// registry resolution and the variant builder always agree.
pub fn variant_output_path(
    store_root: &Path,
    platform: &str,
    variant: &str,
    artifact: &str,
) -> PathBuf {
    platform_store_root(store_root, platform)
        .join(OUTPUTS_DIR)
        .join(variant)
        .join(artifact)
}

fn read_entry(entry_dir: &Path) -> KilnResult<Option<CacheEntry>> {
    let path = entry_dir.join(ENTRY_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| KilnError::io(format!("reading {}", path.display()), e))?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| KilnError::StoreCorrupt {
            path,
            reason: e.to_string(),
        })
}

fn write_entry(entry_dir: &Path, entry: &CacheEntry) -> KilnResult<()> {
    let path = entry_dir.join(ENTRY_FILE);
    let content = serde_json::to_string_pretty(entry)?;
    std::fs::write(&path, content)
        .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))
}

fn remove_dir(dir: &Path) -> KilnResult<()> {
    std::fs::remove_dir_all(dir)
        .map_err(|e| KilnError::io(format!("removing {}", dir.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::key::DepInputs;
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    fn test_key(tag: &str) -> DerivationKey {
        let inputs = DepInputs {
            lockfile_hash: tag.to_string(),
            auto_fetch: false,
        };
        DerivationKey::compute("x86_64-unknown-linux-gnu", "kiln-tc-1.82.0", "snap", &inputs)
    }

    async fn build_stub(out_dir: PathBuf) -> KilnResult<Vec<PathBuf>> {
        let file = out_dir.join("deps.bundle");
        std::fs::write(&file, "bundle").unwrap();
        Ok(vec![file])
    }

    #[tokio::test]
    async fn builds_once_then_serves_ready() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().to_path_buf());
        let key = test_key("a");
        let count = AtomicUsize::new(0);

        let first = store
            .get_or_build(&key, |dir| {
                count.fetch_add(1, Ordering::SeqCst);
                build_stub(dir)
            })
            .await
            .unwrap();

        let second = store
            .get_or_build(&key, |dir| {
                count.fetch_add(1, Ordering::SeqCst);
                build_stub(dir)
            })
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(first.files, second.files);
        assert_eq!(store.stats(), (1, 1));
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(temp.path().to_path_buf()));
        let key = test_key("concurrent");
        let count = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let store = store.clone();
            let key = key.clone();
            let count = count.clone();
            let barrier = barrier.clone();
            tasks.spawn(async move {
                barrier.wait().await;
                store
                    .get_or_build(&key, |dir| async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        build_stub(dir).await
                    })
                    .await
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_sticky_and_propagates() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().to_path_buf());
        let key = test_key("failing");
        let count = AtomicUsize::new(0);

        let first = store
            .get_or_build(&key, |_dir| {
                count.fetch_add(1, Ordering::SeqCst);
                async { Err(KilnError::command_exec("kilnc dep-build", "exit 1")) }
            })
            .await;
        assert!(matches!(first, Err(KilnError::DependencyBuildFailed { .. })));

        // Second request must observe the recorded failure without building
        let second = store
            .get_or_build(&key, |dir| {
                count.fetch_add(1, Ordering::SeqCst);
                build_stub(dir)
            })
            .await;
        match second {
            Err(KilnError::DependencyBuildFailed { reason, .. }) => {
                assert!(reason.contains("exit 1"));
            }
            other => panic!("expected sticky failure, got {other:?}"),
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_allows_rebuild() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().to_path_buf());
        let key = test_key("invalidate");
        let count = AtomicUsize::new(0);

        store
            .get_or_build(&key, |_dir| {
                count.fetch_add(1, Ordering::SeqCst);
                async { Err(KilnError::command_exec("kilnc dep-build", "exit 1")) }
            })
            .await
            .unwrap_err();

        assert!(store.invalidate(&key).await.unwrap());

        store
            .get_or_build(&key, |dir| {
                count.fetch_add(1, Ordering::SeqCst);
                build_stub(dir)
            })
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_building_entry_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().to_path_buf());
        let key = test_key("stale");

        // Simulate an aborted run that left a building entry behind
        let entry_dir = store.entry_dir(&key);
        std::fs::create_dir_all(entry_dir.join("artifacts")).unwrap();
        let mut stale = CacheEntry::new(&key);
        stale.status = EntryStatus::Building;
        write_entry(&entry_dir, &stale).unwrap();

        let count = AtomicUsize::new(0);
        let set = store
            .get_or_build(&key, |dir| {
                count.fetch_add(1, Ordering::SeqCst);
                build_stub(dir)
            })
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(set.files.len(), 1);

        let entries = store.list_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Ready);
    }

    #[tokio::test]
    async fn ready_entry_with_missing_artifacts_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().to_path_buf());
        let key = test_key("gutted");

        let set = store.get_or_build(&key, build_stub).await.unwrap();
        std::fs::remove_file(&set.files[0]).unwrap();

        let count = AtomicUsize::new(0);
        store
            .get_or_build(&key, |dir| {
                count.fetch_add(1, Ordering::SeqCst);
                build_stub(dir)
            })
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_entries_reports_status() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().to_path_buf());

        store.get_or_build(&test_key("one"), build_stub).await.unwrap();
        store
            .get_or_build(&test_key("two"), |_dir| async {
                Err(KilnError::command_exec("kilnc dep-build", "boom"))
            })
            .await
            .unwrap_err();

        let entries = store.list_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.status == EntryStatus::Ready)
                .count(),
            1
        );
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.status == EntryStatus::Failed)
                .count(),
            1
        );
    }

    #[test]
    fn variant_outputs_are_namespaced_by_platform() {
        let root = Path::new("/store");
        let a = variant_output_path(root, "x86_64-unknown-linux-gnu", "base", "server");
        let b = variant_output_path(root, "aarch64-apple-darwin", "base", "server");
        assert_ne!(a, b);
        assert!(a.starts_with("/store/x86_64-unknown-linux-gnu"));
    }
}
