//! Persistent ledger of items already materialized on disk.
//!
//! The ledger is a single JSON object, `{"downloads": {"<id>": "<path>"}}`,
//! rewritten in full after every mutation. Entries are only trusted while
//! the file they point at still exists and is non-empty; anything else is
//! evicted the moment it is looked up.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    downloads: BTreeMap<String, PathBuf>,
}

/// Download ledger shared by every worker of a run.
///
/// All reads and writes go through one mutex, which also covers the file
/// rewrite, so concurrent completions never interleave on disk.
pub struct DownloadCache {
    path: PathBuf,
    downloads: Mutex<BTreeMap<String, PathBuf>>,
}

impl DownloadCache {
    /// Opens the ledger at `path`. A missing or unreadable ledger yields an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let downloads = Self::load(&path);
        Self {
            path,
            downloads: Mutex::new(downloads),
        }
    }

    fn load(path: &Path) -> BTreeMap<String, PathBuf> {
        if !path.exists() {
            return BTreeMap::new();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<Ledger>(&json).map_err(|e| e.to_string()));

        match parsed {
            Ok(ledger) => {
                debug!("Loaded {} cached episodes from {}", ledger.downloads.len(), path.display());
                ledger.downloads
            }
            Err(e) => {
                warn!("Failed to load cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn save(&self, downloads: &BTreeMap<String, PathBuf>) {
        if let Err(e) = self.write_ledger(downloads) {
            warn!("Failed to save cache {}: {}", self.path.display(), e);
        }
    }

    fn write_ledger(&self, downloads: &BTreeMap<String, PathBuf>) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&serde_json::json!({ "downloads": downloads }))?;

        // Swap in a complete file so a crash never leaves half a ledger behind.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)
    }

    /// Returns the recorded path if it still points at a non-empty file.
    pub fn is_downloaded(&self, key: &str) -> Option<PathBuf> {
        let mut downloads = self.downloads.lock();
        let path = downloads.get(key)?.clone();

        if is_non_empty_file(&path) {
            return Some(path);
        }

        debug!("Cached file no longer exists, removing from cache: {}", path.display());
        downloads.remove(key);
        self.save(&downloads);
        None
    }

    /// Records `key` as materialized at `path` and persists immediately.
    ///
    /// Relative paths are anchored at the working directory so entries stay
    /// valid when a later run starts somewhere else.
    pub fn mark_downloaded(&self, key: &str, path: &Path) {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut downloads = self.downloads.lock();
        downloads.insert(key.to_string(), path);
        self.save(&downloads);
    }

    pub fn remove(&self, key: &str) {
        let mut downloads = self.downloads.lock();
        if downloads.remove(key).is_some() {
            self.save(&downloads);
        }
    }

    pub fn len(&self) -> usize {
        self.downloads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_mark_and_lookup() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("episode.mp4");
        fs::write(&video, b"data").unwrap();

        let cache = DownloadCache::open(dir.path().join("cache.json"));
        assert!(cache.is_downloaded("1609").is_none());

        cache.mark_downloaded("1609", &video);
        assert_eq!(cache.is_downloaded("1609"), Some(video));
    }

    #[test]
    fn test_deleted_file_is_evicted() {
        let dir = tempdir().unwrap();
        let ledger = dir.path().join("cache.json");
        let video = dir.path().join("episode.mp4");
        fs::write(&video, b"data").unwrap();

        let cache = DownloadCache::open(&ledger);
        cache.mark_downloaded("42", &video);
        fs::remove_file(&video).unwrap();

        assert!(cache.is_downloaded("42").is_none());
        assert_eq!(cache.len(), 0);

        // Eviction is persisted, not just in memory.
        let reopened = DownloadCache::open(&ledger);
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_empty_file_is_not_trusted() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("empty.mp4");
        fs::write(&video, b"").unwrap();

        let cache = DownloadCache::open(dir.path().join("cache.json"));
        cache.mark_downloaded("7", &video);

        assert!(cache.is_downloaded("7").is_none());
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        let ledger = dir.path().join("nested").join("cache.json");
        let video = dir.path().join("episode.mp4");
        fs::write(&video, b"data").unwrap();

        DownloadCache::open(&ledger).mark_downloaded("1", &video);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&ledger).unwrap()).unwrap();
        assert_eq!(raw["downloads"]["1"], serde_json::json!(video));

        let reopened = DownloadCache::open(&ledger);
        assert_eq!(reopened.is_downloaded("1"), Some(video));
    }

    #[test]
    fn test_relative_paths_are_stored_absolute() {
        let dir = tempdir().unwrap();
        let ledger = dir.path().join("cache.json");

        DownloadCache::open(&ledger).mark_downloaded("9", Path::new("downloads/ep.mp4"));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&ledger).unwrap()).unwrap();
        let stored = PathBuf::from(raw["downloads"]["9"].as_str().unwrap());
        assert!(stored.is_absolute(), "ledger path not absolute: {}", stored.display());
        assert!(stored.ends_with("downloads/ep.mp4"));
    }

    #[test]
    fn test_corrupt_ledger_starts_empty() {
        let dir = tempdir().unwrap();
        let ledger = dir.path().join("cache.json");
        fs::write(&ledger, "{ not json").unwrap();

        let cache = DownloadCache::open(&ledger);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("episode.mp4");
        fs::write(&video, b"data").unwrap();

        let cache = DownloadCache::open(dir.path().join("cache.json"));
        cache.mark_downloaded("5", &video);
        cache.remove("5");

        assert!(cache.is_downloaded("5").is_none());
    }

    #[test]
    fn test_concurrent_marks_keep_ledger_valid() {
        let dir = tempdir().unwrap();
        let ledger = dir.path().join("cache.json");
        let cache = Arc::new(DownloadCache::open(&ledger));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                let video = dir.path().join(format!("ep{}.mp4", i));
                fs::write(&video, b"data").unwrap();
                std::thread::spawn(move || cache.mark_downloaded(&i.to_string(), &video))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = DownloadCache::open(&ledger);
        assert_eq!(reopened.len(), 16);
    }
}
