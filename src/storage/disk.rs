// src/storage/disk.rs

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SeismicError};
use crate::storage::{CacheEntry, CacheStore};

const ENTRY_EXTENSION: &str = "json";
const TEMP_MARKER: &str = ".json.tmp.";

/// On-disk cache holding one JSON file per key
///
/// Writes go to a uniquely named temp file in the same directory and are then
/// renamed over the target, so a concurrent reader sees either the old entry or
/// the new one, never a partial file. Several clients may share a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Opens the cache, creating the directory when missing
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            SeismicError::from(e).with_detail("cache_dir", dir.display())
        })?;
        debug!(dir = %dir.display(), "Disk cache ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Temp files left behind by a writer that died between write and rename
    fn orphaned_temp_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(TEMP_MARKER));
            if is_temp && path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Number of entries currently on disk
    pub fn len(&self) -> Result<usize> {
        Ok(self.entry_files()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl CacheStore for DiskCache {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SeismicError::from(e).with_detail("path", path.display())),
        };

        // A corrupt file is a miss; the next successful fetch overwrites it
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(entry) => {
                warn!(expected = key, found = %entry.key, "Cache entry key mismatch, ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), "Unreadable cache entry, ignoring: {}", e);
                Ok(None)
            }
        }
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(&entry.key);
        let temp_path = self
            .dir
            .join(format!("{}{}{}", entry.key, TEMP_MARKER, Uuid::new_v4()));

        let data = serde_json::to_vec(entry)?;
        if let Err(e) = fs::write(&temp_path, data).and_then(|()| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(SeismicError::from(e).with_detail("path", path.display()));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // Another process cleared it first
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let mut orphans = 0;
        for path in self.orphaned_temp_files()? {
            if fs::remove_file(&path).is_ok() {
                orphans += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, orphans, "Disk cache cleared");
        Ok(removed)
    }
}
