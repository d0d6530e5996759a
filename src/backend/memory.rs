//! In-memory storage backend.
//!
//! Provides a fast, non-persistent store using DashMap for concurrent
//! access. Ideal for testing, scratch disks, and embedded use cases.

use super::Backend;
use super::path::{is_within, normalize, normalize_dir, parent};
use super::types::{Entry, EntryKind, Metadata, Visibility, WriteOptions, guess_mimetype};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// File stored in the memory backend.
#[derive(Clone)]
struct MemoryFile {
    data: Vec<u8>,
    mimetype: String,
    timestamp: i64,
    visibility: Visibility,
}

/// Explicitly created directory.
#[derive(Clone, Copy)]
struct MemoryDir {
    timestamp: i64,
    visibility: Visibility,
}

/// In-memory storage backend using DashMap.
///
/// Directories exist either explicitly (`create_dir`) or implicitly as
/// the parent of a stored file. All data is lost when the process exits.
///
/// # Thread Safety
///
/// `MemoryBackend` is `Clone`; clones share the same store.
///
/// # Example
///
/// ```ignore
/// use disks::backend::{Backend, MemoryBackend, WriteOptions};
///
/// let backend = MemoryBackend::new();
/// backend.write("images/logo.png", &image_bytes, &WriteOptions::default()).await?;
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    files: Arc<DashMap<String, MemoryFile>>,
    dirs: Arc<DashMap<String, MemoryDir>>,
    default_visibility: Visibility,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_visibility(Visibility::Public)
    }
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend with public default visibility.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty backend whose writes default to `visibility`.
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            files: Arc::new(DashMap::new()),
            dirs: Arc::new(DashMap::new()),
            default_visibility: visibility,
        }
    }

    /// Returns the number of files in the store.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no files are stored.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Removes every file and directory.
    pub fn clear(&self) {
        self.files.clear();
        self.dirs.clear();
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir.is_empty()
            || self.dirs.contains_key(dir)
            || self.files.iter().any(|f| is_within(dir, f.key(), true))
    }

    /// Rejects a file at `path` when a directory already lives there or
    /// when any ancestor is a file.
    fn check_file_slot(&self, path: &str) -> Result<()> {
        if self.dir_exists(path) {
            anyhow::bail!("Cannot write file over directory: {path}");
        }
        self.check_ancestors(path)
    }

    fn check_ancestors(&self, path: &str) -> Result<()> {
        let mut ancestor = parent(path);
        while !ancestor.is_empty() {
            if self.files.contains_key(ancestor) {
                anyhow::bail!("Parent of {path} is a file: {ancestor}");
            }
            ancestor = parent(ancestor);
        }
        Ok(())
    }

    fn dir_metadata(&self, dir: &str) -> Metadata {
        let (timestamp, visibility) = self
            .dirs
            .get(dir)
            .map_or((0, self.default_visibility), |d| (d.timestamp, d.visibility));
        Metadata {
            path: dir.to_string(),
            kind: EntryKind::Dir,
            size: 0,
            mimetype: "inode/directory".to_string(),
            timestamp,
            visibility,
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool> {
        let path = normalize(path)?;
        self.check_file_slot(&path)?;

        // Overwrites keep the file's visibility unless one is given
        let visibility = options
            .visibility
            .or_else(|| self.files.get(&path).map(|f| f.visibility))
            .unwrap_or(self.default_visibility);
        let mimetype = options
            .mimetype
            .clone()
            .unwrap_or_else(|| guess_mimetype(&path));
        let file = MemoryFile {
            data: contents.to_vec(),
            mimetype,
            timestamp: Utc::now().timestamp(),
            visibility,
        };
        self.files.insert(path, file);
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize(path)?;
        Ok(self.files.get(&path).map(|f| f.data.clone()))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        Ok(self.files.remove(&path).is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        if from == to {
            return Ok(self.files.contains_key(&from));
        }
        if self.files.contains_key(&from) {
            self.check_file_slot(&to)?;
        }
        match self.files.remove(&from) {
            Some((_, file)) => {
                self.files.insert(to, file);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<bool> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        if from == to {
            return Ok(self.files.contains_key(&from));
        }
        if self.files.contains_key(&from) {
            self.check_file_slot(&to)?;
        }
        // Clone out of the map before inserting; holding a read guard
        // across an insert on the same shard deadlocks.
        let source = self.files.get(&from).map(|f| f.value().clone());
        match source {
            Some(mut file) => {
                file.timestamp = Utc::now().timestamp();
                self.files.insert(to, file);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn has(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        Ok(self.files.contains_key(&path) || self.dir_exists(&path))
    }

    async fn create_dir(&self, path: &str, options: &WriteOptions) -> Result<bool> {
        let path = normalize(path)?;
        if self.files.contains_key(&path) {
            anyhow::bail!("Cannot create directory over file: {path}");
        }
        self.check_ancestors(&path)?;
        let dir = MemoryDir {
            timestamp: Utc::now().timestamp(),
            visibility: options.visibility.unwrap_or(self.default_visibility),
        };
        self.dirs.insert(path, dir);
        Ok(true)
    }

    async fn delete_dir(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        if !self.dir_exists(&path) {
            return Ok(false);
        }
        self.files.retain(|key, _| !is_within(&path, key, true));
        self.dirs
            .retain(|key, _| key != &path && !is_within(&path, key, true));
        Ok(true)
    }

    async fn list_contents(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        let dir = normalize_dir(dir)?;

        let mut dirs: BTreeSet<String> = self
            .dirs
            .iter()
            .filter(|d| is_within(&dir, d.key(), recursive))
            .map(|d| d.key().clone())
            .collect();

        let mut entries = Vec::new();
        for file in self.files.iter() {
            let key = file.key();
            // Implicit parent directories between `dir` and the file
            let mut ancestor = parent(key);
            while !ancestor.is_empty() && is_within(&dir, ancestor, true) {
                if is_within(&dir, ancestor, recursive) {
                    dirs.insert(ancestor.to_string());
                }
                ancestor = parent(ancestor);
            }
            if is_within(&dir, key, recursive) {
                entries.push(Entry::file(
                    key.clone(),
                    file.data.len() as u64,
                    file.timestamp,
                ));
            }
        }

        entries.extend(dirs.into_iter().map(Entry::dir));
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>> {
        let path = normalize(path)?;
        if let Some(file) = self.files.get(&path) {
            return Ok(Some(Metadata {
                path: path.clone(),
                kind: EntryKind::File,
                size: file.data.len() as u64,
                mimetype: file.mimetype.clone(),
                timestamp: file.timestamp,
                visibility: file.visibility,
            }));
        }
        if self.dir_exists(&path) {
            return Ok(Some(self.dir_metadata(&path)));
        }
        Ok(None)
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
        let path = normalize(path)?;
        if let Some(mut file) = self.files.get_mut(&path) {
            file.visibility = visibility;
            return Ok(true);
        }
        if let Some(mut dir) = self.dirs.get_mut(&path) {
            dir.visibility = visibility;
            return Ok(true);
        }
        Ok(false)
    }
}
