//! Disk registry and current-disk selection.
//!
//! [`DiskManager`] owns the configured disks, builds each one lazily on
//! first use and keeps the instance for its own lifetime. It offers two
//! ways to reach a disk:
//!
//! - [`DiskManager::disk`] returns an explicit [`Disk`] handle. Takes
//!   `&self`, so a shared manager can hand out handles from any thread.
//! - A cursor: [`DiskManager::select`] names the disk the next proxied
//!   operation (`write`, `read`, ...) runs against. Unless pinned, the
//!   cursor returns to `"default"` after that one operation.
//!
//! ```text
//! select("A")       cursor = A, revert after use
//! write("f", ..)    runs on A, cursor = default
//! exists("f")       runs on default
//! ```

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{ByteStream, Entry, Metadata, Visibility};
use crate::config::{DEFAULT_DISK, DisksConfig, parse_url_base};
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::registry::{BackendRegistry, CacheRegistry};

/// Named disks with lazy construction and a current-disk cursor.
pub struct DiskManager {
    config: DisksConfig,
    backends: BackendRegistry,
    caches: CacheRegistry,
    instances: Mutex<HashMap<String, Disk>>,
    current: String,
    revert_after_use: bool,
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager")
            .field("current", &self.current)
            .field("revert_after_use", &self.revert_after_use)
            .field("constructed", &self.constructed())
            .finish_non_exhaustive()
    }
}

impl DiskManager {
    /// Creates a manager with the built-in backend and cache types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if there is no `default` disk.
    pub fn new(config: DisksConfig) -> Result<Self> {
        Self::with_registries(
            config,
            BackendRegistry::with_defaults(),
            CacheRegistry::with_defaults(),
        )
    }

    /// Creates a manager with caller-supplied registries.
    ///
    /// Only a missing `default` disk is fatal. Other configuration
    /// problems are logged here and raised when the affected disk is
    /// first used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if there is no `default` disk.
    pub fn with_registries(
        config: DisksConfig,
        backends: BackendRegistry,
        caches: CacheRegistry,
    ) -> Result<Self> {
        if !config.contains(DEFAULT_DISK) {
            return Err(Error::configuration(format!(
                "no '{DEFAULT_DISK}' disk configured"
            )));
        }

        let inspection = config.inspect();
        for problem in inspection.errors.iter().chain(&inspection.warnings) {
            warn!("{problem}");
        }

        debug!(
            disks = config.names().count(),
            backends = ?backends.names(),
            "disk manager ready"
        );

        Ok(Self {
            config,
            backends,
            caches,
            instances: Mutex::new(HashMap::new()),
            current: DEFAULT_DISK.to_string(),
            revert_after_use: true,
        })
    }

    pub fn config(&self) -> &DisksConfig {
        &self.config
    }

    /// Name the next proxied operation will run against.
    pub fn current_name(&self) -> &str {
        &self.current
    }

    /// Whether the cursor returns to `"default"` after each operation.
    pub fn reverts_after_use(&self) -> bool {
        self.revert_after_use
    }

    /// Names of the disks built so far, sorted.
    pub fn constructed(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a handle to `name`, building the disk on first use.
    ///
    /// Does not touch the cursor.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the disk is not configured or has no backend type
    /// - [`Error::Disk`] if the backend or cache type is unknown or construction fails
    pub fn disk(&self, name: &str) -> Result<Disk> {
        let mut instances = self.instances.lock();
        if let Some(disk) = instances.get(name) {
            return Ok(disk.clone());
        }

        let disk = self.build(name)?;
        instances.insert(name.to_string(), disk.clone());
        Ok(disk)
    }

    fn build(&self, name: &str) -> Result<Disk> {
        let config = self
            .config
            .get(name)
            .ok_or_else(|| Error::configuration(format!("disk '{name}' is not configured")))?;

        if config.backend_type.trim().is_empty() {
            return Err(Error::configuration(format!(
                "disk '{name}' has no backend_type"
            )));
        }

        if let Some(base) = &config.url_base {
            parse_url_base(base)
                .map_err(|e| Error::configuration(format!("disk '{name}' {e}")))?;
        }

        let mut backend = self
            .backends
            .construct(&config.backend_type, &config.backend_settings)?;

        if let Some(settings) = &config.cache_settings {
            match config.cache_type() {
                Some(cache_type) if self.caches.contains(cache_type) => {
                    backend = self.caches.decorate(cache_type, settings, backend)?;
                    debug!(disk = name, cache_type, "cache attached");
                },
                Some(cache_type) => {
                    warn!(
                        disk = name,
                        cache_type, "cache type is not registered, disk is not cached"
                    );
                },
                None => {
                    warn!(disk = name, "cache_settings without cache_type, disk is not cached");
                },
            }
        }

        debug!(disk = name, backend_type = %config.backend_type, "disk constructed");
        Ok(Disk::new(name, backend, config.url_base.clone()))
    }

    /// Points the cursor at `name`, building the disk if needed.
    ///
    /// With `pin`, the cursor stops reverting to `"default"` after each
    /// operation. On failure the cursor is left unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`DiskManager::disk`].
    pub fn select(&mut self, name: &str, pin: bool) -> Result<&mut Self> {
        self.disk(name)?;
        self.current = name.to_string();
        if pin {
            self.revert_after_use = false;
        }
        debug!(disk = name, pin, "disk selected");
        Ok(self)
    }

    /// Resolves the disk under the cursor, then reverts the cursor to
    /// `"default"` unless pinned.
    ///
    /// The revert happens whether or not resolution succeeded, so a failed
    /// selection never sticks.
    ///
    /// # Errors
    ///
    /// Same as [`DiskManager::disk`].
    pub fn resolve_current(&mut self) -> Result<Disk> {
        let resolved = self.disk(&self.current);
        if self.revert_after_use && self.current != DEFAULT_DISK {
            debug!(from = %self.current, "cursor reverted to default");
            self.current = DEFAULT_DISK.to_string();
        }
        resolved
    }

    // Proxies. Each runs one facade operation on the disk under the
    // cursor via `resolve_current`, so it fails with the same errors as
    // `resolve_current` or the `Disk` method it forwards to.

    /// Writes a file on the current disk; see [`Disk::write`].
    pub async fn write(&mut self, path: &str, contents: impl AsRef<[u8]>, public: bool) -> Result<()> {
        self.resolve_current()?.write(path, contents, public).await
    }

    /// Writes a file with the default visibility; see [`Disk::put`].
    pub async fn put(&mut self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        self.resolve_current()?.put(path, contents).await
    }

    /// Writes a file from a stream; see [`Disk::write_stream`].
    pub async fn write_stream(&mut self, path: &str, stream: ByteStream, public: bool) -> Result<()> {
        self.resolve_current()?.write_stream(path, stream, public).await
    }

    /// Reads a whole file; see [`Disk::read`].
    pub async fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        self.resolve_current()?.read(path).await
    }

    /// Reads a file as UTF-8; see [`Disk::read_to_string`].
    pub async fn read_to_string(&mut self, path: &str) -> Result<String> {
        self.resolve_current()?.read_to_string(path).await
    }

    /// Opens a file as a stream; see [`Disk::read_stream`].
    pub async fn read_stream(&mut self, path: &str) -> Result<ByteStream> {
        self.resolve_current()?.read_stream(path).await
    }

    /// Reads a file, then deletes it; see [`Disk::read_and_delete`].
    pub async fn read_and_delete(&mut self, path: &str) -> Result<Vec<u8>> {
        self.resolve_current()?.read_and_delete(path).await
    }

    /// Checks whether a path exists; see [`Disk::exists`].
    pub async fn exists(&mut self, path: &str) -> Result<bool> {
        self.resolve_current()?.exists(path).await
    }

    /// Copies a file; see [`Disk::copy`].
    pub async fn copy(&mut self, from: &str, to: &str) -> Result<()> {
        self.resolve_current()?.copy(from, to).await
    }

    /// Renames a file; see [`Disk::rename`].
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.resolve_current()?.rename(from, to).await
    }

    /// Moves a file by copy then delete; see [`Disk::move_file`].
    pub async fn move_file(&mut self, from: &str, to: &str) -> Result<()> {
        self.resolve_current()?.move_file(from, to).await
    }

    /// Deletes a file; see [`Disk::delete`].
    pub async fn delete(&mut self, path: &str) -> Result<()> {
        self.resolve_current()?.delete(path).await
    }

    /// Refreshes a file's timestamp; see [`Disk::touch`].
    pub async fn touch(&mut self, path: &str) -> Result<()> {
        self.resolve_current()?.touch(path).await
    }

    /// Prepends to a file; see [`Disk::prepend`].
    pub async fn prepend(&mut self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        self.resolve_current()?.prepend(path, contents).await
    }

    /// Appends to a file; see [`Disk::append`].
    pub async fn append(&mut self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        self.resolve_current()?.append(path, contents).await
    }

    /// Creates a directory; see [`Disk::create_dir`].
    pub async fn create_dir(&mut self, path: &str, public: bool) -> Result<()> {
        self.resolve_current()?.create_dir(path, public).await
    }

    /// Deletes a directory and its contents; see [`Disk::delete_dir`].
    pub async fn delete_dir(&mut self, path: &str) -> Result<()> {
        self.resolve_current()?.delete_dir(path).await
    }

    /// Lists files and directories; see [`Disk::list_contents`].
    pub async fn list_contents(&mut self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        self.resolve_current()?.list_contents(dir, recursive).await
    }

    /// Lists files with one of `extensions`; see [`Disk::list_files`].
    pub async fn list_files(&mut self, dir: &str, recursive: bool, extensions: &[&str]) -> Result<Vec<Entry>> {
        self.resolve_current()?
            .list_files(dir, recursive, extensions)
            .await
    }

    /// Lists files without any of `extensions`; see [`Disk::list_files_except`].
    pub async fn list_files_except(
        &mut self,
        dir: &str,
        recursive: bool,
        extensions: &[&str],
    ) -> Result<Vec<Entry>> {
        self.resolve_current()?
            .list_files_except(dir, recursive, extensions)
            .await
    }

    /// Lists directories; see [`Disk::list_dirs`].
    pub async fn list_dirs(&mut self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        self.resolve_current()?.list_dirs(dir, recursive).await
    }

    /// Returns a path's metadata; see [`Disk::metadata`].
    pub async fn metadata(&mut self, path: &str) -> Result<Metadata> {
        self.resolve_current()?.metadata(path).await
    }

    /// Returns a file's MIME type; see [`Disk::mimetype`].
    pub async fn mimetype(&mut self, path: &str) -> Result<String> {
        self.resolve_current()?.mimetype(path).await
    }

    /// Returns a file's size in bytes; see [`Disk::size`].
    pub async fn size(&mut self, path: &str) -> Result<u64> {
        self.resolve_current()?.size(path).await
    }

    /// Returns the last modification time; see [`Disk::last_modified`].
    pub async fn last_modified(&mut self, path: &str) -> Result<i64> {
        self.resolve_current()?.last_modified(path).await
    }

    /// Returns a path's visibility; see [`Disk::visibility`].
    pub async fn visibility(&mut self, path: &str) -> Result<Visibility> {
        self.resolve_current()?.visibility(path).await
    }

    /// Whether a path is public; see [`Disk::is_public`].
    pub async fn is_public(&mut self, path: &str) -> Result<bool> {
        self.resolve_current()?.is_public(path).await
    }

    /// Changes a path's visibility; see [`Disk::set_visibility`].
    pub async fn set_visibility(&mut self, path: &str, public: bool) -> Result<()> {
        self.resolve_current()?.set_visibility(path, public).await
    }

    /// Builds the public URL of a file; see [`Disk::url`].
    pub async fn url(&mut self, path: &str) -> Result<String> {
        self.resolve_current()?.url(path).await
    }
}
