//! Storage backend capability and the bundled backends.
//!
//! Every disk is driven by a [`Backend`]. The facade never talks to a
//! concrete storage type directly; it only uses the capability below, so
//! a cache decorator or a custom backend registered at startup is
//! indistinguishable from the bundled ones:
//!
//! - [`LocalBackend`] - a directory on the local filesystem
//! - [`MemoryBackend`] - non-persistent store, ideal for tests and scratch disks
//! - [`NullBackend`] - accepts everything, stores nothing
//!
//! Backends report failure two ways, mirroring the storage libraries they
//! wrap: an `Err` for a failed call, and `false`/`None` for "nothing to
//! act on" (missing file, refused operation). The facade turns both into
//! typed errors.

mod local;
mod memory;
mod null;
pub(crate) mod path;
mod types;

pub use local::{LocalBackend, Permissions};
pub use memory::MemoryBackend;
pub use null::NullBackend;
pub use types::{ByteStream, Entry, EntryKind, Metadata, Visibility, WriteOptions};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

/// Capability every storage backend must provide.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
///
/// # Example
///
/// ```ignore
/// use disks::backend::{Backend, MemoryBackend, WriteOptions};
///
/// let backend = MemoryBackend::new();
/// backend.write("notes/today.txt", b"hello", &WriteOptions::default()).await?;
/// let data = backend.read("notes/today.txt").await?;
/// ```
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Writes a file, creating or replacing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool>;

    /// Writes a file from a stream.
    ///
    /// The default implementation buffers the stream and calls `write`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the stream or writing the file fails.
    async fn write_stream(
        &self,
        path: &str,
        mut stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<bool> {
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("Failed to read input stream for: {path}"))?;
        self.write(path, &buf, options).await
    }

    /// Reads a whole file. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the read fails.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Opens a file as a stream. `Ok(None)` if it does not exist.
    ///
    /// The default implementation reads the whole file into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the read fails.
    async fn read_stream(&self, path: &str) -> Result<Option<ByteStream>> {
        Ok(self
            .read(path)
            .await?
            .map(|data| Box::new(std::io::Cursor::new(data)) as ByteStream))
    }

    /// Deletes a file. `Ok(false)` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or deletion fails.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Renames a file. `Ok(false)` if the source does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either path is invalid or the rename fails.
    async fn rename(&self, from: &str, to: &str) -> Result<bool>;

    /// Copies a file. `Ok(false)` if the source does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either path is invalid or the copy fails.
    async fn copy(&self, from: &str, to: &str) -> Result<bool>;

    /// Checks whether a file or directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the lookup fails.
    async fn has(&self, path: &str) -> Result<bool>;

    /// Creates a directory (and its parents).
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or creation fails.
    async fn create_dir(&self, path: &str, options: &WriteOptions) -> Result<bool>;

    /// Deletes a directory and everything below it. `Ok(false)` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or deletion fails.
    async fn delete_dir(&self, path: &str) -> Result<bool>;

    /// Lists the entries below `dir` ("" for the root), sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or listing fails.
    async fn list_contents(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>>;

    /// Returns metadata for a path. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or metadata cannot be read.
    async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>>;

    /// Returns the MIME type of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    async fn get_mimetype(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get_metadata(path).await?.map(|m| m.mimetype))
    }

    /// Returns the size of a file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    async fn get_size(&self, path: &str) -> Result<Option<u64>> {
        Ok(self.get_metadata(path).await?.map(|m| m.size))
    }

    /// Returns the last modification time in unix seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    async fn get_timestamp(&self, path: &str) -> Result<Option<i64>> {
        Ok(self.get_metadata(path).await?.map(|m| m.timestamp))
    }

    /// Returns the visibility of a path. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    async fn get_visibility(&self, path: &str) -> Result<Option<Visibility>> {
        Ok(self.get_metadata(path).await?.map(|m| m.visibility))
    }

    /// Sets the visibility of a path. `Ok(false)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the change fails.
    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool>;
}
