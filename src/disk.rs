//! File operations facade over a single disk.
//!
//! A [`Disk`] is a cheap, cloneable handle to one constructed disk. Every
//! operation delegates to the disk's backend and translates the result
//! into the typed error taxonomy: a backend error becomes the category
//! error with the backend error as its source, and a `false`/`None`
//! result becomes the same category error with an "unable to ..."
//! message. Nothing is retried.

use std::sync::Arc;

use crate::backend::path;
use crate::backend::{Backend, ByteStream, Entry, EntryKind, Metadata, Visibility, WriteOptions};
use crate::error::{Error, ErrorKind, Result};

/// Suffix of the temporary sibling used by [`Disk::touch`].
const TOUCH_SUFFIX: &str = ".tmp";

/// Handle to a constructed disk.
///
/// # Example
///
/// ```ignore
/// let disk = manager.disk("uploads")?;
/// disk.write("avatars/1.png", &bytes, true).await?;
/// let url = disk.url("avatars/1.png").await?;
/// ```
#[derive(Clone)]
pub struct Disk {
    name: String,
    backend: Arc<dyn Backend>,
    url_base: Option<String>,
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disk")
            .field("name", &self.name)
            .field("url_base", &self.url_base)
            .finish_non_exhaustive()
    }
}

/// Maps a backend call result to the facade's error taxonomy.
fn check(result: anyhow::Result<bool>, kind: ErrorKind, message: String) -> Result<()> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::new(kind, message)),
        Err(e) => Err(Error::with_source(kind, message, e)),
    }
}

/// Like [`check`], for calls returning `Option`.
fn require<T>(result: anyhow::Result<Option<T>>, kind: ErrorKind, message: String) -> Result<T> {
    match result {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(Error::new(kind, message)),
        Err(e) => Err(Error::with_source(kind, message, e)),
    }
}

/// Normalizes an extension filter: lowercase, no leading dot.
fn normalize_extensions(extensions: &[&str]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// True when both paths normalize to the same location.
fn same_path(from: &str, to: &str) -> bool {
    match (path::normalize(from), path::normalize(to)) {
        (Ok(from), Ok(to)) => from == to,
        _ => false,
    }
}

fn has_extension(entry: &Entry, extensions: &[String]) -> bool {
    entry
        .extension
        .as_deref()
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

impl Disk {
    /// Creates a handle. Normally obtained from the disk manager.
    pub fn new(name: impl Into<String>, backend: Arc<dyn Backend>, url_base: Option<String>) -> Self {
        Self {
            name: name.into(),
            backend,
            url_base,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_base(&self) -> Option<&str> {
        self.url_base.as_deref()
    }

    /// Returns the (possibly cache-decorated) backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Writes a file, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileWrite`] if the backend fails or refuses the write.
    pub async fn write(&self, path: &str, contents: impl AsRef<[u8]>, public: bool) -> Result<()> {
        let options = WriteOptions::with_visibility(Visibility::from_public(public));
        self.write_with(path, contents.as_ref(), &options).await
    }

    /// Writes a file without choosing a visibility: an existing file keeps
    /// its own, a new one gets the backend default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileWrite`] if the backend fails or refuses the write.
    pub async fn put(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        self.write_with(path, contents.as_ref(), &WriteOptions::default())
            .await
    }

    /// Writes a file with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileWrite`] if the backend fails or refuses the write.
    pub async fn write_with(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<()> {
        check(
            self.backend.write(path, contents, options).await,
            ErrorKind::FileWrite,
            format!("unable to write file: {path}"),
        )
    }

    /// Writes a file from a stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileWrite`] if the stream or the backend fails.
    pub async fn write_stream(&self, path: &str, stream: ByteStream, public: bool) -> Result<()> {
        let options = WriteOptions::with_visibility(Visibility::from_public(public));
        check(
            self.backend.write_stream(path, stream, &options).await,
            ErrorKind::FileWrite,
            format!("unable to write stream to file: {path}"),
        )
    }

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file does not exist or cannot be read.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        require(
            self.backend.read(path).await,
            ErrorKind::FileRead,
            format!("unable to read file: {path}"),
        )
    }

    /// Reads a whole file as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file cannot be read or is not UTF-8.
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        let data = self.read(path).await?;
        String::from_utf8(data).map_err(|e| {
            Error::with_source(
                ErrorKind::FileRead,
                format!("file is not valid UTF-8: {path}"),
                e.into(),
            )
        })
    }

    /// Opens a file as a stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file does not exist or cannot be opened.
    pub async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        require(
            self.backend.read_stream(path).await,
            ErrorKind::FileRead,
            format!("unable to read stream from file: {path}"),
        )
    }

    /// Reads a file, then deletes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] or [`Error::FileDelete`] for the failing step.
    pub async fn read_and_delete(&self, path: &str) -> Result<Vec<u8>> {
        let data = self.read(path).await?;
        self.delete(path).await?;
        Ok(data)
    }

    /// Checks whether a file or directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the lookup fails.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.backend.has(path).await.map_err(|e| {
            Error::with_source(
                ErrorKind::FileMetadata,
                format!("unable to check existence of: {path}"),
                e,
            )
        })
    }

    /// Copies a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileCopy`] if the source is missing or the copy fails.
    pub async fn copy(&self, from: &str, to: &str) -> Result<()> {
        check(
            self.backend.copy(from, to).await,
            ErrorKind::FileCopy,
            format!("unable to copy file from {from} to {to}"),
        )
    }

    /// Renames a file using the backend's native rename.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRename`] if the source is missing or the rename fails.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        check(
            self.backend.rename(from, to).await,
            ErrorKind::FileRename,
            format!("unable to rename file from {from} to {to}"),
        )
    }

    /// Moves a file by copying it and deleting the source.
    ///
    /// Not atomic. If the delete fails after a successful copy, the copy
    /// at `to` is kept and the source still exists. Moving a file onto
    /// itself leaves it untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMove`] if either step fails, or if `from` and
    /// `to` name the same path and no file exists there.
    pub async fn move_file(&self, from: &str, to: &str) -> Result<()> {
        if same_path(from, to) {
            return match self.backend.get_metadata(from).await {
                Ok(Some(meta)) if meta.kind == EntryKind::File => Ok(()),
                Ok(_) => Err(Error::new(
                    ErrorKind::FileMove,
                    format!("unable to move file from {from} to {to}: no such file"),
                )),
                Err(e) => Err(Error::with_source(
                    ErrorKind::FileMove,
                    format!("unable to move file from {from} to {to}"),
                    e,
                )),
            };
        }
        check(
            self.backend.copy(from, to).await,
            ErrorKind::FileMove,
            format!("unable to move file from {from} to {to}: copy failed"),
        )?;
        check(
            self.backend.delete(from).await,
            ErrorKind::FileMove,
            format!("unable to move file from {from} to {to}: source was copied but not deleted"),
        )
    }

    /// Deletes a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileDelete`] if the file does not exist or deletion fails.
    pub async fn delete(&self, path: &str) -> Result<()> {
        check(
            self.backend.delete(path).await,
            ErrorKind::FileDelete,
            format!("unable to delete file: {path}"),
        )
    }

    /// Refreshes a file's timestamp.
    ///
    /// Copies the file to `<path>.tmp`, deletes the original and renames
    /// the copy back, for backends without a timestamp primitive. Not
    /// atomic: a failure mid-sequence can leave only the `.tmp` copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if any step fails, or if
    /// `<path>.tmp` already exists. An existing `.tmp` is never overwritten.
    pub async fn touch(&self, path: &str) -> Result<()> {
        let tmp = format!("{path}{TOUCH_SUFFIX}");
        let occupied = self.backend.has(&tmp).await.map_err(|e| {
            Error::with_source(ErrorKind::FileMetadata, format!("unable to touch file: {path}"), e)
        })?;
        if occupied {
            return Err(Error::new(
                ErrorKind::FileMetadata,
                format!("unable to touch file: {path} ({tmp} already exists)"),
            ));
        }
        check(
            self.backend.copy(path, &tmp).await,
            ErrorKind::FileMetadata,
            format!("unable to touch file: {path}"),
        )?;
        check(
            self.backend.delete(path).await,
            ErrorKind::FileMetadata,
            format!("unable to touch file: {path} (original not deleted, copy left at {tmp})"),
        )?;
        check(
            self.backend.rename(&tmp, path).await,
            ErrorKind::FileMetadata,
            format!("unable to touch file: {path} (content left at {tmp})"),
        )
    }

    /// Prepends `contents` to a file, creating it if missing.
    ///
    /// Reads and rewrites the whole file; meant for small files. An
    /// existing file keeps its visibility.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] or [`Error::FileWrite`] for the failing step.
    pub async fn prepend(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let contents = contents.as_ref();
        let data = match self.existing(path).await? {
            Some(mut existing) => {
                let mut data = contents.to_vec();
                data.append(&mut existing);
                data
            },
            None => contents.to_vec(),
        };
        self.rewrite(path, &data).await
    }

    /// Appends `contents` to a file, creating it if missing.
    ///
    /// Reads and rewrites the whole file; meant for small files. An
    /// existing file keeps its visibility.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] or [`Error::FileWrite`] for the failing step.
    pub async fn append(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let contents = contents.as_ref();
        let data = match self.existing(path).await? {
            Some(mut existing) => {
                existing.extend_from_slice(contents);
                existing
            },
            None => contents.to_vec(),
        };
        self.rewrite(path, &data).await
    }

    async fn existing(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.backend.read(path).await.map_err(|e| {
            Error::with_source(ErrorKind::FileRead, format!("unable to read file: {path}"), e)
        })
    }

    /// Writes `data` with the file's current visibility, or the backend
    /// default for a new file.
    async fn rewrite(&self, path: &str, data: &[u8]) -> Result<()> {
        let visibility = self.backend.get_visibility(path).await.map_err(|e| {
            Error::with_source(
                ErrorKind::FileWrite,
                format!("unable to read visibility of: {path}"),
                e,
            )
        })?;
        let options = WriteOptions {
            visibility,
            ..WriteOptions::default()
        };
        self.write_with(path, data, &options).await
    }

    /// Creates a directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] if creation fails.
    pub async fn create_dir(&self, path: &str, public: bool) -> Result<()> {
        let options = WriteOptions::with_visibility(Visibility::from_public(public));
        check(
            self.backend.create_dir(path, &options).await,
            ErrorKind::DirectoryCreate,
            format!("unable to create directory: {path}"),
        )
    }

    /// Deletes a directory and its contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryDelete`] if it does not exist or deletion fails.
    pub async fn delete_dir(&self, path: &str) -> Result<()> {
        check(
            self.backend.delete_dir(path).await,
            ErrorKind::DirectoryDelete,
            format!("unable to delete directory: {path}"),
        )
    }

    /// Lists files and directories below `dir` ("" for the root).
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if listing fails.
    pub async fn list_contents(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        self.backend
            .list_contents(dir, recursive)
            .await
            .map_err(|e| {
                Error::with_source(
                    ErrorKind::FileRead,
                    format!("unable to list contents of: {dir}"),
                    e,
                )
            })
    }

    /// Lists files, keeping only the given extensions (all if empty).
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if listing fails.
    pub async fn list_files(&self, dir: &str, recursive: bool, extensions: &[&str]) -> Result<Vec<Entry>> {
        let extensions = normalize_extensions(extensions);
        let entries = self.list_contents(dir, recursive).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .filter(|e| extensions.is_empty() || has_extension(e, &extensions))
            .collect())
    }

    /// Lists files, dropping the given extensions (none dropped if empty).
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if listing fails.
    pub async fn list_files_except(
        &self,
        dir: &str,
        recursive: bool,
        extensions: &[&str],
    ) -> Result<Vec<Entry>> {
        let extensions = normalize_extensions(extensions);
        let entries = self.list_contents(dir, recursive).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .filter(|e| !has_extension(e, &extensions))
            .collect())
    }

    /// Lists directories only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if listing fails.
    pub async fn list_dirs(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        let entries = self.list_contents(dir, recursive).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Dir)
            .collect())
    }

    /// Returns the metadata of a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or lookup fails.
    pub async fn metadata(&self, path: &str) -> Result<Metadata> {
        require(
            self.backend.get_metadata(path).await,
            ErrorKind::FileMetadata,
            format!("unable to get metadata of: {path}"),
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or lookup fails.
    pub async fn mimetype(&self, path: &str) -> Result<String> {
        require(
            self.backend.get_mimetype(path).await,
            ErrorKind::FileMetadata,
            format!("unable to get mimetype of: {path}"),
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or lookup fails.
    pub async fn size(&self, path: &str) -> Result<u64> {
        require(
            self.backend.get_size(path).await,
            ErrorKind::FileMetadata,
            format!("unable to get size of: {path}"),
        )
    }

    /// Last modification time in unix seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or lookup fails.
    pub async fn last_modified(&self, path: &str) -> Result<i64> {
        require(
            self.backend.get_timestamp(path).await,
            ErrorKind::FileMetadata,
            format!("unable to get timestamp of: {path}"),
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or lookup fails.
    pub async fn visibility(&self, path: &str) -> Result<Visibility> {
        require(
            self.backend.get_visibility(path).await,
            ErrorKind::FileMetadata,
            format!("unable to get visibility of: {path}"),
        )
    }

    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or lookup fails.
    pub async fn is_public(&self, path: &str) -> Result<bool> {
        Ok(self.visibility(path).await?.is_public())
    }

    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if the path does not exist or the change fails.
    pub async fn set_visibility(&self, path: &str, public: bool) -> Result<()> {
        let visibility = Visibility::from_public(public);
        check(
            self.backend.set_visibility(path, visibility).await,
            ErrorKind::FileMetadata,
            format!("unable to set visibility of {path} to {visibility}"),
        )
    }

    /// Builds the public URL of a path.
    ///
    /// Requires a configured URL base, an existing path, and public
    /// visibility; a private path never gets a URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMetadata`] if any of the three conditions fails.
    pub async fn url(&self, path: &str) -> Result<String> {
        let Some(base) = self.url_base.as_deref() else {
            return Err(Error::new(
                ErrorKind::FileMetadata,
                format!("disk '{}' has no url_base configured", self.name),
            ));
        };

        if !self.exists(path).await? {
            return Err(Error::new(
                ErrorKind::FileMetadata,
                format!("unable to build url, file does not exist: {path}"),
            ));
        }

        if !self.is_public(path).await? {
            return Err(Error::new(
                ErrorKind::FileMetadata,
                format!("unable to build url, file is not public: {path}"),
            ));
        }

        build_url(base, path)
    }
}

/// Joins `path` onto `base`, percent-encoding as needed.
fn build_url(base: &str, path: &str) -> Result<String> {
    let base = if base.ends_with('/') {
        url::Url::parse(base)
    } else {
        url::Url::parse(&format!("{base}/"))
    };
    let joined = base
        .and_then(|b| b.join(path.trim_start_matches('/')))
        .map_err(|e| {
            Error::with_source(
                ErrorKind::FileMetadata,
                format!("unable to build url for: {path}"),
                e.into(),
            )
        })?;
    Ok(joined.into())
}
