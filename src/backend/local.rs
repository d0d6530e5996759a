//! Local filesystem backend.
//!
//! Stores files below a root directory. Visibility is expressed through
//! unix permission bits: a path is public when its mode matches the
//! configured public mode, private otherwise. On platforms without unix
//! permissions every path reports the backend's default visibility.

use super::Backend;
use super::path::{normalize, normalize_dir, resolve};
use super::types::{Entry, EntryKind, Metadata, Visibility, WriteOptions, guess_mimetype};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Permission modes used to express visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub file_public: u32,
    pub file_private: u32,
    pub dir_public: u32,
    pub dir_private: u32,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            file_public: 0o644,
            file_private: 0o600,
            dir_public: 0o755,
            dir_private: 0o700,
        }
    }
}

impl Permissions {
    fn mode(&self, kind: EntryKind, visibility: Visibility) -> u32 {
        match (kind, visibility) {
            (EntryKind::File, Visibility::Public) => self.file_public,
            (EntryKind::File, Visibility::Private) => self.file_private,
            (EntryKind::Dir, Visibility::Public) => self.dir_public,
            (EntryKind::Dir, Visibility::Private) => self.dir_private,
        }
    }
}

/// Filesystem-backed storage backend.
///
/// # Thread Safety
///
/// `LocalBackend` is `Clone` and can be shared across threads. Blocking
/// filesystem calls run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    permissions: Permissions,
    default_visibility: Visibility,
}

impl LocalBackend {
    /// Opens (and creates if needed) a backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open<P: AsRef<Path>>(
        root: P,
        permissions: Permissions,
        default_visibility: Visibility,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create disk root: {}", root.display()))?;

        Ok(Self {
            root,
            permissions,
            default_visibility,
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Self) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || f(backend))
            .await
            .context("Task join error")?
    }

    fn location(&self, path: &str) -> Result<PathBuf> {
        resolve(&self.root, path)
    }

    #[cfg(unix)]
    fn apply_visibility(&self, location: &Path, kind: EntryKind, visibility: Visibility) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mode = self.permissions.mode(kind, visibility);
        fs::set_permissions(location, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions on: {}", location.display()))
    }

    #[cfg(not(unix))]
    fn apply_visibility(&self, _location: &Path, _kind: EntryKind, _visibility: Visibility) -> Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn visibility_of(&self, meta: &fs::Metadata, kind: EntryKind) -> Visibility {
        use std::os::unix::fs::PermissionsExt;

        if meta.permissions().mode() & 0o777 == self.permissions.mode(kind, Visibility::Public) {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    #[cfg(not(unix))]
    fn visibility_of(&self, _meta: &fs::Metadata, _kind: EntryKind) -> Visibility {
        self.default_visibility
    }

    fn ensure_parent(location: &Path) -> Result<()> {
        if let Some(parent) = location.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directories for: {}", location.display())
            })?;
        }
        Ok(())
    }

    fn write_sync(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool> {
        normalize(path)?;
        let location = self.location(path)?;
        Self::ensure_parent(&location)?;
        let existed = location.is_file();

        fs::write(&location, contents).with_context(|| format!("Failed to write file: {path}"))?;

        // Overwrites keep the file's mode unless a visibility is given
        match options.visibility {
            Some(visibility) => self.apply_visibility(&location, EntryKind::File, visibility)?,
            None if !existed => {
                self.apply_visibility(&location, EntryKind::File, self.default_visibility)?;
            },
            None => {},
        }
        Ok(true)
    }

    fn read_sync(&self, path: &str) -> Result<Option<Vec<u8>>> {
        normalize(path)?;
        let location = self.location(path)?;
        if !location.is_file() {
            return Ok(None);
        }
        let data = fs::read(&location).with_context(|| format!("Failed to read file: {path}"))?;
        Ok(Some(data))
    }

    fn delete_sync(&self, path: &str) -> Result<bool> {
        normalize(path)?;
        let location = self.location(path)?;
        if !location.is_file() {
            return Ok(false);
        }
        fs::remove_file(&location).with_context(|| format!("Failed to delete file: {path}"))?;
        Ok(true)
    }

    fn rename_sync(&self, from: &str, to: &str) -> Result<bool> {
        let same = normalize(from)? == normalize(to)?;
        let source = self.location(from)?;
        if !source.is_file() {
            return Ok(false);
        }
        if same {
            return Ok(true);
        }
        let target = self.location(to)?;
        Self::ensure_parent(&target)?;
        fs::rename(&source, &target)
            .with_context(|| format!("Failed to rename file: {from} -> {to}"))?;
        Ok(true)
    }

    fn copy_sync(&self, from: &str, to: &str) -> Result<bool> {
        let same = normalize(from)? == normalize(to)?;
        let source = self.location(from)?;
        if !source.is_file() {
            return Ok(false);
        }
        // fs::copy onto the source truncates it
        if same {
            return Ok(true);
        }
        let target = self.location(to)?;
        Self::ensure_parent(&target)?;
        fs::copy(&source, &target).with_context(|| format!("Failed to copy file: {from} -> {to}"))?;
        Ok(true)
    }

    fn has_sync(&self, path: &str) -> Result<bool> {
        normalize(path)?;
        Ok(self.location(path)?.exists())
    }

    fn create_dir_sync(&self, path: &str, options: &WriteOptions) -> Result<bool> {
        normalize(path)?;
        let location = self.location(path)?;
        fs::create_dir_all(&location)
            .with_context(|| format!("Failed to create directory: {path}"))?;

        let visibility = options.visibility.unwrap_or(self.default_visibility);
        self.apply_visibility(&location, EntryKind::Dir, visibility)?;
        Ok(true)
    }

    fn delete_dir_sync(&self, path: &str) -> Result<bool> {
        normalize(path)?;
        let location = self.location(path)?;
        if !location.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&location)
            .with_context(|| format!("Failed to delete directory: {path}"))?;
        Ok(true)
    }

    fn list_sync(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        let dir = normalize_dir(dir)?;
        let location = self.location(&dir)?;

        let mut entries = Vec::new();
        scan_directory(&self.root, &location, recursive, &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn metadata_sync(&self, path: &str) -> Result<Option<Metadata>> {
        let path = normalize(path)?;
        let location = self.location(&path)?;
        if !location.exists() {
            return Ok(None);
        }

        let meta = fs::metadata(&location)
            .with_context(|| format!("Failed to get file metadata: {path}"))?;
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        let mimetype = match kind {
            EntryKind::Dir => "inode/directory".to_string(),
            EntryKind::File => guess_mimetype(&path),
        };

        Ok(Some(Metadata {
            size: if meta.is_dir() { 0 } else { meta.len() },
            timestamp: modified_secs(&meta),
            visibility: self.visibility_of(&meta, kind),
            path,
            kind,
            mimetype,
        }))
    }

    fn set_visibility_sync(&self, path: &str, visibility: Visibility) -> Result<bool> {
        normalize(path)?;
        let location = self.location(path)?;
        if !location.exists() {
            return Ok(false);
        }
        let kind = if location.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        self.apply_visibility(&location, kind, visibility)?;
        Ok(true)
    }
}

fn modified_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .map(|t| DateTime::<Utc>::from(t).timestamp())
        .unwrap_or_default()
}

/// Collects entries below `dir`, paths relative to `root`.
///
/// Symbolic links are skipped, so a link cycle cannot recurse forever and
/// a listing never reaches outside the root.
fn scan_directory(root: &Path, dir: &Path, recursive: bool, entries: &mut Vec<Entry>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        let location = entry.path();
        let Ok(relative) = location.strip_prefix(root) else {
            continue;
        };
        // Normalize path separators for cross-platform consistency
        let relative = relative.to_string_lossy().replace('\\', "/");

        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to get file type: {relative}"))?;
        if file_type.is_symlink() {
            continue;
        }

        if file_type.is_dir() {
            entries.push(Entry::dir(relative));
            if recursive {
                scan_directory(root, &location, recursive, entries)?;
            }
        } else if file_type.is_file() {
            let meta = entry
                .metadata()
                .with_context(|| format!("Failed to get file metadata: {relative}"))?;
            entries.push(Entry::file(relative, meta.len(), modified_secs(&meta)));
        }
    }
    Ok(())
}

#[async_trait]
impl Backend for LocalBackend {
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool> {
        let path = path.to_string();
        let contents = contents.to_vec();
        let options = options.clone();
        self.blocking(move |b| b.write_sync(&path, &contents, &options))
            .await
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = path.to_string();
        self.blocking(move |b| b.read_sync(&path)).await
    }

    async fn read_stream(&self, path: &str) -> Result<Option<super::ByteStream>> {
        normalize(path)?;
        let location = self.location(path)?;
        if !tokio::fs::metadata(&location)
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            return Ok(None);
        }
        let file = tokio::fs::File::open(&location)
            .await
            .with_context(|| format!("Failed to open file: {path}"))?;
        Ok(Some(Box::new(file)))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.blocking(move |b| b.delete_sync(&path)).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let (from, to) = (from.to_string(), to.to_string());
        self.blocking(move |b| b.rename_sync(&from, &to)).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<bool> {
        let (from, to) = (from.to_string(), to.to_string());
        self.blocking(move |b| b.copy_sync(&from, &to)).await
    }

    async fn has(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.blocking(move |b| b.has_sync(&path)).await
    }

    async fn create_dir(&self, path: &str, options: &WriteOptions) -> Result<bool> {
        let path = path.to_string();
        let options = options.clone();
        self.blocking(move |b| b.create_dir_sync(&path, &options))
            .await
    }

    async fn delete_dir(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.blocking(move |b| b.delete_dir_sync(&path)).await
    }

    async fn list_contents(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        let dir = dir.to_string();
        self.blocking(move |b| b.list_sync(&dir, recursive)).await
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>> {
        let path = path.to_string();
        self.blocking(move |b| b.metadata_sync(&path)).await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
        let path = path.to_string();
        self.blocking(move |b| b.set_visibility_sync(&path, visibility))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_backend() -> (LocalBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let backend =
            LocalBackend::open(tmp.path(), Permissions::default(), Visibility::Public).unwrap();
        (backend, tmp)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (backend, tmp) = create_backend();

        backend
            .write("a/b/hello.txt", b"Hello", &WriteOptions::default())
            .await
            .unwrap();

        assert!(tmp.path().join("a/b/hello.txt").is_file());
        let data = backend.read("a/b/hello.txt").await.unwrap().unwrap();
        assert_eq!(data, b"Hello");
        assert!(backend.read("missing.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_copy_rename() {
        let (backend, _tmp) = create_backend();
        let opts = WriteOptions::default();
        backend.write("one.txt", b"1", &opts).await.unwrap();

        assert!(backend.copy("one.txt", "copies/two.txt").await.unwrap());
        assert!(backend.rename("copies/two.txt", "three.txt").await.unwrap());
        assert!(!backend.has("copies/two.txt").await.unwrap());
        assert!(backend.has("copies").await.unwrap());
        assert!(backend.delete("one.txt").await.unwrap());
        assert!(!backend.delete("one.txt").await.unwrap());
        assert_eq!(backend.read("three.txt").await.unwrap().unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_list_contents() {
        let (backend, _tmp) = create_backend();
        let opts = WriteOptions::default();
        backend.write("root.md", b"r", &opts).await.unwrap();
        backend.write("docs/a.txt", b"a", &opts).await.unwrap();
        backend.write("docs/deep/b.txt", b"b", &opts).await.unwrap();

        let shallow = backend.list_contents("", false).await.unwrap();
        let paths: Vec<_> = shallow.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["docs", "root.md"]);

        let deep = backend.list_contents("docs", true).await.unwrap();
        let paths: Vec<_> = deep.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/a.txt", "docs/deep", "docs/deep/b.txt"]);
        assert_eq!(deep[0].kind, EntryKind::File);
        assert_eq!(deep[0].extension.as_deref(), Some("txt"));
        assert_eq!(deep[1].kind, EntryKind::Dir);

        assert!(backend.list_contents("nowhere", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directories() {
        let (backend, tmp) = create_backend();

        assert!(backend
            .create_dir("x/y", &WriteOptions::default())
            .await
            .unwrap());
        assert!(tmp.path().join("x/y").is_dir());
        assert!(backend.delete_dir("x").await.unwrap());
        assert!(!tmp.path().join("x").exists());
        assert!(!backend.delete_dir("x").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_visibility_via_permissions() {
        let (backend, _tmp) = create_backend();

        backend
            .write(
                "private.txt",
                b"p",
                &WriteOptions::with_visibility(Visibility::Private),
            )
            .await
            .unwrap();
        assert_eq!(
            backend.get_visibility("private.txt").await.unwrap(),
            Some(Visibility::Private)
        );

        assert!(backend
            .set_visibility("private.txt", Visibility::Public)
            .await
            .unwrap());
        assert_eq!(
            backend.get_visibility("private.txt").await.unwrap(),
            Some(Visibility::Public)
        );
    }

    #[tokio::test]
    async fn test_copy_onto_itself_keeps_content() {
        let (backend, tmp) = create_backend();
        backend
            .write("same.txt", b"keep me", &WriteOptions::default())
            .await
            .unwrap();

        assert!(backend.copy("same.txt", "./same.txt").await.unwrap());
        assert!(backend.rename("same.txt", "same.txt").await.unwrap());
        assert_eq!(std::fs::read(tmp.path().join("same.txt")).unwrap(), b"keep me");
        assert!(!backend.copy("gone.txt", "gone.txt").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_overwrite_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (backend, tmp) = create_backend();
        backend
            .write("p.txt", b"1", &WriteOptions::with_visibility(Visibility::Private))
            .await
            .unwrap();
        backend
            .write("p.txt", b"2", &WriteOptions::default())
            .await
            .unwrap();

        let mode = std::fs::metadata(tmp.path().join("p.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            backend.get_visibility("p.txt").await.unwrap(),
            Some(Visibility::Private)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listing_skips_symlink_cycles() {
        let (backend, tmp) = create_backend();
        backend
            .write("a/file.txt", b"f", &WriteOptions::default())
            .await
            .unwrap();
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("a/back")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("a/file.txt"), tmp.path().join("link.txt"))
            .unwrap();

        let all = backend.list_contents("", true).await.unwrap();
        let paths: Vec<_> = all.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "a/file.txt"]);
    }

    #[tokio::test]
    async fn test_metadata() {
        let (backend, _tmp) = create_backend();
        backend
            .write("page.html", b"<html>", &WriteOptions::default())
            .await
            .unwrap();

        let meta = backend.get_metadata("page.html").await.unwrap().unwrap();
        assert_eq!(meta.size, 6);
        assert_eq!(meta.mimetype, "text/html");
        assert_eq!(meta.kind, EntryKind::File);
        assert!(meta.timestamp > 0);
        assert!(backend.get_metadata("nope.html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_stream() {
        use tokio::io::AsyncReadExt;

        let (backend, _tmp) = create_backend();
        backend
            .write("s.bin", b"stream me", &WriteOptions::default())
            .await
            .unwrap();

        let mut stream = backend.read_stream("s.bin").await.unwrap().unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"stream me");
        assert!(backend.read_stream("none.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let (backend, _tmp) = create_backend();
        for path in ["../escape.txt", "a/../../escape.txt"] {
            let result = backend.write(path, b"attack", &WriteOptions::default()).await;
            assert!(result.is_err(), "Path traversal not prevented for: {path}");
        }
    }
}
