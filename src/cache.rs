//! Caching decorator for backends.
//!
//! [`CachedBackend`] wraps any [`Backend`] and keeps file contents,
//! metadata and existence checks in `moka` caches. It implements
//! `Backend` itself, so a cached disk looks exactly like an uncached one,
//! and decorators can be layered.
//!
//! Every mutation is forwarded first, then invalidates the touched paths
//! and their ancestors (a write to `a/b.txt` changes whether `a` exists).
//! Directory deletion invalidates everything. Listings are never cached.
//!
//! A fill that loaded its value before a concurrent invalidation is
//! dropped: every invalidation bumps an epoch, and a fill only lands if
//! the epoch it started under is still current.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use moka::sync::Cache;
use parking_lot::Mutex;

use crate::backend::path::{normalize, parent};
use crate::backend::{Backend, ByteStream, Entry, Metadata, Visibility, WriteOptions};

/// Default maximum number of entries per cache.
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Tuning for [`CachedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Time to live of an entry; `None` keeps entries until evicted
    pub expire: Option<Duration>,
    /// Maximum entries held by each of the internal caches
    pub max_capacity: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expire: None,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

fn build_cache<V>(options: &CacheOptions) -> Cache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    let mut builder = Cache::builder().max_capacity(options.max_capacity);
    if let Some(ttl) = options.expire {
        builder = builder.time_to_live(ttl);
    }
    builder.build()
}

/// Backend decorator caching reads, metadata and existence checks.
#[derive(Clone)]
pub struct CachedBackend {
    inner: Arc<dyn Backend>,
    contents: Cache<String, Arc<Vec<u8>>>,
    metadata: Cache<String, Metadata>,
    exists: Cache<String, bool>,
    epoch: Arc<Mutex<u64>>,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn Backend>, options: CacheOptions) -> Self {
        Self {
            inner,
            contents: build_cache(&options),
            metadata: build_cache(&options),
            exists: build_cache(&options),
            epoch: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    /// Drops every cached entry.
    pub fn flush(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.contents.invalidate_all();
        self.metadata.invalidate_all();
        self.exists.invalidate_all();
    }

    fn invalidate(&self, path: &str) {
        let Ok(key) = normalize(path) else {
            return;
        };
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        let mut current = key.as_str();
        while !current.is_empty() {
            self.contents.invalidate(current);
            self.metadata.invalidate(current);
            self.exists.invalidate(current);
            current = parent(current);
        }
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Inserts a loaded value unless an invalidation ran since `seen`.
    fn fill<V>(&self, cache: &Cache<String, V>, key: String, seen: u64, value: V)
    where
        V: Clone + Send + Sync + 'static,
    {
        let epoch = self.epoch.lock();
        if *epoch == seen {
            cache.insert(key, value);
        }
    }
}

#[async_trait]
impl Backend for CachedBackend {
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool> {
        let written = self.inner.write(path, contents, options).await;
        self.invalidate(path);
        written
    }

    async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<bool> {
        let written = self.inner.write_stream(path, stream, options).await;
        self.invalidate(path);
        written
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Ok(key) = normalize(path) else {
            return self.inner.read(path).await;
        };
        if let Some(data) = self.contents.get(&key) {
            return Ok(Some(data.as_ref().clone()));
        }

        let seen = self.current_epoch();
        let data = self.inner.read(path).await?;
        if let Some(data) = &data {
            self.fill(&self.contents, key, seen, Arc::new(data.clone()));
        }
        Ok(data)
    }

    async fn read_stream(&self, path: &str) -> Result<Option<ByteStream>> {
        if let Ok(key) = normalize(path)
            && let Some(data) = self.contents.get(&key)
        {
            return Ok(Some(Box::new(std::io::Cursor::new(data.as_ref().clone()))));
        }
        self.inner.read_stream(path).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let deleted = self.inner.delete(path).await;
        self.invalidate(path);
        deleted
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let renamed = self.inner.rename(from, to).await;
        self.invalidate(from);
        self.invalidate(to);
        renamed
    }

    async fn copy(&self, from: &str, to: &str) -> Result<bool> {
        let copied = self.inner.copy(from, to).await;
        self.invalidate(to);
        copied
    }

    async fn has(&self, path: &str) -> Result<bool> {
        let Ok(key) = normalize(path) else {
            return self.inner.has(path).await;
        };
        if let Some(exists) = self.exists.get(&key) {
            return Ok(exists);
        }

        let seen = self.current_epoch();
        let exists = self.inner.has(path).await?;
        self.fill(&self.exists, key, seen, exists);
        Ok(exists)
    }

    async fn create_dir(&self, path: &str, options: &WriteOptions) -> Result<bool> {
        let created = self.inner.create_dir(path, options).await;
        self.invalidate(path);
        created
    }

    async fn delete_dir(&self, path: &str) -> Result<bool> {
        let deleted = self.inner.delete_dir(path).await;
        self.flush();
        deleted
    }

    async fn list_contents(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
        self.inner.list_contents(dir, recursive).await
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>> {
        let Ok(key) = normalize(path) else {
            return self.inner.get_metadata(path).await;
        };
        if let Some(meta) = self.metadata.get(&key) {
            return Ok(Some(meta));
        }

        let seen = self.current_epoch();
        let meta = self.inner.get_metadata(path).await?;
        if let Some(meta) = &meta {
            self.fill(&self.metadata, key, seen, meta.clone());
        }
        Ok(meta)
    }

    async fn get_mimetype(&self, path: &str) -> Result<Option<String>> {
        match self.cached_metadata(path) {
            Some(meta) => Ok(Some(meta.mimetype)),
            None => self.inner.get_mimetype(path).await,
        }
    }

    async fn get_size(&self, path: &str) -> Result<Option<u64>> {
        match self.cached_metadata(path) {
            Some(meta) => Ok(Some(meta.size)),
            None => self.inner.get_size(path).await,
        }
    }

    async fn get_timestamp(&self, path: &str) -> Result<Option<i64>> {
        match self.cached_metadata(path) {
            Some(meta) => Ok(Some(meta.timestamp)),
            None => self.inner.get_timestamp(path).await,
        }
    }

    async fn get_visibility(&self, path: &str) -> Result<Option<Visibility>> {
        match self.cached_metadata(path) {
            Some(meta) => Ok(Some(meta.visibility)),
            None => self.inner.get_visibility(path).await,
        }
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
        let changed = self.inner.set_visibility(path, visibility).await;
        self.invalidate(path);
        changed
    }
}

impl CachedBackend {
    fn cached_metadata(&self, path: &str) -> Option<Metadata> {
        let key = normalize(path).ok()?;
        self.metadata.get(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn cached() -> (CachedBackend, MemoryBackend) {
        let inner = MemoryBackend::new();
        let backend = CachedBackend::new(Arc::new(inner.clone()), CacheOptions::default());
        (backend, inner)
    }

    #[tokio::test]
    async fn test_reads_are_served_from_cache() {
        let (backend, inner) = cached();
        let opts = WriteOptions::default();

        backend.write("a.txt", b"first", &opts).await.unwrap();
        assert_eq!(backend.read("a.txt").await.unwrap().unwrap(), b"first");

        // Bypass the decorator; the cached copy is still returned
        inner.write("a.txt", b"second", &opts).await.unwrap();
        assert_eq!(backend.read("/a.txt").await.unwrap().unwrap(), b"first");

        backend.flush();
        assert_eq!(backend.read("a.txt").await.unwrap().unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_writes_through_decorator_invalidate() {
        let (backend, _inner) = cached();
        let opts = WriteOptions::default();

        backend.write("a.txt", b"one", &opts).await.unwrap();
        backend.read("a.txt").await.unwrap();
        backend.write("a.txt", b"two", &opts).await.unwrap();
        assert_eq!(backend.read("a.txt").await.unwrap().unwrap(), b"two");

        assert!(backend.delete("a.txt").await.unwrap());
        assert!(backend.read("a.txt").await.unwrap().is_none());
        assert!(!backend.has("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_existence_of_ancestors_is_invalidated() {
        let (backend, _inner) = cached();

        assert!(!backend.has("docs").await.unwrap());
        backend
            .write("docs/readme.md", b"#", &WriteOptions::default())
            .await
            .unwrap();
        assert!(backend.has("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_visibility_change_invalidates_metadata() {
        let (backend, _inner) = cached();
        backend
            .write(
                "p.txt",
                b"p",
                &WriteOptions::with_visibility(Visibility::Private),
            )
            .await
            .unwrap();

        assert_eq!(
            backend.get_visibility("p.txt").await.unwrap(),
            Some(Visibility::Private)
        );
        backend.get_metadata("p.txt").await.unwrap();
        backend.set_visibility("p.txt", Visibility::Public).await.unwrap();
        assert_eq!(
            backend.get_visibility("p.txt").await.unwrap(),
            Some(Visibility::Public)
        );
    }

    #[tokio::test]
    async fn test_delete_dir_flushes() {
        let (backend, _inner) = cached();
        let opts = WriteOptions::default();
        backend.write("tmp/a.txt", b"a", &opts).await.unwrap();
        assert!(backend.has("tmp/a.txt").await.unwrap());

        assert!(backend.delete_dir("tmp").await.unwrap());
        assert!(!backend.has("tmp/a.txt").await.unwrap());
    }

    /// Memory backend whose next read parks after loading its data.
    struct GatedReads {
        inner: MemoryBackend,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl GatedReads {
        fn new() -> Self {
            Self {
                inner: MemoryBackend::new(),
                armed: AtomicBool::new(false),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Backend for GatedReads {
        async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool> {
            self.inner.write(path, contents, options).await
        }

        async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
            let data = self.inner.read(path).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(data)
        }

        async fn delete(&self, path: &str) -> Result<bool> {
            self.inner.delete(path).await
        }

        async fn rename(&self, from: &str, to: &str) -> Result<bool> {
            self.inner.rename(from, to).await
        }

        async fn copy(&self, from: &str, to: &str) -> Result<bool> {
            self.inner.copy(from, to).await
        }

        async fn has(&self, path: &str) -> Result<bool> {
            self.inner.has(path).await
        }

        async fn create_dir(&self, path: &str, options: &WriteOptions) -> Result<bool> {
            self.inner.create_dir(path, options).await
        }

        async fn delete_dir(&self, path: &str) -> Result<bool> {
            self.inner.delete_dir(path).await
        }

        async fn list_contents(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>> {
            self.inner.list_contents(dir, recursive).await
        }

        async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>> {
            self.inner.get_metadata(path).await
        }

        async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
            self.inner.set_visibility(path, visibility).await
        }
    }

    #[tokio::test]
    async fn test_stale_fill_after_write_is_dropped() {
        let opts = WriteOptions::default();
        let gated = Arc::new(GatedReads::new());
        gated.inner.write("r.txt", b"old", &opts).await.unwrap();
        let backend = CachedBackend::new(gated.clone() as Arc<dyn Backend>, CacheOptions::default());

        gated.armed.store(true, Ordering::SeqCst);
        let reader = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.read("r.txt").await })
        };

        // The reader holds "old" while the write lands
        gated.entered.notified().await;
        backend.write("r.txt", b"new", &opts).await.unwrap();
        gated.release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap().unwrap(), b"old");
        assert_eq!(backend.read("r.txt").await.unwrap().unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_decorators_compose() {
        let inner = MemoryBackend::new();
        let once = CachedBackend::new(Arc::new(inner), CacheOptions::default());
        let twice = CachedBackend::new(Arc::new(once), CacheOptions::default());

        twice
            .write("x.txt", b"layered", &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(twice.read("x.txt").await.unwrap().unwrap(), b"layered");
    }
}
