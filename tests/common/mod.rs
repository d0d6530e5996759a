//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use disks::backend::{Backend, ByteStream, Entry, MemoryBackend, Metadata, Visibility, WriteOptions};
use disks::{BackendRegistry, CacheRegistry, DiskConfig, DiskManager, DisksConfig};

/// Config with one in-memory disk per name (plus `default`).
pub fn memory_config(names: &[&str]) -> DisksConfig {
    names.iter().fold(
        DisksConfig::new().with_disk("default", DiskConfig::new("memory")),
        |config, name| config.with_disk(*name, DiskConfig::new("memory")),
    )
}

/// Manager over in-memory disks `default` plus `names`.
pub fn memory_manager(names: &[&str]) -> DiskManager {
    DiskManager::new(memory_config(names)).expect("valid config")
}

/// Backend registry with a `counting` type that records every construction.
pub fn counting_registry() -> (BackendRegistry, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let mut registry = BackendRegistry::with_defaults();
    let counter = count.clone();
    registry.register("counting", &[], move |_settings| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryBackend::new()) as Arc<dyn Backend>)
    });
    (registry, count)
}

/// Manager whose disks all use the `counting` backend type.
pub fn counting_manager(names: &[&str]) -> (DiskManager, Arc<AtomicUsize>) {
    let config = names.iter().fold(
        DisksConfig::new().with_disk("default", DiskConfig::new("counting")),
        |config, name| config.with_disk(*name, DiskConfig::new("counting")),
    );
    let (registry, count) = counting_registry();
    let manager =
        DiskManager::with_registries(config, registry, CacheRegistry::with_defaults()).expect("valid config");
    (manager, count)
}

/// In-memory backend whose deletes always report failure.
#[derive(Clone, Default)]
pub struct UndeletableBackend {
    pub inner: MemoryBackend,
}

#[async_trait]
impl Backend for UndeletableBackend {
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<bool> {
        self.inner.write(path, contents, options).await
    }

    async fn write_stream(&self, path: &str, stream: ByteStream, options: &WriteOptions) -> Result<bool> {
        self.inner.write_stream(path, stream, options).await
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(path).await
    }

    async fn delete(&self, _path: &str) -> Result<bool> {
        anyhow::bail!("permission denied")
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

    async fn delete_dir(&self, _path: &str) -> Result<bool> {
        Ok(false)
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
