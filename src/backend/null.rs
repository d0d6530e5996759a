//! Backend that stores nothing.
//!
//! Writes succeed and are discarded; nothing ever exists. Useful as a
//! sink for disks that are configured but intentionally inert.

use super::Backend;
use super::path::{normalize, normalize_dir};
use super::types::{Entry, Metadata, Visibility, WriteOptions};
use anyhow::Result;
use async_trait::async_trait;

/// Discards every write and reports every path as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for NullBackend {
    async fn write(&self, path: &str, _contents: &[u8], _options: &WriteOptions) -> Result<bool> {
        normalize(path)?;
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        normalize(path)?;
        Ok(None)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        normalize(path)?;
        Ok(false)
    }

    async fn rename(&self, _from: &str, _to: &str) -> Result<bool> {
        Ok(false)
    }

    async fn copy(&self, _from: &str, _to: &str) -> Result<bool> {
        Ok(false)
    }

    async fn has(&self, path: &str) -> Result<bool> {
        normalize(path)?;
        Ok(false)
    }

    async fn create_dir(&self, path: &str, _options: &WriteOptions) -> Result<bool> {
        normalize(path)?;
        Ok(true)
    }

    async fn delete_dir(&self, _path: &str) -> Result<bool> {
        Ok(false)
    }

    async fn list_contents(&self, dir: &str, _recursive: bool) -> Result<Vec<Entry>> {
        normalize_dir(dir)?;
        Ok(Vec::new())
    }

    async fn get_metadata(&self, _path: &str) -> Result<Option<Metadata>> {
        Ok(None)
    }

    async fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<bool> {
        Ok(false)
    }
}
