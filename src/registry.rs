//! Registration tables for backend and cache constructors.
//!
//! A disk's `backend_type` names an entry in [`BackendRegistry`]; its
//! `cache_settings.cache_type` names an entry in [`CacheRegistry`]. Each
//! entry declares the settings keys it requires (dot paths) and a
//! constructor. Required keys are checked before the constructor runs, so
//! malformed configuration never reaches a backend.
//!
//! Both tables are built at startup and may be extended with custom
//! constructors:
//!
//! ```ignore
//! use disks::registry::BackendRegistry;
//!
//! let mut backends = BackendRegistry::with_defaults();
//! backends.register("archive", &["bucket"], |settings| {
//!     Ok(Arc::new(ArchiveBackend::connect(settings.get_str("bucket").unwrap_or_default())?))
//! });
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::backend::{Backend, LocalBackend, MemoryBackend, NullBackend, Permissions, Visibility};
use crate::cache::{CacheOptions, CachedBackend};
use crate::config::Settings;
use crate::error::{Error, ErrorKind, Result};

/// Builds a backend from its settings.
pub type BackendConstructor =
    dyn Fn(&Settings) -> anyhow::Result<Arc<dyn Backend>> + Send + Sync + 'static;

/// Wraps a backend with a cache built from its settings.
pub type CacheConstructor = dyn Fn(&Settings, Arc<dyn Backend>) -> anyhow::Result<Arc<dyn Backend>>
    + Send
    + Sync
    + 'static;

struct Registration<C: ?Sized> {
    required: Vec<String>,
    constructor: Box<C>,
}

fn check_required(kind: &str, name: &str, required: &[String], settings: &Settings) -> Result<()> {
    let missing = settings.missing(required);
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::configuration(format!(
        "{kind} '{name}' is missing required settings: {}",
        missing.join(", ")
    )))
}

/// Maps backend type names to constructors.
pub struct BackendRegistry {
    factories: HashMap<String, Registration<BackendConstructor>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BackendRegistry {
    /// Creates a registry with no backend types.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the bundled `local`, `memory` and `null` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register("local", &["root"], local_backend)
            .register("memory", &[], memory_backend)
            .register("null", &[], |_| Ok(Arc::new(NullBackend::new())));
        registry
    }

    /// Registers (or replaces) a backend type.
    pub fn register<F>(&mut self, name: &str, required: &[&str], constructor: F) -> &mut Self
    where
        F: Fn(&Settings) -> anyhow::Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        self.factories.insert(
            name.to_string(),
            Registration {
                required: required.iter().map(|k| (*k).to_string()).collect(),
                constructor: Box::new(constructor),
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Required settings keys of a backend type.
    pub fn required_keys(&self, name: &str) -> Option<&[String]> {
        self.factories.get(name).map(|r| r.required.as_slice())
    }

    /// Constructs a backend of the given type.
    ///
    /// # Errors
    ///
    /// - [`Error::Disk`] if the type is not registered or the constructor fails
    /// - [`Error::Configuration`] if a required setting is missing
    pub fn construct(&self, backend_type: &str, settings: &Settings) -> Result<Arc<dyn Backend>> {
        let registration = self
            .factories
            .get(backend_type)
            .ok_or_else(|| Error::disk(format!("adapter '{backend_type}' does not exist")))?;

        check_required("backend", backend_type, &registration.required, settings)?;

        (registration.constructor)(settings).map_err(|e| {
            Error::with_source(
                ErrorKind::Disk,
                format!("failed to construct '{backend_type}' backend"),
                e,
            )
        })
    }
}

/// Maps cache type names to decorators.
pub struct CacheRegistry {
    decorators: HashMap<String, Registration<CacheConstructor>>,
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CacheRegistry {
    /// Creates a registry with no cache types.
    pub fn empty() -> Self {
        Self {
            decorators: HashMap::new(),
        }
    }

    /// Creates a registry with the bundled `memory` cache.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", &[], memory_cache);
        registry
    }

    /// Registers (or replaces) a cache type.
    pub fn register<F>(&mut self, name: &str, required: &[&str], decorator: F) -> &mut Self
    where
        F: Fn(&Settings, Arc<dyn Backend>) -> anyhow::Result<Arc<dyn Backend>>
            + Send
            + Sync
            + 'static,
    {
        self.decorators.insert(
            name.to_string(),
            Registration {
                required: required.iter().map(|k| (*k).to_string()).collect(),
                constructor: Box::new(decorator),
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decorators.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decorators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Wraps `backend` with the given cache type.
    ///
    /// # Errors
    ///
    /// - [`Error::Disk`] if the type is not registered or the decorator fails
    /// - [`Error::Configuration`] if a required setting is missing
    pub fn decorate(
        &self,
        cache_type: &str,
        settings: &Settings,
        backend: Arc<dyn Backend>,
    ) -> Result<Arc<dyn Backend>> {
        let registration = self
            .decorators
            .get(cache_type)
            .ok_or_else(|| Error::disk(format!("cache '{cache_type}' does not exist")))?;

        check_required("cache", cache_type, &registration.required, settings)?;

        (registration.constructor)(settings, backend).map_err(|e| {
            Error::with_source(
                ErrorKind::Disk,
                format!("failed to construct '{cache_type}' cache"),
                e,
            )
        })
    }
}

fn default_visibility(settings: &Settings) -> anyhow::Result<Visibility> {
    match settings.lookup("visibility") {
        None => Ok(Visibility::Public),
        Some(value) => value
            .as_str()
            .context("'visibility' must be a string")?
            .parse(),
    }
}

fn mode(settings: &Settings, path: &str, default: u32) -> anyhow::Result<u32> {
    match settings.lookup(path) {
        None => Ok(default),
        Some(value) => {
            let mode = value
                .as_integer()
                .with_context(|| format!("'{path}' must be an integer mode"))?;
            u32::try_from(mode)
                .ok()
                .filter(|m| *m <= 0o7777)
                .with_context(|| format!("'{path}' is not a valid mode: {mode:o}"))
        },
    }
}

fn local_backend(settings: &Settings) -> anyhow::Result<Arc<dyn Backend>> {
    let root = settings.get_str("root").context("'root' must be a string")?;

    let defaults = Permissions::default();
    let permissions = Permissions {
        file_public: mode(settings, "permissions.file.public", defaults.file_public)?,
        file_private: mode(settings, "permissions.file.private", defaults.file_private)?,
        dir_public: mode(settings, "permissions.dir.public", defaults.dir_public)?,
        dir_private: mode(settings, "permissions.dir.private", defaults.dir_private)?,
    };

    let backend = LocalBackend::open(root, permissions, default_visibility(settings)?)?;
    Ok(Arc::new(backend))
}

fn memory_backend(settings: &Settings) -> anyhow::Result<Arc<dyn Backend>> {
    Ok(Arc::new(MemoryBackend::with_visibility(default_visibility(
        settings,
    )?)))
}

fn memory_cache(settings: &Settings, backend: Arc<dyn Backend>) -> anyhow::Result<Arc<dyn Backend>> {
    let mut options = CacheOptions::default();
    if let Some(value) = settings.lookup("expire") {
        let secs = value
            .as_integer()
            .and_then(|s| u64::try_from(s).ok())
            .context("'expire' must be a non-negative integer (seconds)")?;
        options.expire = Some(Duration::from_secs(secs));
    }
    if let Some(value) = settings.lookup("max_capacity") {
        options.max_capacity = value
            .as_integer()
            .and_then(|c| u64::try_from(c).ok())
            .context("'max_capacity' must be a non-negative integer")?;
    }
    Ok(Arc::new(CachedBackend::new(backend, options)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_registrations() {
        let backends = BackendRegistry::with_defaults();
        assert_eq!(backends.names(), vec!["local", "memory", "null"]);
        assert_eq!(backends.required_keys("local").unwrap(), ["root".to_string()]);

        let caches = CacheRegistry::with_defaults();
        assert_eq!(caches.names(), vec!["memory"]);
    }

    #[test]
    fn test_unknown_backend_is_disk_error() {
        let backends = BackendRegistry::with_defaults();
        let err = backends
            .construct("ftp", &Settings::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Disk);
        assert!(err.to_string().contains("adapter 'ftp' does not exist"));
    }

    #[test]
    fn test_missing_keys_checked_before_constructor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut backends = BackendRegistry::empty();
        backends.register("remote", &["host", "credentials.key"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryBackend::new()))
        });

        let err = backends
            .construct("remote", &Settings::new().with("host", "example.com"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("credentials.key"));
        assert!(!err.to_string().contains("host"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_constructor_failure_is_wrapped() {
        use std::error::Error as _;

        let mut backends = BackendRegistry::empty();
        backends.register("flaky", &[], |_| anyhow::bail!("connection refused"));

        let err = backends.construct("flaky", &Settings::new()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Disk);
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }

    #[test]
    fn test_local_backend_settings() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backends = BackendRegistry::with_defaults();

        let root = tmp.path().join("disk");
        let settings = Settings::new()
            .with("root", root.to_string_lossy().to_string())
            .with("visibility", "private");
        assert!(backends.construct("local", &settings).is_ok());
        assert!(root.is_dir());

        let bad = Settings::new()
            .with("root", root.to_string_lossy().to_string())
            .with("visibility", "world");
        let err = backends.construct("local", &bad).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Disk);

        let missing = backends.construct("local", &Settings::new()).err().unwrap();
        assert_eq!(missing.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_cache_decorator() {
        let caches = CacheRegistry::with_defaults();
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());

        let settings = Settings::new().with("cache_type", "memory").with("expire", 30);
        assert!(caches.decorate("memory", &settings, Arc::clone(&backend)).is_ok());

        let bad = Settings::new().with("expire", -1);
        let err = caches.decorate("memory", &bad, Arc::clone(&backend)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Disk);

        let err = caches.decorate("redis", &settings, backend).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Disk);
        assert!(err.to_string().contains("cache 'redis' does not exist"));
    }

    #[test]
    fn test_cache_required_keys() {
        let mut caches = CacheRegistry::empty();
        caches.register("memcached", &["host", "port"], |_, backend| Ok(backend));

        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let err = caches
            .decorate("memcached", &Settings::new().with("host", "localhost"), backend)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("port"));
    }
}
