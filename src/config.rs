//! Disk configuration.
//!
//! Disks are declared in a TOML file, one table per disk name:
//!
//! ```toml
//! [disks.default]
//! backend_type = "local"
//! url_base = "https://cdn.example.com/files/"
//!
//! [disks.default.backend_settings]
//! root = "/var/lib/disks/default"
//!
//! [disks.default.cache_settings]
//! cache_type = "memory"
//! expire = 60
//!
//! [disks.scratch]
//! backend_type = "memory"
//! ```
//!
//! - [`DisksConfig`] - the whole set, must contain a `default` disk
//! - [`DiskConfig`] - one disk: backend type, settings, cache, URL base
//! - [`Settings`] - opaque nested table with dot-path lookup
//!
//! Configuration is supplied wholesale to the disk manager and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, ErrorKind, Result};

/// Name of the disk every configuration must declare.
pub const DEFAULT_DISK: &str = "default";

/// Default configuration file looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "disks.toml";

/// Key inside `cache_settings` naming the cache decorator.
pub const CACHE_TYPE_KEY: &str = "cache_type";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Problems that make the affected disk unusable.
    pub errors: Vec<String>,
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Opaque settings table consumed by a backend or cache constructor.
///
/// Keys are addressed with dot-path notation over nested tables, e.g.
/// `credentials.key` for `[credentials] key = "..."`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(toml::Table);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level key. Builder style, for programmatic configuration.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up a value by dot path.
    pub fn lookup(&self, path: &str) -> Option<&toml::Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(toml::Value::as_str)
    }

    pub fn get_integer(&self, path: &str) -> Option<i64> {
        self.lookup(path).and_then(toml::Value::as_integer)
    }

    /// Returns the required keys that are absent, in declaration order.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .map(String::as_str)
            .filter(|key| !self.contains(key))
            .collect()
    }

    pub fn as_table(&self) -> &toml::Table {
        &self.0
    }
}

impl From<toml::Table> for Settings {
    fn from(table: toml::Table) -> Self {
        Self(table)
    }
}

/// Configuration of a single disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Registered backend type, e.g. `local` or `memory`
    #[serde(default)]
    pub backend_type: String,
    /// Settings handed to the backend constructor
    #[serde(default)]
    pub backend_settings: Settings,
    /// Cache decorator settings; must name a `cache_type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_settings: Option<Settings>,
    /// Base URL public files are served from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_base: Option<String>,
}

impl DiskConfig {
    pub fn new(backend_type: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            backend_settings: Settings::new(),
            cache_settings: None,
            url_base: None,
        }
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.backend_settings = self.backend_settings.with(key, value);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, settings: Settings) -> Self {
        self.cache_settings = Some(settings);
        self
    }

    #[must_use]
    pub fn with_url_base(mut self, url_base: impl Into<String>) -> Self {
        self.url_base = Some(url_base.into());
        self
    }

    /// Returns the configured cache type, if caching is enabled.
    pub fn cache_type(&self) -> Option<&str> {
        self.cache_settings
            .as_ref()
            .and_then(|s| s.get_str(CACHE_TYPE_KEY))
    }
}

/// The full set of configured disks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisksConfig {
    #[serde(default)]
    pub disks: BTreeMap<String, DiskConfig>,
}

impl DisksConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a disk. Builder style.
    #[must_use]
    pub fn with_disk(mut self, name: impl Into<String>, disk: DiskConfig) -> Self {
        self.disks.insert(name.into(), disk);
        self
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or is not
    /// valid TOML for this schema.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::with_source(
                ErrorKind::Configuration,
                format!("failed to read config file: {}", path.display()),
                e.into(),
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on invalid TOML or mismatched types.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::with_source(
                ErrorKind::Configuration,
                "failed to parse disk configuration",
                e.into(),
            )
        })
    }

    pub fn get(&self, name: &str) -> Option<&DiskConfig> {
        self.disks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.disks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.disks.keys().map(String::as_str)
    }

    /// Collects every configuration problem without failing.
    ///
    /// Backend and cache types are not checked against the registries;
    /// an unknown type only fails when that disk is first used.
    ///
    /// Errors:
    /// - No `default` disk
    /// - Empty `backend_type`
    /// - `cache_settings` without a `cache_type`
    /// - `url_base` that is not an absolute URL
    pub fn inspect(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.contains(DEFAULT_DISK) {
            result.errors.push(format!(
                "no '{DEFAULT_DISK}' disk configured\n  \
                 Add a [disks.{DEFAULT_DISK}] table with a backend_type"
            ));
        }

        for (name, disk) in &self.disks {
            if disk.backend_type.trim().is_empty() {
                result.errors.push(format!("disk '{name}' has no backend_type"));
            }

            if disk.cache_settings.is_some() && disk.cache_type().is_none() {
                result.errors.push(format!(
                    "disk '{name}' has cache_settings without a '{CACHE_TYPE_KEY}' key"
                ));
            }

            if let Some(base) = &disk.url_base {
                match parse_url_base(base) {
                    Ok(_) if !base.ends_with('/') => {
                        result.warnings.push(format!(
                            "disk '{name}' url_base has no trailing '/'; one is assumed"
                        ));
                    },
                    Ok(_) => {},
                    Err(e) => result.errors.push(format!("disk '{name}' {e}")),
                }
            }
        }

        result
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// # Errors
    ///
    /// Returns a configuration error listing every error [`inspect`](Self::inspect)
    /// finds.
    pub fn validate(&self) -> Result<ValidationResult> {
        let result = self.inspect();
        if result.has_errors() {
            return Err(Error::configuration(format!(
                "validation failed:\n  - {}",
                result.errors.join("\n  - ")
            )));
        }
        Ok(result)
    }
}

/// Parses a `url_base`, which must be an absolute URL usable as a base.
pub(crate) fn parse_url_base(base: &str) -> std::result::Result<url::Url, String> {
    match url::Url::parse(base) {
        Ok(parsed) if parsed.cannot_be_a_base() => Err(format!("url_base cannot be a base: {base}")),
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(format!("url_base is invalid ({e}): {base}")),
    }
}
