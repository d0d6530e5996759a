//! Multi-backend file storage behind named disks.
//!
//! A disk is a named storage target: one [`Backend`](backend::Backend)
//! (local filesystem, in-memory, or null) optionally wrapped in a cache.
//! Disks are declared in a TOML file and built lazily by a
//! [`DiskManager`].
//!
//! ```ignore
//! use disks::{DiskManager, DisksConfig};
//!
//! let config = DisksConfig::load_from("disks.toml")?;
//! let mut manager = DiskManager::new(config)?;
//!
//! // Explicit handle
//! manager.disk("uploads")?.write("a.txt", "hello", true).await?;
//!
//! // Cursor: runs on "uploads" once, then back to "default"
//! manager.select("uploads", false)?;
//! let data = manager.read("a.txt").await?;
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod disk;
pub mod error;
pub mod manager;
pub mod registry;

pub use backend::{Backend, Entry, EntryKind, Metadata, Visibility};
pub use config::{DiskConfig, DisksConfig, Settings};
pub use disk::Disk;
pub use error::{Error, ErrorKind, Result};
pub use manager::DiskManager;
pub use registry::{BackendRegistry, CacheRegistry};
