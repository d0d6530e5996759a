//! Value types shared by all backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stream of bytes handed to or returned from a backend.
pub type ByteStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Access classification attached to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// Maps a caller-facing `public` flag to a visibility.
    pub fn from_public(public: bool) -> Self {
        if public { Self::Public } else { Self::Private }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => anyhow::bail!("invalid visibility '{other}', expected 'public' or 'private'"),
        }
    }
}

/// Entry type tag in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// A single record returned by `list_contents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the disk root, `/`-separated
    pub path: String,
    pub kind: EntryKind,
    /// Extension without the leading dot (files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Size in bytes (files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modification, unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Entry {
    pub fn file(path: impl Into<String>, size: u64, timestamp: i64) -> Self {
        let path = path.into();
        let extension = extension_of(&path);
        Self {
            path,
            kind: EntryKind::File,
            extension,
            size: Some(size),
            timestamp: Some(timestamp),
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
            extension: None,
            size: None,
            timestamp: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Metadata for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mimetype: String,
    /// Last modification, unix seconds
    pub timestamp: i64,
    pub visibility: Visibility,
}

/// Options accepted by write-style operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Visibility to apply; `None` keeps an existing file's visibility
    /// and uses the backend's default for a new one
    pub visibility: Option<Visibility>,
    /// MIME type override; `None` guesses from the extension
    pub mimetype: Option<String>,
}

impl WriteOptions {
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            visibility: Some(visibility),
            mimetype: None,
        }
    }
}

/// Returns the extension of the last path segment, if any.
pub(crate) fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_string())
}

/// Guesses a MIME type from the path, falling back to octet-stream.
pub(crate) fn guess_mimetype(path: &str) -> String {
    mime_guess::from_path(path)
        .first()
        .map_or_else(|| "application/octet-stream".to_string(), |mime| mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_strings() {
        assert_eq!(Visibility::from_public(true).as_str(), "public");
        assert_eq!(Visibility::from_public(false).as_str(), "private");
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert!("world".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("docs/readme.md").as_deref(), Some("md"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("dir.d/Makefile"), None);
        assert_eq!(extension_of(".gitignore"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_guess_mimetype() {
        assert_eq!(guess_mimetype("a.json"), "application/json");
        assert_eq!(guess_mimetype("a.unknownext"), "application/octet-stream");
    }
}
