//! Typed errors for disk operations.
//!
//! Backends report failures as `anyhow::Error`. The facade catches every
//! one of them at the boundary and re-raises it as the category-specific
//! variant below, keeping the original error as the source. Callers match
//! on [`Error::kind`] (or the variant) to handle a category.

/// Result type for disk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Underlying collaborator error carried as the source of an [`Error`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Disk errors, one variant per category.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration (including a missing `default` disk).
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Unknown backend type or a backend that failed to construct.
    #[error("disk error: {message}")]
    Disk {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    FileWrite {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    FileRead {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    FileRename {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    FileCopy {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    FileMove {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    FileDelete {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    DirectoryCreate {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{message}")]
    DirectoryDelete {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Metadata, visibility, size, timestamp, touch and URL failures.
    #[error("{message}")]
    FileMetadata {
        message: String,
        #[source]
        source: Option<Cause>,
    },
}

/// Error category, for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Disk,
    FileWrite,
    FileRead,
    FileRename,
    FileCopy,
    FileMove,
    FileDelete,
    DirectoryCreate,
    DirectoryDelete,
    FileMetadata,
}

impl Error {
    /// Builds an error of the given category without a source.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::build(kind, message.into(), None)
    }

    /// Builds an error of the given category wrapping a collaborator error.
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::build(kind, message.into(), Some(source.into()))
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a disk error.
    pub fn disk(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disk, message)
    }

    fn build(kind: ErrorKind, message: String, source: Option<Cause>) -> Self {
        match kind {
            ErrorKind::Configuration => Self::Configuration { message, source },
            ErrorKind::Disk => Self::Disk { message, source },
            ErrorKind::FileWrite => Self::FileWrite { message, source },
            ErrorKind::FileRead => Self::FileRead { message, source },
            ErrorKind::FileRename => Self::FileRename { message, source },
            ErrorKind::FileCopy => Self::FileCopy { message, source },
            ErrorKind::FileMove => Self::FileMove { message, source },
            ErrorKind::FileDelete => Self::FileDelete { message, source },
            ErrorKind::DirectoryCreate => Self::DirectoryCreate { message, source },
            ErrorKind::DirectoryDelete => Self::DirectoryDelete { message, source },
            ErrorKind::FileMetadata => Self::FileMetadata { message, source },
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Disk { .. } => ErrorKind::Disk,
            Self::FileWrite { .. } => ErrorKind::FileWrite,
            Self::FileRead { .. } => ErrorKind::FileRead,
            Self::FileRename { .. } => ErrorKind::FileRename,
            Self::FileCopy { .. } => ErrorKind::FileCopy,
            Self::FileMove { .. } => ErrorKind::FileMove,
            Self::FileDelete { .. } => ErrorKind::FileDelete,
            Self::DirectoryCreate { .. } => ErrorKind::DirectoryCreate,
            Self::DirectoryDelete { .. } => ErrorKind::DirectoryDelete,
            Self::FileMetadata { .. } => ErrorKind::FileMetadata,
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message, .. }
            | Self::Disk { message, .. }
            | Self::FileWrite { message, .. }
            | Self::FileRead { message, .. }
            | Self::FileRename { message, .. }
            | Self::FileCopy { message, .. }
            | Self::FileMove { message, .. }
            | Self::FileDelete { message, .. }
            | Self::DirectoryCreate { message, .. }
            | Self::DirectoryDelete { message, .. }
            | Self::FileMetadata { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_round_trips_through_constructor() {
        let err = Error::new(ErrorKind::FileDelete, "unable to delete file: a.txt");
        assert_eq!(err.kind(), ErrorKind::FileDelete);
        assert_eq!(err.message(), "unable to delete file: a.txt");
        assert_eq!(err.to_string(), "unable to delete file: a.txt");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_source_is_preserved() {
        let cause = anyhow::anyhow!("permission denied");
        let err = Error::with_source(ErrorKind::FileWrite, "unable to write file: a.txt", cause);

        assert!(matches!(err, Error::FileWrite { .. }));
        let source = err.source().expect("source should be set");
        assert_eq!(source.to_string(), "permission denied");
    }

    #[test]
    fn test_configuration_display_prefix() {
        let err = Error::configuration("missing default disk");
        assert_eq!(err.to_string(), "configuration error: missing default disk");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
