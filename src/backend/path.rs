//! Path normalization shared by the bundled backends.
//!
//! Paths are always relative to the disk root. A leading `/` is
//! accepted and means the root; `..` components are rejected so a path can
//! never escape the disk.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Normalizes a file path to its `/`-separated form.
///
/// # Examples
/// ```text
/// normalize("images/logo.png")   // Ok("images/logo.png")
/// normalize("/./data//file")     // Ok("data/file")
/// normalize("../etc/passwd")     // Error: path traversal
/// normalize("")                  // Error: empty path
/// ```
pub(crate) fn normalize(path: &str) -> Result<String> {
    let normalized = normalize_dir(path)?;
    if normalized.is_empty() {
        bail!("Path cannot be empty: '{path}'");
    }
    Ok(normalized)
}

/// Normalizes a directory path; the empty string denotes the disk root.
pub(crate) fn normalize_dir(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {},
            ".." => bail!("Path cannot contain '..': {path}"),
            s if parts.is_empty() && s.len() == 2 && s.ends_with(':') => {
                bail!("Path cannot contain a drive prefix: {path}")
            },
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Returns the filesystem location of `path` below `root`.
pub(crate) fn resolve(root: &Path, path: &str) -> Result<PathBuf> {
    let normalized = normalize_dir(path)?;
    let mut full = root.to_path_buf();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(name) => full.push(name),
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("Path escapes the disk root: {path}")
            },
        }
    }
    Ok(full)
}

/// Returns the parent directory of a normalized path ("" for top level).
pub(crate) fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// True when `path` sits below `dir` (directly, or anywhere if `recursive`).
pub(crate) fn is_within(dir: &str, path: &str, recursive: bool) -> bool {
    let rest = if dir.is_empty() {
        path
    } else {
        match path.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
            Some(rest) => rest,
            None => return false,
        }
    };
    !rest.is_empty() && (recursive || !rest.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("images/logo.png").unwrap(), "images/logo.png");
        assert_eq!(normalize("/./data//file.txt").unwrap(), "data/file.txt");
        assert_eq!(normalize("a\\b.txt").unwrap(), "a/b.txt");
        assert!(normalize("C:/windows/system.ini").is_err());
    }

    #[test]
    fn test_normalize_rejects_traversal_and_empty() {
        for path in ["../etc/passwd", "a/../../b", "", "/", "./"] {
            assert!(normalize(path).is_err(), "expected rejection for {path:?}");
        }
    }

    #[test]
    fn test_normalize_dir_allows_root() {
        assert_eq!(normalize_dir("").unwrap(), "");
        assert_eq!(normalize_dir("/").unwrap(), "");
        assert_eq!(normalize_dir("docs/").unwrap(), "docs");
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let root = Path::new("/srv/disk");
        assert_eq!(
            resolve(root, "a/b.txt").unwrap(),
            PathBuf::from("/srv/disk/a/b.txt")
        );
        assert!(resolve(root, "../b.txt").is_err());
    }

    #[test]
    fn test_parent_and_within() {
        assert_eq!(parent("a/b/c.txt"), "a/b");
        assert_eq!(parent("c.txt"), "");

        assert!(is_within("", "a.txt", false));
        assert!(!is_within("", "a/b.txt", false));
        assert!(is_within("", "a/b.txt", true));
        assert!(is_within("a", "a/b.txt", false));
        assert!(!is_within("a", "ab/c.txt", true));
        assert!(!is_within("a", "a", true));
    }
}
