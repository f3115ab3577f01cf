//! Path utilities.
//!
//! This module provides utilities for working with file paths, including
//! the portable relative keys used to index files inside a snapshot.

use std::path::{Component, Path, PathBuf};

/// Get the toolsnap data directory.
///
/// This follows XDG conventions:
/// - `$XDG_DATA_HOME/toolsnap` if set
/// - `~/.local/share/toolsnap` otherwise
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("toolsnap"))
}

/// Check if a path is within a base directory.
///
/// This is used for security checks to prevent path traversal.
pub fn is_within(path: &Path, base: &Path) -> bool {
    // Canonicalize both paths if possible
    let canonical_path = path.canonicalize().ok();
    let canonical_base = base.canonicalize().ok();

    match (canonical_path, canonical_base) {
        (Some(p), Some(b)) => p.starts_with(&b),
        _ => {
            // If we can't canonicalize, do a simple prefix check
            // This is less reliable but better than nothing
            path.starts_with(base)
        }
    }
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {
                // Skip `.`
            }
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Make a path relative to a base directory.
///
/// Returns `None` if the path is not within the base directory.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Join a path safely, preventing path traversal.
///
/// Returns `None` if the resulting path would be outside the base.
pub fn safe_join(base: &Path, path: &Path) -> Option<PathBuf> {
    let result = base.join(path);
    let normalized = normalize(&result);

    if is_within(&normalized, base) {
        Some(normalized)
    } else {
        None
    }
}

/// Render a relative path as a portable snapshot key.
///
/// Components are joined with `/` regardless of platform so that a
/// snapshot written on one OS indexes identically on another.
pub fn portable_key(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir() {
        let dir = data_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("toolsnap"));
    }

    #[test]
    fn test_is_within() {
        let base = PathBuf::from("/home/user/project");
        assert!(is_within(Path::new("/home/user/project/src"), &base));
        assert!(!is_within(Path::new("/home/user/other"), &base));
    }

    #[test]
    fn test_normalize() {
        let path = Path::new("/home/user/./project/../project/src");
        let normalized = normalize(path);
        assert_eq!(normalized, PathBuf::from("/home/user/project/src"));
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/home/user/project");
        let path = Path::new("/home/user/project/src/main.rs");
        let relative = relative_to(path, base);
        assert_eq!(relative, Some(PathBuf::from("src/main.rs")));
    }

    #[test]
    fn test_safe_join() {
        let base = PathBuf::from("/home/user/project");

        // Safe join
        let result = safe_join(&base, Path::new("src/main.rs"));
        assert!(result.is_some());

        // Unsafe join (path traversal attempt)
        let result = safe_join(&base, Path::new("../../../etc/passwd"));
        assert!(result.is_none());
    }

    #[test]
    fn test_portable_key() {
        assert_eq!(portable_key(Path::new("src/main.rs")), "src/main.rs");
        assert_eq!(portable_key(Path::new("./src/main.rs")), "src/main.rs");
        assert_eq!(portable_key(Path::new("README.md")), "README.md");
    }

    #[test]
    fn test_portable_key_strips_non_normal_components() {
        // Leading separators and dots never appear in a snapshot key
        assert_eq!(portable_key(Path::new("/a/b")), "a/b");
    }

    #[test]
    fn test_is_within_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("sub");
        std::fs::create_dir(&inside).unwrap();

        assert!(is_within(&inside, dir.path()));
        // A dotted route back into the base still counts as inside
        let dotted = dir.path().join("sub").join("..").join("sub");
        assert!(is_within(&dotted, dir.path()));
    }
}
