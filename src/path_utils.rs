//! Path utilities for safe and robust file path handling.
//!
//! Source trees come from many machines, so names are converted lossily
//! instead of failing on invalid UTF-8, and every name written into the
//! target tree goes through [`sanitize_filename`].

use crate::error::{Error, Result};

use std::path::{Component, Path, PathBuf};

/// Gets the file name from a path with fallback to lossy conversion.
///
/// # Arguments
///
/// * `path` - The path to extract the file name from
///
/// # Returns
///
/// * `String` - The file name, using lossy conversion if necessary
pub fn get_file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Converts a path to a string with fallback to lossy conversion.
pub fn path_to_string_lossy(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Lowercase extension without the dot, if any.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Splits `path` into its segments below `root`, lossily converted.
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Segments from the first folder below `root` to the file name
/// * `Err(Error::InvalidPath)` - `path` is not inside `root`
pub fn relative_segments(root: &Path, path: &Path) -> Result<Vec<String>> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::InvalidPath(
            path.to_path_buf(),
            format!("Path is not inside {}", path_to_string_lossy(root)),
        )
    })?;
    Ok(relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .collect())
}

/// Checks if a filename starts with a dot (hidden file) using safe conversion.
///
/// # Arguments
///
/// * `path` - The path to check
///
/// # Returns
///
/// * `bool` - True if the file is hidden (starts with a dot)
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Sanitizes a filename by replacing invalid characters with safe alternatives.
///
/// # Arguments
///
/// * `filename` - The filename to sanitize
///
/// # Returns
///
/// * `String` - The sanitized filename
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| match c {
            '<' | '>' | '"' | '|' | '?' | '*' => '-',
            ':' => '-',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    // Windows refuses trailing dots and spaces
    sanitized.trim_end_matches(['.', ' ']).to_string()
}

/// Absolute form of `path` for comparisons, without requiring it to exist.
///
/// The deepest existing ancestor is canonicalized and the missing remainder
/// appended, so a not yet created target compares correctly against a
/// canonical source.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| {
        Error::InvalidPath(path.to_path_buf(), format!("Cannot resolve path: {}", e))
    })?;

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |path: PathBuf, name| path.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_path_to_string_lossy() {
        let path = Path::new("test/path");
        let result = path_to_string_lossy(path);
        assert!(result.contains("test"));
        assert!(result.contains("path"));
    }

    #[test]
    fn test_get_file_name_lossy() {
        let path = Path::new("Overlord/Overlord - v01.epub");
        assert_eq!(get_file_name_lossy(path), "Overlord - v01.epub");
    }

    #[test]
    fn test_lowercase_extension() {
        assert_eq!(
            lowercase_extension(Path::new("a/Book.EPUB")),
            Some("epub".to_string())
        );
        assert_eq!(lowercase_extension(Path::new("a/README")), None);
    }

    #[test]
    fn test_relative_segments() {
        let root = Path::new("/library/src");
        let file = Path::new("/library/src/Overlord/Light Novel/Overlord - v01.epub");
        assert_eq!(
            relative_segments(root, file).unwrap(),
            vec!["Overlord", "Light Novel", "Overlord - v01.epub"]
        );
        assert!(relative_segments(root, Path::new("/elsewhere/x.epub")).is_err());
    }

    #[test]
    fn test_is_hidden_file() {
        let hidden = Path::new(".hidden");
        let normal = Path::new("normal.txt");

        assert!(is_hidden_file(hidden));
        assert!(!is_hidden_file(normal));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test<file>"), "test-file-");
        assert_eq!(sanitize_filename("test|file"), "test-file");
        assert_eq!(sanitize_filename("test?file"), "test-file");
        assert_eq!(sanitize_filename("test*file"), "test-file");
        assert_eq!(sanitize_filename("test\"file"), "test-file");
        assert_eq!(sanitize_filename("Re:Zero - v01"), "Re-Zero - v01");
        assert_eq!(sanitize_filename("test/file"), "test-file");
        assert_eq!(sanitize_filename("test\\file"), "test-file");
        assert_eq!(sanitize_filename("Is This a Zombie..."), "Is This a Zombie");
        assert_eq!(sanitize_filename("normal_file.txt"), "normal_file.txt");
    }

    #[test]
    fn test_absolute_path_of_missing_child() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let resolved = absolute_path(Path::new("does-not-exist/kavita")).unwrap();
        assert_eq!(resolved, cwd.join("does-not-exist").join("kavita"));
        assert!(resolved.starts_with(absolute_path(Path::new(".")).unwrap()));
    }
}
