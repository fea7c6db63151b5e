//! Path utilities for naming outputs and staged files.
//!
//! Output names are derived from folder names and archive stems, which may hold
//! characters that are invalid on some file systems. Staged images may collide
//! when an archive nests several folders with the same page names. The helpers
//! here keep both cases deterministic.

use std::path::{Path, PathBuf};

/// Suffix appended to an output stem that would otherwise overwrite its source.
pub const CONVERTED_SUFFIX: &str = "_converted";

/// Converts a path to a string with fallback to lossy conversion.
pub fn path_to_string_lossy(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Gets the file name from a path with fallback to lossy conversion.
///
/// # Returns
///
/// * `String` - The file name, or `"unknown"` for paths without one
pub fn get_file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
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
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | '"' | '|' | '?' | '*' => '-',
            ':' => '-',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Picks a name in `dir` for `file_name` that does not exist yet.
///
/// Tries the bare name first, then `<parent_name>_<file_name>`, then appends
/// `_2`, `_3`, ... before the extension of the prefixed name.
pub fn unique_destination(dir: &Path, file_name: &str, parent_name: &str) -> PathBuf {
    let direct = dir.join(file_name);
    if !direct.exists() {
        return direct;
    }

    let prefixed_name = format!("{}_{}", parent_name, file_name);
    let prefixed = dir.join(&prefixed_name);
    if !prefixed.exists() {
        return prefixed;
    }

    let prefixed_path = Path::new(&prefixed_name);
    let stem = prefixed_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = prefixed_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 2usize;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Computes `<dir>/<name>.<extension>` for an output, with the name sanitized.
///
/// If the result would be the unit's own `source`, [`CONVERTED_SUFFIX`] is
/// appended to the stem so the source is never overwritten.
pub fn output_path_for(dir: &Path, name: &str, extension: &str, source: &Path) -> PathBuf {
    let stem = sanitize_filename(name);
    let candidate = dir.join(format!("{}.{}", stem, extension));
    if same_file_path(&candidate, source) {
        dir.join(format!("{}{}.{}", stem, CONVERTED_SUFFIX, extension))
    } else {
        candidate
    }
}

/// Compares paths after canonicalizing whatever exists of them.
fn same_file_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_file_name_lossy() {
        assert_eq!(get_file_name_lossy(Path::new("test/file.txt")), "file.txt");
        assert_eq!(get_file_name_lossy(Path::new("")), "unknown");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test<file>"), "test-file-");
        assert_eq!(sanitize_filename("test|file"), "test-file");
        assert_eq!(sanitize_filename("test:file"), "test-file");
        assert_eq!(sanitize_filename("test/file"), "test-file");
        assert_eq!(sanitize_filename("normal_file.txt"), "normal_file.txt");
    }

    #[test]
    fn output_path_avoids_source() {
        let dir = Path::new("/library");
        let source = Path::new("/library/Vol 1.cbz");
        assert_eq!(
            output_path_for(dir, "Vol 1", "cbz", source),
            PathBuf::from("/library/Vol 1_converted.cbz")
        );
        assert_eq!(
            output_path_for(dir, "Vol 1", "epub", source),
            PathBuf::from("/library/Vol 1.epub")
        );
    }
}
