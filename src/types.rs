//! Core data types, enums, and reports for the Hako conversion library.
//!
//! This module defines the fundamental data structures used throughout Hako:
//! - The image classifier and archive extension tables
//! - Target container formats (`TargetFormat`)
//! - Discovered work items (`ConversionUnit`, `UnitKind`)
//! - Per-job and per-run reports (`ConversionResult`, `RunSummary`)

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Lower-cased extensions (without the dot) accepted as raster images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Lower-cased extensions (without the dot) that discovery registers as archive units.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "cbz", "epub", "7z", "cb7", "mobi", "rar", "cbr", "pdf",
];

/// An ordered sequence of image paths, sorted once at discovery time.
pub type ImageSet = Vec<PathBuf>;

/// Returns the lower-cased extension of `path`, if it has a UTF-8 one.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Checks whether a file name carries one of the [`IMAGE_EXTENSIONS`].
///
/// Only the extension is considered; file contents are never sniffed.
pub fn is_image_file(path: impl AsRef<Path>) -> bool {
    lowercase_extension(path.as_ref())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Checks whether a file name carries one of the [`ARCHIVE_EXTENSIONS`].
pub fn is_archive_file(path: impl AsRef<Path>) -> bool {
    lowercase_extension(path.as_ref())
        .is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type used for an image inside an EPUB manifest.
///
/// # Supported formats
///
/// - PNG: image/png
/// - GIF: image/gif
/// - anything else: image/jpeg
pub fn epub_media_type(image_path: &Path) -> &'static str {
    match lowercase_extension(image_path).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Output container format for a conversion job.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub enum TargetFormat {
    #[default]
    Cbz,
    Zip,
    #[cfg_attr(feature = "serde", serde(rename = "7z"))]
    SevenZ,
    Pdf,
    Epub,
    Mobi,
    Rar,
}

impl TargetFormat {
    /// Every format, in the order they are offered to users.
    pub const ALL: [TargetFormat; 7] = [
        TargetFormat::Cbz,
        TargetFormat::Zip,
        TargetFormat::SevenZ,
        TargetFormat::Pdf,
        TargetFormat::Epub,
        TargetFormat::Mobi,
        TargetFormat::Rar,
    ];

    /// File extension (without the dot) of containers in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Cbz => "cbz",
            TargetFormat::Zip => "zip",
            TargetFormat::SevenZ => "7z",
            TargetFormat::Pdf => "pdf",
            TargetFormat::Epub => "epub",
            TargetFormat::Mobi => "mobi",
            TargetFormat::Rar => "rar",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        TargetFormat::ALL
            .into_iter()
            .find(|format| format.extension() == wanted)
            .ok_or_else(|| Error::UnsupportedFormat(format!("unknown target format '{}'", s)))
    }
}

/// Whether a unit already holds images or must be extracted first.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub enum UnitKind {
    Folder,
    Archive,
}

/// A folder of images or a single archive discovered under the run root.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub struct ConversionUnit {
    pub source: PathBuf,
    /// Folder name or archive stem, used to name outputs.
    pub name: String,
    pub kind: UnitKind,
}

impl ConversionUnit {
    pub fn folder(source: PathBuf) -> Self {
        let name = crate::path_utils::get_file_name_lossy(&source);
        Self {
            source,
            name,
            kind: UnitKind::Folder,
        }
    }

    pub fn archive(source: PathBuf) -> Self {
        let name = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            source,
            name,
            kind: UnitKind::Archive,
        }
    }
}

/// Outcome of one (unit, format) job.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub enum ConversionOutcome {
    Success(PathBuf),
    Failure(String),
}

/// Report for one (unit, format) job.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub struct ConversionResult {
    pub unit: ConversionUnit,
    pub format: TargetFormat,
    pub outcome: ConversionOutcome,
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Success(_))
    }
}

/// Aggregate report of a whole run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Message of the most recent failure, run-level or job-level.
    pub last_error: Option<String>,
    pub results: Vec<ConversionResult>,
    /// Set when the run stopped early on a cancellation request.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            last_error: None,
            results: Vec::new(),
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Records a finished job and updates the counters.
    pub fn record(&mut self, result: ConversionResult) {
        self.attempted += 1;
        match &result.outcome {
            ConversionOutcome::Success(_) => self.succeeded += 1,
            ConversionOutcome::Failure(reason) => {
                self.failed += 1;
                self.last_error = Some(reason.clone());
            }
        }
        self.results.push(result);
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_is_extension_based_and_case_insensitive() {
        assert!(is_image_file("a/b/PAGE.JPG"));
        assert!(is_image_file("cover.webp"));
        assert!(is_image_file("x.Jpeg"));
        assert!(!is_image_file("chapter.xhtml"));
        assert!(!is_image_file("jpg"));
        assert!(!is_image_file("scan.tiff"));
    }

    #[test]
    fn archive_table_covers_read_formats() {
        for name in ["a.cbz", "a.CBR", "a.cb7", "a.mobi", "a.pdf", "a.epub"] {
            assert!(is_archive_file(name), "{} should be an archive", name);
        }
        assert!(!is_archive_file("a.tar"));
    }

    #[test]
    fn target_format_parses_loosely() {
        assert_eq!("CBZ".parse::<TargetFormat>().unwrap(), TargetFormat::Cbz);
        assert_eq!(".7z".parse::<TargetFormat>().unwrap(), TargetFormat::SevenZ);
        assert!("docx".parse::<TargetFormat>().is_err());
        assert_eq!(TargetFormat::SevenZ.to_string(), "7z");
    }

    #[test]
    fn epub_media_types() {
        assert_eq!(epub_media_type(Path::new("a.PNG")), "image/png");
        assert_eq!(epub_media_type(Path::new("a.gif")), "image/gif");
        assert_eq!(epub_media_type(Path::new("a.webp")), "image/jpeg");
    }

    #[test]
    fn summary_tracks_last_failure() {
        let unit = ConversionUnit::folder(PathBuf::from("/tmp/Comic01"));
        assert_eq!(unit.name, "Comic01");
        let mut summary = RunSummary::new();
        summary.record(ConversionResult {
            unit: unit.clone(),
            format: TargetFormat::Cbz,
            outcome: ConversionOutcome::Failure("first".to_string()),
        });
        summary.record(ConversionResult {
            unit,
            format: TargetFormat::Zip,
            outcome: ConversionOutcome::Success(PathBuf::from("/tmp/Comic01.zip")),
        });
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.last_error.as_deref(), Some("first"));
    }
}
