//! Extractor module unpacks source containers into flat image sets.
//!
//! Each supported container format has an [`ArchiveReader`] that unpacks the
//! container into a scratch directory. The [`Extractor`] picks a reader by file
//! extension, runs it, then copies every image it finds in the scratch area into
//! a flat output directory. The scratch area is a [`tempfile::TempDir`] and is
//! removed however the extraction ends.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::capability::Capabilities;
use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::path_utils::{get_file_name_lossy, unique_destination};
use crate::sort::natural_cmp;
use crate::types::{ImageSet, is_image_file, lowercase_extension};

pub mod mobi;
pub mod pdf;
pub mod rar;
pub mod sevenz;
pub mod zip;

/// Unpacks one container format into a directory.
///
/// Readers are blocking; the [`Extractor`] calls them from a blocking task.
pub trait ArchiveReader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Unpacks `archive` below `scratch`. Non-image entries may be written too;
    /// they are filtered out afterwards.
    fn unpack(&self, archive: &Path, scratch: &Path) -> Result<()>;
}

/// Format-dispatching decoder, keyed by lower-cased file extension.
#[derive(Clone)]
pub struct Extractor {
    readers: HashMap<&'static str, Arc<dyn ArchiveReader>>,
}

impl Extractor {
    /// Creates an extractor with every built-in reader registered.
    ///
    /// # Arguments
    ///
    /// * `capabilities` - External tools; the RAR reader is backed by them
    pub fn new(capabilities: &Capabilities) -> Self {
        let mut extractor = Self {
            readers: HashMap::new(),
        };
        extractor.register(&["zip", "cbz", "epub"], Arc::new(zip::ZipReader));
        extractor.register(&["7z", "cb7"], Arc::new(sevenz::SevenZReader));
        extractor.register(&["mobi"], Arc::new(mobi::MobiReader));
        extractor.register(&["pdf"], Arc::new(pdf::PdfReader));
        extractor.register(
            &["rar", "cbr"],
            Arc::new(rar::RarReader::new(capabilities.clone())),
        );
        extractor
    }

    /// Registers (or replaces) the reader used for `extensions`.
    pub fn register(&mut self, extensions: &[&'static str], reader: Arc<dyn ArchiveReader>) {
        for extension in extensions {
            self.readers.insert(*extension, Arc::clone(&reader));
        }
    }

    /// Looks up the reader for `path` by its extension.
    pub fn reader_for(&self, path: &Path) -> Result<Arc<dyn ArchiveReader>> {
        let extension = lowercase_extension(path).unwrap_or_default();
        self.readers
            .get(extension.as_str())
            .cloned()
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!(
                    "cannot extract '.{}' files ({})",
                    extension,
                    path.display()
                ))
            })
    }

    /// Extracts every image of `input` into the flat directory `output_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of images copied. Zero is not an error here;
    ///   callers decide whether an empty result is a failure.
    /// * `Err(Error)` - Missing input, unknown format, or decoder failure
    pub async fn extract(&self, input: &Path, output_dir: &Path) -> Result<usize> {
        if !input.exists() {
            return Err(Error::NotFound(input.to_path_buf()));
        }
        let reader = self.reader_for(input)?;
        let input = input.to_path_buf();
        let output_dir = output_dir.to_path_buf();

        spawn_blocking(move || {
            let scratch = tempfile::Builder::new().prefix("hako-scratch-").tempdir()?;
            log::debug!(
                "Unpacking '{}' with the {} reader",
                input.display(),
                reader.name()
            );
            reader.unpack(&input, scratch.path())?;

            fs::create_dir_all(&output_dir)?;
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "archive".to_string());
            collect_images(scratch.path(), &output_dir, &stem)
        })
        .await?
    }

    /// Extracts `input` into a fresh [`StagingArea`] and returns its image set.
    pub async fn stage(
        &self,
        input: &Path,
        staging_root: Option<&Path>,
    ) -> Result<(StagingArea, ImageSet)> {
        let staging = match staging_root {
            Some(root) => StagingArea::new_in(root)?,
            None => StagingArea::new()?,
        };
        let count = self.extract(input, staging.path()).await?;
        let images = staging.images().await?;
        log::debug!(
            "Staged {} images from '{}' in '{}'",
            count,
            input.display(),
            staging.path().display()
        );
        Ok((staging, images))
    }
}

/// Exclusively owned temporary directory holding images extracted from one archive.
///
/// Dropping it removes the directory and everything in it.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("hako-staging-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn new_in(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix("hako-staging-")
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The staged images in natural order.
    pub async fn images(&self) -> Result<ImageSet> {
        Collector::folder_images(self.path()).await
    }
}

/// Copies every image below `scratch` into the flat directory `output_dir`.
///
/// The walk is sorted naturally so repeated runs produce identical names. An
/// image whose name is taken is prefixed with its parent directory's name
/// (`root_label` for files at the top of `scratch`); existing files are never
/// overwritten.
///
/// # Returns
///
/// * `Result<usize>` - The number of images copied
pub fn collect_images(scratch: &Path, output_dir: &Path, root_label: &str) -> Result<usize> {
    let mut copied = 0usize;
    let walker = WalkDir::new(scratch).sort_by(|a, b| {
        natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable staged entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image_file(entry.path()) {
            continue;
        }

        let file_name = get_file_name_lossy(entry.path());
        let parent_name = match entry.path().parent() {
            Some(parent) if parent != scratch => get_file_name_lossy(parent),
            _ => root_label.to_string(),
        };
        let destination = unique_destination(output_dir, &file_name, &parent_name);
        fs::copy(entry.path(), &destination)?;
        log::debug!(
            "Collected '{}' as '{}'",
            entry.path().display(),
            destination.display()
        );
        copied += 1;
    }

    Ok(copied)
}

/// Joins an archive entry name onto `root`, refusing absolute paths and `..`.
pub(crate) fn safe_join(root: &Path, entry_name: &str) -> Option<PathBuf> {
    use std::path::Component;

    let mut joined = root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(&entry_name.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(joined)
}
