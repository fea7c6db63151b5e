//! Discovery of convertible units below a root directory.
//!
//! Every directory (the root included) that directly contains at least one
//! image is a folder unit. When archive processing is enabled, every file
//! with a known archive extension is an archive unit as well. Units come back
//! folders first, then archives, each group in walk order, which is natural
//! order at every level.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::fs::read_dir;
use tokio::spawn;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, spawn_blocking};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::sort::{natural_cmp, sort_paths};
use crate::types::{ConversionUnit, ImageSet, is_archive_file, is_image_file};

/// Limits the number of concurrent directory operations
const MAX_CONCURRENT_DIRS: usize = 64;

/// Finds folder and archive units below a root directory.
#[derive(Debug)]
pub struct Collector<'a> {
    root: &'a Path,
    process_archives: bool,
}

impl<'a> Collector<'a> {
    /// Creates a new Collector for `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to walk recursively
    /// * `process_archives` - Whether archive files become units too
    pub fn new(root: &'a Path, process_archives: bool) -> Self {
        Self {
            root,
            process_archives,
        }
    }

    /// Walks the root and returns every unit found.
    ///
    /// Unreadable entries are logged and skipped; a missing root is an error.
    pub async fn discover(&self) -> Result<Vec<ConversionUnit>> {
        if !self.root.exists() {
            return Err(Error::NotFound(self.root.to_path_buf()));
        }

        let root = self.root.to_path_buf();
        let process_archives = self.process_archives;
        let (directories, archives) =
            spawn_blocking(move || walk(&root, process_archives)).await?;

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DIRS));
        let mut handles: Vec<JoinHandle<Result<(PathBuf, bool)>>> = Vec::new();
        for directory in directories {
            let semaphore = Arc::clone(&semaphore);
            handles.push(spawn(async move {
                let _permit = semaphore.acquire().await?;
                let has_images = has_images(&directory).await;
                Ok((directory, has_images))
            }));
        }

        let results = try_join_all(handles).await.map_err(|e| {
            Error::AsyncTaskError(format!("Failed to join discovery tasks: {}", e))
        })?;

        let mut units = Vec::new();
        for result in results {
            let (directory, has_images) = result?;
            if has_images {
                units.push(ConversionUnit::folder(directory));
            }
        }
        let folder_count = units.len();
        units.extend(archives.into_iter().map(ConversionUnit::archive));

        log::info!(
            "Discovered {} folder units and {} archive units in '{}'",
            folder_count,
            units.len() - folder_count,
            self.root.display()
        );
        Ok(units)
    }

    /// Returns the image files directly inside `directory`, naturally sorted.
    ///
    /// # Returns
    ///
    /// * `Result<ImageSet>` - The images; subdirectories are not descended into
    pub async fn folder_images(directory: &Path) -> Result<ImageSet> {
        let mut images = Vec::new();
        let mut entries = read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_image_file(&path) && path.is_file() {
                images.push(path);
            }
        }
        sort_paths(&mut images);
        Ok(images)
    }
}

async fn has_images(directory: &Path) -> bool {
    match Collector::folder_images(directory).await {
        Ok(images) => !images.is_empty(),
        Err(e) => {
            log::warn!("Skipping unreadable directory '{}': {}", directory.display(), e);
            false
        }
    }
}

/// Lists every directory and (optionally) every archive file below `root`.
fn walk(root: &Path, process_archives: bool) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut directories = Vec::new();
    let mut archives = Vec::new();
    let walker = WalkDir::new(root).sort_by(|a, b| {
        natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry during discovery: {}", e);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            directories.push(entry.into_path());
        } else if process_archives && entry.file_type().is_file() && is_archive_file(entry.path()) {
            archives.push(entry.into_path());
        }
    }
    (directories, archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitKind;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[tokio::test]
    async fn folders_then_archives_in_natural_order() -> Result<()> {
        let root = tempfile::tempdir()?;
        touch(&root.path().join("Vol 10/01.jpg"));
        touch(&root.path().join("Vol 2/01.PNG"));
        touch(&root.path().join("Vol 2/notes.txt"));
        touch(&root.path().join("empty/readme.md"));
        touch(&root.path().join("extra 10.cbz"));
        touch(&root.path().join("extra 9.cbr"));

        let units = Collector::new(root.path(), true).discover().await?;
        let names: Vec<(&str, UnitKind)> =
            units.iter().map(|u| (u.name.as_str(), u.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("Vol 2", UnitKind::Folder),
                ("Vol 10", UnitKind::Folder),
                ("extra 9", UnitKind::Archive),
                ("extra 10", UnitKind::Archive),
            ]
        );

        let folders_only = Collector::new(root.path(), false).discover().await?;
        assert_eq!(folders_only.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn root_with_images_is_a_unit() -> Result<()> {
        let root = tempfile::tempdir()?;
        touch(&root.path().join("cover.jpg"));
        let units = Collector::new(root.path(), false).discover().await?;
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].source, root.path());
        Ok(())
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let err = Collector::new(Path::new("/definitely/not/here"), false)
            .discover()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn folder_images_skip_subdirectories() -> Result<()> {
        let root = tempfile::tempdir()?;
        touch(&root.path().join("page10.jpg"));
        touch(&root.path().join("page2.jpg"));
        touch(&root.path().join("nested/page1.jpg"));
        fs::create_dir_all(root.path().join("fake.jpg"))?;

        let images = Collector::folder_images(root.path()).await?;
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page2.jpg", "page10.jpg"]);
        Ok(())
    }
}
