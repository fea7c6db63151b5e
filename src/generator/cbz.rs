use crate::error::{Error, Result};
use crate::generator::{EntryNamer, Generator};
use crate::path_utils::path_to_string_lossy;
use async_trait::async_trait;
use memmap2::MmapOptions;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tokio::fs;
use tokio::task::spawn_blocking;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A generator for flat deflate archives (CBZ and plain ZIP).
///
/// Every page is stored under its own file name at the root of the archive,
/// in the order it was added. No metadata entries are written.
pub struct Cbz {
    zip: Option<ZipWriter<File>>,
    options: SimpleFileOptions,
    names: EntryNamer,
}

#[async_trait]
impl Generator for Cbz {
    fn new(output_path: &Path, _title: &str) -> Result<Self> {
        let options: SimpleFileOptions = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let file = File::create(output_path)?;
        let zip = ZipWriter::new(file);

        Ok(Cbz {
            zip: Some(zip),
            options,
            names: EntryNamer::new(),
        })
    }

    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self> {
        let file = fs::File::open(image_path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to open image file '{}': {}",
                    path_to_string_lossy(image_path),
                    e
                ),
            ))
        })?;
        let is_empty = file.metadata().await?.len() == 0;
        let file_std = file.into_std().await;
        let options = self.options;
        let entry_name = self.names.name_for(image_path);

        let zip = match self.zip.as_mut() {
            Some(z) => z,
            None => {
                return Err(Error::Io(std::io::Error::other("zip writer already finished")));
            }
        };

        zip.start_file(entry_name, options)?;
        // zero-length files cannot be mapped
        if !is_empty {
            let mmap = spawn_blocking(move || unsafe { MmapOptions::new().map(&file_std) })
                .await
                .map_err(|e| Error::AsyncTaskError(e.to_string()))??;
            zip.write_all(&mmap[..])?;
        }

        Ok(self)
    }

    async fn save(mut self) -> Result<()> {
        let zip = match self.zip.take() {
            Some(z) => z,
            None => {
                return Err(Error::Io(std::io::Error::other("zip writer already finished")));
            }
        };

        spawn_blocking(move || match zip.finish() {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::Zip(e)),
        })
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[tokio::test]
    async fn pages_are_flat_and_ordered() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pages: [(&str, &str, &[u8]); 3] =
            [("a", "02.png", b"two"), ("a", "01.png", b"one"), ("b", "01.png", b"")];
        for (folder, name, bytes) in pages {
            std::fs::create_dir_all(dir.path().join(folder))?;
            std::fs::write(dir.path().join(folder).join(name), bytes)?;
        }
        let output = dir.path().join("book.cbz");

        let mut cbz = Cbz::new(&output, "book")?;
        cbz.add_page(&dir.path().join("a/02.png")).await?;
        cbz.add_page(&dir.path().join("a/01.png")).await?;
        cbz.add_page(&dir.path().join("b/01.png")).await?;
        cbz.save().await?;

        let mut archive = ZipArchive::new(File::open(&output)?)?;
        let names = (0..archive.len())
            .map(|i| archive.by_index(i).map(|entry| entry.name().to_string()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(names, vec!["02.png", "01.png", "b_01.png"]);

        let mut content = Vec::new();
        archive.by_name("02.png")?.read_to_end(&mut content)?;
        assert_eq!(content, b"two");
        assert_eq!(archive.by_name("b_01.png")?.size(), 0);
        Ok(())
    }
}
