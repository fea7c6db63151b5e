use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::extractor::{ArchiveReader, safe_join};

/// Reader for deflate-container archives: ZIP, CBZ and EPUB.
///
/// Every entry is unpacked, keeping its directory structure; entries whose
/// names would escape the scratch directory are skipped.
pub struct ZipReader;

impl ArchiveReader for ZipReader {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn unpack(&self, archive_path: &Path, scratch: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| Error::corrupt(archive_path, e))?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| Error::corrupt(archive_path, e))?;

            let Some(destination) = safe_join(scratch, entry.name()) else {
                log::warn!(
                    "Skipping unsafe entry '{}' in '{}'",
                    entry.name(),
                    archive_path.display()
                );
                continue;
            };

            if entry.is_dir() {
                fs::create_dir_all(&destination)?;
                continue;
            }
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut output = File::create(&destination)?;
            io::copy(&mut entry, &mut output).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                    Error::corrupt(archive_path, format!("entry '{}': {}", entry.name(), e))
                }
                _ => Error::Io(e),
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    #[test]
    fn unpacks_nested_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("book.cbz");
        let mut writer = ZipWriter::new(File::create(&archive_path)?);
        writer.add_directory("chapter 1/", SimpleFileOptions::default())?;
        writer.start_file("chapter 1/01.jpg", SimpleFileOptions::default())?;
        writer.write_all(b"jpeg bytes")?;
        writer.start_file("../escape.jpg", SimpleFileOptions::default())?;
        writer.write_all(b"nope")?;
        writer.finish()?;

        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch)?;
        ZipReader.unpack(&archive_path, &scratch)?;

        assert_eq!(fs::read(scratch.join("chapter 1").join("01.jpg"))?, b"jpeg bytes");
        assert!(!dir.path().join("escape.jpg").exists());
        Ok(())
    }

    #[test]
    fn garbage_is_a_corrupt_container() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("broken.zip");
        fs::write(&archive_path, b"definitely not a zip file")?;

        let err = ZipReader.unpack(&archive_path, dir.path()).unwrap_err();
        assert!(matches!(err, Error::CorruptContainer { .. }));
        Ok(())
    }
}
