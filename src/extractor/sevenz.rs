use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::extractor::{ArchiveReader, safe_join};

/// Reader for 7z and CB7 archives.
pub struct SevenZReader;

impl ArchiveReader for SevenZReader {
    fn name(&self) -> &'static str {
        "7z"
    }

    fn unpack(&self, archive_path: &Path, scratch: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let mut write_failure: Option<io::Error> = None;

        let mut extract_fn = |entry: &sevenz_rust2::SevenZArchiveEntry,
                              reader: &mut dyn Read,
                              _default_path: &PathBuf|
         -> std::result::Result<bool, sevenz_rust2::Error> {
            let Some(destination) = safe_join(scratch, &entry.name) else {
                log::warn!(
                    "Skipping unsafe entry '{}' in '{}'",
                    entry.name,
                    archive_path.display()
                );
                return Ok(true);
            };

            let written = if entry.is_directory {
                fs::create_dir_all(&destination)
            } else {
                write_entry(reader, &destination)
            };
            match written {
                Ok(()) => Ok(true),
                Err(e) => {
                    // stop decoding; the error is reported after the walk
                    write_failure = Some(e);
                    Ok(false)
                }
            }
        };

        sevenz_rust2::decompress_with_extract_fn(file, scratch, &mut extract_fn)
            .map_err(|e| Error::corrupt(archive_path, e))?;

        match write_failure {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }
}

fn write_entry(reader: &mut dyn Read, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut output = File::create(destination)?;
    io::copy(reader, &mut output)?;
    Ok(())
}
