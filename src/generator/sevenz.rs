use std::fs::File;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use sevenz_rust2::{SevenZArchiveEntry, SevenZWriter};
use tokio::task::spawn_blocking;

use crate::error::{Error, Result};
use crate::generator::{EntryNamer, Generator};

/// A generator for flat 7z archives.
///
/// Entries follow the same naming rules as [`crate::generator::cbz::Cbz`].
/// The writer compresses on a blocking thread, so it is handed over to
/// `spawn_blocking` for every page and handed back afterwards.
pub struct SevenZ {
    writer: Option<SevenZWriter<File>>,
    names: EntryNamer,
}

fn to_io(error: sevenz_rust2::Error) -> Error {
    Error::Io(io::Error::other(error.to_string()))
}

impl SevenZ {
    fn take_writer(&mut self) -> Result<SevenZWriter<File>> {
        self.writer
            .take()
            .ok_or_else(|| Error::Io(io::Error::other("7z writer already finished")))
    }
}

#[async_trait]
impl Generator for SevenZ {
    fn new(output_path: &Path, _title: &str) -> Result<Self> {
        let writer = SevenZWriter::create(output_path).map_err(to_io)?;
        Ok(SevenZ {
            writer: Some(writer),
            names: EntryNamer::new(),
        })
    }

    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self> {
        let entry_name = self.names.name_for(image_path);
        let image_path = image_path.to_path_buf();
        let mut writer = self.take_writer()?;

        let writer = spawn_blocking(move || -> Result<SevenZWriter<File>> {
            let source = File::open(&image_path)?;
            let entry = SevenZArchiveEntry::from_path(&image_path, entry_name);
            writer
                .push_archive_entry(entry, Some(source))
                .map_err(to_io)?;
            Ok(writer)
        })
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        self.writer = Some(writer);
        Ok(self)
    }

    async fn save(mut self) -> Result<()> {
        let writer = self.take_writer()?;
        spawn_blocking(move || writer.finish().map(|_| ()).map_err(Error::Io))
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))??;
        Ok(())
    }
}
