use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::task::spawn_blocking;

use crate::capability::Capabilities;
use crate::error::{Error, Result};
use crate::generator::{ContainerBuilder, EntryNamer};
use crate::path_utils::get_file_name_lossy;

/// Builds RAR archives through the injected external packer.
pub struct RarBuilder {
    capabilities: Capabilities,
}

impl RarBuilder {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

#[async_trait]
impl ContainerBuilder for RarBuilder {
    fn preflight(&self) -> Result<()> {
        self.capabilities.require_rar_packer().map(|_| ())
    }

    async fn build(&self, images: &[PathBuf], output_path: &Path, _title: &str) -> Result<()> {
        let packer = self.capabilities.require_rar_packer()?;
        let images = images.to_vec();
        let output_path = output_path.to_path_buf();
        log::debug!(
            "Packing {} images into '{}' with '{}'",
            images.len(),
            output_path.display(),
            packer.name()
        );
        spawn_blocking(move || {
            let staging = tempfile::Builder::new().prefix("hako-rar-").tempdir()?;
            let entries = flat_entries(&images, staging.path())?;
            packer.pack(&entries, &output_path)
        })
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))?
    }
}

/// Returns paths whose file names are unique, since the packer stores bare
/// names. Images whose name is taken are copied into `staging` under their
/// [`EntryNamer`] name; the rest are passed through untouched.
fn flat_entries(images: &[PathBuf], staging: &Path) -> Result<Vec<PathBuf>> {
    let mut names = EntryNamer::new();
    let mut entries = Vec::with_capacity(images.len());
    for image in images {
        let name = names.name_for(image);
        if name == get_file_name_lossy(image) {
            entries.push(image.clone());
        } else {
            let staged = staging.join(&name);
            std::fs::copy(image, &staged)?;
            entries.push(staged);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RarPacker;
    use crate::error::ErrorKind;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct RecordingPacker {
        calls: Mutex<Vec<(Vec<PathBuf>, PathBuf)>>,
    }

    impl RarPacker for RecordingPacker {
        fn name(&self) -> &str {
            "recording-rar"
        }

        fn pack(&self, images: &[PathBuf], output: &Path) -> Result<()> {
            std::fs::write(output, b"Rar!")?;
            self.calls
                .lock()
                .unwrap()
                .push((images.to_vec(), output.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn missing_packer_fails_preflight() {
        let err = RarBuilder::new(Capabilities::none()).preflight().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }

    #[tokio::test]
    async fn images_are_handed_over_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let packer = Arc::new(RecordingPacker::default());
        let builder = RarBuilder::new(Capabilities::none().with_rar_packer(packer.clone()));
        let images = vec![dir.path().join("2.jpg"), dir.path().join("10.jpg")];
        let output = dir.path().join("book.rar");

        builder.build(&images, &output, "book").await?;

        let calls = packer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, images);
        assert!(output.exists());
        Ok(())
    }

    #[tokio::test]
    async fn colliding_names_are_packed_under_unique_names() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for (folder, bytes) in [("a", b"first"), ("b", b"other")] {
            std::fs::create_dir_all(dir.path().join(folder))?;
            std::fs::write(dir.path().join(folder).join("cover.jpg"), bytes)?;
        }
        let images = vec![dir.path().join("a/cover.jpg"), dir.path().join("b/cover.jpg")];
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging)?;

        let entries = flat_entries(&images, &staging)?;
        assert_eq!(entries[0], images[0]);
        assert_eq!(entries[1], staging.join("b_cover.jpg"));
        assert_eq!(std::fs::read(&entries[1])?, b"other");
        Ok(())
    }
}
