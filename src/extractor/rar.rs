use std::path::Path;

use crate::capability::Capabilities;
use crate::error::Result;
use crate::extractor::ArchiveReader;

/// Reader for RAR and CBR archives.
///
/// There is no native RAR decoder; unpacking is delegated to whichever
/// external extractor the [`Capabilities`] carry.
pub struct RarReader {
    capabilities: Capabilities,
}

impl RarReader {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

impl ArchiveReader for RarReader {
    fn name(&self) -> &'static str {
        "rar"
    }

    fn unpack(&self, archive_path: &Path, scratch: &Path) -> Result<()> {
        let extractor = self.capabilities.require_rar_extractor()?;
        log::debug!(
            "Delegating '{}' to external extractor '{}'",
            archive_path.display(),
            extractor.name()
        );
        extractor.extract(archive_path, scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RarExtractor;
    use crate::error::{Error, ErrorKind};
    use std::fs;
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeUnrar;

    impl RarExtractor for FakeUnrar {
        fn name(&self) -> &str {
            "fake-unrar"
        }

        fn extract(&self, _archive: &Path, dest: &Path) -> Result<()> {
            fs::write(dest.join("001.jpg"), b"page")?;
            Ok(())
        }
    }

    #[test]
    fn missing_tool_is_capability_unavailable() {
        let reader = RarReader::new(Capabilities::none());
        let err = reader
            .unpack(Path::new("book.cbr"), Path::new("scratch"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
        assert!(matches!(err, Error::CapabilityUnavailable { .. }));
    }

    #[test]
    fn injected_extractor_is_used() -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let capabilities = Capabilities::none().with_rar_extractor(Arc::new(FakeUnrar));
        RarReader::new(capabilities).unpack(Path::new("book.cbr"), scratch.path())?;
        assert_eq!(fs::read(scratch.path().join("001.jpg"))?, b"page");
        Ok(())
    }
}
