use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::generator::ContainerBuilder;

/// MOBI output is not produced; convert to EPUB and use an external tool.
pub struct MobiBuilder;

#[async_trait]
impl ContainerBuilder for MobiBuilder {
    fn preflight(&self) -> Result<()> {
        Err(Error::NotImplemented(
            "writing MOBI is not supported; convert to EPUB instead".to_string(),
        ))
    }

    async fn build(&self, _images: &[PathBuf], _output_path: &Path, _title: &str) -> Result<()> {
        self.preflight()
    }
}
