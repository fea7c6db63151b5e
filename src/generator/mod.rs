//! Generator module packs ordered image sets into target containers.
//!
//! Native writers implement the page-streaming [`Generator`] trait and are
//! exposed to the dispatch table through [`Streamed`]. Formats that are not
//! streamed page by page (RAR through an external tool, MOBI which is refused)
//! implement [`ContainerBuilder`] directly. [`BuilderTable`] maps each
//! [`TargetFormat`] to its builder and owns the output protocol: the container
//! is built inside a temporary directory next to the final path and renamed
//! into place only once it is complete.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::path_utils::get_file_name_lossy;
use crate::types::TargetFormat;

pub mod cbz;
pub mod epub;
pub mod mobi;
pub mod pdf;
pub mod rar;
pub mod sevenz;

/// Common interface for page-streaming container writers.
///
/// A generator is created for one output file, receives pages in order and
/// is consumed by [`Generator::save`].
#[async_trait]
pub trait Generator {
    /// Creates a new generator instance.
    ///
    /// # Parameters
    /// * `output_path` - File the container is written to
    /// * `title` - Human-readable title, used by formats that carry metadata
    ///
    /// # Returns
    /// * `Result<Self>` - A new generator instance or an error if creation fails
    fn new(output_path: &Path, title: &str) -> Result<Self>
    where
        Self: Sized;

    /// Adds a page to the generated container.
    ///
    /// # Parameters
    /// * `image_path` - Path to the image file to add as a page
    ///
    /// # Returns
    /// * `Result<&mut Self>` - Self reference for method chaining, or an error if failed
    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self>
    where
        Self: Sized;

    /// Finalizes the container and flushes it to disk.
    async fn save(self) -> Result<()>;
}

/// Object-safe strategy that turns an image set into one container file.
#[async_trait]
pub trait ContainerBuilder: Send + Sync {
    /// Fails fast, before any file is touched, if this builder cannot run.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Writes `images`, in order, into a new container at `output_path`.
    async fn build(&self, images: &[PathBuf], output_path: &Path, title: &str) -> Result<()>;
}

/// Adapts a [`Generator`] into a [`ContainerBuilder`].
pub struct Streamed<G>(PhantomData<fn() -> G>);

impl<G> Streamed<G> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<G> Default for Streamed<G> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<G> ContainerBuilder for Streamed<G>
where
    G: Generator + Send + 'static,
{
    async fn build(&self, images: &[PathBuf], output_path: &Path, title: &str) -> Result<()> {
        let mut generator = G::new(output_path, title)?;
        for image in images {
            generator.add_page(image).await?;
        }
        generator.save().await
    }
}

/// Format-dispatching encoder.
#[derive(Clone)]
pub struct BuilderTable {
    builders: HashMap<TargetFormat, Arc<dyn ContainerBuilder>>,
}

impl BuilderTable {
    /// Creates a table with every built-in builder registered.
    ///
    /// # Arguments
    ///
    /// * `capabilities` - External tools; the RAR builder is backed by them
    pub fn new(capabilities: &Capabilities) -> Self {
        let mut table = Self {
            builders: HashMap::new(),
        };
        let zip: Arc<dyn ContainerBuilder> = Arc::new(Streamed::<cbz::Cbz>::new());
        table.register(TargetFormat::Cbz, Arc::clone(&zip));
        table.register(TargetFormat::Zip, zip);
        table.register(TargetFormat::SevenZ, Arc::new(Streamed::<sevenz::SevenZ>::new()));
        table.register(TargetFormat::Pdf, Arc::new(Streamed::<pdf::Pdf>::new()));
        table.register(TargetFormat::Epub, Arc::new(Streamed::<epub::Epub>::new()));
        table.register(TargetFormat::Mobi, Arc::new(mobi::MobiBuilder));
        table.register(
            TargetFormat::Rar,
            Arc::new(rar::RarBuilder::new(capabilities.clone())),
        );
        table
    }

    /// Registers (or replaces) the builder for `format`.
    pub fn register(&mut self, format: TargetFormat, builder: Arc<dyn ContainerBuilder>) {
        self.builders.insert(format, builder);
    }

    pub fn get(&self, format: TargetFormat) -> Result<Arc<dyn ContainerBuilder>> {
        self.builders
            .get(&format)
            .cloned()
            .ok_or_else(|| Error::UnsupportedFormat(format!("no builder for '{}'", format)))
    }

    /// Packs `images` into `output_path` as `format`.
    ///
    /// Nothing is written for an empty image set or a builder that fails its
    /// preflight. An existing file at `output_path` is replaced only once the
    /// new container is complete.
    pub async fn create(
        &self,
        images: &[PathBuf],
        output_path: &Path,
        format: TargetFormat,
        title: &str,
    ) -> Result<()> {
        if images.is_empty() {
            return Err(Error::EmptyInput(format!(
                "nothing to pack into '{}'",
                output_path.display()
            )));
        }
        let builder = self.get(format)?;
        builder.preflight()?;

        let parent = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let workspace = tempfile::Builder::new()
            .prefix(".hako-build-")
            .tempdir_in(&parent)?;
        let partial = workspace
            .path()
            .join(output_path.file_name().unwrap_or_else(|| OsStr::new("output")));

        log::debug!(
            "Building {} '{}' from {} images",
            format,
            output_path.display(),
            images.len()
        );
        builder.build(images, &partial, title).await?;
        tokio::fs::rename(&partial, output_path).await?;
        Ok(())
    }

    /// Packs the images found directly in `source_dir` into `output_path`.
    ///
    /// The output's file stem is used as the title.
    pub async fn create_from_dir(
        &self,
        source_dir: &Path,
        output_path: &Path,
        format: TargetFormat,
    ) -> Result<()> {
        if !source_dir.exists() {
            return Err(Error::NotFound(source_dir.to_path_buf()));
        }
        let images = Collector::folder_images(source_dir).await?;
        let title = output_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| get_file_name_lossy(source_dir));
        self.create(&images, output_path, format, &title).await
    }
}

/// Assigns flat, unique entry names to pages inside one container.
///
/// A page keeps its bare file name unless an earlier page took it; then it is
/// prefixed with its parent directory name, and numbered if that is taken too.
#[derive(Debug, Default)]
pub struct EntryNamer {
    used: HashSet<String>,
}

impl EntryNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_for(&mut self, image_path: &Path) -> String {
        let file_name = get_file_name_lossy(image_path);
        if self.used.insert(file_name.clone()) {
            return file_name;
        }

        let parent = image_path
            .parent()
            .map(get_file_name_lossy)
            .unwrap_or_else(|| "page".to_string());
        let prefixed = format!("{}_{}", parent, file_name);
        if self.used.insert(prefixed.clone()) {
            return prefixed;
        }

        let (stem, extension) = match prefixed.rsplit_once('.') {
            Some((stem, extension)) => (stem.to_string(), format!(".{}", extension)),
            None => (prefixed.clone(), String::new()),
        };
        let mut counter = 2usize;
        loop {
            let candidate = format!("{}_{}{}", stem, counter, extension);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Escapes text for use inside XML character data and attribute values.
pub(crate) fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_stay_flat_and_unique() {
        let mut namer = EntryNamer::new();
        assert_eq!(namer.name_for(Path::new("a/cover.jpg")), "cover.jpg");
        assert_eq!(namer.name_for(Path::new("b/cover.jpg")), "b_cover.jpg");
        assert_eq!(namer.name_for(Path::new("x/b/cover.jpg")), "b_cover_2.jpg");
        assert_eq!(namer.name_for(Path::new("b/01.png")), "01.png");
    }

    #[test]
    fn xml_is_escaped() {
        assert_eq!(escape_xml("Tom & \"Jerry\" <1>"), "Tom &amp; &quot;Jerry&quot; &lt;1&gt;");
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("out").join("book.cbz");
        let table = BuilderTable::new(&Capabilities::none());

        let err = table
            .create(&[], &output, TargetFormat::Cbz, "book")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput(_)));
        assert!(!output.exists());
        assert!(!dir.path().join("out").exists());
        Ok(())
    }
}
