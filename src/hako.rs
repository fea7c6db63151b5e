use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;

use crate::capability::Capabilities;
use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::generator::BuilderTable;
use crate::path_utils::output_path_for;
use crate::pipeline::{
    CancellationFlag, DONE_LABEL, LogSink, Pipeline, ProgressSink, RunSinks, discover_units,
};
use crate::types::{RunSummary, TargetFormat};

/// The main Hako run configuration, built declaratively using the builder pattern.
///
/// A run discovers every convertible unit below [`root_path`](HakoConfig::root_path)
/// and converts each of them into every format in [`formats`](HakoConfig::formats).
///
/// ## Builder Pattern
///
/// ```rust,no_run
/// # use hako::prelude::*;
/// # use std::path::PathBuf;
/// # async fn example() -> hako::error::Result<()> {
/// let config = HakoConfig::builder()
///     .root_path(PathBuf::from("./comics"))
///     .output_path(PathBuf::from("./converted"))
///     .formats(vec![TargetFormat::Cbz, TargetFormat::Epub])
///     .process_archives(true)
///     .build()?;
///
/// let summary = config.run(&RunSinks::new()).await;
/// println!("{} of {} jobs succeeded", summary.succeeded, summary.attempted);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, derive_builder::Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HakoConfig {
    /// Directory walked for folder and archive units.
    pub root_path: PathBuf,

    /// Directory receiving every output. When unset, each output is written
    /// next to its unit (into the unit's parent directory).
    #[builder(default)]
    pub output_path: Option<PathBuf>,

    /// Target formats; every unit is converted into each of them.
    #[builder(default = "vec![TargetFormat::Cbz]")]
    pub formats: Vec<TargetFormat>,

    /// Whether archive files below the root are converted as well.
    #[builder(default = "false")]
    pub process_archives: bool,

    /// External tools available to the run. Defaults to a PATH lookup.
    #[builder(default = "Capabilities::detect()")]
    #[cfg_attr(feature = "serde", serde(skip))]
    #[cfg_attr(feature = "specta", specta(skip))]
    pub capabilities: Capabilities,

    /// Directory under which staging areas are created. Defaults to the
    /// system temporary directory.
    #[builder(default)]
    pub staging_path: Option<PathBuf>,

    /// Stop request shared with whoever may cancel the run.
    #[builder(default)]
    #[cfg_attr(feature = "serde", serde(skip))]
    #[cfg_attr(feature = "specta", specta(skip))]
    pub cancellation: CancellationFlag,
}

impl HakoConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(root) = &self.root_path {
            if root.as_os_str().is_empty() {
                return Err("`root_path` must not be empty".to_string());
            }
        }
        if let Some(formats) = &self.formats {
            if formats.is_empty() {
                return Err("At least one target format is required".to_string());
            }
            let mut seen = HashSet::new();
            if let Some(duplicate) = formats.iter().find(|format| !seen.insert(**format)) {
                return Err(format!("Target format '{}' is listed twice", duplicate));
            }
        }
        Ok(())
    }
}

impl HakoConfig {
    /// Creates a new builder for configuring `HakoConfig`.
    pub fn builder() -> HakoConfigBuilder {
        HakoConfigBuilder::default()
    }

    /// Checks the file system side of the configuration without touching it.
    ///
    /// # Returns
    ///
    /// * `Ok(&self)` - The root exists and is a directory, and the output
    ///   path (if set) is not an existing file
    /// * `Err(Error)` - [`Error::NotFound`] for a missing root,
    ///   [`Error::InvalidConfig`] otherwise
    pub fn preflight_check(&self) -> Result<&Self> {
        if !self.root_path.exists() {
            return Err(Error::NotFound(self.root_path.clone()));
        }
        if !self.root_path.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "Root path is not a directory: {:?}",
                self.root_path
            )));
        }
        if let Some(output) = &self.output_path {
            if output.exists() && !output.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "Output path is not a directory: {:?}",
                    output
                )));
            }
        }
        if self.formats.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one target format is required".to_string(),
            ));
        }
        Ok(self)
    }

    /// Executes one run: discovery, then every unit × format job.
    ///
    /// Job failures are collected in the returned summary. A failing preflight
    /// or discovery ends the run with zero jobs; the reason is sent to the log
    /// sink and kept in [`RunSummary::last_error`].
    pub async fn run(&self, sinks: &RunSinks) -> RunSummary {
        let units = match self.preflight_check() {
            Ok(_) => discover_units(&self.root_path, self.process_archives, sinks).await,
            Err(e) => Err(e),
        };
        let units = match units {
            Ok(units) if !units.is_empty() => units,
            Ok(_) => {
                let message = no_units_message(&self.root_path);
                return Self::empty_run(sinks, Some(message));
            }
            Err(e) => {
                log::warn!("Run aborted: {}", e);
                sinks.log(&format!("Error: {}", e));
                return Self::empty_run(sinks, Some(e.to_string()));
            }
        };

        if let Some(output) = &self.output_path {
            if let Err(e) = tokio::fs::create_dir_all(output).await {
                sinks.log(&format!("Error: {}", e));
                return Self::empty_run(sinks, Some(e.to_string()));
            }
        }

        let pipeline = Pipeline {
            extractor: Extractor::new(&self.capabilities),
            builders: BuilderTable::new(&self.capabilities),
            formats: &self.formats,
            output_dir: self.output_path.as_deref(),
            staging_root: self.staging_path.as_deref(),
            cancellation: &self.cancellation,
            sinks,
        };
        let summary = pipeline.run(units).await;
        log::info!(
            "Run finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        summary
    }

    /// Starts the run on a dedicated task.
    pub fn spawn(self, sinks: RunSinks) -> RunHandle {
        let cancellation = self.cancellation.clone();
        let task = tokio::spawn(async move { self.run(&sinks).await });
        RunHandle { cancellation, task }
    }

    fn empty_run(sinks: &RunSinks, error: Option<String>) -> RunSummary {
        sinks.progress(0, 0, DONE_LABEL);
        let mut summary = RunSummary::new();
        summary.last_error = error;
        summary.finish()
    }
}

/// A run executing on its own task.
#[derive(Debug)]
pub struct RunHandle {
    cancellation: CancellationFlag,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Asks the run to stop before its next unit.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns a clone of the run's stop flag, for cancelling from elsewhere.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Waits for the run to finish and returns its summary.
    pub async fn join(self) -> Result<RunSummary> {
        Ok(self.task.await?)
    }
}

/// Packs the images directly inside `source_dir` into one container.
///
/// # Returns
///
/// * `Err(Error::NotFound)` - `source_dir` does not exist
/// * `Err(Error::EmptyInput)` - it holds no images; nothing is written
pub async fn create_archive(source_dir: &Path, output_path: &Path, format: TargetFormat) -> Result<()> {
    BuilderTable::new(&Capabilities::detect())
        .create_from_dir(source_dir, output_path, format)
        .await
}

/// Packs an explicit, already ordered image list into one container.
pub async fn create_archive_from_images(
    images: &[PathBuf],
    output_path: &Path,
    format: TargetFormat,
    title: &str,
) -> Result<()> {
    BuilderTable::new(&Capabilities::detect())
        .create(images, output_path, format, title)
        .await
}

/// Extracts every image of an archive into the flat directory `output_dir`.
///
/// # Returns
///
/// * `Ok(usize)` - The number of images written; zero is not an error
pub async fn extract_archive(input_path: &Path, output_dir: &Path) -> Result<usize> {
    Extractor::new(&Capabilities::detect())
        .extract(input_path, output_dir)
        .await
}

/// Converts every unit below `root` into `formats`.
///
/// A thin wrapper around [`HakoConfig`] and [`HakoConfig::run`]; fails only if
/// the arguments do not form a valid configuration.
pub async fn process_directory(
    root: &Path,
    output_dir: Option<&Path>,
    formats: Vec<TargetFormat>,
    process_archives: bool,
    on_progress: Option<ProgressSink>,
    on_log: Option<LogSink>,
) -> Result<RunSummary> {
    let mut builder = HakoConfig::builder();
    builder
        .root_path(root)
        .formats(formats)
        .process_archives(process_archives);
    if let Some(output_dir) = output_dir {
        builder.output_path(output_dir);
    }
    let config = builder.build()?;

    let sinks = RunSinks {
        progress: on_progress,
        log: on_log,
    };
    Ok(config.run(&sinks).await)
}

/// Converts a single archive into another container format.
///
/// The output is `output_dir/<stem>.<ext>`; if that is the input itself,
/// `_converted` is appended to the stem.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the written container
pub async fn convert_archive(input_path: &Path, output_dir: &Path, format: TargetFormat) -> Result<PathBuf> {
    let capabilities = Capabilities::detect();
    let (staging, images) = Extractor::new(&capabilities).stage(input_path, None).await?;
    let stem = archive_stem(input_path);
    if images.is_empty() {
        return Err(Error::EmptyInput(format!(
            "no images extracted from '{}'",
            input_path.display()
        )));
    }

    let output = output_path_for(output_dir, &stem, format.extension(), input_path);
    BuilderTable::new(&capabilities)
        .create(&images, &output, format, &stem)
        .await?;
    drop(staging);
    Ok(output)
}

/// Extracts an archive into `output_root/<stem>/`.
///
/// # Returns
///
/// * `Ok(PathBuf)` - The folder holding the images
/// * `Err(Error::EmptyInput)` - The archive held no images
pub async fn extract_to_folder(input_path: &Path, output_root: &Path) -> Result<PathBuf> {
    let folder = output_root.join(crate::path_utils::sanitize_filename(&archive_stem(input_path)));
    let count = extract_archive(input_path, &folder).await?;
    if count == 0 {
        return Err(Error::EmptyInput(format!(
            "no images extracted from '{}'",
            input_path.display()
        )));
    }
    log::info!("Extracted {} images into '{}'", count, folder.display());
    Ok(folder)
}

/// Message reported when discovery finds nothing to convert.
pub(crate) fn no_units_message(root: &Path) -> String {
    format!("No folders with images found in {}", root.display())
}

fn archive_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = HakoConfig::builder()
            .root_path("comics")
            .capabilities(Capabilities::none())
            .build()
            .unwrap();
        assert_eq!(config.formats, vec![TargetFormat::Cbz]);
        assert!(!config.process_archives);
        assert!(config.output_path.is_none());
    }

    #[test]
    fn builder_rejects_bad_format_lists() {
        let empty = HakoConfig::builder()
            .root_path("comics")
            .formats(Vec::<TargetFormat>::new())
            .build();
        assert!(empty.is_err());

        let duplicated = HakoConfig::builder()
            .root_path("comics")
            .formats(vec![TargetFormat::Pdf, TargetFormat::Pdf])
            .build();
        let message = Error::from(duplicated.unwrap_err()).to_string();
        assert!(message.contains("pdf"));
    }

    #[test]
    fn builder_requires_root() {
        let err: Error = HakoConfig::builder().build().unwrap_err().into();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn run_without_units_reports_why() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("notes.txt"), b"no images").unwrap();
        let config = HakoConfig::builder()
            .root_path(root.path())
            .capabilities(Capabilities::none())
            .build()
            .unwrap();
        let messages = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = messages.clone();
        let sinks = RunSinks::new().with_log(move |m| recorded.lock().unwrap().push(m.to_string()));

        let summary = config.run(&sinks).await;
        assert_eq!(summary.attempted, 0);
        let expected = no_units_message(root.path());
        assert_eq!(summary.last_error.as_deref(), Some(expected.as_str()));
        assert_eq!(*messages.lock().unwrap(), vec![expected]);
    }

    #[tokio::test]
    async fn missing_root_ends_the_run_once() {
        let config = HakoConfig::builder()
            .root_path("/definitely/not/a/root")
            .capabilities(Capabilities::none())
            .build()
            .unwrap();
        let messages = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = messages.clone();
        let sinks = RunSinks::new().with_log(move |m| recorded.lock().unwrap().push(m.to_string()));

        let summary = config.run(&sinks).await;
        assert_eq!(summary.attempted, 0);
        assert!(summary.last_error.is_some());
        assert_eq!(messages.lock().unwrap().len(), 1);
    }
}
