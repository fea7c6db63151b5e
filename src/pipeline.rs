//! The conversion run loop.
//!
//! A run walks its units in discovery order. For every unit the image set is
//! resolved once (read from the folder, or extracted into a staging area for
//! archives) and then packed into every requested format. A failing job is
//! recorded and the run moves on; nothing inside the loop aborts the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::extractor::{Extractor, StagingArea};
use crate::generator::BuilderTable;
use crate::hako::no_units_message;
use crate::path_utils::{get_file_name_lossy, output_path_for};
use crate::types::{
    ConversionOutcome, ConversionResult, ConversionUnit, ImageSet, RunSummary, TargetFormat,
    UnitKind,
};

/// Receives `(completed, total, label)` after every job and once more at the end.
pub type ProgressSink = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Receives human-readable run messages.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Label of the final progress event of a run.
pub const DONE_LABEL: &str = "Done";

/// Optional callbacks a run reports to. Both are invoked from the run's task
/// and must not block.
#[derive(Clone, Default)]
pub struct RunSinks {
    pub progress: Option<ProgressSink>,
    pub log: Option<LogSink>,
}

impl RunSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, sink: impl Fn(usize, usize, &str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn with_log(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(sink));
        self
    }

    pub(crate) fn progress(&self, completed: usize, total: usize, label: &str) {
        if let Some(sink) = &self.progress {
            sink(completed, total, label);
        }
    }

    pub(crate) fn log(&self, message: &str) {
        if let Some(sink) = &self.log {
            sink(message);
        }
    }
}

impl std::fmt::Debug for RunSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSinks")
            .field("progress", &self.progress.as_ref().map(|_| "Fn"))
            .field("log", &self.log.as_ref().map(|_| "Fn"))
            .finish()
    }
}

/// Shared stop request, checked between units.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one run needs besides its units.
pub(crate) struct Pipeline<'a> {
    pub extractor: Extractor,
    pub builders: BuilderTable,
    pub formats: &'a [TargetFormat],
    pub output_dir: Option<&'a Path>,
    pub staging_root: Option<&'a Path>,
    pub cancellation: &'a CancellationFlag,
    pub sinks: &'a RunSinks,
}

impl Pipeline<'_> {
    /// Processes `units` × `formats` and returns the finished summary.
    pub async fn run(&self, units: Vec<ConversionUnit>) -> RunSummary {
        let mut summary = RunSummary::new();
        let total = units.len() * self.formats.len();
        let mut completed = 0usize;
        let mut reserved: HashSet<PathBuf> = HashSet::new();

        for unit in units {
            if self.cancellation.is_cancelled() {
                log::info!("Run cancelled before '{}'", unit.name);
                self.sinks.log("Cancelled");
                summary.cancelled = true;
                break;
            }

            log::info!("Processing '{}' ({:?})", unit.name, unit.kind);
            let (staging, images) = self.resolve_images(&unit).await;

            for &format in self.formats {
                let output = self.reserve_output_path(&unit, format, &mut reserved);
                let outcome = match &images {
                    Ok(images) => self.convert(&unit, images, format, &output).await,
                    Err(reason) => Err(reason.clone()),
                };
                let outcome = match outcome {
                    Ok(output) => {
                        log::info!("Wrote '{}'", output.display());
                        self.sinks
                            .log(&format!("Success: {} -> {}", unit.name, output.display()));
                        ConversionOutcome::Success(output)
                    }
                    Err(reason) => {
                        log::warn!("Error processing {} ({}): {}", unit.name, format, reason);
                        self.sinks
                            .log(&format!("Error processing {}: {}", unit.name, reason));
                        ConversionOutcome::Failure(reason)
                    }
                };
                summary.record(ConversionResult {
                    unit: unit.clone(),
                    format,
                    outcome,
                });

                completed += 1;
                self.sinks.progress(
                    completed,
                    total,
                    &format!("Processing {} ({})", unit.name, format),
                );
            }

            // staged images live exactly as long as the unit's jobs
            drop(staging);
        }

        self.sinks.progress(completed, total, DONE_LABEL);
        summary.finish()
    }

    /// Returns the unit's image set, or the reason every job of the unit fails.
    async fn resolve_images(
        &self,
        unit: &ConversionUnit,
    ) -> (Option<StagingArea>, std::result::Result<ImageSet, String>) {
        match unit.kind {
            UnitKind::Folder => {
                let images = Collector::folder_images(&unit.source)
                    .await
                    .map_err(|e| e.to_string());
                (None, images)
            }
            UnitKind::Archive => match self.extractor.stage(&unit.source, self.staging_root).await {
                Ok((staging, images)) if images.is_empty() => {
                    let reason = Error::EmptyInput(format!(
                        "no images extracted from '{}'",
                        unit.source.display()
                    ));
                    (Some(staging), Err(reason.to_string()))
                }
                Ok((staging, images)) => (Some(staging), Ok(images)),
                Err(e) => (None, Err(e.to_string())),
            },
        }
    }

    async fn convert(
        &self,
        unit: &ConversionUnit,
        images: &[PathBuf],
        format: TargetFormat,
        output: &Path,
    ) -> std::result::Result<PathBuf, String> {
        self.builders
            .create(images, output, format, &unit.name)
            .await
            .map(|_| output.to_path_buf())
            .map_err(|e| e.to_string())
    }

    /// Picks the job's output path and claims it for the rest of the run.
    ///
    /// A path already claimed by an earlier job is prefixed with the name of
    /// the unit's parent directory, then numbered.
    fn reserve_output_path(
        &self,
        unit: &ConversionUnit,
        format: TargetFormat,
        reserved: &mut HashSet<PathBuf>,
    ) -> PathBuf {
        let dir = match self.output_dir {
            Some(dir) => dir.to_path_buf(),
            None => unit
                .source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let extension = format.extension();
        let mut output = output_path_for(&dir, &unit.name, extension, &unit.source);

        if reserved.contains(&output) {
            let parent = unit
                .source
                .parent()
                .map(get_file_name_lossy)
                .unwrap_or_else(|| "unit".to_string());
            let prefixed = format!("{}_{}", parent, unit.name);
            output = output_path_for(&dir, &prefixed, extension, &unit.source);
            let mut counter = 2usize;
            while reserved.contains(&output) {
                let numbered = format!("{}_{}", prefixed, counter);
                output = output_path_for(&dir, &numbered, extension, &unit.source);
                counter += 1;
            }
            log::info!(
                "Output name for '{}' is taken in this run; using '{}'",
                unit.source.display(),
                output.display()
            );
        }

        reserved.insert(output.clone());
        output
    }
}

/// Runs discovery for `root` and reports what was found through `sinks`.
///
/// # Returns
///
/// * `Ok(Vec<ConversionUnit>)` - The units, possibly empty
/// * `Err(Error)` - The root is missing
pub(crate) async fn discover_units(
    root: &Path,
    process_archives: bool,
    sinks: &RunSinks,
) -> Result<Vec<ConversionUnit>> {
    let units = Collector::new(root, process_archives).discover().await?;
    if units.is_empty() {
        sinks.log(&no_units_message(root));
    } else {
        sinks.log(&format!("Found {} units to convert.", units.len()));
    }
    Ok(units)
}
