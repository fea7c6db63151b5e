//! Hako - Comic Container Conversion Library
//!
//! This crate converts collections of raster images between the containers used
//! for digital comics and e-books: CBZ, ZIP, 7Z, PDF and EPUB, with RAR and MOBI
//! read support (RAR through an external tool). It works in three directions:
//! folder to archive, archive to archive and archive to folder.
//!
//! # Getting Started
//!
//! Configure a run with [`HakoConfig::builder`] and execute it with
//! [`HakoConfig::run`], or on a dedicated task with [`HakoConfig::spawn`].
//!
//! ```rust,no_run
//! use hako::prelude::*;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> hako::error::Result<()> {
//!     let config = HakoConfig::builder()
//!         .root_path(PathBuf::from("./my_comics"))
//!         .output_path(PathBuf::from("./converted"))
//!         .formats(vec![TargetFormat::Cbz, TargetFormat::Pdf])
//!         .process_archives(true)
//!         .build()?;
//!
//!     // Optional: fail early on a missing root
//!     config.preflight_check()?;
//!
//!     let sinks = RunSinks::new()
//!         .with_progress(|done, total, label| println!("[{}/{}] {}", done, total, label))
//!         .with_log(|message| println!("{}", message));
//!
//!     let summary = config.spawn(sinks).join().await?;
//!     println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! Single conversions are available as free functions: [`create_archive`],
//! [`extract_archive`], [`convert_archive`] and [`extract_to_folder`].

pub mod capability;
pub mod collector;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod hako;
pub mod path_utils;
pub mod pipeline;
pub mod sort;
pub mod types;

// Publicly expose the main `HakoConfig` struct and its builder
pub use hako::{HakoConfig, HakoConfigBuilder, RunHandle};

// One-shot conversions
pub use hako::{
    convert_archive, create_archive, create_archive_from_images, extract_archive,
    extract_to_folder, process_directory,
};

// Re-export error and core types for direct access
pub use capability::Capabilities;
pub use pipeline::{CancellationFlag, LogSink, ProgressSink, RunSinks};
pub use types::{
    ConversionOutcome, ConversionResult, ConversionUnit, ImageSet, RunSummary, TargetFormat,
    UnitKind,
};

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions, allowing you to
/// import everything you need with a single `use hako::prelude::*;` statement.
pub mod prelude {
    pub use super::{
        CancellationFlag, Capabilities, ConversionOutcome, ConversionResult, ConversionUnit,
        HakoConfig, HakoConfigBuilder, ImageSet, LogSink, ProgressSink, RunHandle, RunSinks,
        RunSummary, TargetFormat, UnitKind, convert_archive, create_archive,
        create_archive_from_images, error, extract_archive, extract_to_folder, generator,
        process_directory, types,
    };
    pub use crate::collector::Collector;
    pub use crate::sort::{NaturalKey, natural_cmp};
    pub use std::path::{Path, PathBuf};
}
