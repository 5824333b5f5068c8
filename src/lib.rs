//! Shoka - Ebook Series Classifier and Kavita Library Sync
//!
//! This crate turns a loosely organized folder of light novels into the
//! layout Kavita expects: one folder per series, one EPUB per volume, with
//! series title and index written into the book's metadata.
//!
//! A source tree looks like this:
//!
//! ```text
//! Overlord/
//!   Light Novel/
//!     Official Translation/Overlord - v01.epub
//!     Fan Translation/Overlord - v01.epub
//!   Side Story/Fan Translation/Overlord - SS 02.mobi
//! ```
//!
//! Folder names are matched against a small vocabulary (light novel, web novel,
//! side story, fan/official translation, ...). The volume number comes from the
//! filename. Official translations suppress the fan translations of the same
//! series, and only missing or outdated targets are rebuilt.
//!
//! # Getting Started
//!
//! ```rust,no_run
//! use shoka::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> shoka::error::Result<()> {
//!     let config = SyncConfig::builder()
//!         .source_path("./Light Novels")
//!         .target_path("./kavita/Light Novels")
//!         .svg_cover(false)
//!         .build()?;
//!
//!     // Optional: fail early on bad paths
//!     config.preflight_check()?;
//!
//!     let synchronizer = Synchronizer::new(config, Toolchain::calibre());
//!     let report = synchronizer.run().await?;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! The external tools sit behind the [`converter::Converter`],
//! [`converter::MetadataWriter`] and [`converter::DrmRemover`] traits, so a run
//! can be driven with any implementation of them.

pub mod classifier;
pub mod collector;
pub mod converter;
pub mod error;
pub mod path_utils;
pub mod resolver;
pub mod staleness;
pub mod sync;
pub mod types;
pub mod volume;

// Publicly expose the sync entry points and their builder
pub use sync::{
    CancellationFlag, LogObserver, SyncConfig, SyncConfigBuilder, SyncObserver, Synchronizer,
};

// Re-export core types for direct access
pub use converter::Toolchain;
pub use types::{
    Classification, ClassificationTag, ConvertOptions, FileOutcome, FileState, ProduceMethod,
    SeriesMetadata, SourceFile, SyncReport, SyncSummary, TargetArtifact, TargetSeriesKey,
};

/// Prelude module for convenient imports.
///
/// Re-exports the types needed to configure and run a sync with a single
/// `use shoka::prelude::*;` statement.
pub mod prelude {
    pub use super::{
        CancellationFlag, Classification, ClassificationTag, ConvertOptions, FileOutcome,
        FileState, LogObserver, ProduceMethod, SeriesMetadata, SourceFile, SyncConfig,
        SyncConfigBuilder, SyncObserver, SyncReport, SyncSummary, Synchronizer, TargetArtifact,
        TargetSeriesKey, Toolchain, error, types,
    };
    pub use crate::converter::{Calibre, Converter, DrmRemover, MetadataWriter};
    pub use std::path::{Path, PathBuf};
    pub use std::sync::Arc;
}
