//! External collaborators that turn a classified source file into a finished artifact.
//!
//! The sync orchestrator never talks to an ebook tool directly; it goes through
//! three traits:
//! - [`Converter`] turns a non-EPUB ebook into an EPUB,
//! - [`DrmRemover`] opportunistically strips DRM before conversion,
//! - [`MetadataWriter`] stamps series title and index into the produced EPUB.
//!
//! [`Toolchain::calibre`] wires all three to the Calibre command-line tools.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::types::{ConvertOptions, SeriesMetadata};

pub mod calibre;

pub use calibre::Calibre;

/// Converts an ebook into an EPUB.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Whether files with this lowercase extension can be converted.
    fn supports(&self, extension: &str) -> bool;

    /// Converts `source` into an EPUB written at `target`.
    ///
    /// # Parameters
    /// * `source` - The input ebook
    /// * `target` - Output path; must end in `.epub`
    /// * `options` - Page-break splitting and SVG cover settings
    ///
    /// # Returns
    /// * `Result<()>` - `Error::ConversionFailure` or `Error::ToolNotFound` on failure
    async fn convert(&self, source: &Path, target: &Path, options: &ConvertOptions) -> Result<()>;
}

/// Writes series metadata into a produced EPUB in place.
///
/// `SeriesMetadata::series` already carries the series-part suffix, so
/// writers without a part field can ignore `series_part`.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    async fn set_metadata(&self, path: &Path, metadata: &SeriesMetadata) -> Result<()>;
}

/// Removes DRM from an ebook before it is converted.
#[async_trait]
pub trait DrmRemover: Send + Sync {
    /// Writes a DRM-free copy of `source` into `work_dir`.
    ///
    /// # Returns
    /// * `Ok(Some(path))` - Path of the decrypted copy
    /// * `Ok(None)` - No DRM removal available; use `source` as is
    /// * `Err(Error)` - Removal was attempted and failed
    async fn remove_drm(&self, source: &Path, work_dir: &Path) -> Result<Option<PathBuf>>;
}

/// The set of collaborators a sync run uses.
#[derive(Clone)]
pub struct Toolchain {
    pub converter: Arc<dyn Converter>,
    pub metadata_writer: Arc<dyn MetadataWriter>,
    pub drm_remover: Option<Arc<dyn DrmRemover>>,
}

impl Toolchain {
    pub fn new(
        converter: Arc<dyn Converter>,
        metadata_writer: Arc<dyn MetadataWriter>,
        drm_remover: Option<Arc<dyn DrmRemover>>,
    ) -> Self {
        Self {
            converter,
            metadata_writer,
            drm_remover,
        }
    }

    /// Uses the Calibre binaries found on the PATH for every collaborator.
    pub fn calibre() -> Self {
        let calibre = Arc::new(Calibre::discover());
        Self {
            converter: calibre.clone(),
            metadata_writer: calibre.clone(),
            drm_remover: Some(calibre as Arc<dyn DrmRemover>),
        }
    }

    /// Same toolchain without DRM removal.
    pub fn without_drm_removal(mut self) -> Self {
        self.drm_remover = None;
        self
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("converter", &"Converter")
            .field("metadata_writer", &"MetadataWriter")
            .field(
                "drm_remover",
                if self.drm_remover.is_some() {
                    &"Some(DrmRemover)"
                } else {
                    &"None"
                },
            )
            .finish()
    }
}
