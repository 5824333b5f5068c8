//! Source tree traversal.
//!
//! Every folder directly under the source root is a series. Each series folder
//! is walked recursively in its own task, and every non-hidden file with a
//! supported ebook extension becomes a [`SourceFile`]. Files sitting directly
//! in the source root belong to no series and are ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rayon::prelude::*;
use tokio::fs::{ReadDir, read_dir};
use tokio::spawn;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::path_utils::{is_hidden_file, lowercase_extension, relative_segments};
use crate::types::{EBOOK_EXTENSIONS, SourceFile};

/// Limits the number of series folders walked at once
const MAX_CONCURRENT_DIRS: usize = 64;

/// Collects ebook files from a source tree.
#[derive(Debug, Clone)]
pub struct Collector {
    source_root: PathBuf,
    extensions: Arc<Vec<String>>,
}

impl Collector {
    /// Creates a new Collector for the specified source root.
    ///
    /// # Arguments
    ///
    /// * `source_root` - Directory whose sub-folders are series
    /// * `extensions` - Lowercase extensions to collect; empty means [`EBOOK_EXTENSIONS`]
    pub fn new(source_root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        let extensions = if extensions.is_empty() {
            EBOOK_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            extensions.iter().map(|e| e.to_lowercase()).collect()
        };
        Self {
            source_root: source_root.into(),
            extensions: Arc::new(extensions),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Collects the series folders directly under the source root, sorted by name.
    pub async fn collect_series_folders(&self) -> Result<Vec<PathBuf>> {
        let mut folders = Self::collect_parallel(&self.source_root, true).await?;
        folders.par_sort();
        Ok(folders)
    }

    /// Walks every series folder and returns all ebook files, sorted by relative path.
    pub async fn collect_files(&self) -> Result<Vec<SourceFile>> {
        let series_folders = self.collect_series_folders().await?;
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DIRS));
        let mut handles: Vec<JoinHandle<Result<Vec<SourceFile>>>> = Vec::new();

        for series_folder in series_folders {
            let semaphore = Arc::clone(&semaphore);
            let source_root = self.source_root.clone();
            let extensions = Arc::clone(&self.extensions);

            handles.push(spawn(async move {
                let _permit = semaphore.acquire().await?;
                Self::walk_series(&source_root, series_folder, &extensions).await
            }));
        }

        let results = try_join_all(handles).await?;

        let mut files = Vec::new();
        for res in results {
            files.extend(res?);
        }
        files.par_sort_by(|a, b| a.segments.cmp(&b.segments));

        log::debug!(
            "Collected {} ebook files under {:?}",
            files.len(),
            self.source_root
        );
        Ok(files)
    }

    /// Depth-first walk of one series folder.
    async fn walk_series(
        source_root: &Path,
        series_folder: PathBuf,
        extensions: &[String],
    ) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        let mut pending = vec![series_folder];

        while let Some(directory) = pending.pop() {
            let (sub_directories, entries) = match futures::try_join!(
                Self::collect_parallel(&directory, true),
                Self::collect_parallel(&directory, false)
            ) {
                Ok(listing) => listing,
                Err(e) => {
                    log::warn!("Skipping unreadable folder {:?}: {}", directory, e);
                    continue;
                }
            };
            pending.extend(sub_directories);

            for path in entries {
                let Some(extension) = lowercase_extension(&path) else {
                    continue;
                };
                if !extensions.contains(&extension) {
                    continue;
                }
                let metadata = match tokio::fs::metadata(&path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        log::warn!("Skipping unreadable file {:?}: {}", path, e);
                        continue;
                    }
                };
                files.push(SourceFile {
                    segments: relative_segments(source_root, &path)?,
                    modified: DateTime::<Utc>::from(metadata.modified()?),
                    extension,
                    path,
                });
            }
        }

        Ok(files)
    }

    /// Collects directory contents with filtering options
    ///
    /// # Arguments
    ///
    /// * `directory` - Directory to scan
    /// * `only_dirs` - When true, only directories are collected; when false, only files
    ///
    /// # Returns
    ///
    /// * `Result<Vec<PathBuf>>` - Paths meeting the criteria, hidden entries excluded
    pub async fn collect_parallel(directory: &Path, only_dirs: bool) -> Result<Vec<PathBuf>> {
        let mut entries: Vec<PathBuf> = Vec::new();

        let mut paths: ReadDir = read_dir(directory).await.map_err(Error::Io)?;

        while let Some(entry) = paths.next_entry().await.map_err(Error::Io)? {
            let path = entry.path();

            if is_hidden_file(&path) {
                continue;
            }

            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let is_dir = if file_type.is_symlink() {
                // Linked files are collected, linked directories are not followed
                match tokio::fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => false,
                    _ => continue,
                }
            } else {
                file_type.is_dir()
            };
            if only_dirs != is_dir {
                continue;
            }

            entries.push(path);
        }

        Ok(entries)
    }
}
