use futures::future::join_all;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::classifier::classify;
use crate::collector::Collector;
use crate::converter::Toolchain;
use crate::error::{Error, Result};
use crate::path_utils::{absolute_path, get_file_name_lossy};
use crate::resolver::{Candidate, TranslationResolver};
use crate::staleness;
use crate::types::{
    CANONICAL_EXTENSION, ConvertOptions, FileOutcome, FileState, ProduceMethod, SourceFile,
    SyncReport, TargetArtifact,
};

/// Prefix of the hidden staging directories created inside target series folders.
pub const STAGING_PREFIX: &str = ".shoka-";

/// Settings of a sync run, built declaratively using the builder pattern.
///
/// ```rust,no_run
/// # use shoka::prelude::*;
/// # #[tokio::main]
/// # async fn main() -> shoka::error::Result<()> {
/// let config = SyncConfig::builder()
///     .source_path("./Light Novels")
///     .target_path("./kavita/Light Novels")
///     .split_on_page_breaks(false)
///     .build()?;
///
/// let report = config.synchronize().await?;
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SyncConfig {
    /// Folder whose direct sub-folders are series.
    #[builder(default)]
    pub source_path: PathBuf,

    /// Library folder the EPUBs are written to. Created when missing.
    #[builder(default)]
    pub target_path: PathBuf,

    /// Let the converter split the output at page breaks.
    #[builder(default = "true")]
    pub split_on_page_breaks: bool,

    /// Let the converter render the cover as SVG.
    #[builder(default = "true")]
    pub svg_cover: bool,

    /// Upper bound on simultaneous conversions and copies.
    #[builder(default = "num_cpus::get()")]
    pub max_concurrent_conversions: usize,

    /// Try to strip DRM before converting, when a remover is available.
    #[builder(default = "true")]
    pub remove_drm: bool,

    /// Lowercase extensions to pick up. Empty means every supported ebook format.
    #[builder(default)]
    pub extensions: Vec<String>,
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Validates the source and target paths before anything is read or written.
    ///
    /// # Returns
    ///
    /// * `Ok(&self)` - Both paths are usable
    /// * `Err(Error)` - A fatal configuration error:
    ///   - a path is missing,
    ///   - the source does not exist or is not a directory,
    ///   - source and target are the same folder or nested in each other,
    ///   - the target exists but is not a directory.
    pub fn preflight_check(&self) -> Result<&Self> {
        if self.source_path.as_os_str().is_empty() {
            return Err(Error::Configuration("Source path is required".to_string()));
        }
        if self.target_path.as_os_str().is_empty() {
            return Err(Error::Configuration("Target path is required".to_string()));
        }
        if !self.source_path.exists() {
            return Err(Error::NotFound(format!(
                "Source path does not exist: {:?}",
                self.source_path
            )));
        }
        if !self.source_path.is_dir() {
            return Err(Error::InvalidPath(
                self.source_path.clone(),
                "Source path is not a directory.".to_string(),
            ));
        }
        if self.target_path.exists() && !self.target_path.is_dir() {
            return Err(Error::InvalidPath(
                self.target_path.clone(),
                "Target path exists but is not a directory.".to_string(),
            ));
        }
        if self.max_concurrent_conversions == 0 {
            return Err(Error::Configuration(
                "At least one concurrent conversion is required".to_string(),
            ));
        }

        let source = absolute_path(&self.source_path)?;
        let target = absolute_path(&self.target_path)?;
        if source.starts_with(&target) || target.starts_with(&source) {
            return Err(Error::Configuration(format!(
                "Source {:?} and target {:?} must not be the same folder or inside each other",
                source, target
            )));
        }

        Ok(self)
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            split_on_page_breaks: self.split_on_page_breaks,
            svg_cover: self.svg_cover,
        }
    }

    /// Runs a sync with the Calibre tools found on the PATH.
    pub async fn synchronize(self) -> Result<SyncReport> {
        Synchronizer::new(self, Toolchain::calibre()).run().await
    }
}

impl SyncConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(0) = self.max_concurrent_conversions {
            return Err("max_concurrent_conversions must be at least 1".to_string());
        }
        if let Some(extensions) = &self.extensions {
            if let Some(bad) = extensions
                .iter()
                .find(|e| e.is_empty() || e.starts_with('.'))
            {
                return Err(format!(
                    "Invalid extension '{}': use the bare extension, e.g. \"epub\"",
                    bad
                ));
            }
        }
        Ok(())
    }
}

/// Shared stop signal. Checked between files; a file already in progress is finished.
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

/// Receives progress events of a run.
///
/// Every method has an empty default, so observers only implement what they need.
/// Calls come from several tasks at once.
pub trait SyncObserver: Send + Sync {
    /// Traversal finished with `total` ebook files.
    fn on_discovered(&self, _total: usize) {}

    /// A stale artifact is about to be checked and produced.
    fn on_file_started(&self, _artifact: &TargetArtifact) {}

    /// A file reached its final state.
    fn on_file_finished(&self, _outcome: &FileOutcome) {}

    fn on_finished(&self, _report: &SyncReport) {}
}

/// Logs every finished file with a running counter.
#[derive(Debug, Default)]
pub struct LogObserver {
    total: AtomicUsize,
    finished: AtomicUsize,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files reported as finished so far.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl SyncObserver for LogObserver {
    fn on_discovered(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        log::info!("Found {} ebook files", total);
    }

    fn on_file_finished(&self, outcome: &FileOutcome) {
        let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        let name = get_file_name_lossy(&outcome.source);

        match &outcome.state {
            FileState::Produced {
                method,
                metadata_warning,
            } => {
                log::info!("[{}/{}] {:?} {}", done, total, method, name);
                if let Some(warning) = metadata_warning {
                    log::warn!("[{}/{}] {}: {}", done, total, name, warning);
                }
            }
            FileState::Failed(reason) => {
                log::error!("[{}/{}] Failed {}: {}", done, total, name, reason)
            }
            FileState::Unclassifiable(reason) => {
                log::warn!("[{}/{}] Skipped {}: {}", done, total, name, reason)
            }
            FileState::Suppressed(reason) => {
                log::debug!("[{}/{}] Suppressed {}: {}", done, total, name, reason)
            }
            FileState::Current => log::debug!("[{}/{}] Up to date {}", done, total, name),
        }
    }
}

/// Mirrors a source tree into a Kavita library.
///
/// A run collects every ebook, classifies it, resolves official against fan
/// translations and then works through one task per output series. Files of
/// a series are handled one after the other; conversions across series share
/// a semaphore.
pub struct Synchronizer {
    config: SyncConfig,
    toolchain: Toolchain,
    observer: Arc<dyn SyncObserver>,
    cancellation: CancellationFlag,
}

impl Synchronizer {
    /// Creates a synchronizer that logs progress through [`LogObserver`].
    ///
    /// With `remove_drm` disabled, the toolchain's DRM remover is dropped.
    pub fn new(config: SyncConfig, toolchain: Toolchain) -> Self {
        let toolchain = if config.remove_drm {
            toolchain
        } else {
            toolchain.without_drm_removal()
        };
        Self {
            config,
            toolchain,
            observer: Arc::new(LogObserver::new()),
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Handle that stops the run when cancelled.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Executes one incremental sync.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReport)` - One outcome per discovered file, ordered by source path
    /// * `Err(Error)` - Only for configuration problems found before traversal
    pub async fn run(&self) -> Result<SyncReport> {
        self.config.preflight_check()?;
        fs::create_dir_all(&self.config.target_path)
            .await
            .map_err(|e| {
                Error::InvalidPath(
                    self.config.target_path.clone(),
                    format!("Cannot create target directory: {}", e),
                )
            })?;

        log::info!(
            "Syncing {:?} into {:?}",
            self.config.source_path,
            self.config.target_path
        );

        let collector = Collector::new(&self.config.source_path, &self.config.extensions);
        let files = collector.collect_files().await?;
        self.observer.on_discovered(files.len());

        let (candidates, mut outcomes) = Self::classify_files(files);
        for outcome in &outcomes {
            self.observer.on_file_finished(outcome);
        }

        let plans = TranslationResolver::new(&self.config.target_path).resolve(candidates);

        let producer = Arc::new(Producer {
            toolchain: self.toolchain.clone(),
            options: self.config.convert_options(),
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrent_conversions)),
            cancellation: self.cancellation.clone(),
            observer: Arc::clone(&self.observer),
        });

        let mut groups = Vec::with_capacity(plans.len());
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(plans.len());
        for plan in plans {
            for suppressed in plan.suppressed {
                let outcome = FileOutcome {
                    source: suppressed.source.path,
                    target: Some(suppressed.target_path),
                    state: FileState::Suppressed(suppressed.reason.to_string()),
                };
                self.observer.on_file_finished(&outcome);
                outcomes.push(outcome);
            }
            if plan.artifacts.is_empty() {
                continue;
            }
            log::debug!(
                "Series '{}': {} artifacts",
                plan.key,
                plan.artifacts.len()
            );
            let paths: Vec<(PathBuf, PathBuf)> = plan
                .artifacts
                .iter()
                .map(|a| (a.source.path.clone(), a.target_path.clone()))
                .collect();
            let finished = Arc::new(Mutex::new(Vec::with_capacity(paths.len())));
            let producer = Arc::clone(&producer);
            handles.push(tokio::spawn(
                producer.sync_group(plan.artifacts, Arc::clone(&finished)),
            ));
            groups.push((paths, finished));
        }

        for ((paths, finished), result) in groups.into_iter().zip(join_all(handles).await) {
            let mut group_outcomes = take_outcomes(&finished);
            if let Err(e) = result {
                log::error!("Series task failed: {}", e);
                let reason = if e.is_panic() {
                    format!("series task panicked: {}", e)
                } else {
                    format!("series task was aborted: {}", e)
                };
                for (source, target) in paths {
                    if group_outcomes.iter().any(|o| o.source == source) {
                        continue;
                    }
                    let outcome = FileOutcome {
                        source,
                        target: Some(target),
                        state: FileState::Failed(reason.clone()),
                    };
                    self.observer.on_file_finished(&outcome);
                    group_outcomes.push(outcome);
                }
            }
            outcomes.extend(group_outcomes);
        }

        outcomes.par_sort_by(|a, b| a.source.cmp(&b.source));
        let report = SyncReport {
            outcomes,
            cancelled: self.cancellation.is_cancelled(),
        };

        if report.cancelled {
            log::warn!("Sync cancelled: {}", report.summary());
        } else {
            log::info!("Sync finished: {}", report.summary());
        }
        self.observer.on_finished(&report);
        Ok(report)
    }

    /// Classifies all files on the rayon pool.
    ///
    /// Returns the files that have a volume number and the outcomes of those
    /// that could not be classified.
    fn classify_files(files: Vec<SourceFile>) -> (Vec<Candidate>, Vec<FileOutcome>) {
        let classified: Vec<_> = files
            .into_par_iter()
            .map(|file| {
                let classification = classify(&file);
                (file, classification)
            })
            .collect();

        let mut candidates = Vec::with_capacity(classified.len());
        let mut unclassifiable = Vec::new();
        for (file, classification) in classified {
            let reason = match classification {
                Ok(classification) if classification.volume.is_some() => {
                    candidates.push(Candidate {
                        source: file,
                        classification,
                    });
                    continue;
                }
                Ok(_) => Error::UnclassifiableFilename(file.file_name().to_string()).to_string(),
                Err(e) => e.to_string(),
            };
            unclassifiable.push(FileOutcome {
                source: file.path,
                target: None,
                state: FileState::Unclassifiable(reason),
            });
        }
        (candidates, unclassifiable)
    }
}

fn take_outcomes(finished: &Mutex<Vec<FileOutcome>>) -> Vec<FileOutcome> {
    std::mem::take(&mut *finished.lock().unwrap_or_else(PoisonError::into_inner))
}

/// State shared by the per-series tasks of one run.
struct Producer {
    toolchain: Toolchain,
    options: ConvertOptions,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationFlag,
    observer: Arc<dyn SyncObserver>,
}

impl Producer {
    /// Handles the artifacts of one series in order until done or cancelled.
    ///
    /// Outcomes land in `finished` as they happen, so they survive a panic
    /// further down the group.
    async fn sync_group(
        self: Arc<Self>,
        artifacts: Vec<TargetArtifact>,
        finished: Arc<Mutex<Vec<FileOutcome>>>,
    ) {
        for artifact in artifacts {
            if self.cancellation.is_cancelled() {
                break;
            }
            self.observer.on_file_started(&artifact);
            let state = self.sync_artifact(&artifact).await;
            let outcome = FileOutcome {
                source: artifact.source.path,
                target: Some(artifact.target_path),
                state,
            };
            self.observer.on_file_finished(&outcome);
            finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(outcome);
        }
    }

    async fn sync_artifact(&self, artifact: &TargetArtifact) -> FileState {
        match staleness::check(artifact.source.modified, &artifact.target_path).await {
            Ok(verdict) if !verdict.needs_rebuild() => return FileState::Current,
            Ok(verdict) => log::debug!(
                "{:?} target {:?}",
                verdict,
                artifact.target_path
            ),
            Err(e) => return FileState::Failed(e.to_string()),
        }

        match self.produce(artifact).await {
            Ok((method, metadata_warning)) => FileState::Produced {
                method,
                metadata_warning,
            },
            Err(e) => FileState::Failed(e.to_string()),
        }
    }

    /// Writes the artifact into a staging directory next to its final path,
    /// then renames it into place.
    ///
    /// The staging directory is removed when dropped, so a failed or interrupted
    /// production never leaves a partial file at the target path.
    async fn produce(&self, artifact: &TargetArtifact) -> Result<(ProduceMethod, Option<String>)> {
        let _permit = self.semaphore.acquire().await?;

        let target = &artifact.target_path;
        let series_dir = target.parent().ok_or_else(|| {
            Error::InvalidPath(target.clone(), "Target has no parent directory".to_string())
        })?;
        fs::create_dir_all(series_dir).await?;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(series_dir)?;
        let staged = staging.path().join(get_file_name_lossy(target));
        let source = &artifact.source;

        let method = if source.extension == CANONICAL_EXTENSION {
            fs::copy(&source.path, &staged).await?;
            ProduceMethod::Copied
        } else {
            if !self.toolchain.converter.supports(&source.extension) {
                return Err(Error::ConversionFailure {
                    path: source.path.clone(),
                    reason: format!("unsupported format '{}'", source.extension),
                });
            }
            let input = self.remove_drm(&source.path, staging.path()).await;
            self.toolchain
                .converter
                .convert(&input, &staged, &self.options)
                .await?;
            ProduceMethod::Converted
        };

        let metadata_warning = match self
            .toolchain
            .metadata_writer
            .set_metadata(&staged, &artifact.metadata())
            .await
        {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };

        fs::rename(&staged, target).await?;
        Ok((method, metadata_warning))
    }

    /// Decrypted copy of `source` when possible, `source` itself otherwise.
    async fn remove_drm(&self, source: &Path, work_dir: &Path) -> PathBuf {
        let Some(remover) = &self.toolchain.drm_remover else {
            return source.to_path_buf();
        };
        match remover.remove_drm(source, work_dir).await {
            Ok(Some(decrypted)) => {
                log::debug!("Removed DRM from {:?}", source);
                decrypted
            }
            Ok(None) => source.to_path_buf(),
            Err(e) => {
                log::warn!("DRM removal failed, converting as is: {}", e);
                source.to_path_buf()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SyncConfig::builder()
            .source_path("/library/src")
            .target_path("/library/kavita")
            .build()
            .unwrap();
        assert!(config.split_on_page_breaks);
        assert!(config.svg_cover);
        assert!(config.remove_drm);
        assert!(config.max_concurrent_conversions >= 1);
        assert!(config.extensions.is_empty());
        assert_eq!(config.convert_options(), ConvertOptions::default());
    }

    #[test]
    fn test_builder_rejects_zero_jobs() {
        let result = SyncConfig::builder()
            .source_path("/a")
            .target_path("/b")
            .max_concurrent_conversions(0usize)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_dotted_extension() {
        let result = SyncConfig::builder()
            .extensions(vec![".epub".to_string()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_log_observer_counts() {
        let observer = LogObserver::new();
        observer.on_discovered(2);
        observer.on_file_finished(&FileOutcome {
            source: PathBuf::from("/src/A/A - v01.epub"),
            target: None,
            state: FileState::Current,
        });
        assert_eq!(observer.finished(), 1);
    }
}
