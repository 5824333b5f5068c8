//! Common test utilities and constants for the Shoka crate.
//!
//! Provides unique source/target directories, ebook fixture files with
//! controlled modification times, and fake collaborators that stand in for
//! the Calibre tools.

use async_trait::async_trait;
use rand::{Rng, distributions::Alphanumeric};
use shoka::converter::{Converter, DrmRemover, MetadataWriter, Toolchain};
use shoka::error::{Error, Result};
use shoka::sync::{SyncConfig, SyncConfigBuilder};
use shoka::types::{ConvertOptions, EBOOK_EXTENSIONS, SeriesMetadata};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::fs;

#[allow(dead_code)]
pub const TEST_TMP_DIR: &str = "tests/tmp";
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Directories of one test case.
#[allow(dead_code)]
pub struct TestDirs {
    pub base_dir: PathBuf,
    pub source_dir: PathBuf,
    /// Not created; the sync run creates it.
    pub target_dir: PathBuf,
}

/// Creates a fresh, uniquely named test directory with an empty source folder.
#[allow(dead_code)]
pub async fn setup_test_dirs(sub_path: &str) -> TestDirs {
    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let unique_sub_path = format!("{}-{}", sub_path, rand_string);
    let base_dir = PathBuf::from(TEST_TMP_DIR).join(unique_sub_path);
    if base_dir.exists() {
        fs::remove_dir_all(&base_dir).await.unwrap();
    }
    let source_dir = base_dir.join("source");
    let target_dir = base_dir.join("target");
    fs::create_dir_all(&source_dir).await.unwrap();

    TestDirs {
        base_dir,
        source_dir,
        target_dir,
    }
}

/// Builder preset with the test's source and target and two conversion slots.
#[allow(dead_code)]
pub fn config_builder(dirs: &TestDirs) -> SyncConfigBuilder {
    let mut builder = SyncConfig::builder();
    builder
        .source_path(dirs.source_dir.clone())
        .target_path(dirs.target_dir.clone())
        .max_concurrent_conversions(2usize);
    builder
}

/// Writes a small fake ebook below the source directory.
///
/// `relative` uses `/` separators, e.g. `"Overlord/Light Novel/Overlord - v01.epub"`.
#[allow(dead_code)]
pub async fn create_ebook(source_dir: &Path, relative: &str, content: &str) -> Result<PathBuf> {
    let path = relative
        .split('/')
        .fold(source_dir.to_path_buf(), |path, segment| path.join(segment));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&path, content).await?;
    Ok(path)
}

/// Sets the modification time of an existing file.
#[allow(dead_code)]
pub fn set_modified(path: &Path, time: SystemTime) -> Result<()> {
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_modified(time)?;
    Ok(())
}

#[allow(dead_code)]
pub fn hours_ago(hours: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(hours * 3600)
}

#[allow(dead_code)]
pub fn hours_from_now(hours: u64) -> SystemTime {
    SystemTime::now() + Duration::from_secs(hours * 3600)
}

/// Names of leftover staging directories in a series folder.
#[allow(dead_code)]
pub async fn staging_leftovers(series_dir: &Path) -> Vec<String> {
    let mut leftovers = Vec::new();
    let Ok(mut entries) = fs::read_dir(series_dir).await else {
        return leftovers;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(shoka::sync::STAGING_PREFIX) {
            leftovers.push(name);
        }
    }
    leftovers
}

/// Converter that writes a marker file instead of running Calibre.
#[derive(Debug, Default)]
pub struct FakeConverter {
    /// Sources whose file name contains one of these fragments fail.
    pub failing: Vec<String>,
    /// Sources whose file name contains one of these fragments panic.
    pub panicking: Vec<String>,
    pub calls: Mutex<Vec<(PathBuf, ConvertOptions)>>,
}

#[async_trait]
impl Converter for FakeConverter {
    fn supports(&self, extension: &str) -> bool {
        EBOOK_EXTENSIONS.contains(&extension)
    }

    async fn convert(&self, source: &Path, target: &Path, options: &ConvertOptions) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), *options));

        let name = source.file_name().unwrap().to_string_lossy().to_string();
        if self.panicking.iter().any(|fragment| name.contains(fragment)) {
            panic!("simulated converter panic on {}", name);
        }
        if self.failing.iter().any(|fragment| name.contains(fragment)) {
            return Err(Error::ConversionFailure {
                path: source.to_path_buf(),
                reason: "simulated converter crash".to_string(),
            });
        }
        let content = fs::read_to_string(source).await?;
        fs::write(target, format!("converted:{}", content)).await?;
        Ok(())
    }
}

/// Metadata writer that records every call.
#[derive(Debug, Default)]
pub struct FakeMetadataWriter {
    pub fail: bool,
    pub calls: Mutex<Vec<(PathBuf, SeriesMetadata)>>,
}

#[async_trait]
impl MetadataWriter for FakeMetadataWriter {
    async fn set_metadata(&self, path: &Path, metadata: &SeriesMetadata) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), metadata.clone()));
        if self.fail {
            return Err(Error::MetadataWriteFailure {
                path: path.to_path_buf(),
                reason: "simulated ebook-meta failure".to_string(),
            });
        }
        Ok(())
    }
}

/// DRM remover that copies the source into the work directory.
#[derive(Debug, Default)]
pub struct FakeDrmRemover {
    pub calls: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl DrmRemover for FakeDrmRemover {
    async fn remove_drm(&self, source: &Path, work_dir: &Path) -> Result<Option<PathBuf>> {
        self.calls.lock().unwrap().push(source.to_path_buf());
        let decrypted = work_dir.join(format!(
            "dedrm-{}",
            source.file_name().unwrap().to_string_lossy()
        ));
        fs::copy(source, &decrypted).await?;
        Ok(Some(decrypted))
    }
}

/// The three fakes, kept around so tests can inspect their calls.
#[derive(Debug, Default, Clone)]
pub struct Fakes {
    pub converter: Arc<FakeConverter>,
    pub metadata: Arc<FakeMetadataWriter>,
    pub drm: Arc<FakeDrmRemover>,
}

#[allow(dead_code)]
impl Fakes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_conversion(fragment: &str) -> Self {
        Self {
            converter: Arc::new(FakeConverter {
                failing: vec![fragment.to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn with_panicking_conversion(fragment: &str) -> Self {
        Self {
            converter: Arc::new(FakeConverter {
                panicking: vec![fragment.to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn with_failing_metadata() -> Self {
        Self {
            metadata: Arc::new(FakeMetadataWriter {
                fail: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain::new(
            self.converter.clone(),
            self.metadata.clone(),
            Some(self.drm.clone() as Arc<dyn DrmRemover>),
        )
    }

    pub fn conversions(&self) -> usize {
        self.converter.calls.lock().unwrap().len()
    }

    pub fn metadata_calls(&self) -> Vec<SeriesMetadata> {
        self.metadata
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, metadata)| metadata.clone())
            .collect()
    }

    pub fn drm_calls(&self) -> usize {
        self.drm.calls.lock().unwrap().len()
    }
}
