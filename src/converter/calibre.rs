use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::converter::{Converter, DrmRemover, MetadataWriter};
use crate::error::{Error, Result};
use crate::path_utils::get_file_name_lossy;
use crate::types::{ConvertOptions, EBOOK_EXTENSIONS, SeriesMetadata};

const EBOOK_CONVERT: &str = "ebook-convert";
const EBOOK_META: &str = "ebook-meta";
const CALIBRE_DEBUG: &str = "calibre-debug";
const CALIBRE_CUSTOMIZE: &str = "calibre-customize";
const DEDRM_PLUGIN: &str = "DeDRM";

/// Calibre command-line tools, located once on the PATH.
///
/// Missing binaries are not an error at discovery time: each operation that
/// needs one fails on its own with [`Error::ToolNotFound`], so a machine
/// without `ebook-convert` can still copy and tag EPUBs.
#[derive(Debug, Default)]
pub struct Calibre {
    ebook_convert: Option<PathBuf>,
    ebook_meta: Option<PathBuf>,
    calibre_debug: Option<PathBuf>,
    calibre_customize: Option<PathBuf>,
    dedrm_installed: OnceCell<bool>,
}

impl Calibre {
    /// Looks up the Calibre executables with `which`.
    pub fn discover() -> Self {
        let find = |name: &str| match which::which(name) {
            Ok(path) => {
                log::debug!("Found {} at {:?}", name, path);
                Some(path)
            }
            Err(_) => {
                log::warn!(
                    "Calibre's {} not found in the PATH. Install Calibre and add its installation directory to the PATH.",
                    name
                );
                None
            }
        };
        Self {
            ebook_convert: find(EBOOK_CONVERT),
            ebook_meta: find(EBOOK_META),
            calibre_debug: which::which(CALIBRE_DEBUG).ok(),
            calibre_customize: which::which(CALIBRE_CUSTOMIZE).ok(),
            dedrm_installed: OnceCell::new(),
        }
    }

    /// Whether `ebook-convert` and `ebook-meta` were both found.
    pub fn is_complete(&self) -> bool {
        self.ebook_convert.is_some() && self.ebook_meta.is_some()
    }

    /// Whether the DeDRM plugin is installed. Asked once, then cached.
    async fn dedrm_installed(&self) -> bool {
        *self
            .dedrm_installed
            .get_or_init(|| async {
                let Some(customize) = &self.calibre_customize else {
                    return false;
                };
                match Command::new(customize)
                    .arg("--list-plugins")
                    .stdin(Stdio::null())
                    .output()
                    .await
                {
                    Ok(output) if output.status.success() => {
                        let installed =
                            String::from_utf8_lossy(&output.stdout).contains(DEDRM_PLUGIN);
                        log::debug!("{} plugin installed: {}", DEDRM_PLUGIN, installed);
                        installed
                    }
                    _ => false,
                }
            })
            .await
    }
}

/// Last meaningful line a failed command printed.
fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| format!("exited with {}", output.status))
}

#[async_trait]
impl Converter for Calibre {
    fn supports(&self, extension: &str) -> bool {
        EBOOK_EXTENSIONS.contains(&extension)
    }

    async fn convert(&self, source: &Path, target: &Path, options: &ConvertOptions) -> Result<()> {
        let executable = self
            .ebook_convert
            .as_ref()
            .ok_or_else(|| Error::ToolNotFound(EBOOK_CONVERT.to_string()))?;

        let mut command = Command::new(executable);
        command
            .arg(source)
            .arg(target)
            .arg("--no-default-epub-cover");
        if !options.svg_cover {
            command.arg("--no-svg-cover");
        }
        if !options.split_on_page_breaks {
            command.arg("--dont-split-on-page-breaks");
        }

        log::debug!("Running {:?}", command);
        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ConversionFailure {
                path: source.to_path_buf(),
                reason: format!("could not run {}: {}", EBOOK_CONVERT, e),
            })?;

        if !output.status.success() {
            return Err(Error::ConversionFailure {
                path: source.to_path_buf(),
                reason: describe_failure(&output),
            });
        }
        if !fs::try_exists(target).await.unwrap_or(false) {
            return Err(Error::ConversionFailure {
                path: source.to_path_buf(),
                reason: format!("{} reported success but wrote no file", EBOOK_CONVERT),
            });
        }
        Ok(())
    }
}

/// Arguments for `ebook-meta`.
///
/// `ebook-meta` has no field for a series part; it is already part of the
/// series title ("Classroom of the Elite Year 2").
fn ebook_meta_args(path: &Path, metadata: &SeriesMetadata) -> Vec<OsString> {
    let mut args = vec![
        path.as_os_str().to_os_string(),
        OsString::from("--series"),
        OsString::from(&metadata.series),
    ];
    if let Some(index) = &metadata.series_index {
        args.push(OsString::from("--index"));
        args.push(OsString::from(index));
    }
    args
}

#[async_trait]
impl MetadataWriter for Calibre {
    async fn set_metadata(&self, path: &Path, metadata: &SeriesMetadata) -> Result<()> {
        let executable = self
            .ebook_meta
            .as_ref()
            .ok_or_else(|| Error::ToolNotFound(EBOOK_META.to_string()))?;

        let mut command = Command::new(executable);
        command.args(ebook_meta_args(path, metadata));

        log::debug!("Running {:?}", command);
        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::MetadataWriteFailure {
                path: path.to_path_buf(),
                reason: format!("could not run {}: {}", EBOOK_META, e),
            })?;

        if !output.status.success() {
            return Err(Error::MetadataWriteFailure {
                path: path.to_path_buf(),
                reason: describe_failure(&output),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DrmRemover for Calibre {
    async fn remove_drm(&self, source: &Path, work_dir: &Path) -> Result<Option<PathBuf>> {
        let Some(debug) = &self.calibre_debug else {
            return Ok(None);
        };
        if !self.dedrm_installed().await {
            return Ok(None);
        }

        let decrypted = work_dir.join(format!("dedrm-{}", get_file_name_lossy(source)));
        let output = Command::new(debug)
            .args(["-r", DEDRM_PLUGIN, "--", "decrypt", "-o"])
            .arg(&decrypted)
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::ConversionFailure {
                path: source.to_path_buf(),
                reason: format!("{}: {}", DEDRM_PLUGIN, describe_failure(&output)),
            });
        }
        if fs::try_exists(&decrypted).await.unwrap_or(false) {
            Ok(Some(decrypted))
        } else {
            // Nothing to decrypt
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        let calibre = Calibre::default();
        assert!(calibre.supports("mobi"));
        assert!(calibre.supports("azw3"));
        assert!(!calibre.supports("pdf"));
        assert!(!calibre.is_complete());
    }

    #[test]
    fn test_ebook_meta_args_carry_part_in_series_title() {
        let metadata = SeriesMetadata {
            series: "Classroom of the Elite Year 2".to_string(),
            series_index: Some("4.5".to_string()),
            series_part: Some(2),
        };
        let args = ebook_meta_args(Path::new("out.epub"), &metadata);
        assert_eq!(
            args,
            ["out.epub", "--series", "Classroom of the Elite Year 2", "--index", "4.5"]
                .map(OsString::from)
        );

        let metadata = SeriesMetadata {
            series_index: None,
            ..metadata
        };
        assert_eq!(ebook_meta_args(Path::new("out.epub"), &metadata).len(), 3);
    }

    #[tokio::test]
    async fn test_missing_binaries_fail_per_operation() {
        let calibre = Calibre::default();
        let result = calibre
            .convert(
                Path::new("in.mobi"),
                Path::new("out.epub"),
                &ConvertOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::ToolNotFound(name)) if name == EBOOK_CONVERT));

        let metadata = SeriesMetadata {
            series: "Overlord".to_string(),
            series_index: Some("1".to_string()),
            series_part: None,
        };
        let result = calibre.set_metadata(Path::new("out.epub"), &metadata).await;
        assert!(matches!(result, Err(Error::ToolNotFound(name)) if name == EBOOK_META));

        let drm = calibre
            .remove_drm(Path::new("in.azw"), Path::new("/tmp"))
            .await
            .unwrap();
        assert_eq!(drm, None);
    }
}
