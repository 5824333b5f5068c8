//! Decides whether a target artifact must be (re)built.
//!
//! The files already in the target tree are the only cache: a target is
//! current when it exists and is not older than its source. Timestamp
//! truncation and clock skew can produce false "current" verdicts; there is
//! no checksum fallback.

use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::error::Result;

/// Verdict for one source/target pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The target does not exist.
    Missing,
    /// The target is older than the source.
    Outdated,
    /// The target is at least as new as the source.
    Current,
}

impl Staleness {
    pub fn needs_rebuild(&self) -> bool {
        !matches!(self, Staleness::Current)
    }
}

/// Pure decision from the two timestamps.
///
/// Rebuild when the target is absent or strictly older than the source.
pub fn decide(source_modified: DateTime<Utc>, target_modified: Option<DateTime<Utc>>) -> Staleness {
    match target_modified {
        None => Staleness::Missing,
        Some(target) if target < source_modified => Staleness::Outdated,
        Some(_) => Staleness::Current,
    }
}

/// Reads the modification time of `path`, or `None` when it does not exist.
pub async fn modified_time(path: &Path) -> Result<Option<DateTime<Utc>>> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(Some(DateTime::<Utc>::from(metadata.modified()?))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Checks a source timestamp against the file at `target_path`.
pub async fn check(source_modified: DateTime<Utc>, target_path: &Path) -> Result<Staleness> {
    let target_modified = modified_time(target_path).await?;
    Ok(decide(source_modified, target_modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_missing_target_is_stale() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(decide(t, None), Staleness::Missing);
        assert!(decide(t, None).needs_rebuild());
    }

    #[test]
    fn test_older_source_is_current() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(decide(t - Duration::seconds(1), Some(t)), Staleness::Current);
    }

    #[test]
    fn test_newer_source_is_stale() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let verdict = decide(t + Duration::seconds(1), Some(t));
        assert_eq!(verdict, Staleness::Outdated);
        assert!(verdict.needs_rebuild());
    }

    #[test]
    fn test_equal_timestamps_are_current() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(decide(t, Some(t)), Staleness::Current);
    }

    #[tokio::test]
    async fn test_modified_time_of_missing_file() -> Result<()> {
        let missing = std::env::temp_dir().join("shoka-definitely-missing-file.epub");
        assert_eq!(modified_time(&missing).await?, None);
        Ok(())
    }
}
