//! Official/fan translation resolution and target planning.
//!
//! Files are grouped by [`TargetSeriesKey`], i.e. series name plus story-type
//! tags with translation status stripped. Resolution takes two passes over the
//! classified files because an official file may be discovered after the fan
//! files of its group:
//!
//! 1. record, per group, whether any official translation exists;
//! 2. emit artifacts, dropping every fan translation of a group that has one.
//!
//! Suppression is deliberately coarse: once an official file is present, the
//! whole fan set of that group goes, not just the volumes the official release
//! covers. Groups that differ in any story-type tag never affect each other.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::path_utils::sanitize_filename;
use crate::types::{
    CANONICAL_EXTENSION, Classification, ClassificationTag, SourceFile, TargetArtifact,
    TargetSeriesKey,
};

/// A classified file with a volume number, ready for resolution.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: SourceFile,
    pub classification: Classification,
}

/// Why a file was left out of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressionReason {
    /// The group has at least one official translation.
    OfficialTranslationPresent,
    /// Another file of the group maps to the same target path and wins.
    ShadowedBy(PathBuf),
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionReason::OfficialTranslationPresent => {
                f.write_str("fan translation superseded by an official translation")
            }
            SuppressionReason::ShadowedBy(winner) => {
                write!(f, "same target as {:?}", winner)
            }
        }
    }
}

/// A file dropped by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressedFile {
    pub source: SourceFile,
    pub target_path: PathBuf,
    pub reason: SuppressionReason,
}

/// Everything to do for one output series.
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub key: TargetSeriesKey,
    /// Artifacts in source path order.
    pub artifacts: Vec<TargetArtifact>,
    pub suppressed: Vec<SuppressedFile>,
}

/// Lower wins when two files want the same target path.
fn provenance_rank(classification: &Classification) -> u8 {
    match classification.tags.translation_status() {
        Some(ClassificationTag::OfficialTranslation) => 0,
        None => 1,
        Some(_) => 2,
    }
}

/// Computes the series title and target path of a classified file.
///
/// Layout: `<target_root>/<series title>/<series title>[ Year N] - v<NN>[.<M>].epub`,
/// where the series title carries the plural labels of the story-type tags.
/// Returns `None` when the classification has no volume.
pub fn plan_target(target_root: &Path, classification: &Classification) -> Option<(String, PathBuf)> {
    let volume = classification.volume?;
    let key = classification.target_key();
    let folder_title = key.series_title();

    let mut series_title = folder_title.clone();
    if let Some(part) = classification.series_part {
        series_title.push_str(&part.title_suffix());
    }

    let mut file_stem = format!("{} - v{}", series_title, volume.padded());
    if let Some(sub) = classification.volume_sub_part {
        file_stem.push('.');
        file_stem.push_str(&sub.padded());
    }

    let target_path = target_root
        .join(sanitize_filename(&folder_title))
        .join(format!("{}.{}", sanitize_filename(&file_stem), CANONICAL_EXTENSION));
    Some((series_title, target_path))
}

/// Groups candidates and applies translation suppression.
#[derive(Debug, Clone)]
pub struct TranslationResolver {
    target_root: PathBuf,
}

impl TranslationResolver {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
        }
    }

    /// Resolves all candidates of a run into per-series plans.
    ///
    /// Groups are returned in order of first appearance; candidates without a
    /// volume number are ignored (the caller reports them beforehand).
    pub fn resolve(&self, candidates: Vec<Candidate>) -> Vec<GroupPlan> {
        // Pass 1: which groups have an official translation?
        let mut official_present: HashMap<TargetSeriesKey, bool> = HashMap::new();
        for candidate in &candidates {
            let is_official = candidate
                .classification
                .tags
                .contains(ClassificationTag::OfficialTranslation);
            *official_present
                .entry(candidate.classification.target_key())
                .or_insert(false) |= is_official;
        }

        // Pass 2: emit
        let mut plans: Vec<GroupPlan> = Vec::new();
        let mut plan_index: HashMap<TargetSeriesKey, usize> = HashMap::new();

        for candidate in candidates {
            let Some((series_title, target_path)) =
                plan_target(&self.target_root, &candidate.classification)
            else {
                continue;
            };
            let key = candidate.classification.target_key();
            let index = *plan_index.entry(key.clone()).or_insert_with(|| {
                plans.push(GroupPlan {
                    key: key.clone(),
                    artifacts: Vec::new(),
                    suppressed: Vec::new(),
                });
                plans.len() - 1
            });
            let plan = &mut plans[index];

            let is_fan = candidate
                .classification
                .tags
                .contains(ClassificationTag::FanTranslation);
            if is_fan && official_present.get(&key).copied().unwrap_or(false) {
                log::debug!(
                    "Suppressing fan translation {:?}: official translation present for '{}'",
                    candidate.source.path,
                    key
                );
                plan.suppressed.push(SuppressedFile {
                    source: candidate.source,
                    target_path,
                    reason: SuppressionReason::OfficialTranslationPresent,
                });
                continue;
            }

            plan.artifacts.push(TargetArtifact {
                source: candidate.source,
                classification: candidate.classification,
                series_title,
                target_path,
            });
        }

        for plan in &mut plans {
            Self::resolve_collisions(plan);
        }
        plans
    }

    /// Keeps one artifact per target path, preferring official over untagged over fan.
    fn resolve_collisions(plan: &mut GroupPlan) {
        let mut winners: HashMap<PathBuf, usize> = HashMap::new();
        let mut losers: Vec<usize> = Vec::new();

        for (i, artifact) in plan.artifacts.iter().enumerate() {
            match winners.get(&artifact.target_path).copied() {
                None => {
                    winners.insert(artifact.target_path.clone(), i);
                }
                Some(current) => {
                    let current_rank = provenance_rank(&plan.artifacts[current].classification);
                    if provenance_rank(&artifact.classification) < current_rank {
                        winners.insert(artifact.target_path.clone(), i);
                        losers.push(current);
                    } else {
                        losers.push(i);
                    }
                }
            }
        }

        if losers.is_empty() {
            return;
        }

        let winner_sources: HashMap<PathBuf, PathBuf> = winners
            .iter()
            .map(|(target, &i)| (target.clone(), plan.artifacts[i].source.path.clone()))
            .collect();

        let artifacts = std::mem::take(&mut plan.artifacts);
        for (i, artifact) in artifacts.into_iter().enumerate() {
            if !losers.contains(&i) {
                plan.artifacts.push(artifact);
                continue;
            }
            let winner = winner_sources
                .get(&artifact.target_path)
                .cloned()
                .unwrap_or_default();
            log::warn!(
                "{:?} maps to {:?} like {:?}; skipping it",
                artifact.source.path,
                artifact.target_path,
                winner
            );
            plan.suppressed.push(SuppressedFile {
                reason: SuppressionReason::ShadowedBy(winner),
                target_path: artifact.target_path.clone(),
                source: artifact.source,
            });
        }
    }
}
