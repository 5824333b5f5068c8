//! Core data types, enums, and reports for the Shoka sync library.
//!
//! This module defines the fundamental data structures used throughout Shoka:
//! - Discovered input (`SourceFile`)
//! - Classification results (`ClassificationTag`, `TagSet`, `SeriesPart`, `Number`, `Classification`)
//! - Planned output (`TargetSeriesKey`, `TargetArtifact`)
//! - Collaborator options (`ConvertOptions`, `SeriesMetadata`)
//! - Per-file outcomes and the end-of-run report (`FileState`, `FileOutcome`, `SyncReport`)

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// Every extension Calibre can turn into an EPUB.
pub const EBOOK_EXTENSIONS: &[&str] = &[
    "epub", "azw4", "azw3", "azw", "chm", "djvu", "docx", "fb2", "htlz", "html", "lit", "lrf",
    "mobi", "odt", "pdb", "pml", "rb", "rtf", "snb", "tcr",
];

/// The format every target artifact is written in.
pub const CANONICAL_EXTENSION: &str = "epub";

/// A folder-derived label describing story type or translation provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ClassificationTag {
    LightNovel,
    WebNovel,
    ShortStory,
    SideStory,
    SpinOffSeries,
    FanTranslation,
    OfficialTranslation,
}

impl ClassificationTag {
    pub const ALL: [ClassificationTag; 7] = [
        ClassificationTag::LightNovel,
        ClassificationTag::WebNovel,
        ClassificationTag::ShortStory,
        ClassificationTag::SideStory,
        ClassificationTag::SpinOffSeries,
        ClassificationTag::FanTranslation,
        ClassificationTag::OfficialTranslation,
    ];

    /// Singular display label, e.g. "Side Story".
    pub fn label(&self) -> &'static str {
        match self {
            ClassificationTag::LightNovel => "Light Novel",
            ClassificationTag::WebNovel => "Web Novel",
            ClassificationTag::ShortStory => "Short Story",
            ClassificationTag::SideStory => "Side Story",
            ClassificationTag::SpinOffSeries => "Spin-off Series",
            ClassificationTag::FanTranslation => "Fan Translation",
            ClassificationTag::OfficialTranslation => "Official Translation",
        }
    }

    /// Label used inside series titles, e.g. "Side Stories".
    pub fn plural_label(&self) -> &'static str {
        match self {
            ClassificationTag::ShortStory => "Short Stories",
            ClassificationTag::SideStory => "Side Stories",
            other => other.label(),
        }
    }

    /// Fan and Official Translation describe provenance, not content.
    pub fn is_translation_status(&self) -> bool {
        matches!(
            self,
            ClassificationTag::FanTranslation | ClassificationTag::OfficialTranslation
        )
    }
}

impl fmt::Display for ClassificationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered, duplicate-free set of classification tags. Keeps encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TagSet(Vec<ClassificationTag>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `tag` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, tag: ClassificationTag) -> bool {
        if self.0.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn remove(&mut self, tag: ClassificationTag) -> bool {
        let before = self.0.len();
        self.0.retain(|t| *t != tag);
        before != self.0.len()
    }

    pub fn contains(&self, tag: ClassificationTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassificationTag> {
        self.0.iter()
    }

    /// The tags with Fan/Official Translation removed, order preserved.
    pub fn without_translation_status(&self) -> TagSet {
        TagSet(
            self.0
                .iter()
                .copied()
                .filter(|t| !t.is_translation_status())
                .collect(),
        )
    }

    /// The translation provenance, if any. Official wins when both are present.
    pub fn translation_status(&self) -> Option<ClassificationTag> {
        if self.contains(ClassificationTag::OfficialTranslation) {
            Some(ClassificationTag::OfficialTranslation)
        } else if self.contains(ClassificationTag::FanTranslation) {
            Some(ClassificationTag::FanTranslation)
        } else {
            None
        }
    }

    /// Plural labels joined by spaces, e.g. "Light Novel Side Stories".
    pub fn title_suffix(&self) -> String {
        self.0
            .iter()
            .map(|t| t.plural_label())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromIterator<ClassificationTag> for TagSet {
    fn from_iter<I: IntoIterator<Item = ClassificationTag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

/// An integer token as it appeared in a name: its value and zero-padded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Number {
    pub value: u32,
    pub width: usize,
}

impl Number {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            width: value.to_string().len(),
        }
    }

    /// Parses an all-digit token, tolerating leading zeros ("007" -> 7, width 3).
    pub fn parse(digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        let value = if trimmed.is_empty() {
            0
        } else {
            trimmed.parse::<u32>().ok()?
        };
        Some(Self {
            value,
            width: digits.len(),
        })
    }

    /// The value formatted back to its original width.
    pub fn padded(&self) -> String {
        format!("{:0width$}", self.value, width = self.width)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// How a series part was named in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SeriesPartKind {
    /// "Year 2"
    Year,
    /// "Part 2" / "Pt 2"
    Part,
    /// A folder named just "2"
    Number,
}

/// A numbered arc of a series, e.g. "Year 2".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SeriesPart {
    pub kind: SeriesPartKind,
    pub number: Number,
}

impl SeriesPart {
    pub fn new(kind: SeriesPartKind, number: Number) -> Self {
        Self { kind, number }
    }

    /// Suffix appended to the series title (" Year 2", " Part 2").
    pub fn title_suffix(&self) -> String {
        match self.kind {
            SeriesPartKind::Year => format!(" Year {}", self.number.value),
            SeriesPartKind::Part | SeriesPartKind::Number => {
                format!(" Part {}", self.number.value)
            }
        }
    }
}

/// One ebook file found under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SourceFile {
    /// Absolute (or source-root-joined) path used for I/O.
    pub path: PathBuf,
    /// Path segments from the source root to the file; the last one is the filename.
    pub segments: Vec<String>,
    pub modified: DateTime<Utc>,
    /// Lowercase extension without the dot.
    pub extension: String,
}

impl SourceFile {
    /// The top-level folder under the source root.
    pub fn series_folder(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// Folders between the series folder and the file.
    pub fn directories(&self) -> &[String] {
        match self.segments.len() {
            0..=2 => &[],
            n => &self.segments[1..n - 1],
        }
    }

    pub fn file_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// The filename without its extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// Segments joined with `/`, used for logging and stable ordering.
    pub fn relative_display(&self) -> String {
        self.segments.join("/")
    }
}

/// Everything derived from a file's path and name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Classification {
    pub series_name: String,
    pub tags: TagSet,
    pub series_part: Option<SeriesPart>,
    pub volume: Option<Number>,
    /// Only meaningful when `volume` is present.
    pub volume_sub_part: Option<Number>,
}

impl Classification {
    /// Key of the output series this file belongs to.
    pub fn target_key(&self) -> TargetSeriesKey {
        TargetSeriesKey {
            series_name: self.series_name.clone(),
            tags: self.tags.without_translation_status(),
        }
    }

    /// Series index as written into metadata: "3" or "3.5".
    pub fn series_index(&self) -> Option<String> {
        let volume = self.volume?;
        Some(match self.volume_sub_part {
            Some(sub) => format!("{}.{}", volume.value, sub.value),
            None => volume.value.to_string(),
        })
    }
}

/// Identifies one output series folder: series name plus story-type tags.
///
/// Translation status never takes part in the key: official and fan copies of
/// the same content land in the same output series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TargetSeriesKey {
    pub series_name: String,
    pub tags: TagSet,
}

impl TargetSeriesKey {
    /// "Series" or "Series Side Stories".
    pub fn series_title(&self) -> String {
        if self.tags.is_empty() {
            self.series_name.clone()
        } else {
            format!("{} {}", self.series_name, self.tags.title_suffix())
        }
    }
}

impl fmt::Display for TargetSeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.series_title())
    }
}

/// One file to be written into the target tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TargetArtifact {
    pub source: SourceFile,
    pub classification: Classification,
    /// Series title including any series-part suffix.
    pub series_title: String,
    pub target_path: PathBuf,
}

impl TargetArtifact {
    pub fn metadata(&self) -> SeriesMetadata {
        SeriesMetadata {
            series: self.series_title.clone(),
            series_index: self.classification.series_index(),
            series_part: self.classification.series_part.map(|p| p.number.value),
        }
    }
}

/// Options forwarded to the external converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConvertOptions {
    pub split_on_page_breaks: bool,
    pub svg_cover: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            split_on_page_breaks: true,
            svg_cover: true,
        }
    }
}

/// Series information written into a produced artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SeriesMetadata {
    /// Full series title, classification and part suffixes included.
    pub series: String,
    pub series_index: Option<String>,
    /// Informational; writers put the part into the file through `series`.
    pub series_part: Option<u32>,
}

/// How a target artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ProduceMethod {
    /// The source already was an EPUB.
    Copied,
    /// The source went through the external converter.
    Converted,
}

/// Terminal state of one discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FileState {
    /// Classification failed (ambiguous folder, no volume token).
    Unclassifiable(String),
    /// Dropped by the translation resolver.
    Suppressed(String),
    /// Target already up to date.
    Current,
    /// Target written. A metadata failure leaves the artifact and a warning.
    Produced {
        method: ProduceMethod,
        metadata_warning: Option<String>,
    },
    /// Conversion or I/O failed; nothing was written.
    Failed(String),
}

impl FileState {
    pub fn is_produced(&self) -> bool {
        matches!(self, FileState::Produced { .. })
    }
}

/// The outcome for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileOutcome {
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub state: FileState,
}

/// Counters aggregated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SyncSummary {
    pub discovered: usize,
    pub unclassifiable: usize,
    pub suppressed: usize,
    pub current: usize,
    pub copied: usize,
    pub converted: usize,
    pub metadata_warnings: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn produced(&self) -> usize {
        self.copied + self.converted
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} discovered, {} produced ({} copied, {} converted), {} current, {} suppressed, {} unclassifiable, {} failed, {} metadata warnings",
            self.discovered,
            self.produced(),
            self.copied,
            self.converted,
            self.current,
            self.suppressed,
            self.unclassifiable,
            self.failed,
            self.metadata_warnings
        )
    }
}

/// Report returned by a sync run.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SyncReport {
    /// Outcomes ordered by source path.
    pub outcomes: Vec<FileOutcome>,
    /// Set when the run was interrupted; files not yet started have no outcome.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary {
            discovered: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            match &outcome.state {
                FileState::Unclassifiable(_) => summary.unclassifiable += 1,
                FileState::Suppressed(_) => summary.suppressed += 1,
                FileState::Current => summary.current += 1,
                FileState::Produced {
                    method,
                    metadata_warning,
                } => {
                    match method {
                        ProduceMethod::Copied => summary.copied += 1,
                        ProduceMethod::Converted => summary.converted += 1,
                    }
                    if metadata_warning.is_some() {
                        summary.metadata_warnings += 1;
                    }
                }
                FileState::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// The outcome recorded for a given source path.
    pub fn outcome_for(&self, source: &std::path::Path) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_parse_keeps_width() {
        let n = Number::parse("007").unwrap();
        assert_eq!(n.value, 7);
        assert_eq!(n.width, 3);
        assert_eq!(n.padded(), "007");
        assert_eq!(Number::parse("0").unwrap().value, 0);
        assert!(Number::parse("1a").is_none());
        assert!(Number::parse("").is_none());
    }

    #[test]
    fn test_tag_set_keeps_encounter_order() {
        let mut tags = TagSet::new();
        assert!(tags.insert(ClassificationTag::SideStory));
        assert!(tags.insert(ClassificationTag::FanTranslation));
        assert!(!tags.insert(ClassificationTag::SideStory));
        assert_eq!(tags.len(), 2);
        assert_eq!(
            tags.without_translation_status(),
            TagSet::from_iter([ClassificationTag::SideStory])
        );
        assert_eq!(
            tags.translation_status(),
            Some(ClassificationTag::FanTranslation)
        );
    }

    #[test]
    fn test_series_title_uses_plural_labels() {
        let key = TargetSeriesKey {
            series_name: "Overlord".to_string(),
            tags: TagSet::from_iter([
                ClassificationTag::LightNovel,
                ClassificationTag::SideStory,
            ]),
        };
        assert_eq!(key.series_title(), "Overlord Light Novel Side Stories");
    }

    #[test]
    fn test_source_file_segments() {
        let file = SourceFile {
            path: PathBuf::from("/src/A/Side Story/A - v01.epub"),
            segments: vec![
                "A".to_string(),
                "Side Story".to_string(),
                "A - v01.epub".to_string(),
            ],
            modified: Utc::now(),
            extension: "epub".to_string(),
        };
        assert_eq!(file.series_folder(), "A");
        assert_eq!(file.directories(), &["Side Story".to_string()]);
        assert_eq!(file.stem(), "A - v01");
    }
}
