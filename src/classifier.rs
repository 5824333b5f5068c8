//! Folder-name classification.
//!
//! Turns the folders between a series folder and an ebook file into a set of
//! [`ClassificationTag`]s and an optional [`SeriesPart`]. Everything here is a
//! pure function of path strings; no I/O happens.
//!
//! Matching rules:
//! - every folder below the series folder is matched case-insensitively
//!   against a fixed vocabulary ("Light Novels", "Side Story", "Fan Translation", ...);
//! - a folder matching two vocabulary terms is ambiguous and the file is skipped;
//! - a folder containing "official" anywhere marks the file as an official
//!   translation and overrides any fan translation marker;
//! - a folder named "2", "Year 2" or "Part 2" sets the series part;
//! - anything else is transparent.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::types::{
    Classification, ClassificationTag, Number, SeriesPart, SeriesPartKind, SourceFile, TagSet,
};
use crate::volume::identify_volume;

lazy_static! {
    /// Vocabulary patterns. Words may be separated by spaces, dots, dashes,
    /// underscores or nothing at all.
    static ref VOCABULARY: Vec<(ClassificationTag, Regex)> = vec![
        (ClassificationTag::LightNovel, Regex::new(r"(?i)\blight[\s._-]*novels?\b").unwrap()),
        (ClassificationTag::WebNovel, Regex::new(r"(?i)\bweb[\s._-]*novels?\b").unwrap()),
        (ClassificationTag::ShortStory, Regex::new(r"(?i)\bshort[\s._-]*stor(?:y|ies)\b").unwrap()),
        (ClassificationTag::SideStory, Regex::new(r"(?i)\bside[\s._-]*stor(?:y|ies)\b").unwrap()),
        (ClassificationTag::SpinOffSeries, Regex::new(r"(?i)\bspin[\s._-]*off[\s._-]*series\b").unwrap()),
        (ClassificationTag::FanTranslation, Regex::new(r"(?i)\bfan[\s._-]*translat(?:ions?|ed)\b").unwrap()),
        (ClassificationTag::OfficialTranslation, Regex::new(r"(?i)\bofficial[\s._-]*translat(?:ions?|ed)\b").unwrap()),
    ];
    /// A folder that is nothing but a number, e.g. "2".
    static ref NUMBER_SEGMENT_REGEX: Regex = Regex::new(r"^\s*(\d+)\s*$").unwrap();
    /// "Year 2", "year-02"
    pub static ref YEAR_REGEX: Regex = Regex::new(r"(?i)\byear[\s._-]*(\d+)\b").unwrap();
    /// "Part 2", "Pt.2"
    pub static ref PART_REGEX: Regex = Regex::new(r"(?i)\b(?:part|pt)[\s._-]*(\d+)\b").unwrap();
}

/// Result of classifying the folder part of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassification {
    pub series_name: String,
    pub tags: TagSet,
    pub series_part: Option<SeriesPart>,
}

/// Classifies a file from its series folder and the folders below it.
///
/// # Arguments
///
/// * `series_folder` - Name of the top-level folder under the source root
/// * `directories` - Folders between the series folder and the file, root-to-leaf
///
/// # Returns
///
/// * `Ok(PathClassification)` - Series name, tags in encounter order, series part
/// * `Err(Error::ClassificationAmbiguity)` - A folder matched more than one term
pub fn classify_path(series_folder: &str, directories: &[String]) -> Result<PathClassification> {
    let series_name = series_folder.trim();
    if series_name.is_empty() {
        return Err(Error::Other(format!(
            "Series folder name '{}' is empty",
            series_folder
        )));
    }

    let mut tags = TagSet::new();
    let mut series_part = None;

    for segment in directories {
        for tag in classify_segment(segment)? {
            tags.insert(tag);
        }
        if let Some(part) = series_part_from_segment(segment) {
            // Deepest folder wins
            series_part = Some(part);
        }
    }

    if tags.contains(ClassificationTag::OfficialTranslation) {
        tags.remove(ClassificationTag::FanTranslation);
    }

    Ok(PathClassification {
        series_name: series_name.to_string(),
        tags,
        series_part,
    })
}

/// Returns the tags a single folder name contributes.
///
/// At most one vocabulary term may match, not counting translation status when
/// the folder also says "official" (that substring decides provenance on its own).
pub fn classify_segment(segment: &str) -> Result<Vec<ClassificationTag>> {
    let is_official = segment.to_lowercase().contains("official");

    let matches: Vec<ClassificationTag> = VOCABULARY
        .iter()
        .filter(|(tag, regex)| {
            regex.is_match(segment) && !(is_official && tag.is_translation_status())
        })
        .map(|(tag, _)| *tag)
        .collect();

    if matches.len() > 1 {
        return Err(Error::ClassificationAmbiguity {
            segment: segment.to_string(),
            matches,
        });
    }

    let mut tags = matches;
    if is_official {
        tags.push(ClassificationTag::OfficialTranslation);
    }
    Ok(tags)
}

/// Recognizes "2", "Year 2" and "Part 2" folder names.
pub fn series_part_from_segment(segment: &str) -> Option<SeriesPart> {
    if let Some(caps) = NUMBER_SEGMENT_REGEX.captures(segment) {
        return Number::parse(caps.get(1)?.as_str())
            .map(|n| SeriesPart::new(SeriesPartKind::Number, n));
    }
    if let Some(caps) = YEAR_REGEX.captures(segment) {
        return Number::parse(caps.get(1)?.as_str())
            .map(|n| SeriesPart::new(SeriesPartKind::Year, n));
    }
    PART_REGEX
        .captures(segment)
        .and_then(|caps| Number::parse(caps.get(1)?.as_str()))
        .map(|n| SeriesPart::new(SeriesPartKind::Part, n))
}

/// Classifies a discovered file from both its folders and its filename.
///
/// A series part found in the filename (before the volume token) overrides one
/// found in the folders. A missing volume number is not an error here; the
/// caller decides what to do with it.
pub fn classify(file: &SourceFile) -> Result<Classification> {
    let path = classify_path(file.series_folder(), file.directories())?;
    let volume = identify_volume(file.stem(), &path.series_name);

    Ok(Classification {
        series_part: volume.series_part.or(path.series_part),
        series_name: path.series_name,
        tags: path.tags,
        volume: volume.volume,
        volume_sub_part: volume.sub_part,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClassificationTag::*;

    fn dirs(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_series_has_no_tags() {
        let result = classify_path("  Mushoku Tensei ", &dirs(&["Extras", "misc"])).unwrap();
        assert_eq!(result.series_name, "Mushoku Tensei");
        assert!(result.tags.is_empty());
        assert_eq!(result.series_part, None);
    }

    #[test]
    fn test_vocabulary_variants() {
        assert_eq!(classify_segment("Light Novels").unwrap(), vec![LightNovel]);
        assert_eq!(classify_segment("web-novel").unwrap(), vec![WebNovel]);
        assert_eq!(classify_segment("Short Stories").unwrap(), vec![ShortStory]);
        assert_eq!(classify_segment("SIDE STORY").unwrap(), vec![SideStory]);
        assert_eq!(
            classify_segment("Spin-off Series").unwrap(),
            vec![SpinOffSeries]
        );
        assert_eq!(
            classify_segment("Fan Translations").unwrap(),
            vec![FanTranslation]
        );
        assert_eq!(
            classify_segment("Official Translation").unwrap(),
            vec![OfficialTranslation]
        );
    }

    #[test]
    fn test_bare_spinoff_folder_is_transparent() {
        assert!(classify_segment("Spinoff").unwrap().is_empty());
        assert!(classify_segment("spin-off").unwrap().is_empty());
    }

    #[test]
    fn test_segment_matching_two_terms_is_ambiguous() {
        let err = classify_segment("Light Novel Side Stories").unwrap_err();
        match err {
            Error::ClassificationAmbiguity { segment, matches } => {
                assert_eq!(segment, "Light Novel Side Stories");
                assert_eq!(matches, vec![LightNovel, SideStory]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(classify_path("A", &dirs(&["Web Novel Short Story"])).is_err());
    }

    #[test]
    fn test_official_substring_wins_over_fan() {
        assert_eq!(
            classify_segment("Official (J-Novel Club)").unwrap(),
            vec![OfficialTranslation]
        );
        assert_eq!(
            classify_segment("Official Fan Translation").unwrap(),
            vec![OfficialTranslation]
        );
        assert_eq!(
            classify_segment("Official Light Novels").unwrap(),
            vec![LightNovel, OfficialTranslation]
        );

        let result = classify_path("A", &dirs(&["Fan Translation", "officially licensed"])).unwrap();
        assert_eq!(result.tags, TagSet::from_iter([OfficialTranslation]));
    }

    #[test]
    fn test_tags_keep_encounter_order() {
        let result = classify_path("A", &dirs(&["Side Stories", "Fan Translation"])).unwrap();
        let tags: Vec<_> = result.tags.iter().copied().collect();
        assert_eq!(tags, vec![SideStory, FanTranslation]);
    }

    #[test]
    fn test_series_part_folders() {
        let result = classify_path("Classroom", &dirs(&["Year 2"])).unwrap();
        assert_eq!(
            result.series_part,
            Some(SeriesPart::new(SeriesPartKind::Year, Number::new(2)))
        );

        let result = classify_path("Classroom", &dirs(&["Light Novel", "03"])).unwrap();
        let part = result.series_part.unwrap();
        assert_eq!(part.kind, SeriesPartKind::Number);
        assert_eq!(part.number.value, 3);
        assert_eq!(result.tags, TagSet::from_iter([LightNovel]));

        let result = classify_path("A", &dirs(&["Year 1", "Part 2"])).unwrap();
        assert_eq!(result.series_part.unwrap().kind, SeriesPartKind::Part);
    }

    #[test]
    fn test_empty_series_name_is_rejected() {
        assert!(classify_path("   ", &[]).is_err());
    }
}
