//! Volume number extraction from ebook filenames.
//!
//! Filenames in the wild look like `Overlord - v03`, `Overlord Vol. 3.5`,
//! `Classroom of the Elite Year 2 - LN 04` or just `Overlord - 03`. The
//! identifier looks for the rightmost number preceded by a volume marker,
//! then for a side-story marker ("SS 2", "Extra 1"), falling back to a
//! trailing `- NN` and finally to any standalone number.
//!
//! The series name is never searched: matching starts after its last
//! whole-word occurrence in the filename (or after the first ` - ` when it is
//! absent), so series like "86" or "The 100" are not mistaken for a volume.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::classifier::{PART_REGEX, YEAR_REGEX};
use crate::types::{Number, SeriesPart, SeriesPartKind};

lazy_static! {
    /// Volume marker followed by the volume number and an optional `.N` sub-part.
    /// Matches "v01", "Vol. 3", "Volume 12", "LN 4", "#7".
    pub static ref VOLUME_MARKER_REGEX: Regex = Regex::new(
        r"(?i)(?:^|[^a-z0-9])(?:volume|vol|v|ln|#)[\s._-]*(\d+)(?:\.(\d+))?"
    )
    .unwrap();
    /// Side-story numbering, only used when no volume marker is present.
    /// Matches "SS 2", "Extra 1", "Special 3".
    pub static ref SIDE_STORY_MARKER_REGEX: Regex = Regex::new(
        r"(?i)(?:^|[^a-z0-9])(?:ss|extra|special)[\s._-]*(\d+)(?:\.(\d+))?"
    )
    .unwrap();
    /// Bare "- 03" at the end of the name.
    static ref BARE_SUFFIX_REGEX: Regex = Regex::new(r"-\s*(\d+)(?:\.(\d+))?\s*$").unwrap();
    /// Any standalone number, last resort.
    static ref STANDALONE_NUMBER_REGEX: Regex = Regex::new(r"\b(\d+)(?:\.(\d+))?\b").unwrap();
}

/// Result of scanning a filename.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume: Option<Number>,
    /// Only set together with `volume`.
    pub sub_part: Option<Number>,
    /// A "Year N" / "Part N" token appearing before the volume token.
    pub series_part: Option<SeriesPart>,
}

/// Extracts the volume number, sub-part and filename-level series part.
///
/// # Arguments
///
/// * `stem` - Filename without its extension
/// * `series_name` - The series the file belongs to, excluded from matching
///
/// # Returns
///
/// * `VolumeInfo` - `volume` is `None` when no number could be found
pub fn identify_volume(stem: &str, series_name: &str) -> VolumeInfo {
    let spans = series_name_spans(stem, series_name);
    let window = anchored_window(stem, &spans);
    if let Some(info) = scan_markers(window) {
        return info;
    }

    // A marker outside the window ("v07 Overlord", or text after a partial
    // title) beats any loose number inside it.
    let anchored = window.len() != stem.len();
    let stripped = strip_series_name(stem, &spans);
    if anchored {
        if let Some(info) = scan_markers(&stripped) {
            return info;
        }
    }

    let info = scan_loose(window);
    if info.volume.is_some() || !anchored {
        return info;
    }
    let fallback = scan_loose(&stripped);
    if fallback.volume.is_some() {
        fallback
    } else {
        info
    }
}

/// The part of `stem` that may contain the volume number.
fn anchored_window<'a>(stem: &'a str, spans: &[(usize, usize)]) -> &'a str {
    if let Some(&(_, end)) = spans.last() {
        return &stem[end..];
    }
    match stem.find(" - ") {
        Some(idx) => &stem[idx + 3..],
        None => stem,
    }
}

fn series_name_regex(series_name: &str) -> Option<Regex> {
    let trimmed = series_name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Regex::new(&format!("(?i){}", regex::escape(trimmed))).ok()
}

/// Byte ranges of whole-word occurrences of the series name.
///
/// "Ai" matches in "Ai - v02" but not inside "Aiko".
fn series_name_spans(stem: &str, series_name: &str) -> Vec<(usize, usize)> {
    let Some(re) = series_name_regex(series_name) else {
        return Vec::new();
    };
    let trimmed = series_name.trim();
    let bounded_start = trimmed.chars().next().is_some_and(char::is_alphanumeric);
    let bounded_end = trimmed.chars().next_back().is_some_and(char::is_alphanumeric);

    let mut spans = Vec::new();
    let mut at = 0;
    while let Some(m) = re.find_at(stem, at) {
        let starts_word = !bounded_start
            || !stem[..m.start()]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric);
        let ends_word = !bounded_end
            || !stem[m.end()..]
                .chars()
                .next()
                .is_some_and(char::is_alphanumeric);
        if starts_word && ends_word {
            spans.push((m.start(), m.end()));
            at = m.end();
        } else {
            at = m.start() + stem[m.start()..].chars().next().map_or(1, char::len_utf8);
        }
    }
    spans
}

fn strip_series_name(stem: &str, spans: &[(usize, usize)]) -> String {
    let mut stripped = String::with_capacity(stem.len());
    let mut last = 0;
    for &(start, end) in spans {
        stripped.push_str(&stem[last..start]);
        stripped.push(' ');
        last = end;
    }
    stripped.push_str(&stem[last..]);
    stripped
}

fn parse_group(caps: &Captures, index: usize) -> Option<Number> {
    caps.get(index).and_then(|m| Number::parse(m.as_str()))
}

/// Finds the series-part token that starts before `limit`, preferring "Year".
fn series_part_before(text: &str, limit: usize) -> Option<SeriesPart> {
    let year = YEAR_REGEX
        .captures_iter(text)
        .filter(|c| c.get(0).is_some_and(|m| m.start() < limit))
        .last()
        .and_then(|c| parse_group(&c, 1))
        .map(|n| SeriesPart::new(SeriesPartKind::Year, n));
    year.or_else(|| {
        PART_REGEX
            .captures_iter(text)
            .filter(|c| c.get(0).is_some_and(|m| m.start() < limit))
            .last()
            .and_then(|c| parse_group(&c, 1))
            .map(|n| SeriesPart::new(SeriesPartKind::Part, n))
    })
}

/// Rightmost volume marker, or the rightmost side-story marker when there is none.
fn scan_markers(text: &str) -> Option<VolumeInfo> {
    let caps = VOLUME_MARKER_REGEX
        .captures_iter(text)
        .last()
        .or_else(|| SIDE_STORY_MARKER_REGEX.captures_iter(text).last())?;
    let whole = caps.get(0)?;
    let volume = parse_group(&caps, 1)?;
    // "v01.5" or "v01 Part 2"
    let sub_part = parse_group(&caps, 2).or_else(|| {
        PART_REGEX
            .captures(&text[whole.end()..])
            .and_then(|c| parse_group(&c, 1))
    });
    Some(VolumeInfo {
        volume: Some(volume),
        sub_part,
        series_part: series_part_before(text, whole.start()),
    })
}

/// Trailing "- NN", then any standalone number outside a "Year N" / "Part N" token.
fn scan_loose(text: &str) -> VolumeInfo {
    if let Some(caps) = BARE_SUFFIX_REGEX.captures(text) {
        if let (Some(whole), Some(volume)) = (caps.get(0), parse_group(&caps, 1)) {
            return VolumeInfo {
                volume: Some(volume),
                sub_part: parse_group(&caps, 2),
                series_part: series_part_before(text, whole.start()),
            };
        }
    }

    // Numbers belonging to a "Year N" / "Part N" token are not volumes.
    let reserved: Vec<(usize, usize)> = YEAR_REGEX
        .find_iter(text)
        .chain(PART_REGEX.find_iter(text))
        .map(|m| (m.start(), m.end()))
        .collect();

    let standalone = STANDALONE_NUMBER_REGEX
        .captures_iter(text)
        .filter(|c| {
            c.get(0).is_some_and(|m| {
                !reserved
                    .iter()
                    .any(|&(start, end)| m.start() < end && start < m.end())
            })
        })
        .last();

    match standalone {
        Some(caps) => {
            let start = caps.get(0).map_or(0, |m| m.start());
            VolumeInfo {
                volume: parse_group(&caps, 1),
                sub_part: parse_group(&caps, 2),
                series_part: series_part_before(text, start),
            }
        }
        None => VolumeInfo {
            volume: None,
            sub_part: None,
            series_part: series_part_before(text, text.len()),
        },
    }
}
