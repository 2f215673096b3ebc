//! Metadata tag extraction from streamed model text.
//!
//! The model is instructed to embed `ALERTE:`, `Crowding:`, `Cost:` and
//! `Access:` tags in its prose. Extraction tokenizes the cumulative text on
//! tag boundaries, then parses each token's value. When a tag occurs more
//! than once, the last valid occurrence wins.

use std::sync::LazyLock;

use londonway_core::types::{AccessibilityLevel, CrowdingLevel};
use regex::Regex;
use serde::Serialize;

// =============================================================================
// Compiled patterns
// =============================================================================

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(ALERTE|Crowding|Cost|Access):").expect("Invalid tag regex"));

/// A tag and the rest of its line.
static TAG_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:ALERTE|Crowding|Cost|Access):[^\r\n]*").expect("Invalid tag line regex"));

const CROWDING_VALUES: &[(&str, CrowdingLevel)] = &[
    ("Low", CrowdingLevel::Low),
    ("Moderate", CrowdingLevel::Moderate),
    ("High", CrowdingLevel::High),
    // Synonym accepted from the model; there is no separate badge for it.
    ("Busy", CrowdingLevel::High),
];

const ACCESS_VALUES: &[(&str, AccessibilityLevel)] = &[
    ("Step-free", AccessibilityLevel::StepFree),
    ("Partial", AccessibilityLevel::Partial),
    ("Complex", AccessibilityLevel::Complex),
];

// =============================================================================
// Tokens
// =============================================================================

/// The four recognised metadata tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
    Alert,
    Crowding,
    Cost,
    Access,
}

impl TagKind {
    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("ALERTE") {
            Some(TagKind::Alert)
        } else if name.eq_ignore_ascii_case("Crowding") {
            Some(TagKind::Crowding)
        } else if name.eq_ignore_ascii_case("Cost") {
            Some(TagKind::Cost)
        } else if name.eq_ignore_ascii_case("Access") {
            Some(TagKind::Access)
        } else {
            None
        }
    }
}

/// One tag occurrence. `value` runs from just after the colon up to the
/// next tag or the end of the text, unparsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagToken<'a> {
    pub kind: TagKind,
    pub value: &'a str,
}

/// Split `text` into tag tokens in order of appearance.
pub fn tokenize(text: &str) -> Vec<TagToken<'_>> {
    let matches: Vec<_> = TAG_RE.captures_iter(text).collect();
    let mut tokens = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // Unicode case folding lets `Coſt:` through the regex.
        let Some(kind) = TagKind::from_name(name.as_str()) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        tokens.push(TagToken {
            kind,
            value: &text[whole.end()..end],
        });
    }

    tokens
}

// =============================================================================
// Extraction
// =============================================================================

/// Structured fields extracted from model text. Absent fields were not found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedMetadata {
    pub crowding: Option<CrowdingLevel>,
    pub alert: Option<String>,
    pub cost: Option<String>,
    pub access: Option<AccessibilityLevel>,
}

impl ExtractedMetadata {
    pub fn is_empty(&self) -> bool {
        self.crowding.is_none()
            && self.alert.is_none()
            && self.cost.is_none()
            && self.access.is_none()
    }
}

/// Extract metadata from the full text received so far.
///
/// Pure and total: unmatched or incomplete tags (e.g. `Crowding: Lo`
/// mid-stream) simply yield no value.
pub fn extract(text: &str) -> ExtractedMetadata {
    let mut meta = ExtractedMetadata::default();

    for token in tokenize(text) {
        match token.kind {
            TagKind::Crowding => {
                if let Some(level) = parse_keyword(token.value, CROWDING_VALUES) {
                    meta.crowding = Some(level);
                }
            }
            TagKind::Access => {
                if let Some(level) = parse_keyword(token.value, ACCESS_VALUES) {
                    meta.access = Some(level);
                }
            }
            TagKind::Alert => {
                if let Some(text) = parse_line(token.value) {
                    meta.alert = Some(text);
                }
            }
            TagKind::Cost => {
                if let Some(text) = parse_line(token.value) {
                    meta.cost = Some(text);
                }
            }
        }
    }

    meta
}

/// The last disruption alert whose value can no longer grow: its line has
/// ended or another tag follows it. Mid-stream this lags [`extract`], which
/// also reports the alert still being written.
pub fn settled_alert(text: &str) -> Option<String> {
    let tokens = tokenize(text);
    let last = tokens.len().saturating_sub(1);
    tokens
        .iter()
        .enumerate()
        .filter(|(i, token)| {
            token.kind == TagKind::Alert
                && (*i < last || token.value.trim_start().contains(['\n', '\r']))
        })
        .filter_map(|(_, token)| parse_line(token.value))
        .last()
}

/// Remove every tag and the remainder of its line, for display.
pub fn strip_metadata(text: &str) -> String {
    TAG_LINE_RE.replace_all(text, "").trim().to_string()
}

/// Match the start of `value` (after whitespace) against a keyword table,
/// ignoring ASCII case.
fn parse_keyword<T: Copy>(value: &str, table: &[(&str, T)]) -> Option<T> {
    let value = value.trim_start();
    table.iter().find_map(|(keyword, level)| {
        value
            .get(..keyword.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(keyword))
            .map(|_| *level)
    })
}

/// First line of `value` after leading whitespace, trimmed. Empty is `None`.
fn parse_line(value: &str) -> Option<String> {
    let value = value.trim_start();
    let line = value
        .split(|c: char| c == '\n' || c == '\r')
        .next()
        .unwrap_or_default()
        .trim();
    (!line.is_empty()).then(|| line.to_string())
}
