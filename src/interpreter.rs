//! Turns a free-text assistant reply into exactly four field values.
//!
//! Two strategies, in order:
//! 1. exactly four `"quoted"` substrings, returned verbatim;
//! 2. the first four non-blank trimmed lines, padded with [`MISSING_SENTINEL`].
//!
//! [`interpret`] never fails and has no side effects.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Number of target fields a reply fills.
pub const FIELD_COUNT: usize = 4;
/// Placeholder for a value the assistant could not determine.
pub const MISSING_SENTINEL: &str = "N/A";
/// Marker the assistant appends to values derived from assumptions.
pub const ASSUMED_TAG: &str = "(AS)";

fn quoted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // non-greedy and `.` stops at newlines, so a quote never pairs across lines
    PATTERN.get_or_init(|| Regex::new(r#""(.*?)""#).expect("quoted-field pattern is valid"))
}

/// Which of the two parsing strategies produced a [`ParsedReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exactly four double-quoted substrings.
    Quoted,
    /// First four non-blank lines, padded with the sentinel.
    Lines,
}

/// The four parsed values in target-column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    fields: [String; FIELD_COUNT],
    strategy: Strategy,
}

impl ParsedReply {
    /// Values in target-column order.
    pub fn fields(&self) -> &[String; FIELD_COUNT] {
        &self.fields
    }

    /// Strategy that produced the values.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn into_fields(self) -> [String; FIELD_COUNT] {
        self.fields
    }

    /// Classification of each value, same order as [`ParsedReply::fields`].
    pub fn kinds(&self) -> [FieldKind; FIELD_COUNT] {
        [
            FieldKind::classify(&self.fields[0]),
            FieldKind::classify(&self.fields[1]),
            FieldKind::classify(&self.fields[2]),
            FieldKind::classify(&self.fields[3]),
        ]
    }
}

/// Informational classification of a parsed value. Never changes what is
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Determined,
    Assumed,
    Missing,
}

impl FieldKind {
    pub fn classify(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case(MISSING_SENTINEL) {
            FieldKind::Missing
        } else if value.to_ascii_uppercase().contains(ASSUMED_TAG) {
            FieldKind::Assumed
        } else {
            FieldKind::Determined
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::Determined => "determined",
            FieldKind::Assumed => "assumed",
            FieldKind::Missing => "missing",
        };
        f.write_str(label)
    }
}

/// Parses one reply into four values. Never fails: unusable input yields
/// [`MISSING_SENTINEL`] in every slot.
pub fn interpret(reply: &str) -> ParsedReply {
    if let Some(fields) = quoted_fields(reply) {
        return ParsedReply {
            fields,
            strategy: Strategy::Quoted,
        };
    }
    ParsedReply {
        fields: line_fields(reply),
        strategy: Strategy::Lines,
    }
}

/// Succeeds only when the reply holds exactly four quoted substrings.
fn quoted_fields(reply: &str) -> Option<[String; FIELD_COUNT]> {
    let matches: Vec<&str> = quoted_pattern()
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if matches.len() != FIELD_COUNT {
        return None;
    }
    Some([
        matches[0].to_string(),
        matches[1].to_string(),
        matches[2].to_string(),
        matches[3].to_string(),
    ])
}

/// Every character treated as a line boundary, including a lone `\r`, form
/// feeds, the ASCII separators and the Unicode line/paragraph separators.
const LINE_BREAKS: [char; 10] = [
    '\n', '\r', '\u{0b}', '\u{0c}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{85}', '\u{2028}', '\u{2029}',
];

/// First four non-blank trimmed lines; extra lines are dropped, missing ones
/// become the sentinel.
fn line_fields(reply: &str) -> [String; FIELD_COUNT] {
    // `\r\n` yields an empty piece between the two breaks, dropped by the filter
    let mut lines = reply.split(LINE_BREAKS).map(str::trim).filter(|l| !l.is_empty());
    let mut next = || lines.next().unwrap_or(MISSING_SENTINEL).to_string();
    [next(), next(), next(), next()]
}
