// BookForge - Audiobook Library Organizer
// Copyright (C) 2025 BookForge Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Naming templates and path sanitization
//!
//! Templates use placeholders: `{Author}/{Title}/{DiscPad}{TrackPad} - {TrackTitle}`.
//! A template may contain `/` to produce nested directories. Numeric tokens
//! are zero-padded to a width computed from the set being planned, never from
//! a global constant.
//!
//! Rendered names are sanitized for filesystem compatibility: forbidden
//! characters are replaced with fullwidth lookalikes, reserved device names
//! are prefixed, and overlong components are truncated at UTF-8 boundaries.

use std::collections::HashMap;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::PlanError;
use crate::model::{AudiobookSet, Track};

/// Maximum bytes per path component on common filesystems
const MAX_COMPONENT_LENGTH: usize = 255;

/// Every token a template may reference
pub const KNOWN_TOKENS: &[&str] = &[
    "Author",
    "AuthorLastFirst",
    "Title",
    "ShortTitle",
    "SeriesName",
    "SeriesIndex",
    "Year",
    "Narrator",
    "Language",
    "ISBN",
    "Disc",
    "DiscPad",
    "Track",
    "TrackPad",
    "TrackTitle",
];

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(r"\{([A-Za-z]+)\}").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// How rendered token values are cased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CasePolicy {
    /// Leave values exactly as the metadata supplied them
    #[default]
    AsIs,
    /// Smart title case: minor words stay lowercase except at the start
    TitleCase,
    Lower,
    Upper,
}

/// A parsed, validated naming template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    tokens: Vec<String>,
}

impl Template {
    /// Parse and validate template text.
    ///
    /// Rejects unmatched braces and tokens outside [`KNOWN_TOKENS`].
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        let open = raw.matches('{').count();
        let close = raw.matches('}').count();
        if open != close {
            return Err(PlanError::InvalidTemplate(
                "unmatched braces in template".to_string(),
            ));
        }

        let tokens: Vec<String> = TOKEN_REGEX
            .captures_iter(raw)
            .map(|c| c[1].to_string())
            .collect();

        for token in &tokens {
            if !KNOWN_TOKENS.contains(&token.as_str()) {
                return Err(PlanError::InvalidTemplate(format!(
                    "unknown token: {{{token}}}"
                )));
            }
        }

        // Any brace left over after removing recognized tokens is malformed
        let stripped = TOKEN_REGEX.replace_all(raw, "");
        if stripped.contains('{') || stripped.contains('}') {
            return Err(PlanError::InvalidTemplate(
                "malformed token braces in template".to_string(),
            ));
        }

        if tokens.is_empty() {
            return Err(PlanError::InvalidTemplate(
                "template contains no tokens".to_string(),
            ));
        }

        Ok(Self {
            raw: raw.to_string(),
            tokens,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Render this template against one track's token values.
    ///
    /// Tokens with no value fall back to `defaults`; a token missing from
    /// both aborts with [`PlanError::UnresolvedToken`]. The result is a
    /// relative path: cleaned, sanitized, one component per `/` in the
    /// template.
    pub(crate) fn render(
        &self,
        values: &TokenValues,
        defaults: &HashMap<String, String>,
        case_policy: CasePolicy,
        context: &Path,
    ) -> Result<String, PlanError> {
        let mut result = self.raw.clone();

        for token in &self.tokens {
            let value = match values.get(token) {
                Some(Some(v)) => apply_case_policy(v, case_policy),
                _ => match defaults.get(token) {
                    Some(v) => v.clone(),
                    None => {
                        return Err(PlanError::UnresolvedToken {
                            token: token.clone(),
                            path: context.to_path_buf(),
                        })
                    }
                },
            };
            result = result.replace(&format!("{{{token}}}"), &value);
        }

        let components: Vec<String> = result
            .split('/')
            .map(clean_segment)
            .filter(|s| !s.is_empty())
            .map(|s| truncate_component(&sanitize_component(&s), MAX_COMPONENT_LENGTH))
            .collect();

        if components.is_empty() {
            return Err(PlanError::UnresolvedToken {
                token: self.tokens[0].clone(),
                path: context.to_path_buf(),
            });
        }

        Ok(components.join("/"))
    }
}

/// Zero-padding widths computed per audiobook set.
///
/// Track width grows with the highest track number observed in the set; a
/// multi-disc set pads tracks to at least two digits so concatenated
/// `{DiscPad}{TrackPad}` names stay unambiguous. Disc width is zero for
/// single-disc sets, which renders the disc tokens empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadWidths {
    pub track: usize,
    pub disc: usize,
}

impl PadWidths {
    pub fn for_set(set: &AudiobookSet) -> Self {
        let mut track = digits(set.max_track_number().max(1));
        let disc = if set.is_multi_disc() {
            track = track.max(2);
            digits(set.max_disc_number())
        } else {
            0
        };
        Self { track, disc }
    }
}

fn digits(n: u32) -> usize {
    n.to_string().len()
}

/// Resolved token values for one track. `None` means the token exists but has
/// no value for this set, which makes it eligible for a configured default.
pub(crate) struct TokenValues(HashMap<&'static str, Option<String>>);

impl TokenValues {
    fn get(&self, token: &str) -> Option<&Option<String>> {
        self.0.get(token)
    }
}

/// Build the token table for one track of a set
pub(crate) fn build_tokens(set: &AudiobookSet, track: &Track, widths: PadWidths) -> TokenValues {
    let mut map: HashMap<&'static str, Option<String>> = HashMap::new();
    let meta = set.metadata.as_ref();

    // Book title from matched metadata, falling back to the track's own
    // inferred title when no identity was chosen.
    let title = meta
        .and_then(|m| m.title.clone())
        .or_else(|| track.title.clone());
    map.insert("Title", title.clone().map(|t| strip_separators(&t)));
    map.insert(
        "ShortTitle",
        title.as_deref().map(|t| strip_separators(&shorten(t, 30))),
    );

    let author = meta.and_then(|m| m.authors.first().cloned());
    map.insert("Author", author.clone().map(|a| strip_separators(&a)));
    map.insert(
        "AuthorLastFirst",
        author
            .as_deref()
            .map(|a| strip_separators(&author_last_first(a))),
    );

    map.insert(
        "Narrator",
        meta.and_then(|m| m.narrator.as_deref().map(strip_separators)),
    );
    map.insert(
        "SeriesName",
        meta.and_then(|m| m.series_name.as_deref().map(strip_separators)),
    );
    map.insert(
        "SeriesIndex",
        meta.and_then(|m| m.series_index.as_deref().map(strip_separators)),
    );
    map.insert("Year", meta.and_then(|m| m.year.map(|y| y.to_string())));
    map.insert(
        "Language",
        meta.and_then(|m| m.language.as_deref().map(strip_separators)),
    );
    map.insert(
        "ISBN",
        meta.and_then(|m| m.isbn.as_deref().map(strip_separators)),
    );

    map.insert("Track", Some(track.number.to_string()));
    map.insert(
        "TrackPad",
        Some(format!("{:0width$}", track.number, width = widths.track)),
    );

    // Disc tokens render empty for single-disc sets
    if widths.disc > 0 {
        map.insert("Disc", Some(track.disc.to_string()));
        map.insert(
            "DiscPad",
            Some(format!("{:0width$}", track.disc, width = widths.disc)),
        );
    } else {
        map.insert("Disc", Some(String::new()));
        map.insert("DiscPad", Some(String::new()));
    }

    map.insert(
        "TrackTitle",
        Some(match &track.title {
            Some(t) => strip_separators(t),
            None => format!("Track {}", track.number),
        }),
    );

    TokenValues(map)
}

/// Replace path separators inside a token value so a title like "AC/DC"
/// cannot introduce an extra directory level.
fn strip_separators(value: &str) -> String {
    value.replace('/', "\u{2215}").replace('\\', "_")
}

/// Collapse whitespace runs and trim separator clutter left by empty tokens
fn clean_segment(segment: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(segment, " ");
    collapsed
        .trim_matches(|c: char| c == ' ' || c == '-' || c == '_')
        .to_string()
}

fn apply_case_policy(text: &str, policy: CasePolicy) -> String {
    match policy {
        CasePolicy::AsIs => text.to_string(),
        CasePolicy::TitleCase => smart_title_case(text),
        CasePolicy::Lower => text.to_lowercase(),
        CasePolicy::Upper => text.to_uppercase(),
    }
}

/// Title case that keeps articles and prepositions lowercase, except at the
/// start of the text.
pub fn smart_title_case(text: &str) -> String {
    const MINOR_WORDS: &[&str] = &[
        "a", "an", "and", "as", "at", "but", "by", "for", "if", "in", "nor", "of", "on", "or",
        "so", "the", "to", "up", "yet",
    ];

    let mut words = text.split_whitespace();
    let first = match words.next() {
        Some(w) => capitalize(w),
        None => return String::new(),
    };

    let mut result = vec![first];
    for word in words {
        if MINOR_WORDS.contains(&word.to_lowercase().as_str()) {
            result.push(word.to_lowercase());
        } else {
            result.push(capitalize(word));
        }
    }
    result.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Format an author name as "Last, First". The last whitespace-separated word
/// is taken as the surname.
pub fn author_last_first(author: &str) -> String {
    let parts: Vec<&str> = author.split_whitespace().collect();
    if parts.len() <= 1 {
        return author.trim().to_string();
    }
    let last = parts[parts.len() - 1];
    let first = parts[..parts.len() - 1].join(" ");
    format!("{last}, {first}")
}

/// Shorten a title at word boundaries
fn shorten(title: &str, max_length: usize) -> String {
    if title.chars().count() <= max_length {
        return title.to_string();
    }

    let mut result = String::new();
    for word in title.split_whitespace() {
        let candidate_len = result.chars().count() + 1 + word.chars().count();
        if !result.is_empty() && candidate_len > max_length {
            break;
        }
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }

    if result.is_empty() {
        title.chars().take(max_length).collect()
    } else {
        result
    }
}

/// Sanitize one path component for filesystem compatibility.
///
/// Forbidden characters become fullwidth lookalikes rather than being dropped,
/// so names stay readable. Trailing dots and surrounding whitespace are
/// trimmed, and reserved device names are prefixed with an underscore.
pub fn sanitize_component(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for c in name.chars() {
        result.push(match c {
            '<' => '\u{FF1C}',
            '>' => '\u{FF1E}',
            ':' => '_',
            '"' => '\u{FF02}',
            '|' => '\u{23D0}',
            '?' => '\u{FF1F}',
            '*' => '\u{2731}',
            '/' => '\u{2215}',
            '\\' => '_',
            '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        });
    }

    let mut result = result.trim().trim_end_matches('.').to_string();
    result = prefix_reserved_name(&result);

    if result.is_empty() {
        result = "untitled".to_string();
    }

    result
}

/// Prefix Windows reserved device names so the name is usable everywhere
fn prefix_reserved_name(name: &str) -> String {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    let upper = name.to_uppercase();
    for reserved in RESERVED {
        if upper == *reserved || upper.starts_with(&format!("{reserved}.")) {
            return format!("_{name}");
        }
    }
    name.to_string()
}

/// Truncate a component to a byte limit at a valid UTF-8 boundary
pub fn truncate_component(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut index = max_bytes;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    text[..index].to_string()
}
