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


//! Audiobook set model
//!
//! Pure data describing one logical audiobook as discovered by the scanning
//! collaborator. The engine treats these as read-only input: a set is created
//! at scan time and discarded once a plan has been produced.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// One physical audio file. Immutable for a given scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Current location on disk
    pub path: PathBuf,
    /// Disc this track belongs to (1 for single-disc books)
    pub disc: u32,
    /// Track number within its disc
    pub number: u32,
    /// Title inferred from tags or the filename, if any
    pub title: Option<String>,
    /// File size in bytes
    pub size: u64,
    /// Last modification time, if known
    pub modified: Option<DateTime<Utc>>,
}

impl Track {
    /// File extension of the source file, without the leading dot
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// An ordered run of tracks belonging to one disc
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disc {
    pub number: u32,
    /// Tracks in playback order
    pub tracks: Vec<Track>,
}

/// Metadata chosen by the matching collaborator for a set.
///
/// Owned by the matcher; the engine only reads it to resolve template tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub narrator: Option<String>,
    pub series_name: Option<String>,
    pub series_index: Option<String>,
    pub year: Option<i32>,
    pub language: Option<String>,
    pub isbn: Option<String>,
}

/// One logical audiobook: an ordered collection of discs and tracks
/// rooted at a single directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudiobookSet {
    /// Directory the set was discovered under
    pub root: PathBuf,
    /// Discs in ascending disc-number order
    pub discs: Vec<Disc>,
    /// Matched metadata, if the matching collaborator chose an identity
    pub metadata: Option<MatchedMetadata>,
    /// Non-fatal observations from discovery ("disc numbering ambiguous", ...)
    pub warnings: Vec<String>,
}

impl AudiobookSet {
    pub fn new(root: impl Into<PathBuf>, discs: Vec<Disc>) -> Self {
        Self {
            root: root.into(),
            discs,
            metadata: None,
            warnings: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All tracks in plan order: discs ascending, tracks in disc order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.discs.iter().flat_map(|d| d.tracks.iter())
    }

    pub fn track_count(&self) -> usize {
        self.discs.iter().map(|d| d.tracks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.track_count() == 0
    }

    /// Highest disc number present in the set
    pub fn max_disc_number(&self) -> u32 {
        self.discs.iter().map(|d| d.number).max().unwrap_or(1)
    }

    /// Highest track number observed across all discs
    pub fn max_track_number(&self) -> u32 {
        self.tracks().map(|t| t.number).max().unwrap_or(0)
    }

    pub fn is_multi_disc(&self) -> bool {
        self.discs.len() > 1 || self.max_disc_number() > 1
    }

    /// Check track ordering within each disc.
    ///
    /// Returns one message per problem found: gaps in the numbering, duplicate
    /// track numbers, or a disc with no tracks at all. Callers surface these
    /// as warnings; none of them block planning.
    pub fn validate_track_order(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for disc in &self.discs {
            if disc.tracks.is_empty() {
                issues.push(format!("Disc {} has no tracks", disc.number));
                continue;
            }

            let mut numbers: Vec<u32> = disc.tracks.iter().map(|t| t.number).collect();
            numbers.sort_unstable();

            let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
            if numbers != expected {
                let mut duplicates: Vec<u32> = numbers
                    .windows(2)
                    .filter(|w| w[0] == w[1])
                    .map(|w| w[0])
                    .collect();
                duplicates.dedup();

                if duplicates.is_empty() {
                    issues.push(format!(
                        "Disc {} has gaps in track numbering: {:?}",
                        disc.number, numbers
                    ));
                } else {
                    issues.push(format!(
                        "Disc {} has duplicate track numbers: {:?}",
                        disc.number, duplicates
                    ));
                }
            }
        }

        issues
    }
}
