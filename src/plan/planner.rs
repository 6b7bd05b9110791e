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


//! Path planning
//!
//! Computes the target path for every track of a set and assembles the
//! operation list: directory creations first (parents before children), then
//! moves in disc/track order, then removals of source directories the plan
//! fully vacates (deepest first).
//!
//! Planning is pure apart from read-only checks through [`FilesystemView`];
//! nothing here mutates the disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::PlanError;
use crate::fsview::FilesystemView;
use crate::model::AudiobookSet;
use crate::plan::{Operation, Plan};
use crate::template::{build_tokens, CasePolicy, PadWidths, Template};

/// Tuning knobs for path planning
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Where renamed files land; defaults to the set's own root
    pub destination_root: Option<PathBuf>,
    /// Fallback values for tokens the metadata cannot resolve,
    /// e.g. `Author -> "Unknown Author"`
    pub token_defaults: HashMap<String, String>,
    /// Casing applied to rendered token values
    pub case_policy: CasePolicy,
}

/// Compute a plan moving every track of `set` to its templated destination.
///
/// Fails with [`PlanError::EmptySet`] for a set without tracks and
/// [`PlanError::UnresolvedToken`] when a token has neither a value nor a
/// configured default.
pub fn plan(
    set: &AudiobookSet,
    template: &Template,
    options: &PlanOptions,
    fs: &dyn FilesystemView,
) -> Result<Plan, PlanError> {
    if set.is_empty() {
        return Err(PlanError::EmptySet(set.root.clone()));
    }

    let destination_root = options
        .destination_root
        .clone()
        .unwrap_or_else(|| set.root.clone());
    let widths = PadWidths::for_set(set);

    let mut moves: Vec<Operation> = Vec::new();
    let mut sources: HashSet<PathBuf> = HashSet::new();
    let mut destinations: Vec<PathBuf> = Vec::new();

    for track in set.tracks() {
        let values = build_tokens(set, track, widths);
        let mut relative = template.render(
            &values,
            &options.token_defaults,
            options.case_policy,
            &track.path,
        )?;

        if let Some(ext) = track.extension() {
            let suffix = format!(".{ext}");
            if !relative.to_lowercase().ends_with(&suffix.to_lowercase()) {
                relative.push_str(&suffix);
            }
        }

        let destination = destination_root.join(relative);
        if destination == track.path {
            // Already in canonical shape; nothing to do for this track
            continue;
        }

        sources.insert(track.path.clone());
        destinations.push(destination.clone());
        moves.push(Operation::Move {
            source: track.path.clone(),
            destination,
        });
    }

    let creates = directory_creations(&destinations, fs);
    let removals = vacated_directories(set.root(), &destination_root, &sources, &destinations, fs);

    let mut operations = creates;
    operations.extend(moves);
    operations.extend(removals);

    Ok(Plan::new(set.root.clone(), template.raw(), operations))
}

/// One CreateDirectory per missing destination directory level,
/// ordered parents before children.
fn directory_creations(destinations: &[PathBuf], fs: &dyn FilesystemView) -> Vec<Operation> {
    let mut missing: HashSet<PathBuf> = HashSet::new();

    for destination in destinations {
        let mut current = destination.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() || fs.exists(&dir) || missing.contains(&dir) {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
            missing.insert(dir);
        }
    }

    // Depth keys the ordering: parents sort before their children
    let mut ordered: Vec<PathBuf> = missing.into_iter().collect();
    ordered.sort_by_key(|p| (p.components().count(), p.clone()));

    ordered
        .into_iter()
        .map(|path| Operation::CreateDirectory { path })
        .collect()
}

/// Source directories this plan fully empties, deepest first.
///
/// A directory qualifies only when every entry observed at planning time is
/// either a move source or a descendant directory that itself qualifies, and
/// no destination lands inside it. The set root itself is never removed.
fn vacated_directories(
    set_root: &Path,
    destination_root: &Path,
    sources: &HashSet<PathBuf>,
    destinations: &[PathBuf],
    fs: &dyn FilesystemView,
) -> Vec<Operation> {
    // Candidate dirs: every ancestor of a source strictly below the set root
    let mut candidates: HashSet<PathBuf> = HashSet::new();
    for source in sources {
        let mut current = source.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if !dir.starts_with(set_root) || dir == set_root {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
            candidates.insert(dir);
        }
    }

    let mut removed: HashSet<PathBuf> = HashSet::new();
    loop {
        let mut progressed = false;

        for dir in &candidates {
            if removed.contains(dir) {
                continue;
            }
            if destinations.iter().any(|d| d.starts_with(dir)) {
                continue;
            }
            if destination_root.starts_with(dir) {
                continue;
            }

            let vacated = fs
                .list_dir(dir)
                .iter()
                .all(|entry| sources.contains(entry) || removed.contains(entry));
            if vacated {
                removed.insert(dir.clone());
                progressed = true;
            }
        }

        if !progressed {
            break;
        }
    }

    // Children sort before their parents so removals always see empty dirs
    let mut ordered: Vec<PathBuf> = removed.into_iter().collect();
    ordered.sort_by_key(|p| (std::cmp::Reverse(p.components().count()), p.clone()));

    ordered
        .into_iter()
        .map(|path| Operation::RemoveEmptyDirectory { path })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsview::MemoryFilesystemView;
    use crate::model::{Disc, Track};

    fn track(path: &str, disc: u32, number: u32, title: &str) -> Track {
        Track {
            path: PathBuf::from(path),
            disc,
            number,
            title: Some(title.to_string()),
            size: 1024,
            modified: None,
        }
    }

    /// Two-disc set matching the canonical renaming scenario
    fn cd_set() -> (AudiobookSet, MemoryFilesystemView) {
        let set = AudiobookSet::new(
            "/books/b",
            vec![
                Disc {
                    number: 1,
                    tracks: vec![
                        track("/books/b/CD1/01 - A.mp3", 1, 1, "A"),
                        track("/books/b/CD1/02 - B.mp3", 1, 2, "B"),
                    ],
                },
                Disc {
                    number: 2,
                    tracks: vec![track("/books/b/CD2/01 - C.mp3", 2, 1, "C")],
                },
            ],
        );

        let mut fs = MemoryFilesystemView::new();
        for t in set.tracks() {
            fs.add_file(t.path.clone());
        }
        (set, fs)
    }

    #[test]
    fn test_disc_track_padding_scenario() {
        let (set, fs) = cd_set();
        let template = Template::parse("{DiscPad}{TrackPad} - {Title}").unwrap();

        let plan = plan(&set, &template, &PlanOptions::default(), &fs).unwrap();

        let destinations: Vec<PathBuf> = plan.moves().map(|(_, d)| d.clone()).collect();
        assert_eq!(
            destinations,
            vec![
                PathBuf::from("/books/b/101 - A.mp3"),
                PathBuf::from("/books/b/102 - B.mp3"),
                PathBuf::from("/books/b/201 - C.mp3"),
            ]
        );
    }

    #[test]
    fn test_vacated_source_dirs_removed_after_moves() {
        let (set, fs) = cd_set();
        let template = Template::parse("{DiscPad}{TrackPad} - {Title}").unwrap();

        let plan = plan(&set, &template, &PlanOptions::default(), &fs).unwrap();
        let ops = plan.operations();

        let removal_positions: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, Operation::RemoveEmptyDirectory { .. }))
            .map(|(i, _)| i)
            .collect();
        let last_move = ops
            .iter()
            .rposition(|op| matches!(op, Operation::Move { .. }))
            .unwrap();

        assert_eq!(removal_positions.len(), 2, "CD1 and CD2 should be removed");
        assert!(removal_positions.iter().all(|&i| i > last_move));
    }

    #[test]
    fn test_directory_creations_ordered_parent_first() {
        let (set, fs) = cd_set();
        let template = Template::parse("{Title}/{DiscPad}{TrackPad}").unwrap();
        let options = PlanOptions {
            destination_root: Some(PathBuf::from("/library/new")),
            ..Default::default()
        };

        let plan = plan(&set, &template, &options, &fs).unwrap();
        let created: Vec<&Path> = plan
            .operations()
            .iter()
            .filter_map(|op| match op {
                Operation::CreateDirectory { path } => Some(path.as_path()),
                _ => None,
            })
            .collect();

        // every parent precedes its children
        for (i, dir) in created.iter().enumerate() {
            for later in &created[i + 1..] {
                assert!(!dir.starts_with(later), "{later:?} created after child {dir:?}");
            }
        }
        assert!(created.contains(&Path::new("/library/new")));

        // creations all precede the first move
        let first_move = plan
            .operations()
            .iter()
            .position(|op| matches!(op, Operation::Move { .. }))
            .unwrap();
        let last_create = plan
            .operations()
            .iter()
            .rposition(|op| matches!(op, Operation::CreateDirectory { .. }))
            .unwrap();
        assert!(last_create < first_move);
    }

    #[test]
    fn test_dir_with_foreign_file_not_removed() {
        let (set, mut fs) = cd_set();
        fs.add_file("/books/b/CD1/cover.jpg");

        let template = Template::parse("{DiscPad}{TrackPad} - {Title}").unwrap();
        let plan = plan(&set, &template, &PlanOptions::default(), &fs).unwrap();

        assert!(!plan.operations().iter().any(|op| matches!(
            op,
            Operation::RemoveEmptyDirectory { path } if path == Path::new("/books/b/CD1")
        )));
        // CD2 is still fully vacated
        assert!(plan.operations().iter().any(|op| matches!(
            op,
            Operation::RemoveEmptyDirectory { path } if path == Path::new("/books/b/CD2")
        )));
    }

    #[test]
    fn test_empty_set_rejected() {
        let set = AudiobookSet::new("/books/empty", vec![]);
        let fs = MemoryFilesystemView::new();
        let template = Template::parse("{TrackPad}").unwrap();

        assert!(matches!(
            plan(&set, &template, &PlanOptions::default(), &fs),
            Err(PlanError::EmptySet(_))
        ));
    }

    #[test]
    fn test_unresolved_token_aborts_planning() {
        let (set, fs) = cd_set();
        let template = Template::parse("{Narrator}/{TrackPad}").unwrap();

        let err = plan(&set, &template, &PlanOptions::default(), &fs).unwrap_err();
        assert!(matches!(err, PlanError::UnresolvedToken { token, .. } if token == "Narrator"));
    }

    #[test]
    fn test_token_default_applies() {
        let (set, fs) = cd_set();
        let template = Template::parse("{Narrator}/{DiscPad}{TrackPad} - {Title}").unwrap();
        let mut options = PlanOptions::default();
        options
            .token_defaults
            .insert("Narrator".to_string(), "Unknown Narrator".to_string());

        let plan = plan(&set, &template, &options, &fs).unwrap();
        let (_, first_dest) = plan.moves().next().unwrap();
        assert_eq!(
            first_dest,
            &PathBuf::from("/books/b/Unknown Narrator/101 - A.mp3")
        );
    }

    #[test]
    fn test_already_canonical_track_skipped() {
        let set = AudiobookSet::new(
            "/books/b",
            vec![Disc {
                number: 1,
                tracks: vec![
                    track("/books/b/1 - A.mp3", 1, 1, "A"),
                    track("/books/b/second.mp3", 1, 2, "B"),
                ],
            }],
        );
        let mut fs = MemoryFilesystemView::new();
        for t in set.tracks() {
            fs.add_file(t.path.clone());
        }

        let template = Template::parse("{Track} - {Title}").unwrap();
        let plan = plan(&set, &template, &PlanOptions::default(), &fs).unwrap();

        let moves: Vec<_> = plan.moves().collect();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, &PathBuf::from("/books/b/second.mp3"));
    }

    #[test]
    fn test_extension_carried_from_source() {
        let (set, fs) = cd_set();
        let template = Template::parse("{DiscPad}{TrackPad}").unwrap();

        let plan = plan(&set, &template, &PlanOptions::default(), &fs).unwrap();
        for (_, dest) in plan.moves() {
            assert_eq!(dest.extension().and_then(|e| e.to_str()), Some("mp3"));
        }
    }
}
