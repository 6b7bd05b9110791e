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


//! Conflict detection
//!
//! Validates a plan against the current and projected filesystem state before
//! anything is mutated. All conflicts are collected in one pass over the plan
//! rather than failing at the first finding, so the user can fix everything
//! at once.
//!
//! A plan with zero blocking conflicts becomes a [`ValidatedPlan`] — a
//! distinct type and the only input the executor accepts. Validation also
//! fixes the execution order: moves whose destination is vacated by another
//! move in the same plan are sequenced after the vacating move, and a rename
//! cycle (a swap, or any longer rotation) is opened by diverting one member
//! through a temporary sibling name. Cross-device moves and broken cycles are
//! warnings: they stay on the validated plan but never block it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ConflictError;
use crate::fsview::FilesystemView;
use crate::plan::{Operation, Plan};

/// One detected condition that would make executing a plan unsafe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Two or more operations write the same destination path
    DestinationCollision {
        destination: PathBuf,
        sources: Vec<PathBuf>,
    },
    /// A destination already exists on disk and is not vacated by this plan
    OverwriteHazard {
        source: PathBuf,
        destination: PathBuf,
    },
    /// A destination is an ancestor of another operation's source or
    /// destination; executing would order data out from under itself
    ContainmentHazard {
        destination: PathBuf,
        contained: PathBuf,
    },
    /// Source and destination live on different volumes; the move degrades
    /// from a near-atomic rename to copy+verify+delete. Non-blocking.
    CrossDevice {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The plan's moves form a rotation (every member's destination is
    /// another member's source). Resolved by diverting one member through a
    /// temporary name, so this is non-blocking.
    RenameCycle { members: Vec<PathBuf> },
}

impl Conflict {
    /// Whether this conflict blocks execution (warnings do not)
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            Conflict::CrossDevice { .. } | Conflict::RenameCycle { .. }
        )
    }
}

/// Every conflict found while validating one plan
#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(|c| c.is_blocking())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(|c| !c.is_blocking())
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

/// A plan that passed conflict detection. The only way to obtain one is
/// [`validate`], which is what keeps unchecked plans away from the executor.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    plan: Plan,
    warnings: Vec<Conflict>,
}

impl ValidatedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Non-blocking findings, currently only cross-device warnings
    pub fn warnings(&self) -> &[Conflict] {
        &self.warnings
    }

    /// Whether a specific move was flagged as crossing devices
    pub fn crosses_devices(&self, source: &Path) -> bool {
        self.warnings.iter().any(|w| {
            matches!(w, Conflict::CrossDevice { source: s, .. } if s == source)
        })
    }
}

/// Validate `plan` against `fs`, consuming it.
///
/// Checks run in a fixed order, each contributing its own conflict kind:
/// destination collisions (case-insensitively when the view says so),
/// overwrite hazards, containment hazards, then cross-device warnings.
pub fn validate(plan: Plan, fs: &dyn FilesystemView) -> Result<ValidatedPlan, ConflictError> {
    let mut conflicts: Vec<Conflict> = Vec::new();

    let moves: Vec<(&PathBuf, &PathBuf)> = plan.moves().collect();
    let normalize = |path: &Path| -> PathBuf {
        if fs.is_case_insensitive() {
            PathBuf::from(path.to_string_lossy().to_lowercase())
        } else {
            path.to_path_buf()
        }
    };

    // 1. destination collisions, grouped case-normalized but reported with
    // the destination as the plan spelled it
    let mut by_destination: HashMap<PathBuf, (PathBuf, Vec<PathBuf>)> = HashMap::new();
    for (source, destination) in &moves {
        let entry = by_destination
            .entry(normalize(destination))
            .or_insert_with(|| ((*destination).clone(), Vec::new()));
        entry.1.push((*source).clone());
    }
    let mut collisions: Vec<(&PathBuf, &(PathBuf, Vec<PathBuf>))> = by_destination
        .iter()
        .filter(|(_, (_, sources))| sources.len() > 1)
        .collect();
    collisions.sort_by_key(|(key, _)| (*key).clone());
    for (_, (destination, sources)) in collisions {
        conflicts.push(Conflict::DestinationCollision {
            destination: destination.clone(),
            sources: sources.clone(),
        });
    }

    // 2. overwrite hazards: existing destinations not vacated by this plan
    let vacated: HashMap<PathBuf, ()> = moves
        .iter()
        .map(|(source, _)| (normalize(source), ()))
        .collect();
    for (source, destination) in &moves {
        if fs.exists(destination) && !vacated.contains_key(&normalize(destination)) {
            conflicts.push(Conflict::OverwriteHazard {
                source: (*source).clone(),
                destination: (*destination).clone(),
            });
        }
    }

    // 3. containment hazards
    for (i, (_, destination)) in moves.iter().enumerate() {
        for (j, (other_source, other_destination)) in moves.iter().enumerate() {
            if i == j {
                continue;
            }
            if other_source.starts_with(destination) && *other_source != *destination {
                conflicts.push(Conflict::ContainmentHazard {
                    destination: (*destination).clone(),
                    contained: (*other_source).clone(),
                });
            }
            if i < j
                && other_destination.starts_with(destination)
                && *other_destination != *destination
            {
                conflicts.push(Conflict::ContainmentHazard {
                    destination: (*destination).clone(),
                    contained: (*other_destination).clone(),
                });
            }
        }
    }

    // 4. cross-device warnings
    for (source, destination) in &moves {
        if !fs.same_device(source, destination) {
            conflicts.push(Conflict::CrossDevice {
                source: (*source).clone(),
                destination: (*destination).clone(),
            });
        }
    }

    let report = ConflictReport { conflicts };
    if report.has_blocking() {
        return Err(ConflictError { report });
    }

    let mut warnings = report.conflicts;
    let (plan, cycles) = resolve_execution_order(plan, fs);
    warnings.extend(cycles);
    Ok(ValidatedPlan { plan, warnings })
}

/// Put operations into a safe execution order: directory creations first,
/// then moves sequenced so every destination is vacant by the time its move
/// runs, then removals. Occupancy is simulated over the filesystem view, so
/// a move is deferred only while a pending move still holds its destination.
/// A rename rotation, where every pending destination stays occupied, is
/// opened by diverting one member through a temporary sibling name; the
/// executor sees only plain moves and each hop keeps its computable inverse.
fn resolve_execution_order(plan: Plan, fs: &dyn FilesystemView) -> (Plan, Vec<Conflict>) {
    let mut ordered: Vec<Operation> = Vec::new();
    let mut pending: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut removals: Vec<Operation> = Vec::new();

    for op in plan.operations() {
        match op {
            Operation::CreateDirectory { .. } => ordered.push(op.clone()),
            Operation::RemoveEmptyDirectory { .. } => removals.push(op.clone()),
            Operation::Move {
                source,
                destination,
            } => pending.push((source.clone(), destination.clone())),
        }
    }

    let mut occupied: HashSet<PathBuf> = pending
        .iter()
        .flat_map(|(s, d)| [s, d])
        .filter(|p| fs.exists(p))
        .cloned()
        .collect();

    let mut warnings = Vec::new();
    while !pending.is_empty() {
        if let Some(i) = pending.iter().position(|(_, d)| !occupied.contains(d)) {
            let (source, destination) = pending.remove(i);
            occupied.remove(&source);
            occupied.insert(destination.clone());
            ordered.push(Operation::Move {
                source,
                destination,
            });
            continue;
        }

        // every pending destination is still held by another pending move
        let members = trace_cycle(&pending);
        let i = pending
            .iter()
            .position(|(s, _)| s == &members[0])
            .expect("cycle member is pending");
        let (source, destination) = pending.remove(i);
        let temp = temp_destination(&source);
        occupied.remove(&source);
        occupied.insert(temp.clone());
        ordered.push(Operation::Move {
            source,
            destination: temp.clone(),
        });
        pending.push((temp, destination));
        warnings.push(Conflict::RenameCycle { members });
    }
    ordered.extend(removals);

    (plan.with_operations(ordered), warnings)
}

/// Follow destination-to-source links from the first pending move until one
/// repeats; the repeated tail is the cycle. Only called when every pending
/// destination is occupied, and an occupied destination no pending move
/// vacates is an overwrite hazard caught before ordering, so every link
/// exists here.
fn trace_cycle(pending: &[(PathBuf, PathBuf)]) -> Vec<PathBuf> {
    let mut seen: Vec<usize> = Vec::new();
    let mut current = 0usize;
    loop {
        if let Some(pos) = seen.iter().position(|&i| i == current) {
            return seen[pos..].iter().map(|&i| pending[i].0.clone()).collect();
        }
        seen.push(current);
        let destination = &pending[current].1;
        current = pending
            .iter()
            .position(|(s, _)| s == destination)
            .expect("blocked move has a successor");
    }
}

/// Temporary sibling name for opening a rename cycle. Staying in the source's
/// directory keeps the hop on the same volume, so it is a plain rename.
fn temp_destination(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("cycle");
    let tag = Uuid::new_v4().simple().to_string();
    source.with_file_name(format!("{name}.{}.tmp", &tag[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsview::MemoryFilesystemView;
    use crate::plan::Plan;

    fn move_op(source: &str, destination: &str) -> Operation {
        Operation::Move {
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
        }
    }

    fn plan_of(ops: Vec<Operation>) -> Plan {
        Plan::new("/books/b", "{TrackPad} - {Title}", ops)
    }

    #[test]
    fn test_clean_plan_validates() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/x.mp3");
        fs.add_file("/books/b/y.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/x.mp3", "/books/b/01 - X.mp3"),
            move_op("/books/b/y.mp3", "/books/b/02 - Y.mp3"),
        ]);

        let validated = validate(plan, &fs).unwrap();
        assert!(validated.warnings().is_empty());
        assert_eq!(validated.plan().operations().len(), 2);
    }

    #[test]
    fn test_destination_collision_names_both_sources() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/b.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/a.mp3", "/books/b/01 - Intro.mp3"),
            move_op("/books/b/b.mp3", "/books/b/01 - Intro.mp3"),
        ]);

        let err = validate(plan, &fs).unwrap_err();
        let blocking: Vec<&Conflict> = err.report.blocking().collect();
        assert_eq!(blocking.len(), 1);
        match blocking[0] {
            Conflict::DestinationCollision {
                destination,
                sources,
            } => {
                assert_eq!(destination, &PathBuf::from("/books/b/01 - Intro.mp3"));
                assert_eq!(sources.len(), 2);
                assert!(sources.contains(&PathBuf::from("/books/b/a.mp3")));
                assert!(sources.contains(&PathBuf::from("/books/b/b.mp3")));
            }
            other => panic!("expected DestinationCollision, got {other:?}"),
        }
    }

    #[test]
    fn test_case_insensitive_collision() {
        let mut fs = MemoryFilesystemView::new().case_insensitive();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/b.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/a.mp3", "/books/b/Intro.mp3"),
            move_op("/books/b/b.mp3", "/books/b/INTRO.mp3"),
        ]);

        let err = validate(plan, &fs).unwrap_err();
        let collision = err
            .report
            .iter()
            .find_map(|c| match c {
                Conflict::DestinationCollision { destination, .. } => Some(destination),
                _ => None,
            })
            .expect("collision reported");
        // reported with the spelling the plan produced, not folded case
        assert_eq!(collision, &PathBuf::from("/books/b/Intro.mp3"));
    }

    #[test]
    fn test_case_sensitive_view_allows_differing_case() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/b.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/a.mp3", "/books/b/Intro.mp3"),
            move_op("/books/b/b.mp3", "/books/b/INTRO.mp3"),
        ]);

        assert!(validate(plan, &fs).is_ok());
    }

    #[test]
    fn test_overwrite_hazard_for_existing_destination() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/taken.mp3");

        let plan = plan_of(vec![move_op("/books/b/a.mp3", "/books/b/taken.mp3")]);

        let err = validate(plan, &fs).unwrap_err();
        assert!(err
            .report
            .iter()
            .any(|c| matches!(c, Conflict::OverwriteHazard { .. })));
    }

    #[test]
    fn test_swap_through_vacated_destination_is_allowed() {
        // a -> b while b -> c: b exists but is vacated by the same plan
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/b.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/b.mp3", "/books/b/c.mp3"),
            move_op("/books/b/a.mp3", "/books/b/b.mp3"),
        ]);

        assert!(validate(plan, &fs).is_ok());
    }

    #[test]
    fn test_mis_ordered_chain_is_sequenced_for_execution() {
        // 1 -> 2 listed before 2 -> 3: the vacating move must run first
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/1.mp3");
        fs.add_file("/books/b/2.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/1.mp3", "/books/b/2.mp3"),
            move_op("/books/b/2.mp3", "/books/b/3.mp3"),
        ]);

        let validated = validate(plan, &fs).unwrap();
        assert!(validated.warnings().is_empty());

        let moves: Vec<(&PathBuf, &PathBuf)> = validated.plan().moves().collect();
        assert_eq!(moves[0].0, &PathBuf::from("/books/b/2.mp3"));
        assert_eq!(moves[1].0, &PathBuf::from("/books/b/1.mp3"));
    }

    #[test]
    fn test_swap_cycle_opened_with_temp_hop() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/b.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/a.mp3", "/books/b/b.mp3"),
            move_op("/books/b/b.mp3", "/books/b/a.mp3"),
        ]);

        let validated = validate(plan, &fs).unwrap();

        let cycle = validated
            .warnings()
            .iter()
            .find_map(|c| match c {
                Conflict::RenameCycle { members } => Some(members),
                _ => None,
            })
            .expect("cycle reported");
        assert!(cycle.contains(&PathBuf::from("/books/b/a.mp3")));
        assert!(cycle.contains(&PathBuf::from("/books/b/b.mp3")));

        // a hops out through a temp name so b can vacate, then lands in b
        let moves: Vec<(&PathBuf, &PathBuf)> = validated.plan().moves().collect();
        assert_eq!(moves.len(), 3);
        assert_eq!(moves[0].0, &PathBuf::from("/books/b/a.mp3"));
        let temp = moves[0].1;
        assert_ne!(temp, &PathBuf::from("/books/b/b.mp3"));
        assert_eq!(
            (moves[1].0, moves[1].1),
            (
                &PathBuf::from("/books/b/b.mp3"),
                &PathBuf::from("/books/b/a.mp3")
            )
        );
        assert_eq!((moves[2].0, moves[2].1), (temp, &PathBuf::from("/books/b/b.mp3")));
    }

    #[test]
    fn test_containment_hazard() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/CD1/01.mp3");
        fs.add_dir("/books/b/old");

        let plan = plan_of(vec![
            move_op("/books/b/old", "/books/b/CD1"),
            move_op("/books/b/CD1/01.mp3", "/books/b/01.mp3"),
        ]);

        let err = validate(plan, &fs).unwrap_err();
        assert!(err
            .report
            .iter()
            .any(|c| matches!(c, Conflict::ContainmentHazard { .. })));
    }

    #[test]
    fn test_all_conflicts_collected_not_just_first() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_file("/books/b/a.mp3");
        fs.add_file("/books/b/b.mp3");
        fs.add_file("/books/b/c.mp3");
        fs.add_file("/books/b/taken.mp3");

        let plan = plan_of(vec![
            move_op("/books/b/a.mp3", "/books/b/same.mp3"),
            move_op("/books/b/b.mp3", "/books/b/same.mp3"),
            move_op("/books/b/c.mp3", "/books/b/taken.mp3"),
        ]);

        let err = validate(plan, &fs).unwrap_err();
        assert!(err.report.len() >= 2);
        assert!(err
            .report
            .iter()
            .any(|c| matches!(c, Conflict::DestinationCollision { .. })));
        assert!(err
            .report
            .iter()
            .any(|c| matches!(c, Conflict::OverwriteHazard { .. })));
    }

    #[test]
    fn test_cross_device_is_nonblocking_warning() {
        let mut fs = MemoryFilesystemView::new();
        fs.add_mount("/", 1);
        fs.add_mount("/mnt/usb", 2);
        fs.add_file("/books/b/a.mp3");

        let plan = plan_of(vec![move_op("/books/b/a.mp3", "/mnt/usb/a.mp3")]);

        let validated = validate(plan, &fs).unwrap();
        assert_eq!(validated.warnings().len(), 1);
        assert!(validated.crosses_devices(Path::new("/books/b/a.mp3")));
    }
}
