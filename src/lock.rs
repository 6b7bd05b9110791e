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


//! Single-writer root locking
//!
//! At most one transaction may mutate a given source root at a time. A second
//! request against the same or an overlapping root fails fast with
//! `ConcurrentTransaction` instead of interleaving operations. The lock is
//! coarse on purpose: this is an interactively driven tool, not a throughput
//! service.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::ExecutionError;

/// In-process registry of roots with a transaction in flight
#[derive(Debug, Default)]
pub struct RootLock {
    active: Mutex<Vec<PathBuf>>,
}

impl RootLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `root` for exclusive mutation.
    ///
    /// Fails when any in-flight root equals, contains, or is contained by
    /// `root`. The claim is released when the returned guard drops.
    pub fn acquire(&self, root: &Path) -> Result<RootGuard<'_>, ExecutionError> {
        let mut active = self.active.lock().expect("root lock poisoned");

        if active.iter().any(|held| overlaps(held, root)) {
            return Err(ExecutionError::ConcurrentTransaction {
                root: root.to_path_buf(),
            });
        }

        active.push(root.to_path_buf());
        Ok(RootGuard {
            lock: self,
            root: root.to_path_buf(),
        })
    }
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Releases its root claim on drop
#[derive(Debug)]
pub struct RootGuard<'a> {
    lock: &'a RootLock,
    root: PathBuf,
}

impl Drop for RootGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.lock.active.lock().expect("root lock poisoned");
        if let Some(pos) = active.iter().position(|p| p == &self.root) {
            active.swap_remove(pos);
        }
    }
}
