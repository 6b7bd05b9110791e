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


//! Plans and reversible operations
//!
//! A [`Plan`] is an ordered sequence of [`Operation`]s plus the metadata
//! needed to audit it later. Plans are immutable once produced; validation
//! (see [`conflict`]) freezes one into a `ValidatedPlan`, the only input the
//! executor accepts.
//!
//! Every operation's inverse is computable without external state, which is
//! what makes journaled rollback and undo possible.

pub mod conflict;
pub mod planner;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use conflict::{validate, Conflict, ConflictReport, ValidatedPlan};
pub use planner::{plan, PlanOptions};

/// One proposed filesystem mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Relocate a file
    Move {
        source: PathBuf,
        destination: PathBuf,
    },
    /// Create a single directory level (parents must already exist)
    CreateDirectory { path: PathBuf },
    /// Remove a directory that the plan has fully vacated
    RemoveEmptyDirectory { path: PathBuf },
}

impl Operation {
    /// The operation that exactly reverses this one
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::Move {
                source,
                destination,
            } => Operation::Move {
                source: destination.clone(),
                destination: source.clone(),
            },
            Operation::CreateDirectory { path } => Operation::RemoveEmptyDirectory {
                path: path.clone(),
            },
            Operation::RemoveEmptyDirectory { path } => Operation::CreateDirectory {
                path: path.clone(),
            },
        }
    }

    /// The path this operation writes or removes
    pub fn target(&self) -> &Path {
        match self {
            Operation::Move { destination, .. } => destination,
            Operation::CreateDirectory { path } => path,
            Operation::RemoveEmptyDirectory { path } => path,
        }
    }

    /// Short human-readable description for logs and progress displays
    pub fn describe(&self) -> String {
        match self {
            Operation::Move {
                source,
                destination,
            } => format!("move {} -> {}", source.display(), destination.display()),
            Operation::CreateDirectory { path } => format!("mkdir {}", path.display()),
            Operation::RemoveEmptyDirectory { path } => format!("rmdir {}", path.display()),
        }
    }
}

/// An ordered sequence of operations computed from a naming template.
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    id: Uuid,
    source_root: PathBuf,
    template: String,
    created_at: DateTime<Utc>,
    operations: Vec<Operation>,
}

impl Plan {
    pub fn new(
        source_root: impl Into<PathBuf>,
        template: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_root: source_root.into(),
            template: template.into(),
            created_at: Utc::now(),
            operations,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Template text this plan was computed from
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Same plan identity and metadata with the operations replaced. Used by
    /// validation to put operations into a safe execution order.
    pub(crate) fn with_operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = operations;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Move operations only, in plan order
    pub fn moves(&self) -> impl Iterator<Item = (&PathBuf, &PathBuf)> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Move {
                source,
                destination,
            } => Some((source, destination)),
            _ => None,
        })
    }
}
