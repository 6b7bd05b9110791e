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


//! Error types for the BookForge engine
//!
//! Errors are categorized by the phase in which they arise:
//!
//! - [`PlanError`] — template resolution and plan construction; recoverable,
//!   the caller adjusts the template and re-plans.
//! - [`ConflictError`] — plan validation found blocking conflicts; carries the
//!   full collected report, never just the first conflict.
//! - [`ExecutionError`] — a filesystem mutation failed; the executor rolls
//!   back automatically and surfaces the aborted transaction.
//! - [`RollbackError`] — an inverse operation itself failed. The tree may be
//!   in an intermediate state; the error lists every operation that remains
//!   unreverted so a human can inspect it. Never retried automatically.
//! - [`UndoError`] — a requested undo cannot proceed.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::plan::conflict::ConflictReport;
use crate::plan::Operation;

/// Result type alias using the engine's umbrella error type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Umbrella error for all engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Undo(#[from] UndoError),

    /// Transaction log store failure
    #[error("transaction log error: {0}")]
    Database(#[from] sqlx::Error),

    /// Journal entry could not be serialized or deserialized
    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema migration failure on the transaction log store
    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

/// Errors raised while turning an audiobook set into a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A template token has no value for this set and no configured default
    #[error("template token '{{{token}}}' could not be resolved for {path}")]
    UnresolvedToken { token: String, path: PathBuf },

    /// The set contains no tracks at all
    #[error("audiobook set at {0} contains no tracks")]
    EmptySet(PathBuf),

    /// The template text itself is malformed
    #[error("invalid naming template: {0}")]
    InvalidTemplate(String),
}

/// Validation found blocking conflicts; the plan must not be executed
#[derive(Error, Debug)]
#[error("plan validation found {} blocking conflict(s)", report.blocking().count())]
pub struct ConflictError {
    /// Every conflict detected, blocking and non-blocking alike
    pub report: ConflictReport,
}

/// Errors raised while applying a single operation
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Another transaction is already mutating an overlapping root
    #[error("another transaction is already running against {root}")]
    ConcurrentTransaction { root: PathBuf },

    /// A source file disappeared between validation and execution
    #[error("source vanished before it could be moved: {path}")]
    SourceMissing { path: PathBuf },

    /// A destination appeared between validation and execution
    #[error("destination occupied by a concurrent change: {path}")]
    DestinationOccupied { path: PathBuf },

    /// A directory scheduled for removal still has entries
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty { path: PathBuf },

    /// Cross-device copy completed but the copy does not match the source.
    /// The source file is kept; the bad copy is deleted.
    #[error("copy verification failed for {destination}: {detail}")]
    VerificationFailed {
        source_path: PathBuf,
        destination: PathBuf,
        detail: String,
    },

    /// Cooperative cancellation honored at an operation boundary
    #[error("transaction cancelled before operation {index}")]
    Cancelled { index: usize },

    /// Underlying filesystem failure (permission denied, disk full, ...)
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An inverse operation failed during rollback.
///
/// This is the only error class that requires human intervention: the tree is
/// in an intermediate state and blind retry risks compounding it.
#[derive(Error, Debug)]
#[error(
    "rollback of transaction {transaction_id} failed while reverting {failed:?}: {cause}; \
     {} operation(s) remain unreverted",
    unreverted.len()
)]
pub struct RollbackError {
    pub transaction_id: Uuid,
    /// The inverse operation that could not be applied
    pub failed: Operation,
    pub cause: String,
    /// Applied operations that were never reverted, in original plan order
    pub unreverted: Vec<Operation>,
}

/// Errors raised when a requested undo cannot proceed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    #[error("transaction not found: {0}")]
    NotFound(Uuid),

    #[error("transaction {0} has already been undone")]
    AlreadyUndone(Uuid),

    /// Aborted and still-pending transactions have nothing to undo beyond
    /// what rollback already reverted.
    #[error("transaction {0} was not committed; nothing to undo")]
    NotCommitted(Uuid),

    /// The history holds no committed transaction at all
    #[error("no committed transaction to undo")]
    NothingToUndo,

    /// The stored transaction id is not a valid identifier
    #[error("malformed transaction id in log store: {0}")]
    MalformedId(String),
}
