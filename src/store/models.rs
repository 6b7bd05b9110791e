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


//! Transaction log records
//!
//! Enums are persisted as lowercase TEXT rather than integers so the log is
//! inspectable with plain sqlite3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{EngineError, Result, UndoError};
use crate::plan::Operation;

/// Final state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    /// Execution has begun but not finished
    Pending,
    /// Every operation applied
    Committed,
    /// A failure occurred and all applied operations were reverted
    Aborted,
    /// A later undo transaction reversed this one
    Undone,
    /// Rollback itself failed; the tree needs manual inspection
    RollbackFailed,
}

impl TransactionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionOutcome::Pending => "pending",
            TransactionOutcome::Committed => "committed",
            TransactionOutcome::Aborted => "aborted",
            TransactionOutcome::Undone => "undone",
            TransactionOutcome::RollbackFailed => "rollback_failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "committed" => TransactionOutcome::Committed,
            "aborted" => TransactionOutcome::Aborted,
            "undone" => TransactionOutcome::Undone,
            "rollback_failed" => TransactionOutcome::RollbackFailed,
            _ => TransactionOutcome::Pending,
        }
    }
}

/// Per-operation execution status within a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Applied,
    Failed,
    RolledBack,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Applied => "applied",
            OperationStatus::Failed => "failed",
            OperationStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "applied" => OperationStatus::Applied,
            "failed" => OperationStatus::Failed,
            "rolled_back" => OperationStatus::RolledBack,
            _ => OperationStatus::Pending,
        }
    }
}

/// Whether a transaction applied a forward plan or reversed another one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Apply,
    Undo,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Apply => "apply",
            TransactionKind::Undo => "undo",
        }
    }
}

/// Snapshot taken before an operation is attempted, sufficient to detect
/// whether the filesystem diverged from what validation saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreImage {
    pub source_exists: bool,
    pub destination_exists: bool,
    pub source_size: Option<u64>,
}

/// Fields for a freshly started transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_id: Uuid,
    pub source_root: String,
    pub template: String,
    pub kind: TransactionKind,
    pub undoes: Option<Uuid>,
    pub started_at: DateTime<Utc>,
}

/// One row of the transactions table
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub source_root: String,
    pub template: String,
    pub kind: String,
    pub undoes: Option<String>,
    pub outcome: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn outcome(&self) -> TransactionOutcome {
        TransactionOutcome::parse(&self.outcome)
    }

    /// Parsed transaction id; the store only ever writes UUIDs here
    pub fn id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.transaction_id)
            .map_err(|_| EngineError::Undo(UndoError::MalformedId(self.transaction_id.clone())))
    }
}

/// One row of the journal_entries table
#[derive(Debug, Clone, FromRow)]
pub struct JournalEntryRecord {
    pub entry_id: i64,
    pub transaction_id: String,
    pub seq: i64,
    pub operation: String,
    pub pre_image: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl JournalEntryRecord {
    pub fn status(&self) -> OperationStatus {
        OperationStatus::parse(&self.status)
    }

    /// Deserialize the journaled operation
    pub fn operation(&self) -> Result<Operation> {
        Ok(serde_json::from_str(&self.operation)?)
    }

    /// Deserialize the pre-image snapshot
    pub fn pre_image(&self) -> Result<PreImage> {
        Ok(serde_json::from_str(&self.pre_image)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_text_roundtrip() {
        for outcome in [
            TransactionOutcome::Pending,
            TransactionOutcome::Committed,
            TransactionOutcome::Aborted,
            TransactionOutcome::Undone,
            TransactionOutcome::RollbackFailed,
        ] {
            assert_eq!(TransactionOutcome::parse(outcome.as_str()), outcome);
        }
    }

    #[test]
    fn test_status_text_roundtrip() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Applied,
            OperationStatus::Failed,
            OperationStatus::RolledBack,
        ] {
            assert_eq!(OperationStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_outcome_degrades_to_pending() {
        assert_eq!(
            TransactionOutcome::parse("garbage"),
            TransactionOutcome::Pending
        );
    }

    #[test]
    fn test_record_id_parses_and_rejects() {
        let mut record = TransactionRecord {
            transaction_id: Uuid::new_v4().to_string(),
            source_root: "/books/b".to_string(),
            template: "{TrackPad}".to_string(),
            kind: "apply".to_string(),
            undoes: None,
            outcome: "committed".to_string(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        assert!(record.id().is_ok());

        record.transaction_id = "not-a-uuid".to_string();
        assert!(matches!(
            record.id(),
            Err(EngineError::Undo(UndoError::MalformedId(_)))
        ));
    }
}
