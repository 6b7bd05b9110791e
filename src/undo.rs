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


//! Undo
//!
//! Undo is not a special code path. A committed transaction's journal is
//! turned into an inverse plan, and that plan goes through the same
//! validation and execution pipeline as a forward one. The undo is itself a
//! logged transaction (kind `undo`, pointing at the transaction it reverses),
//! so history stays complete and an undo can in turn be undone.

use std::path::PathBuf;

use uuid::Uuid;

use crate::error::{Result, UndoError};
use crate::executor::{TransactionExecutor, TransactionResult};
use crate::fsview::FilesystemView;
use crate::plan::{validate, Operation, Plan};
use crate::store::{queries, TransactionKind, TransactionOutcome, TransactionRecord};

/// Reverses committed transactions from their journals
pub struct UndoManager {
    executor: TransactionExecutor,
}

impl UndoManager {
    pub fn new(executor: TransactionExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    /// Reverse a committed transaction.
    ///
    /// The inverse plan is validated against `fs` before anything moves, so
    /// an original location that has since been occupied surfaces as a
    /// conflict instead of an overwrite. On success the original transaction
    /// is marked undone.
    pub async fn undo(
        &self,
        transaction_id: Uuid,
        fs: &dyn FilesystemView,
    ) -> Result<TransactionResult> {
        let pool = self.executor.database().pool();

        let record = queries::load_transaction(pool, transaction_id)
            .await?
            .ok_or(UndoError::NotFound(transaction_id))?;

        match record.outcome() {
            TransactionOutcome::Committed => {}
            TransactionOutcome::Undone => {
                return Err(UndoError::AlreadyUndone(transaction_id).into());
            }
            _ => return Err(UndoError::NotCommitted(transaction_id).into()),
        }

        let plan = self.inverse_plan(&record, transaction_id).await?;
        let validated = validate(plan, fs)?;

        tracing::info!(
            original = %transaction_id,
            operations = validated.plan().operations().len(),
            "undoing transaction"
        );
        let result = self
            .executor
            .execute_kind(validated, TransactionKind::Undo, Some(transaction_id))
            .await?;

        if result.is_committed() {
            queries::mark_undone(pool, transaction_id).await?;
        }

        Ok(result)
    }

    /// Reverse the most recently committed transaction in the history.
    ///
    /// An undo transaction counts too, so calling this twice in a row redoes.
    /// Fails with [`UndoError::NothingToUndo`] when the history holds no
    /// committed transaction.
    pub async fn undo_last(&self, fs: &dyn FilesystemView) -> Result<TransactionResult> {
        let pool = self.executor.database().pool();
        let recent = queries::list_recent(pool, 100, None).await?;

        let target = recent
            .iter()
            .find(|r| r.outcome() == TransactionOutcome::Committed)
            .ok_or(UndoError::NothingToUndo)?;

        self.undo(target.id()?, fs).await
    }

    /// Build the inverse plan from the journal: applied operations only,
    /// reversed, each replaced by its inverse.
    async fn inverse_plan(
        &self,
        record: &TransactionRecord,
        transaction_id: Uuid,
    ) -> Result<Plan> {
        let pool = self.executor.database().pool();
        let journal = queries::load_journal(pool, transaction_id).await?;

        let mut operations: Vec<Operation> = Vec::new();
        for entry in journal.iter().rev() {
            if entry.status() != crate::store::OperationStatus::Applied {
                continue;
            }
            let operation = entry.operation()?;
            // a directory that predated the original transaction is not ours
            // to remove
            if matches!(operation, Operation::CreateDirectory { .. })
                && entry.pre_image()?.destination_exists
            {
                continue;
            }
            operations.push(operation.inverse());
        }

        Ok(Plan::new(
            PathBuf::from(&record.source_root),
            record.template.clone(),
            operations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::error::EngineError;
    use crate::fsview::RealFilesystemView;
    use crate::store::Database;

    fn write_file(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn manager() -> UndoManager {
        UndoManager::new(TransactionExecutor::new(
            Database::new_in_memory().await.unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_undo_restores_original_tree() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("book");
        write_file(&root.join("CD1/a.mp3"), "track a");

        let fs = RealFilesystemView::new(false);
        let manager = manager().await;

        let plan = Plan::new(
            &root,
            "{TrackPad} - {Title}",
            vec![
                Operation::Move {
                    source: root.join("CD1/a.mp3"),
                    destination: root.join("101 - a.mp3"),
                },
                Operation::RemoveEmptyDirectory {
                    path: root.join("CD1"),
                },
            ],
        );
        let applied = manager
            .executor()
            .execute(validate(plan, &fs).unwrap())
            .await
            .unwrap();
        assert!(applied.is_committed());
        assert!(!root.join("CD1").exists());

        let undone = manager.undo(applied.transaction_id, &fs).await.unwrap();
        assert!(undone.is_committed());
        assert!(root.join("CD1/a.mp3").exists());
        assert!(!root.join("101 - a.mp3").exists());

        let pool = manager.executor().database().pool();
        let original = queries::load_transaction(pool, applied.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(original.outcome(), TransactionOutcome::Undone);

        let undo_record = queries::load_transaction(pool, undone.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(undo_record.kind, "undo");
        assert_eq!(
            undo_record.undoes.as_deref(),
            Some(applied.transaction_id.to_string().as_str())
        );
        assert_eq!(undo_record.outcome(), TransactionOutcome::Committed);
    }

    #[tokio::test]
    async fn test_undo_unknown_id_fails_without_touching_disk() {
        let manager = manager().await;
        let fs = RealFilesystemView::new(false);

        let err = manager.undo(Uuid::new_v4(), &fs).await.unwrap_err();
        assert!(matches!(err, EngineError::Undo(UndoError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_double_undo_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("book");
        write_file(&root.join("a.mp3"), "a");

        let fs = RealFilesystemView::new(false);
        let manager = manager().await;

        let plan = Plan::new(
            &root,
            "{TrackPad} - {Title}",
            vec![Operation::Move {
                source: root.join("a.mp3"),
                destination: root.join("01 - a.mp3"),
            }],
        );
        let applied = manager
            .executor()
            .execute(validate(plan, &fs).unwrap())
            .await
            .unwrap();

        manager.undo(applied.transaction_id, &fs).await.unwrap();
        let err = manager
            .undo(applied.transaction_id, &fs)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Undo(UndoError::AlreadyUndone(_))
        ));
    }

    #[tokio::test]
    async fn test_aborted_transaction_cannot_be_undone() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("book");
        std::fs::create_dir_all(&root).unwrap();

        let fs = RealFilesystemView::new(false);
        let manager = manager().await;

        // the only source never existed, so execution aborts
        let plan = Plan::new(
            &root,
            "{TrackPad} - {Title}",
            vec![Operation::Move {
                source: root.join("ghost.mp3"),
                destination: root.join("01 - ghost.mp3"),
            }],
        );
        let aborted = manager
            .executor()
            .execute(validate(plan, &fs).unwrap())
            .await
            .unwrap();
        assert_eq!(aborted.outcome, TransactionOutcome::Aborted);

        let err = manager
            .undo(aborted.transaction_id, &fs)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Undo(UndoError::NotCommitted(_))
        ));
    }

    #[tokio::test]
    async fn test_undo_of_swap_restores_contents() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("book");
        write_file(&root.join("a.mp3"), "alpha");
        write_file(&root.join("b.mp3"), "beta");

        let fs = RealFilesystemView::new(false);
        let manager = manager().await;

        let plan = Plan::new(
            &root,
            "{TrackPad} - {Title}",
            vec![
                Operation::Move {
                    source: root.join("a.mp3"),
                    destination: root.join("b.mp3"),
                },
                Operation::Move {
                    source: root.join("b.mp3"),
                    destination: root.join("a.mp3"),
                },
            ],
        );
        let applied = manager
            .executor()
            .execute(validate(plan, &fs).unwrap())
            .await
            .unwrap();
        assert!(applied.is_committed());
        assert_eq!(std::fs::read_to_string(root.join("a.mp3")).unwrap(), "beta");

        let undone = manager.undo(applied.transaction_id, &fs).await.unwrap();
        assert!(undone.is_committed());
        assert_eq!(std::fs::read_to_string(root.join("a.mp3")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(root.join("b.mp3")).unwrap(), "beta");

        // no temp hop files left behind by either direction
        let mut entries: Vec<String> = std::fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["a.mp3", "b.mp3"]);
    }

    #[tokio::test]
    async fn test_undo_last_reverses_most_recent_committed() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("book");
        write_file(&root.join("a.mp3"), "a");

        let fs = RealFilesystemView::new(false);
        let manager = manager().await;

        let plan = Plan::new(
            &root,
            "{TrackPad} - {Title}",
            vec![Operation::Move {
                source: root.join("a.mp3"),
                destination: root.join("01 - a.mp3"),
            }],
        );
        let applied = manager
            .executor()
            .execute(validate(plan, &fs).unwrap())
            .await
            .unwrap();

        let undone = manager.undo_last(&fs).await.unwrap();
        assert!(root.join("a.mp3").exists());
        assert_eq!(
            queries::load_transaction(
                manager.executor().database().pool(),
                applied.transaction_id
            )
            .await
            .unwrap()
            .unwrap()
            .outcome(),
            TransactionOutcome::Undone
        );

        // the undo itself is now the most recent committed transaction,
        // so another undo_last redoes
        let redone = manager.undo_last(&fs).await.unwrap();
        assert!(redone.is_committed());
        assert_ne!(redone.transaction_id, undone.transaction_id);
        assert!(root.join("01 - a.mp3").exists());
    }

    #[tokio::test]
    async fn test_undo_last_with_empty_history() {
        let manager = manager().await;
        let fs = RealFilesystemView::new(false);

        let err = manager.undo_last(&fs).await.unwrap_err();
        assert!(matches!(err, EngineError::Undo(UndoError::NothingToUndo)));
    }

    #[tokio::test]
    async fn test_undo_blocked_when_original_location_occupied() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("book");
        write_file(&root.join("a.mp3"), "a");

        let fs = RealFilesystemView::new(false);
        let manager = manager().await;

        let plan = Plan::new(
            &root,
            "{TrackPad} - {Title}",
            vec![Operation::Move {
                source: root.join("a.mp3"),
                destination: root.join("01 - a.mp3"),
            }],
        );
        let applied = manager
            .executor()
            .execute(validate(plan, &fs).unwrap())
            .await
            .unwrap();

        // someone reused the vacated name
        write_file(&root.join("a.mp3"), "interloper");

        let err = manager
            .undo(applied.transaction_id, &fs)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert_eq!(
            std::fs::read_to_string(root.join("a.mp3")).unwrap(),
            "interloper"
        );
        assert!(root.join("01 - a.mp3").exists());
    }
}
