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


//! Transaction execution
//!
//! Applies a validated plan to the filesystem under a write-ahead journal:
//! every operation is journaled to the log store before it touches the disk,
//! so a crash at any point leaves enough state to reconstruct what happened.
//!
//! # Failure Handling
//! - Any operation failure aborts the transaction: applied operations are
//!   reverted in reverse order using their computed inverses, and the result
//!   carries the original error. This is an `Ok` result; the transaction
//!   mechanism worked as designed.
//! - A failure during rollback itself is the one fatal case. The outcome is
//!   persisted as `rollback_failed` and [`RollbackError`] lists everything
//!   that remains unreverted. Nothing is retried automatically.
//!
//! # Cross-Device Moves
//! A rename that fails with `CrossesDevices` degrades to copy, verify
//! (length plus SHA-256), then delete source. A copy that fails verification
//! is deleted and the source is kept untouched.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::error::{ExecutionError, Result, RollbackError};
use crate::lock::RootLock;
use crate::plan::{Operation, ValidatedPlan};
use crate::store::{
    queries, Database, NewTransaction, OperationStatus, PreImage, TransactionKind,
    TransactionOutcome,
};

/// Emitted after each operation is applied
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub transaction_id: Uuid,
    /// Zero-based index of the operation just applied
    pub index: usize,
    pub total: usize,
    pub operation: Operation,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Cooperative cancellation, checked at operation boundaries. Cancelling
/// mid-transaction aborts it through the normal rollback path.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final status of one plan operation after execution
#[derive(Debug, Clone)]
pub struct OperationState {
    pub operation: Operation,
    pub status: OperationStatus,
}

/// What became of one executed transaction
#[derive(Debug)]
pub struct TransactionResult {
    pub transaction_id: Uuid,
    pub outcome: TransactionOutcome,
    /// Every plan operation with its final journal status
    pub operations: Vec<OperationState>,
    /// The failure that aborted the transaction, if any
    pub error: Option<ExecutionError>,
    /// Operations that were applied and then reverted, in rollback order
    pub reverted: Vec<Operation>,
}

impl TransactionResult {
    pub fn is_committed(&self) -> bool {
        self.outcome == TransactionOutcome::Committed
    }
}

/// A journaled operation that has been applied to the disk
#[derive(Debug, Clone)]
struct AppliedOp {
    seq: i64,
    operation: Operation,
    pre_image: PreImage,
}

/// Executes validated plans against the filesystem, journaling to a
/// [`Database`] log store
pub struct TransactionExecutor {
    db: Database,
    lock: Arc<RootLock>,
    progress: Option<ProgressCallback>,
    cancel: CancellationFlag,
}

impl TransactionExecutor {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lock: Arc::new(RootLock::new()),
            progress: None,
            cancel: CancellationFlag::new(),
        }
    }

    /// Share a root lock between executors in the same process
    pub fn with_root_lock(mut self, lock: Arc<RootLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Handle for requesting cancellation from another task
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Execute a validated plan as a forward transaction
    pub async fn execute(&self, validated: ValidatedPlan) -> Result<TransactionResult> {
        self.execute_kind(validated, TransactionKind::Apply, None)
            .await
    }

    pub(crate) async fn execute_kind(
        &self,
        validated: ValidatedPlan,
        kind: TransactionKind,
        undoes: Option<Uuid>,
    ) -> Result<TransactionResult> {
        let plan = validated.plan();
        let root = plan.source_root().to_path_buf();
        let _guard = self.lock.acquire(&root)?;

        let transaction_id = Uuid::new_v4();
        queries::insert_transaction(
            self.db.pool(),
            &NewTransaction {
                transaction_id,
                source_root: root.display().to_string(),
                template: plan.template().to_string(),
                kind,
                undoes,
                started_at: Utc::now(),
            },
        )
        .await?;

        for warning in validated.warnings() {
            tracing::warn!(%transaction_id, conflict = ?warning, "non-blocking conflict");
        }
        tracing::info!(
            %transaction_id,
            kind = kind.as_str(),
            operations = plan.operations().len(),
            root = %root.display(),
            "transaction started"
        );

        let total = plan.operations().len();
        let mut statuses = vec![OperationStatus::Pending; total];
        let mut applied: Vec<AppliedOp> = Vec::new();
        let mut failure: Option<ExecutionError> = None;

        for (index, operation) in plan.operations().iter().enumerate() {
            if self.cancel.is_cancelled() {
                failure = Some(ExecutionError::Cancelled { index });
                break;
            }

            let seq = index as i64;
            let pre_image = snapshot(operation).await;
            queries::append_journal_entry(
                self.db.pool(),
                transaction_id,
                seq,
                &serde_json::to_string(operation)?,
                &serde_json::to_string(&pre_image)?,
            )
            .await?;

            // the journal entry exists before the disk is touched
            let attempt = check_divergence(operation, &pre_image);
            let attempt = match attempt {
                Ok(()) => self.apply_operation(operation).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(()) => {
                    queries::set_entry_status(
                        self.db.pool(),
                        transaction_id,
                        seq,
                        OperationStatus::Applied,
                    )
                    .await?;
                    statuses[index] = OperationStatus::Applied;
                    tracing::debug!(%transaction_id, seq, "{}", operation.describe());
                    if let Some(callback) = &self.progress {
                        callback(&ProgressEvent {
                            transaction_id,
                            index,
                            total,
                            operation: operation.clone(),
                        });
                    }
                    applied.push(AppliedOp {
                        seq,
                        operation: operation.clone(),
                        pre_image,
                    });
                }
                Err(error) => {
                    queries::set_entry_status(
                        self.db.pool(),
                        transaction_id,
                        seq,
                        OperationStatus::Failed,
                    )
                    .await?;
                    statuses[index] = OperationStatus::Failed;
                    tracing::warn!(%transaction_id, seq, error = %error, "operation failed, rolling back");
                    failure = Some(error);
                    break;
                }
            }
        }

        let finished_at = Utc::now();
        let (outcome, error, reverted) = match failure {
            None => {
                queries::set_outcome(
                    self.db.pool(),
                    transaction_id,
                    TransactionOutcome::Committed,
                    None,
                    finished_at,
                )
                .await?;
                tracing::info!(%transaction_id, "transaction committed");
                (TransactionOutcome::Committed, None, Vec::new())
            }
            Some(error) => {
                let reverted = self.roll_back(transaction_id, &applied).await?;
                for op in &applied {
                    statuses[op.seq as usize] = OperationStatus::RolledBack;
                }
                queries::set_outcome(
                    self.db.pool(),
                    transaction_id,
                    TransactionOutcome::Aborted,
                    Some(&error.to_string()),
                    Utc::now(),
                )
                .await?;
                tracing::info!(%transaction_id, reverted = reverted.len(), "transaction aborted");
                (TransactionOutcome::Aborted, Some(error), reverted)
            }
        };

        let operations = plan
            .operations()
            .iter()
            .zip(statuses)
            .map(|(operation, status)| OperationState {
                operation: operation.clone(),
                status,
            })
            .collect();

        Ok(TransactionResult {
            transaction_id,
            outcome,
            operations,
            error,
            reverted,
        })
    }

    /// Revert applied operations in reverse order. A failed inverse persists
    /// the `rollback_failed` outcome and surfaces [`RollbackError`].
    async fn roll_back(
        &self,
        transaction_id: Uuid,
        applied: &[AppliedOp],
    ) -> Result<Vec<Operation>> {
        let mut reverted = Vec::new();

        for (pos, entry) in applied.iter().enumerate().rev() {
            // a directory that existed before the transaction stays
            let pre_existing_dir = matches!(entry.operation, Operation::CreateDirectory { .. })
                && entry.pre_image.destination_exists;

            if !pre_existing_dir {
                let inverse = entry.operation.inverse();
                if let Err(cause) = self.apply_operation(&inverse).await {
                    queries::set_outcome(
                        self.db.pool(),
                        transaction_id,
                        TransactionOutcome::RollbackFailed,
                        Some(&cause.to_string()),
                        Utc::now(),
                    )
                    .await?;
                    tracing::error!(
                        %transaction_id,
                        error = %cause,
                        "rollback failed, tree left in intermediate state"
                    );
                    return Err(RollbackError {
                        transaction_id,
                        failed: inverse,
                        cause: cause.to_string(),
                        unreverted: applied[..=pos].iter().map(|a| a.operation.clone()).collect(),
                    }
                    .into());
                }
            }

            queries::set_entry_status(
                self.db.pool(),
                transaction_id,
                entry.seq,
                OperationStatus::RolledBack,
            )
            .await?;
            reverted.push(entry.operation.clone());
        }

        Ok(reverted)
    }

    async fn apply_operation(&self, operation: &Operation) -> std::result::Result<(), ExecutionError> {
        match operation {
            Operation::Move {
                source,
                destination,
            } => match tokio::fs::rename(source, destination).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                    self.copy_verify_delete(source, destination).await
                }
                Err(e) => Err(io_error("failed to move", source, e)),
            },
            Operation::CreateDirectory { path } => match tokio::fs::create_dir(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(io_error("failed to create directory", path, e)),
            },
            Operation::RemoveEmptyDirectory { path } => match tokio::fs::remove_dir(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {
                    Err(ExecutionError::DirectoryNotEmpty { path: path.clone() })
                }
                Err(e) => Err(io_error("failed to remove directory", path, e)),
            },
        }
    }

    /// Move across volumes: copy, verify the copy byte-for-byte, then delete
    /// the source. The source is never touched until the copy verifies.
    async fn copy_verify_delete(
        &self,
        source: &Path,
        destination: &Path,
    ) -> std::result::Result<(), ExecutionError> {
        let source_len = tokio::fs::metadata(source)
            .await
            .map_err(|e| io_error("failed to stat", source, e))?
            .len();
        let source_hash = sha256_of(source)
            .await
            .map_err(|e| io_error("failed to read", source, e))?;

        tokio::fs::copy(source, destination)
            .await
            .map_err(|e| io_error("failed to copy to", destination, e))?;

        let copy_len = tokio::fs::metadata(destination)
            .await
            .map_err(|e| io_error("failed to stat", destination, e))?
            .len();
        if copy_len != source_len {
            let _ = tokio::fs::remove_file(destination).await;
            return Err(ExecutionError::VerificationFailed {
                source_path: source.to_path_buf(),
                destination: destination.to_path_buf(),
                detail: format!("size mismatch: expected {source_len} bytes, copy has {copy_len}"),
            });
        }

        let copy_hash = sha256_of(destination)
            .await
            .map_err(|e| io_error("failed to read", destination, e))?;
        if copy_hash != source_hash {
            let _ = tokio::fs::remove_file(destination).await;
            return Err(ExecutionError::VerificationFailed {
                source_path: source.to_path_buf(),
                destination: destination.to_path_buf(),
                detail: format!(
                    "checksum mismatch: expected {}, copy has {}",
                    hex::encode(source_hash),
                    hex::encode(copy_hash)
                ),
            });
        }

        tokio::fs::remove_file(source)
            .await
            .map_err(|e| io_error("failed to remove source after copy", source, e))
    }
}

fn io_error(context: &'static str, path: &Path, source: std::io::Error) -> ExecutionError {
    ExecutionError::Io {
        context,
        path: path.to_path_buf(),
        source,
    }
}

/// Snapshot of the paths an operation touches, journaled alongside it
async fn snapshot(operation: &Operation) -> PreImage {
    match operation {
        Operation::Move {
            source,
            destination,
        } => {
            let meta = tokio::fs::metadata(source).await.ok();
            PreImage {
                source_exists: meta.is_some(),
                destination_exists: path_exists(destination).await,
                source_size: meta.map(|m| m.len()),
            }
        }
        Operation::CreateDirectory { path } => PreImage {
            source_exists: false,
            destination_exists: path_exists(path).await,
            source_size: None,
        },
        Operation::RemoveEmptyDirectory { path } => PreImage {
            source_exists: path_exists(path).await,
            destination_exists: false,
            source_size: None,
        },
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Detect filesystem changes since validation, before the disk is touched
fn check_divergence(
    operation: &Operation,
    pre_image: &PreImage,
) -> std::result::Result<(), ExecutionError> {
    if let Operation::Move {
        source,
        destination,
    } = operation
    {
        if !pre_image.source_exists {
            return Err(ExecutionError::SourceMissing {
                path: source.clone(),
            });
        }
        // renaming a file onto its own case variant is not an overwrite
        let case_only_rename = source != destination
            && source
                .to_string_lossy()
                .eq_ignore_ascii_case(&destination.to_string_lossy());
        if pre_image.destination_exists && !case_only_rename {
            return Err(ExecutionError::DestinationOccupied {
                path: destination.clone(),
            });
        }
    }
    Ok(())
}

async fn sha256_of(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().into())
}
