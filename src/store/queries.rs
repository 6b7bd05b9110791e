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


//! Transaction log queries

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::store::models::{
    JournalEntryRecord, NewTransaction, OperationStatus, TransactionOutcome, TransactionRecord,
};

/// Record the start of a transaction with outcome 'pending'
pub async fn insert_transaction(pool: &SqlitePool, tx: &NewTransaction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions
            (transaction_id, source_root, template, kind, undoes, outcome, started_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(tx.transaction_id.to_string())
    .bind(&tx.source_root)
    .bind(&tx.template)
    .bind(tx.kind.as_str())
    .bind(tx.undoes.map(|u| u.to_string()))
    .bind(tx.started_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a transaction's final outcome
pub async fn set_outcome(
    pool: &SqlitePool,
    transaction_id: Uuid,
    outcome: TransactionOutcome,
    error: Option<&str>,
    finished_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE transactions SET outcome = ?, error = ?, finished_at = ? WHERE transaction_id = ?",
    )
    .bind(outcome.as_str())
    .bind(error)
    .bind(finished_at)
    .bind(transaction_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Flip a committed transaction to 'undone', leaving its finish time and
/// error untouched
pub async fn mark_undone(pool: &SqlitePool, transaction_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE transactions SET outcome = 'undone' WHERE transaction_id = ?")
        .bind(transaction_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Append a journal entry (status 'pending') before the operation is attempted
pub async fn append_journal_entry(
    pool: &SqlitePool,
    transaction_id: Uuid,
    seq: i64,
    operation_json: &str,
    pre_image_json: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO journal_entries
            (transaction_id, seq, operation, pre_image, status, created_at)
        VALUES (?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(transaction_id.to_string())
    .bind(seq)
    .bind(operation_json)
    .bind(pre_image_json)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Advance a journal entry's status
pub async fn set_entry_status(
    pool: &SqlitePool,
    transaction_id: Uuid,
    seq: i64,
    status: OperationStatus,
) -> Result<()> {
    sqlx::query("UPDATE journal_entries SET status = ? WHERE transaction_id = ? AND seq = ?")
        .bind(status.as_str())
        .bind(transaction_id.to_string())
        .bind(seq)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load a transaction by id
pub async fn load_transaction(
    pool: &SqlitePool,
    transaction_id: Uuid,
) -> Result<Option<TransactionRecord>> {
    let record = sqlx::query_as::<_, TransactionRecord>(
        "SELECT * FROM transactions WHERE transaction_id = ?",
    )
    .bind(transaction_id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Load a transaction's journal in application order
pub async fn load_journal(
    pool: &SqlitePool,
    transaction_id: Uuid,
) -> Result<Vec<JournalEntryRecord>> {
    let entries = sqlx::query_as::<_, JournalEntryRecord>(
        "SELECT * FROM journal_entries WHERE transaction_id = ? ORDER BY seq ASC",
    )
    .bind(transaction_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// List transactions newest-first, optionally bounded by a start-time cutoff
pub async fn list_recent(
    pool: &SqlitePool,
    limit: i64,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<TransactionRecord>> {
    let records = match since {
        Some(cutoff) => {
            sqlx::query_as::<_, TransactionRecord>(
                "SELECT * FROM transactions WHERE started_at >= ? ORDER BY started_at DESC LIMIT ?",
            )
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, TransactionRecord>(
                "SELECT * FROM transactions ORDER BY started_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(records)
}

/// Delete one transaction and (via cascade) its journal. Returns whether a
/// row was removed.
pub async fn purge_transaction(pool: &SqlitePool, transaction_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM transactions WHERE transaction_id = ?")
        .bind(transaction_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete transactions that started before `cutoff`. Returns how many were
/// removed.
pub async fn purge_older_than(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM transactions WHERE started_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
