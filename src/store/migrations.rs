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


//! Database migrations
//!
//! Runtime SQL migrations tracked in a `_migrations` table; sqlx's
//! compile-time migration system needs a build-time database connection,
//! which this crate avoids.

use sqlx::{Executor, SqlitePool};

use crate::error::Result;

/// Run all pending migrations in order
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "initial_schema", create_initial_schema(pool)).await?;

    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Initial schema: transactions and their write-ahead journal.
///
/// `transactions.started_at` is indexed so "list recent" is served without a
/// table scan; journal entries are unique per (transaction, seq) and cascade
/// on purge.
async fn create_initial_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
CREATE TABLE IF NOT EXISTS transactions (
    transaction_id TEXT PRIMARY KEY,
    source_root TEXT NOT NULL,
    template TEXT NOT NULL,

    -- 'apply' for forward plans, 'undo' for synthesized inverse plans
    kind TEXT NOT NULL DEFAULT 'apply',
    -- transaction this one reverses, for kind = 'undo'
    undoes TEXT,

    -- pending | committed | aborted | undone | rollback_failed
    outcome TEXT NOT NULL DEFAULT 'pending',
    error TEXT,

    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_started_at
    ON transactions(started_at DESC);

CREATE TABLE IF NOT EXISTS journal_entries (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id TEXT NOT NULL
        REFERENCES transactions(transaction_id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,

    -- the operation and its pre-image snapshot, as JSON
    operation TEXT NOT NULL,
    pre_image TEXT NOT NULL,

    -- pending | applied | failed | rolled_back
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,

    UNIQUE(transaction_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_journal_entries_transaction
    ON journal_entries(transaction_id, seq);
        "#,
    )
    .await?;

    Ok(())
}
