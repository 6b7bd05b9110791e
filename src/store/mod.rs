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


//! Transaction log store
//!
//! Durable, append-only record of every transaction and its journal, backed
//! by SQLite. Records are keyed by transaction id and indexed by start time,
//! so "load by id" and "list recent" never scan the full history. Nothing is
//! deleted except by explicit purge.
//!
//! # SQLite Adaptations
//! - Operations and pre-images stored as JSON TEXT (no native struct type)
//! - Timestamps stored as TEXT in ISO 8601 format
//! - Outcome and status enums stored as lowercase TEXT

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::{
    JournalEntryRecord, NewTransaction, OperationStatus, PreImage, TransactionKind,
    TransactionOutcome, TransactionRecord,
};
