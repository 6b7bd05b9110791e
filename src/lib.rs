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


//! BookForge engine: plan, validate, execute, undo.
//!
//! Reorganizing an audiobook set is a four-stage pipeline, each stage a pure
//! function of the previous one until the executor finally touches the disk:
//!
//! 1. **Plan** ([`plan::plan`]) renders a naming template against an
//!    [`model::AudiobookSet`] and yields an ordered, reversible
//!    [`plan::Plan`]. Nothing is mutated.
//! 2. **Validate** ([`plan::validate`]) collects every conflict between the
//!    plan and a [`fsview::FilesystemView`]. A conflict-free plan becomes a
//!    [`plan::ValidatedPlan`], the only type the executor accepts.
//! 3. **Execute** ([`executor::TransactionExecutor`]) applies the plan under
//!    a write-ahead journal in a SQLite log store, rolling back on failure.
//! 4. **Undo** ([`undo::UndoManager`]) reverses a committed transaction by
//!    running its journal's inverse through stages 2 and 3.

pub mod error;
pub mod executor;
pub mod fsview;
pub mod lock;
pub mod model;
pub mod plan;
pub mod store;
pub mod template;
pub mod undo;

pub use error::{EngineError, Result};
pub use executor::{CancellationFlag, TransactionExecutor, TransactionResult};
pub use fsview::{FilesystemView, MemoryFilesystemView, RealFilesystemView};
pub use model::{AudiobookSet, Disc, MatchedMetadata, Track};
pub use plan::{validate, Plan, PlanOptions, ValidatedPlan};
pub use store::{Database, TransactionOutcome};
pub use template::{CasePolicy, Template};
pub use undo::UndoManager;
