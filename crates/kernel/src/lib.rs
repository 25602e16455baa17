// Copyright (C) 2025 The moor-lite Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! The tree-walking evaluator, built-in dispatcher, and task scheduler (spec.md §4.3,
//! §4.4, §4.5). There is no bytecode here: `moor-compiler` hands over a `Program`
//! whose AST is walked directly, one statement and expression at a time.

pub mod builtins;
pub mod tasks;
pub mod vm;

pub use tasks::scheduler::Scheduler;
pub use tasks::sessions::Session;
pub use tasks::task::{AbortReason, Task, TaskId, TaskKind, TaskOutcome};
