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

//! The stack frame, control-flow signals, and the evaluator itself. The evaluator is
//! implemented as inherent methods on [`crate::tasks::task::Task`] in
//! [`interpreter`], rather than as a free-standing struct: a task's call stack,
//! transaction, and tick budget are exactly the state the evaluator needs, and a
//! tree-walker has no separate "machine" to thread through every call.

pub mod activation;
pub mod interpreter;
pub mod unwind;

pub use activation::{Activation, CommandContext};
pub use unwind::{Exception, TracebackFrame, Unwind};
