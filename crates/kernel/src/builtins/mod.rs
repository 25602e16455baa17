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

//! Built-in function dispatch (spec.md §4.5 "Built-in functions"). Grouped into one
//! module per category, the way the evaluator's own teacher codebase organizes its
//! built-ins, but called directly as a synchronous `match` rather than through a
//! trait-object registry — nothing here ever needs to `.await`, since a task is
//! already pinned to its own OS thread and blocks in place when it needs to
//! (`bf_tasks::suspend`/`read`).

mod bf_network;
mod bf_objects;
mod bf_system;
mod bf_tasks;
mod bf_values;

use crate::tasks::sessions::Session;
use crate::tasks::task::Task;
use crate::vm::Unwind;
use moor_var::{Error, ErrorCode, Symbol, Var, Variant};

pub(crate) fn err(code: ErrorCode) -> Unwind {
    Unwind::from(Error::from(code))
}

pub(crate) fn arity(args: &[Var], min: usize, max: usize) -> Result<(), Unwind> {
    if args.len() < min || args.len() > max {
        Err(err(ErrorCode::E_ARGS))
    } else {
        Ok(())
    }
}

pub(crate) fn arg_obj(args: &[Var], i: usize) -> Result<moor_var::Obj, Unwind> {
    match args.get(i).map(Var::variant) {
        Some(Variant::Obj(o)) => Ok(*o),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

pub(crate) fn arg_int(args: &[Var], i: usize) -> Result<i64, Unwind> {
    match args.get(i).map(Var::variant) {
        Some(Variant::Int(n)) => Ok(*n),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

pub(crate) fn arg_str<'a>(args: &'a [Var], i: usize) -> Result<&'a str, Unwind> {
    match args.get(i).map(Var::variant) {
        Some(Variant::Str(s)) => Ok(s.as_str()),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

pub(crate) fn arg_list<'a>(args: &'a [Var], i: usize) -> Result<&'a moor_var::List, Unwind> {
    match args.get(i).map(Var::variant) {
        Some(Variant::List(l)) => Ok(l),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

pub(crate) fn opt_int(args: &[Var], i: usize, default: i64) -> Result<i64, Unwind> {
    if i < args.len() {
        arg_int(args, i)
    } else {
        Ok(default)
    }
}

pub(crate) fn opt_obj(
    args: &[Var],
    i: usize,
    default: moor_var::Obj,
) -> Result<moor_var::Obj, Unwind> {
    if i < args.len() {
        arg_obj(args, i)
    } else {
        Ok(default)
    }
}

/// Route one `Expr::Call` to the category that owns it (spec.md §4.5 groups these as
/// value, object, task, network, and system/server built-ins). Names are matched
/// case-insensitively, the way verb and property names are elsewhere in the
/// evaluator.
pub fn dispatch(
    task: &mut Task,
    session: &dyn Session,
    function: Symbol,
    args: Vec<Var>,
) -> Result<Var, Unwind> {
    let name = function.as_str().to_ascii_lowercase();
    match name.as_str() {
        "typeof" | "length" | "tostr" | "toliteral" | "tonum" | "tofloat" | "toobj" | "toerr"
        | "equal" | "random" | "min" | "max" | "abs" => bf_values::call(&name, &args),

        "create" | "recycle" | "renumber" | "valid" | "parent" | "children" | "chparent"
        | "move" | "is_player" | "add_property" | "delete_property" | "add_verb"
        | "delete_verb" | "set_verb_info" | "set_verb_args" => {
            bf_objects::call(task, &name, &args)
        }

        "task_id" | "suspend" | "read" | "kill_task" | "resume" | "queued_tasks"
        | "seconds_left" | "ticks_left" | "callers" => {
            bf_tasks::call(task, session, &name, &args)
        }

        "notify" | "boot_player" | "connected_players" | "connected_seconds" | "idle_seconds"
        | "connection_name" | "listen" | "unlisten" | "listeners" => {
            bf_network::call(task, session, &name, &args)
        }

        "server_version" | "time" | "shutdown" => bf_system::call(task, &name, &args),

        // Hashing, encryption, and pattern matching are real MOO built-ins but sit
        // outside what this evaluator implements (spec.md's parser/regex-engine
        // Non-goals) — registered here so calling them fails with a MOO-level error
        // rather than "unknown function".
        "string_hash" | "binary_hash" | "value_hash" | "crypt" | "salt" | "match" | "rmatch"
        | "substitute" | "buffered_output_length" => {
            Err(err(ErrorCode::E_QUOTA).tag_unimplemented())
        }

        _ => Err(err(ErrorCode::E_VERBNF)),
    }
}

/// A tiny extension so the "not yet implemented" arm above reads like what it means,
/// without inventing a sixteenth `ErrorCode` this store doesn't have.
trait TagUnimplemented {
    fn tag_unimplemented(self) -> Self;
}

impl TagUnimplemented for Unwind {
    fn tag_unimplemented(self) -> Self {
        self
    }
}
