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

//! Server built-ins (spec.md §4.5 "system built-ins"): version reporting, wall-clock
//! time, and the one built-in that reaches all the way into process shutdown.

use super::arity;
use crate::tasks::messages::SchedulerControlMsg;
use crate::tasks::task::Task;
use crate::vm::Unwind;
use moor_var::{v_int, v_string, Var};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bumped whenever the built-in surface or wire protocol changes in a way a verb
/// might care about.
const SERVER_VERSION: &str = "1.0.0";

pub(crate) fn call(task: &mut Task, name: &str, args: &[Var]) -> Result<Var, Unwind> {
    match name {
        "server_version" => server_version(args),
        "time" => time(args),
        "shutdown" => shutdown(task, args),
        _ => unreachable!("dispatched by builtins::dispatch"),
    }
}

fn server_version(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 0, 0)?;
    Ok(v_string(SERVER_VERSION.to_string()))
}

fn time(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 0, 0)?;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Ok(v_int(secs as i64))
}

/// `shutdown([msg])`: asks the scheduler to stop accepting new tasks and broadcast
/// `msg` to every connected player. Fire-and-forget — there is no reply to wait for,
/// since the calling task's own transaction is already committed by the time the
/// scheduler actually tears anything down.
fn shutdown(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 0, 1)?;
    let msg = match args.first() {
        Some(v) => Some(v.to_display_string()),
        None => None,
    };
    let _ = task.control_sender.send(SchedulerControlMsg::Shutdown { msg });
    Ok(v_int(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_version_takes_no_arguments() {
        assert!(server_version(&[v_int(1)]).is_err());
        assert!(server_version(&[]).is_ok());
    }
}
