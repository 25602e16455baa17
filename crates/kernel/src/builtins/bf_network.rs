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

//! Connection built-ins (spec.md §4.6 "Connection manager"): everything a verb uses
//! to talk to a player's connection, or to the listener set a `Scheduler` owns.
//! `notify`/`send_system_msg` go straight through the [`Session`] the task was handed;
//! listener management goes through [`SchedulerControlMsg`] since listeners are a
//! scheduler-wide resource, not a per-task one.

use super::{arg_int, arg_obj, arity, err};
use crate::tasks::messages::SchedulerControlMsg;
use crate::tasks::sessions::{Session, SessionError};
use crate::tasks::task::Task;
use crate::vm::Unwind;
use moor_var::{v_float, v_int, v_list, v_list_iter, v_objid, v_string, Error, ErrorCode, Var};

fn werr(e: SessionError) -> Unwind {
    Unwind::from(Error::new(ErrorCode::E_PERM, Some(e.to_string()), None))
}

pub(crate) fn call(
    task: &mut Task,
    session: &dyn Session,
    name: &str,
    args: &[Var],
) -> Result<Var, Unwind> {
    match name {
        "notify" => notify(session, args),
        "boot_player" => boot_player(session, args),
        "connected_players" => connected_players(session, args),
        "connected_seconds" => connected_seconds(session, args),
        "idle_seconds" => idle_seconds(session, args),
        "connection_name" => connection_name(session, args),
        "listen" => listen(task, args),
        "unlisten" => unlisten(task, args),
        "listeners" => listeners(task, args),
        _ => unreachable!("dispatched by builtins::dispatch"),
    }
}

/// `notify(player, text)`: queues a line for delivery once the task's transaction
/// commits (spec.md §4.4 "I/O interrupt": output is deferred, never sent mid-attempt).
fn notify(session: &dyn Session, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    let player = arg_obj(args, 0)?;
    let text = args[1].to_display_string();
    session.send_event(player, text).map_err(werr)?;
    Ok(v_int(1))
}

fn boot_player(session: &dyn Session, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let player = arg_obj(args, 0)?;
    session.disconnect(player).map_err(werr)?;
    Ok(v_int(0))
}

fn connected_players(session: &dyn Session, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 0, 0)?;
    let players = session.connected_players().map_err(werr)?;
    Ok(v_list_iter(players.into_iter().map(v_objid)))
}

fn connected_seconds(session: &dyn Session, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let player = arg_obj(args, 0)?;
    let secs = session.connected_seconds(player).map_err(werr)?;
    Ok(v_float(secs))
}

fn idle_seconds(session: &dyn Session, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let player = arg_obj(args, 0)?;
    let secs = session.idle_seconds(player).map_err(werr)?;
    Ok(v_float(secs))
}

fn connection_name(session: &dyn Session, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let player = arg_obj(args, 0)?;
    let name = session.connection_name(player).map_err(werr)?;
    Ok(v_string(name))
}

/// `listen(player, port)`: registers a new listener with the scheduler (spec.md §4.6
/// "Listeners"). The caller's own connection keeps running; this only affects future
/// incoming connections on `port`.
fn listen(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    let player = arg_obj(args, 0)?;
    let port = arg_int(args, 1)? as u16;
    let (reply, recv) = crossbeam_channel::bounded(1);
    task.control_sender
        .send(SchedulerControlMsg::Listen { player, port, reply })
        .map_err(|_| err(ErrorCode::E_QUOTA))?;
    recv.recv()
        .map_err(|_| err(ErrorCode::E_QUOTA))?
        .map_err(Unwind::from)?;
    Ok(v_int(0))
}

fn unlisten(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let port = arg_int(args, 0)? as u16;
    let (reply, recv) = crossbeam_channel::bounded(1);
    task.control_sender
        .send(SchedulerControlMsg::Unlisten { port, reply })
        .map_err(|_| err(ErrorCode::E_QUOTA))?;
    recv.recv()
        .map_err(|_| err(ErrorCode::E_QUOTA))?
        .map_err(Unwind::from)?;
    Ok(v_int(0))
}

fn listeners(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 0, 0)?;
    let (reply, recv) = crossbeam_channel::bounded(1);
    task.control_sender
        .send(SchedulerControlMsg::Listeners { reply })
        .map_err(|_| err(ErrorCode::E_QUOTA))?;
    let entries = recv.recv().map_err(|_| err(ErrorCode::E_QUOTA))?;
    Ok(v_list_iter(
        entries
            .into_iter()
            .map(|(port, player)| v_list(vec![v_int(i64::from(port)), v_objid(player)])),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_checks_reject_the_wrong_argument_count() {
        assert!(arity(&[], 2, 2).is_err());
        assert!(arity(&[v_int(1), v_int(2)], 2, 2).is_ok());
    }
}
