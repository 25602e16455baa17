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

//! The control-plane channel from a running task's built-in calls back to the
//! [`crate::tasks::scheduler::Scheduler`] (spec.md §4.4 "Task engine"). A built-in
//! that needs to see or affect another task, or the listener set, cannot reach
//! those directly — it only has its own `Task` — so it sends a message here and,
//! for anything that must answer, blocks on a one-shot reply channel.

use crate::tasks::task::TaskId;
use moor_var::{Error, Obj};

/// A snapshot of one live task, as reported by `queued_tasks()` (spec.md §4.5
/// "task built-ins").
#[derive(Debug, Clone)]
pub struct QueuedTaskInfo {
    pub task_id: TaskId,
    pub player: Obj,
    pub start_time_elapsed_seconds: f64,
}

/// A request a task's built-in call sends to the scheduler, carrying its own reply
/// channel for anything that isn't fire-and-forget.
pub enum SchedulerControlMsg {
    /// `kill_task(id)` (spec.md §4.5): trip the victim's kill switch.
    KillTask {
        victim: TaskId,
        reply: crossbeam_channel::Sender<Result<(), Error>>,
    },
    /// `queued_tasks()`.
    QueuedTasks {
        reply: crossbeam_channel::Sender<Vec<QueuedTaskInfo>>,
    },
    /// `resume(task_id, value)` — wakes a suspended task, handing it `value` as
    /// the result of the `suspend()` call that parked it.
    Resume {
        victim: TaskId,
        value: moor_var::Var,
        reply: crossbeam_channel::Sender<Result<(), Error>>,
    },
    /// `listen(player, port)` (spec.md §4.5 "network built-ins"): register a new
    /// listening point bound to `player` as the default connect-time object.
    Listen {
        player: Obj,
        port: u16,
        reply: crossbeam_channel::Sender<Result<(), Error>>,
    },
    /// `unlisten(port)`.
    Unlisten {
        port: u16,
        reply: crossbeam_channel::Sender<Result<(), Error>>,
    },
    /// `listeners()`.
    Listeners {
        reply: crossbeam_channel::Sender<Vec<(u16, Obj)>>,
    },
    /// `shutdown([msg])` (spec.md §4.5 "system built-ins").
    Shutdown { msg: Option<String> },
}
