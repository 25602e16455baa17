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

//! A single task: a call stack executing against its own transaction, on its own OS
//! thread (spec.md §4.4 "Task"). `moor-kernel` runs one task per thread rather than
//! multiplexing many tasks cooperatively on a pool, so that `suspend()`/`read()` can
//! park the real call stack in place instead of needing to serialize a continuation
//! (see `DESIGN.md` for the tradeoff this buys and costs).

use crate::tasks::messages::SchedulerControlMsg;
use crate::vm::{Activation, Exception, Unwind};
use moor_common::model::{Perms, WorldState, WorldStateError};
use moor_compiler::Program;
use moor_db::{Database, Transaction};
use moor_var::{Obj, Var, v_err, v_int};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub type TaskId = i32;

/// Foreground tasks (direct command input) get a more generous budget than
/// background tasks (forked/suspended work) — spec.md §4.4 "Tick and time limits".
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TaskKind {
    Foreground,
    Background,
}

impl TaskKind {
    #[must_use]
    pub fn ticks_budget(self) -> i64 {
        match self {
            TaskKind::Foreground => 30_000,
            TaskKind::Background => 15_000,
        }
    }

    #[must_use]
    pub fn seconds_budget(self) -> u64 {
        match self {
            TaskKind::Foreground => 5,
            TaskKind::Background => 3,
        }
    }
}

/// The deepest a call stack may go before `E_MAXREC` (spec.md §4.4).
pub const MAX_STACK_DEPTH: usize = 50;

/// Why a task stopped without running to a normal `return`/fall-through.
#[derive(Debug, Clone)]
pub enum AbortReason {
    TicksExhausted,
    SecondsExhausted,
    Killed,
    /// A `break`/`continue` escaped every loop in the task — a malformed program, not
    /// a reachable outcome for anything the compiler would actually hand the VM.
    UnhandledControlFlow,
}

/// The result of running a task to the point it stops executing (spec.md §4.4 "Task
/// lifecycle": `Complete`/`Aborted`).
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Complete(Var),
    /// Propagated to the scheduler so it can call the world's `handle_uncaught_error`
    /// verb (spec.md §4.4 "Debug handling").
    UncaughtException(Exception),
    Aborted(AbortReason),
}

/// A task-id allocator shared by every `Task` spawned from one `Scheduler`
/// (spec.md §4.4 "Task": "a 32-bit task id"). Fork statements need a collision-free id
/// *immediately*, before the parent's transaction even commits, so the id can be bound
/// to the fork's `id` variable right away.
pub struct TaskIdAllocator {
    inner: Mutex<(StdRng, HashSet<TaskId>)>,
}

impl TaskIdAllocator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new((StdRng::seed_from_u64(seed), HashSet::new())),
        }
    }

    pub fn reserve(&self) -> TaskId {
        let mut guard = self.inner.lock().unwrap();
        loop {
            let candidate = guard.0.gen_range(1..i32::MAX);
            if guard.1.insert(candidate) {
                return candidate;
            }
        }
    }

    pub fn release(&self, id: TaskId) {
        self.inner.lock().unwrap().1.remove(&id);
    }
}

/// A frame ready to become the sole entry on a freshly spawned task's call stack —
/// the fork statement builds one by snapshotting the forking frame's environment
/// (spec.md §4.4 "Fork": the new task starts with a copy of the forking frame's
/// variables).
#[derive(Clone)]
pub struct ForkFrame {
    pub this: Obj,
    pub player: Obj,
    pub caller: Obj,
    pub verb_name: String,
    pub definer: Obj,
    pub perms: Perms,
    pub debug: bool,
    pub program: Program,
    pub env: Vec<Var>,
}

impl ForkFrame {
    #[must_use]
    pub fn into_activation(self) -> Activation {
        Activation {
            this: self.this,
            player: self.player,
            caller: self.caller,
            verb_name: self.verb_name,
            definer: self.definer,
            perms: self.perms,
            debug: self.debug,
            program: self.program,
            env: self.env,
        }
    }
}

/// A fork statement's payload, collected on [`Task`] while the forking task runs and
/// only realized by the scheduler once that task's transaction actually commits
/// (spec.md §4.4 "Fork": "If the parent aborts, the forked task never starts").
pub struct PendingFork {
    pub reserved_id: TaskId,
    pub delay: Duration,
    pub frame: ForkFrame,
}

/// A single task.
pub struct Task {
    pub id: TaskId,
    pub player: Obj,
    pub kind: TaskKind,
    pub database: Database,
    pub db: Transaction,
    pub ticks_left: i64,
    pub seconds_limit: u64,
    pub start_time: Instant,
    pub call_stack: Vec<Activation>,
    pub pending_forks: Vec<PendingFork>,
    /// Pushed/popped around evaluating an `Index`/`Range` expression's subscript, so
    /// `Expr::Length` (the `$` token) can read the enclosing sequence's length
    /// (spec.md §4.1 "Index length").
    pub index_length_stack: Vec<i64>,
    pub current_line: usize,
    /// The value a blocked `read()` call is woken with; `suspend()` reuses it as a
    /// generic wake channel (spec.md §4.4 "Suspend"/"Resume").
    pub wake_rx: crossbeam_channel::Receiver<Var>,
    pub kill_switch: Arc<AtomicBool>,
    pub task_ids: Arc<TaskIdAllocator>,
    /// Where built-ins send requests that only the scheduler can answer —
    /// `kill_task()`, `queued_tasks()`, `listen()`/`unlisten()` (spec.md §4.5).
    pub control_sender: crossbeam_channel::Sender<SchedulerControlMsg>,
}

impl Task {
    #[must_use]
    pub fn deadline_exceeded(&self) -> bool {
        self.start_time.elapsed() >= Duration::from_secs(self.seconds_limit)
    }

    /// Charge one tick for the statement/expression about to execute, observing the
    /// kill switch and wall-clock deadline at the same checkpoint (spec.md §4.4 "Tick
    /// and time limits").
    pub fn charge_tick(&mut self) -> Result<(), Unwind> {
        if self.kill_switch.load(Ordering::Relaxed) {
            return Err(Unwind::Abort);
        }
        if self.deadline_exceeded() {
            return Err(Unwind::SecondsExhausted);
        }
        self.ticks_left -= 1;
        if self.ticks_left < 0 {
            return Err(Unwind::TicksExhausted);
        }
        Ok(())
    }

    /// Commit the current transaction and begin a fresh one against the same backing
    /// store — the mechanics behind `suspend()`/`read()` (spec.md §4.4 "Suspend": "the
    /// current transaction commits"). Called with the task's native call stack simply
    /// parked at the builtin-call site; resuming continues that same stack rather than
    /// replaying anything.
    pub fn recommit(&mut self) -> Result<(), WorldStateError> {
        loop {
            match self.db.commit()? {
                moor_common::model::CommitResult::Success => break,
                moor_common::model::CommitResult::ConflictRetry => {
                    // A conflicting writer landed between our last read and this
                    // commit. There is no statement left to retry at this point (the
                    // task has already run past it), so the suspend point itself is
                    // simply re-attempted against a fresh transaction.
                    self.db = Transaction::begin(self.database.clone());
                    continue;
                }
            }
        }
        self.db = Transaction::begin(self.database.clone());
        Ok(())
    }

    /// Run the task to completion or suspension, assuming exactly one frame has
    /// already been pushed onto `call_stack` (by `Scheduler::spawn` for a top-level
    /// command/eval task, or from a [`ForkFrame`] for a forked one).
    pub fn run(&mut self, session: &dyn crate::tasks::sessions::Session) -> TaskOutcome {
        debug_assert!(!self.call_stack.is_empty(), "task started with no frame");
        let debug = self.call_stack.last().map_or(true, |a| a.debug);
        let result = self.exec_body(session);
        self.call_stack.pop();
        match result {
            Ok(()) => TaskOutcome::Complete(v_int(0)),
            Err(Unwind::Return(v)) => TaskOutcome::Complete(v),
            Err(Unwind::Exception(exc)) => {
                if debug {
                    TaskOutcome::UncaughtException(exc)
                } else {
                    TaskOutcome::Complete(v_err(exc.error.err_type))
                }
            }
            Err(Unwind::TicksExhausted) => TaskOutcome::Aborted(AbortReason::TicksExhausted),
            Err(Unwind::SecondsExhausted) => TaskOutcome::Aborted(AbortReason::SecondsExhausted),
            Err(Unwind::Abort) => TaskOutcome::Aborted(AbortReason::Killed),
            Err(Unwind::Break(_) | Unwind::Continue(_)) => {
                TaskOutcome::Aborted(AbortReason::UnhandledControlFlow)
            }
        }
    }
}
