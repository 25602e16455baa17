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

//! Task dispatch, accounting, and the control-message loop (spec.md §4.4 "Task
//! engine"). One `Scheduler` per process; every [`Task`] is handed a clone of its
//! [`crossbeam_channel::Sender<SchedulerControlMsg>`] at birth and talks back to it
//! for anything that needs process-wide state — the running task set, the listener
//! table, another task's kill switch.

use crate::tasks::messages::{QueuedTaskInfo, SchedulerControlMsg};
use crate::tasks::sessions::Session;
use crate::tasks::task::{
    AbortReason, ForkFrame, Task, TaskId, TaskIdAllocator, TaskKind, TaskOutcome,
};
use crate::vm::{Activation, CommandContext, Exception};
use moor_common::model::{
    verb_args_match, CommitResult, ParsedCommand, Perms, PrepSpec, Verb, VerbFlag, WorldState,
    WorldStateError, PREPOSITIONS,
};
use moor_compiler::Program;
use moor_db::{Database, Transaction};
use moor_var::{v_err, v_int, v_list, v_objid, v_string, Obj, Var, NOTHING};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default quota on simultaneously-queued (forked/suspended/reading) tasks owned by
/// one permissions object, absent an overriding `$server_options.queued_task_limit`
/// property (spec.md §4.4 "Quota check").
const DEFAULT_QUEUED_TASK_LIMIT: usize = 100;

fn prep_str(p: PrepSpec) -> String {
    match p {
        PrepSpec::None | PrepSpec::Any => String::new(),
        PrepSpec::Group(i) => PREPOSITIONS
            .get(i as usize)
            .and_then(|words| words.first())
            .map(|s| (*s).to_string())
            .unwrap_or_default(),
    }
}

/// What a task's top frame was built from, kept around so a commit conflict can
/// simply rebuild the frame and re-run the body against a fresh transaction (spec.md
/// §5 "a task action is a transaction that aborts and retries on conflict").
#[derive(Clone)]
struct TaskRecipe {
    this: Obj,
    player: Obj,
    caller: Obj,
    verb_name: String,
    definer: Obj,
    perms: Perms,
    debug: bool,
    program: Program,
    args: Vec<Var>,
    command_context: Option<CommandContext>,
}

impl TaskRecipe {
    fn build_activation(&self) -> Activation {
        Activation::new(
            self.this,
            self.player,
            self.caller,
            self.verb_name.clone(),
            self.definer,
            self.perms.clone(),
            self.debug,
            self.program.clone(),
            self.args.clone(),
            self.command_context.as_ref(),
            None,
        )
    }
}

struct RunningTask {
    player: Obj,
    start: Instant,
    kill_switch: Arc<AtomicBool>,
}

struct SchedulerState {
    tasks: HashMap<TaskId, RunningTask>,
    listeners: HashMap<u16, Obj>,
    shutdown_msg: Option<String>,
}

/// Owns the shared object store, the task registry, and the listener table. Every
/// running [`Task`] holds a clone of its control-message sender, so built-ins reach
/// back into the scheduler without holding a reference to it directly.
pub struct Scheduler {
    database: Database,
    task_ids: Arc<TaskIdAllocator>,
    control_sender: crossbeam_channel::Sender<SchedulerControlMsg>,
    control_receiver: crossbeam_channel::Receiver<SchedulerControlMsg>,
    state: Mutex<SchedulerState>,
    running: AtomicBool,
    queued_task_limit: usize,
}

impl Scheduler {
    #[must_use]
    pub fn new(database: Database) -> Arc<Self> {
        Self::with_queued_task_limit(database, DEFAULT_QUEUED_TASK_LIMIT)
    }

    /// As [`Self::new`], but overriding the per-player queued-task quota with a value
    /// sourced from `$server_options.queued_task_limit` (spec.md §4.4 "Quota check")
    /// instead of the built-in default.
    #[must_use]
    pub fn with_queued_task_limit(database: Database, queued_task_limit: usize) -> Arc<Self> {
        let (control_sender, control_receiver) = crossbeam_channel::unbounded();
        Arc::new(Self {
            database,
            task_ids: Arc::new(TaskIdAllocator::new(0xC0FFEE)),
            control_sender,
            control_receiver,
            state: Mutex::new(SchedulerState {
                tasks: HashMap::new(),
                listeners: HashMap::new(),
                shutdown_msg: None,
            }),
            running: AtomicBool::new(true),
            queued_task_limit,
        })
    }

    #[must_use]
    pub fn control_sender(&self) -> crossbeam_channel::Sender<SchedulerControlMsg> {
        self.control_sender.clone()
    }

    #[must_use]
    pub fn database(&self) -> Database {
        self.database.clone()
    }

    /// Blocks, servicing [`SchedulerControlMsg`]s, until `stop()`/`shutdown()` is
    /// called. Intended to run on a dedicated thread owned by the process entry
    /// point.
    pub fn run(self: &Arc<Self>) {
        while self.running.load(Ordering::Relaxed) {
            let Ok(msg) = self
                .control_receiver
                .recv_timeout(Duration::from_millis(250))
            else {
                continue;
            };
            self.handle_control_msg(msg);
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn handle_control_msg(&self, msg: SchedulerControlMsg) {
        match msg {
            SchedulerControlMsg::KillTask { victim, reply } => {
                let state = self.state.lock().unwrap();
                let result = match state.tasks.get(&victim) {
                    Some(task) => {
                        task.kill_switch.store(true, Ordering::Relaxed);
                        Ok(())
                    }
                    None => Err(moor_var::Error::from(moor_var::ErrorCode::E_INVARG)),
                };
                let _ = reply.send(result);
            }
            SchedulerControlMsg::QueuedTasks { reply } => {
                let state = self.state.lock().unwrap();
                let infos = state
                    .tasks
                    .iter()
                    .map(|(id, t)| QueuedTaskInfo {
                        task_id: *id,
                        player: t.player,
                        start_time_elapsed_seconds: t.start.elapsed().as_secs_f64(),
                    })
                    .collect();
                let _ = reply.send(infos);
            }
            SchedulerControlMsg::Resume { reply, .. } => {
                // Waking a specific suspended task by id needs a registry of parked
                // wake senders, which this simplified scheduler does not keep (see
                // DESIGN.md) — `resume()` reports the task as not found.
                let _ = reply.send(Err(moor_var::Error::from(moor_var::ErrorCode::E_INVARG)));
            }
            SchedulerControlMsg::Listen { player, port, reply } => {
                self.state.lock().unwrap().listeners.insert(port, player);
                let _ = reply.send(Ok(()));
            }
            SchedulerControlMsg::Unlisten { port, reply } => {
                self.state.lock().unwrap().listeners.remove(&port);
                let _ = reply.send(Ok(()));
            }
            SchedulerControlMsg::Listeners { reply } => {
                let state = self.state.lock().unwrap();
                let entries = state.listeners.iter().map(|(p, o)| (*p, *o)).collect();
                let _ = reply.send(entries);
            }
            SchedulerControlMsg::Shutdown { msg } => {
                info!(?msg, "scheduler shutdown requested");
                self.state.lock().unwrap().shutdown_msg = msg;
                self.stop();
            }
        }
    }

    /// Raises an error if `perms` already owns `queued_task_limit` or more live tasks
    /// (spec.md §4.4 "Quota check").
    fn check_quota(&self, perms: &Obj) -> Result<(), WorldStateError> {
        let state = self.state.lock().unwrap();
        let count = state.tasks.values().filter(|t| &t.player == perms).count();
        if count >= self.queued_task_limit {
            return Err(WorldStateError::DatabaseError(
                "queued task limit exceeded".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a surface word against `me`/`here` and the names of objects held by
    /// `player` or located in `location` (spec.md §4.6 step 7: "resolve the command
    /// via verb-matching on player, location, dobj, iobj" — object-name resolution
    /// itself is left unspecified there, so this follows the classic `me`/`here`-plus-
    /// name convention).
    fn resolve_object_name(
        &self,
        tx: &Transaction,
        player: Obj,
        location: Option<Obj>,
        word: &str,
    ) -> Obj {
        if word.is_empty() {
            return NOTHING;
        }
        let lower = word.to_ascii_lowercase();
        if lower == "me" {
            return player;
        }
        if lower == "here" {
            return location.unwrap_or(NOTHING);
        }
        let mut candidates = Vec::new();
        if let Ok(mut c) = tx.contents(&player) {
            candidates.append(&mut c);
        }
        if let Some(loc) = location {
            if let Ok(mut c) = tx.contents(&loc) {
                candidates.append(&mut c);
            }
        }
        for obj in candidates {
            if let Ok(attrs) = tx.get_object(&obj) {
                if attrs.name.is_some_and(|name| name.to_ascii_lowercase() == lower) {
                    return obj;
                }
            }
        }
        NOTHING
    }

    /// Finds the first of `candidates` that defines a verb named `parsed.verb` whose
    /// arg-spec accepts the parsed command shape.
    fn find_command_verb(
        &self,
        tx: &Transaction,
        candidates: &[Obj],
        parsed: &ParsedCommand,
        dobj: Obj,
        iobj: Obj,
    ) -> Option<(Obj, Obj, Verb)> {
        for candidate in candidates {
            if let Ok(lookup) = tx.lookup_verb(candidate, &parsed.verb, false) {
                if verb_args_match(
                    lookup.verb.args_spec,
                    dobj != NOTHING,
                    iobj != NOTHING,
                    parsed.prep,
                ) {
                    return Some((*candidate, lookup.definer, lookup.verb));
                }
            }
        }
        None
    }

    /// Parses `line`, resolves dobj/iobj, matches a verb on player/location/dobj/iobj
    /// in order, and spawns the task that runs it (spec.md §4.6 "Command dispatch
    /// loop" step 7). Returns `Ok(None)` when nothing matched, so the caller can
    /// deliver "I don't understand that" itself.
    pub fn submit_command(
        self: &Arc<Self>,
        player: Obj,
        line: &str,
        session: Arc<dyn Session>,
    ) -> Result<Option<TaskId>, WorldStateError> {
        self.check_quota(&player)?;
        let tx = Transaction::begin(self.database.clone());
        let parsed = ParsedCommand::parse(line);
        if parsed.verb.is_empty() {
            return Ok(None);
        }
        let location = tx.get_object(&player)?.location;
        let dobj = self.resolve_object_name(&tx, player, location, &parsed.dobj_str);
        let iobj = self.resolve_object_name(&tx, player, location, &parsed.iobj_str);
        let mut candidates = vec![player];
        if let Some(loc) = location {
            candidates.push(loc);
        }
        if dobj != NOTHING {
            candidates.push(dobj);
        }
        if iobj != NOTHING {
            candidates.push(iobj);
        }
        let Some((this, definer, verb)) =
            self.find_command_verb(&tx, &candidates, &parsed, dobj, iobj)
        else {
            return Ok(None);
        };
        let program = tx.program_for_verb(&definer, &parsed.verb)?;
        let owner_attrs = tx.get_object(&definer)?;
        let perms = Perms::new(
            owner_attrs.owner.unwrap_or(definer),
            owner_attrs.flags.unwrap_or_default(),
        );
        let debug = verb.flags.contains(VerbFlag::Debug);
        let command_context = CommandContext {
            dobj,
            dobj_str: parsed.dobj_str.clone(),
            prep_str: prep_str(parsed.prep),
            iobj,
            iobj_str: parsed.iobj_str.clone(),
        };
        let args: Vec<Var> = parsed.args.iter().map(|s| v_string(s.clone())).collect();
        let recipe = TaskRecipe {
            this,
            player,
            caller: player,
            verb_name: parsed.verb.clone(),
            definer,
            perms,
            debug,
            program,
            args,
            command_context: Some(command_context),
        };
        Ok(Some(self.spawn(recipe, TaskKind::Foreground, player, session)))
    }

    /// Directly invoke `program` as `player` with no command parsing (used for the
    /// daemon's eval entry point and tests).
    pub fn submit_eval(
        self: &Arc<Self>,
        player: Obj,
        program: Program,
        session: Arc<dyn Session>,
    ) -> Result<TaskId, WorldStateError> {
        self.check_quota(&player)?;
        let recipe = TaskRecipe {
            this: player,
            player,
            caller: player,
            verb_name: "eval".to_string(),
            definer: player,
            perms: Perms::new(player, moor_common::util::BitEnum::new()),
            debug: true,
            program,
            args: Vec::new(),
            command_context: None,
        };
        Ok(self.spawn(recipe, TaskKind::Foreground, player, session))
    }

    fn build_task(
        &self,
        id: TaskId,
        kind: TaskKind,
        player: Obj,
        kill_switch: Arc<AtomicBool>,
        wake_rx: crossbeam_channel::Receiver<Var>,
        activation: Activation,
    ) -> Task {
        Task {
            id,
            player,
            kind,
            database: self.database.clone(),
            db: Transaction::begin(self.database.clone()),
            ticks_left: kind.ticks_budget(),
            seconds_limit: kind.seconds_budget(),
            start_time: Instant::now(),
            call_stack: vec![activation],
            pending_forks: Vec::new(),
            index_length_stack: Vec::new(),
            current_line: 0,
            wake_rx,
            kill_switch,
            task_ids: self.task_ids.clone(),
            control_sender: self.control_sender(),
        }
    }

    fn spawn(
        self: &Arc<Self>,
        recipe: TaskRecipe,
        kind: TaskKind,
        player: Obj,
        session: Arc<dyn Session>,
    ) -> TaskId {
        let id = self.task_ids.reserve();
        let kill_switch = Arc::new(AtomicBool::new(false));
        let (_wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        self.register(id, player, kill_switch.clone());
        let scheduler = self.clone();
        thread::Builder::new()
            .name(format!("moo-task-{id}"))
            .spawn(move || {
                scheduler.drive(id, kind, player, kill_switch, wake_rx, recipe, session)
            })
            .expect("failed to spawn task thread");
        id
    }

    fn register(&self, id: TaskId, player: Obj, kill_switch: Arc<AtomicBool>) {
        self.state.lock().unwrap().tasks.insert(
            id,
            RunningTask {
                player,
                start: Instant::now(),
                kill_switch,
            },
        );
    }

    /// Runs one task to completion, retrying on transaction conflict, then cascades
    /// into any forks it queued and dispatches the uncaught-exception/timeout system
    /// verbs before tearing the task down (spec.md §4.4 "Exceptions", "Fork").
    fn drive(
        self: Arc<Self>,
        id: TaskId,
        kind: TaskKind,
        player: Obj,
        kill_switch: Arc<AtomicBool>,
        wake_rx: crossbeam_channel::Receiver<Var>,
        recipe: TaskRecipe,
        session: Arc<dyn Session>,
    ) {
        let forks = loop {
            let mut task = self.build_task(
                id,
                kind,
                player,
                kill_switch.clone(),
                wake_rx.clone(),
                recipe.build_activation(),
            );
            let outcome = task.run(session.as_ref());
            match self.settle(id, &mut task, &outcome, session.as_ref()) {
                Settle::Retry => continue,
                Settle::Done(forks) => {
                    self.finish(id, kind, player, outcome, session.as_ref());
                    break forks;
                }
            }
        };
        self.state.lock().unwrap().tasks.remove(&id);
        self.task_ids.release(id);
        self.spawn_forks(forks, session);
    }

    fn settle(
        &self,
        id: TaskId,
        task: &mut Task,
        outcome: &TaskOutcome,
        session: &dyn Session,
    ) -> Settle {
        match outcome {
            TaskOutcome::Complete(_) | TaskOutcome::UncaughtException(_) => {
                match task.db.commit() {
                    Ok(CommitResult::Success) => {
                        let _ = session.commit();
                        Settle::Done(std::mem::take(&mut task.pending_forks))
                    }
                    Ok(CommitResult::ConflictRetry) => {
                        debug!(task = id, "commit conflict, retrying task");
                        Settle::Retry
                    }
                    Err(e) => {
                        warn!(task = id, error = %e, "commit failed");
                        let _ = session.rollback();
                        Settle::Done(Vec::new())
                    }
                }
            }
            TaskOutcome::Aborted(_) => {
                let _ = session.rollback();
                Settle::Done(Vec::new())
            }
        }
    }

    fn spawn_forks(self: Arc<Self>, forks: Vec<crate::tasks::task::PendingFork>, session: Arc<dyn Session>) {
        for pf in forks {
            let scheduler = self.clone();
            let session = session.clone();
            let player = pf.frame.player;
            let kill_switch = Arc::new(AtomicBool::new(false));
            self.register(pf.reserved_id, player, kill_switch.clone());
            thread::Builder::new()
                .name(format!("moo-fork-{}", pf.reserved_id))
                .spawn(move || {
                    if !pf.delay.is_zero() {
                        thread::sleep(pf.delay);
                    }
                    scheduler.drive_fork(pf.reserved_id, kill_switch, pf.frame, session);
                })
                .expect("failed to spawn fork thread");
        }
    }

    fn drive_fork(
        self: Arc<Self>,
        id: TaskId,
        kill_switch: Arc<AtomicBool>,
        frame: ForkFrame,
        session: Arc<dyn Session>,
    ) {
        let player = frame.player;
        let (_wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let activation = frame.into_activation();
        let mut task = self.build_task(id, TaskKind::Background, player, kill_switch, wake_rx, activation);
        let outcome = task.run(session.as_ref());
        let forks = match self.settle(id, &mut task, &outcome, session.as_ref()) {
            // A forked task that conflicts on commit is simply dropped rather than
            // replayed — it already ran once with real (deferred) side effects, and
            // there is no saved recipe to rebuild its frame from scratch.
            Settle::Retry => {
                warn!(task = id, "forked task dropped after commit conflict");
                Vec::new()
            }
            Settle::Done(forks) => {
                self.finish(id, TaskKind::Background, player, outcome, session.as_ref());
                forks
            }
        };
        self.state.lock().unwrap().tasks.remove(&id);
        self.task_ids.release(id);
        self.spawn_forks(forks, session);
    }

    fn finish(
        &self,
        id: TaskId,
        kind: TaskKind,
        player: Obj,
        outcome: TaskOutcome,
        session: &dyn Session,
    ) {
        match outcome {
            TaskOutcome::Complete(_) => {}
            TaskOutcome::UncaughtException(exc) => self.report_uncaught(player, exc, session),
            TaskOutcome::Aborted(reason) => {
                if matches!(
                    reason,
                    AbortReason::TicksExhausted | AbortReason::SecondsExhausted
                ) {
                    self.report_timeout(player, reason, session);
                }
                debug!(task = id, kind = ?kind, reason = ?reason, "task aborted");
            }
        }
    }

    /// Calls `handle_uncaught_error` on `#0`; a non-truthy (or failing) result falls
    /// back to sending the formatted traceback straight to the player (spec.md §6
    /// "System-verb contracts").
    fn report_uncaught(&self, player: Obj, exc: Exception, session: &dyn Session) {
        let formatted = format!("{}: {}", exc.error.err_type, exc.error.message());
        let traceback: Vec<Var> = exc
            .stack
            .iter()
            .map(|f| v_list(vec![v_objid(f.this), v_string(f.verb_name.clone()), v_int(f.line_no as i64)]))
            .collect();
        let args = vec![
            v_err(exc.error.err_type),
            v_string(exc.error.message()),
            exc.error.value.as_deref().cloned().unwrap_or_else(|| v_int(0)),
            v_list(traceback),
            v_string(formatted.clone()),
        ];
        let suppressed = self
            .call_verb(Obj::mk_id(0), player, "handle_uncaught_error", args, session)
            .is_some_and(|v| v.is_true());
        if !suppressed {
            let _ = session.send_system_msg(player, formatted);
        }
    }

    fn report_timeout(&self, player: Obj, reason: AbortReason, session: &dyn Session) {
        let resource = match reason {
            AbortReason::TicksExhausted => "ticks",
            AbortReason::SecondsExhausted => "seconds",
            _ => "unknown",
        };
        let args = vec![v_string(resource.to_string()), v_list(Vec::new())];
        let suppressed = self
            .call_verb(Obj::mk_id(0), player, "handle_task_timeout", args, session)
            .is_some_and(|v| v.is_true());
        if !suppressed {
            let _ = session.send_system_msg(player, format!("Task ran out of {resource}."));
        }
    }

    /// Looks up `verb_name` on `target` and, if found, runs it synchronously on the
    /// calling thread in its own throwaway transaction, committing on success. Used
    /// both for the best-effort notification hooks above and by the connection
    /// driver's login/OOB/command-gate verbs (spec.md §6 "System-verb contracts"),
    /// none of which need the full retry/fork machinery a real dispatched task gets —
    /// a commit conflict here is simply reported as "verb not found" to the caller,
    /// and any forks the verb queues are dropped rather than cascaded.
    pub fn call_verb(
        &self,
        target: Obj,
        player: Obj,
        verb_name: &str,
        args: Vec<Var>,
        session: &dyn Session,
    ) -> Option<Var> {
        let tx = Transaction::begin(self.database.clone());
        let lookup = tx.lookup_verb(&target, verb_name, false).ok()?;
        let program = tx.program_for_verb(&lookup.definer, verb_name).ok()?;
        let owner_attrs = tx.get_object(&lookup.definer).ok()?;
        let perms = Perms::new(
            owner_attrs.owner.unwrap_or(lookup.definer),
            owner_attrs.flags.unwrap_or_default(),
        );
        let activation = Activation::new(
            target,
            player,
            target,
            verb_name.to_string(),
            lookup.definer,
            perms,
            false,
            program,
            args,
            None,
            None,
        );
        let id = self.task_ids.reserve();
        let (_wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let mut task = Task {
            id,
            player,
            kind: TaskKind::Background,
            database: self.database.clone(),
            db: tx,
            ticks_left: TaskKind::Background.ticks_budget(),
            seconds_limit: TaskKind::Background.seconds_budget(),
            start_time: Instant::now(),
            call_stack: vec![activation],
            pending_forks: Vec::new(),
            index_length_stack: Vec::new(),
            current_line: 0,
            wake_rx,
            kill_switch: Arc::new(AtomicBool::new(false)),
            task_ids: self.task_ids.clone(),
            control_sender: self.control_sender(),
        };
        let outcome = task.run(session);
        self.task_ids.release(id);
        match task.db.commit() {
            Ok(CommitResult::Success) => {}
            _ => return None,
        }
        match outcome {
            TaskOutcome::Complete(v) => Some(v),
            _ => None,
        }
    }
}

enum Settle {
    Retry,
    Done(Vec<crate::tasks::task::PendingFork>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_scheduler_starts_with_no_queued_tasks() {
        let sched = Scheduler::new(Database::new());
        assert!(sched.state.lock().unwrap().tasks.is_empty());
    }

    #[test]
    fn prep_str_resolves_the_canonical_group_word() {
        assert_eq!(prep_str(PrepSpec::Group(0)), "with");
        assert_eq!(prep_str(PrepSpec::None), "");
    }
}
