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

//! The tree-walking evaluator itself: `exec_body`/`exec_block`/`exec_stmt`/`eval_expr`
//! as inherent methods on [`Task`] (spec.md §4.3 "Evaluation"). There is no bytecode
//! and no separate "VM" struct — a task's call stack, transaction, and tick budget
//! already are the machine state a tree-walker needs, and recursion into
//! `exec_stmt`/`eval_expr` simply rides the host thread's own native call stack
//! (spec.md §9 "Coroutine control flow").

use crate::tasks::sessions::Session;
use crate::tasks::task::{ForkFrame, PendingFork, Task, MAX_STACK_DEPTH};
use crate::vm::activation::Activation;
use crate::vm::unwind::{Exception, TracebackFrame, Unwind};
use moor_common::model::{ObjFlag, Perms, VerbFlag, WorldState, WorldStateError};
use moor_common::util::BitEnum;
use moor_compiler::{
    Arg, BinaryOp, CatchCodes, Expr, Name, Program, ScatterItem, ScatterKind, Stmt, StmtNode,
    UnaryOp,
};
use moor_var::{
    v_error, v_int, v_list, v_list_iter, v_objid, v_str, v_string, Error, ErrorCode, List, Obj,
    Str, Symbol, Var, Variant, NOTHING,
};
use std::time::Duration;

fn as_obj(v: &Var) -> Result<Obj, Error> {
    match v.variant() {
        Variant::Obj(o) => Ok(*o),
        _ => Err(ErrorCode::E_TYPE.into()),
    }
}

fn as_int(v: &Var) -> Result<i64, Error> {
    match v.variant() {
        Variant::Int(i) => Ok(*i),
        _ => Err(ErrorCode::E_TYPE.into()),
    }
}

fn as_str_ref(v: &Var) -> Result<&str, Error> {
    match v.variant() {
        Variant::Str(s) => Ok(s.as_str()),
        _ => Err(ErrorCode::E_TYPE.into()),
    }
}

fn as_moo_str(v: &Var) -> Result<&Str, Error> {
    match v.variant() {
        Variant::Str(s) => Ok(s),
        _ => Err(ErrorCode::E_TYPE.into()),
    }
}

fn as_list(v: &Var) -> Result<&List, Error> {
    match v.variant() {
        Variant::List(l) => Ok(l),
        _ => Err(ErrorCode::E_TYPE.into()),
    }
}

/// Is `elem` a well-formed association-list pair — a two-element list whose first
/// element is a string (spec.md §3 "Value": "Association-list ... a recognized
/// well-formed shape that string indexing detects")?
fn as_assoc_pair(elem: &Var) -> Option<(&Str, &Var)> {
    let Variant::List(pair) = elem.variant() else { return None };
    let slice = pair.as_slice();
    if slice.len() != 2 {
        return None;
    }
    let Variant::Str(key) = slice[0].variant() else { return None };
    Some((key, &slice[1]))
}

/// String-keyed lookup into `l` treated as an association-list: the value half of the
/// first pair whose key matches `key`, or `E_RANGE` if none does (mirroring ordinary
/// list indexing's out-of-bounds error).
fn assoc_get(l: &List, key: &str) -> Result<Var, Error> {
    for elem in l.iter() {
        if let Some((pair_key, value)) = as_assoc_pair(elem) {
            if pair_key.as_str().eq_ignore_ascii_case(key) {
                return Ok(value.clone());
            }
        }
    }
    Err(ErrorCode::E_RANGE.msg("no such key in association list"))
}

/// String-keyed assignment into `l` treated as an association-list: replaces the
/// first pair whose key matches `key`, or appends a new `{key, value}` pair if none
/// does.
fn assoc_set(l: &List, key: &str, value: Var) -> List {
    for (i, elem) in l.iter().enumerate() {
        if let Some((pair_key, _)) = as_assoc_pair(elem) {
            if pair_key.as_str().eq_ignore_ascii_case(key) {
                let pair = v_list(vec![v_str(key), value]);
                return l.set(i, pair).expect("index came from this list's own iter");
            }
        }
    }
    l.push(v_list(vec![v_str(key), value]))
}

/// The result of running a loop body one iteration (spec.md §4.3 "Control flow"):
/// whether to keep looping, or that a `break` targeted this loop.
enum LoopSignal {
    KeepGoing,
    Break,
}

impl Task {
    fn frame(&self) -> &Activation {
        self.call_stack.last().expect("active frame")
    }

    fn frame_mut(&mut self) -> &mut Activation {
        self.call_stack.last_mut().expect("active frame")
    }

    fn get_var(&self, name: Name) -> Var {
        self.frame().env[name.0 as usize].clone()
    }

    fn set_var(&mut self, name: Name, value: Var) {
        self.frame_mut().env[name.0 as usize] = value;
    }

    /// Run the verb body bound to the top-of-stack frame to completion (spec.md §4.3
    /// "Verb call": falling off the end returns `0`).
    pub fn exec_body(&mut self, session: &dyn Session) -> Result<(), Unwind> {
        let program = self.frame().program.clone();
        self.exec_block(session, program.body())
    }

    fn exec_block(&mut self, session: &dyn Session, body: &[Stmt]) -> Result<(), Unwind> {
        for stmt in body {
            self.exec_stmt(session, stmt)?;
        }
        Ok(())
    }

    /// Execute one loop iteration's body, translating `Break`/`Continue` aimed at
    /// this loop (an unlabeled signal always targets the nearest loop; a labeled one
    /// only the loop carrying that same label) into a [`LoopSignal`], and
    /// propagating everything else (spec.md §4.3 "break"/"continue").
    fn exec_loop_body(
        &mut self,
        session: &dyn Session,
        label: Option<Name>,
        body: &[Stmt],
    ) -> Result<LoopSignal, Unwind> {
        match self.exec_block(session, body) {
            Ok(()) => Ok(LoopSignal::KeepGoing),
            Err(Unwind::Break(l)) if l.is_none() || l == label => Ok(LoopSignal::Break),
            Err(Unwind::Continue(l)) if l.is_none() || l == label => Ok(LoopSignal::KeepGoing),
            Err(other) => Err(other),
        }
    }

    fn exec_stmt(&mut self, session: &dyn Session, stmt: &Stmt) -> Result<(), Unwind> {
        self.charge_tick()?;
        self.current_line = stmt.line_no;
        match &stmt.node {
            StmtNode::Cond { arms, otherwise } => {
                for arm in arms {
                    if self.eval_expr(session, &arm.condition)?.is_true() {
                        return self.exec_block(session, &arm.statements);
                    }
                }
                self.exec_block(session, otherwise)
            }
            StmtNode::ForList { id, expr, body } => {
                let list_val = self.eval_expr(session, expr)?;
                let items = as_list(&list_val).map_err(Unwind::from)?.as_slice().to_vec();
                for item in items {
                    self.set_var(*id, item);
                    match self.exec_loop_body(session, None, body)? {
                        LoopSignal::KeepGoing => {}
                        LoopSignal::Break => break,
                    }
                }
                Ok(())
            }
            StmtNode::ForRange { id, from, to, body } => {
                let from_val = self.eval_expr(session, from)?;
                let to_val = self.eval_expr(session, to)?;
                match (from_val.variant(), to_val.variant()) {
                    (Variant::Int(a), Variant::Int(b)) => {
                        let (a, b) = (*a, *b);
                        let mut i = a;
                        while i <= b {
                            self.set_var(*id, v_int(i));
                            match self.exec_loop_body(session, None, body)? {
                                LoopSignal::KeepGoing => {}
                                LoopSignal::Break => break,
                            }
                            i += 1;
                        }
                        Ok(())
                    }
                    (Variant::Obj(a), Variant::Obj(b)) => {
                        let (a, b) = (a.id(), b.id());
                        let mut i = a;
                        while i <= b {
                            self.set_var(*id, v_objid(Obj::mk_id(i)));
                            match self.exec_loop_body(session, None, body)? {
                                LoopSignal::KeepGoing => {}
                                LoopSignal::Break => break,
                            }
                            i += 1;
                        }
                        Ok(())
                    }
                    _ => Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
                }
            }
            StmtNode::While { id, condition, body } => {
                loop {
                    if !self.eval_expr(session, condition)?.is_true() {
                        break;
                    }
                    match self.exec_loop_body(session, *id, body)? {
                        LoopSignal::KeepGoing => {}
                        LoopSignal::Break => break,
                    }
                }
                Ok(())
            }
            StmtNode::Fork { id, time, body } => {
                let delay_val = self.eval_expr(session, time)?;
                let secs = match delay_val.variant() {
                    Variant::Int(i) => *i as f64,
                    Variant::Float(f) => *f,
                    _ => return Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
                };
                let reserved_id = self.task_ids.reserve();
                if let Some(label) = id {
                    self.set_var(*label, v_int(i64::from(reserved_id)));
                }
                let frame = self.frame();
                let program = Program::new(body.clone(), frame.program.names().clone());
                let fork_frame = ForkFrame {
                    this: frame.this,
                    player: frame.player,
                    caller: frame.caller,
                    verb_name: frame.verb_name.clone(),
                    definer: frame.definer,
                    perms: frame.perms.clone(),
                    debug: frame.debug,
                    program,
                    env: frame.env.clone(),
                };
                self.pending_forks.push(PendingFork {
                    reserved_id,
                    delay: Duration::from_secs_f64(secs.max(0.0)),
                    frame: fork_frame,
                });
                Ok(())
            }
            StmtNode::TryExcept { body, excepts } => match self.exec_block(session, body) {
                Ok(()) => Ok(()),
                Err(Unwind::Exception(exc)) => {
                    for arm in excepts {
                        if self.catch_codes_match(session, &arm.codes, &exc.error)? {
                            if let Some(id) = arm.id {
                                let four = self.exception_tuple(&exc);
                                self.set_var(id, four);
                            }
                            return self.exec_block(session, &arm.statements);
                        }
                    }
                    Err(Unwind::Exception(exc))
                }
                Err(other) => Err(other),
            },
            StmtNode::TryFinally { body, handler } => {
                let result = self.exec_block(session, body);
                match self.exec_block(session, handler) {
                    Ok(()) => result,
                    Err(e) => Err(e),
                }
            }
            StmtNode::Break { exit } => Err(Unwind::Break(*exit)),
            StmtNode::Continue { exit } => Err(Unwind::Continue(*exit)),
            StmtNode::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval_expr(session, e)?,
                    None => v_int(0),
                };
                Err(Unwind::Return(value))
            }
            StmtNode::Expr(e) => self.eval_expr(session, e).map(|_| ()),
        }
    }

    fn exception_tuple(&self, exc: &Exception) -> Var {
        let traceback = v_list_iter(exc.stack.iter().map(|f| {
            v_str(&format!("{} (this = {}, line {})", f.verb_name, f.this, f.line_no))
        }));
        let value = exc
            .error
            .value
            .as_ref()
            .map(|b| (**b).clone())
            .unwrap_or_else(|| v_int(0));
        v_list(vec![
            v_error(exc.error.clone()),
            v_str(&exc.error.message()),
            value,
            traceback,
        ])
    }

    /// Does `error` match a `try`/`except` arm's (or a `` ` `` catch expression's)
    /// code list (spec.md §4.3 "try/except": `ANY` or an explicit list of error
    /// codes, compared by code only, not message).
    fn catch_codes_match(
        &mut self,
        session: &dyn Session,
        codes: &CatchCodes,
        error: &Error,
    ) -> Result<bool, Unwind> {
        match codes {
            CatchCodes::Any => Ok(true),
            CatchCodes::Codes(args) => {
                for arg in args {
                    match arg {
                        Arg::Normal(e) => {
                            let v = self.eval_expr(session, e)?;
                            if let Variant::Err(code) = v.variant() {
                                if code.err_type == error.err_type {
                                    return Ok(true);
                                }
                            }
                        }
                        Arg::Splice(e) => {
                            let v = self.eval_expr(session, e)?;
                            let list = as_list(&v).map_err(Unwind::from)?;
                            for item in list.iter() {
                                if let Variant::Err(code) = item.variant() {
                                    if code.err_type == error.err_type {
                                        return Ok(true);
                                    }
                                }
                            }
                        }
                    }
                }
                Ok(false)
            }
        }
    }

    /// Evaluate an argument list, expanding `@expr` splices in place (spec.md §4.1
    /// "Argument splicing").
    fn eval_args(&mut self, session: &dyn Session, args: &[Arg]) -> Result<Vec<Var>, Unwind> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Normal(e) => out.push(self.eval_expr(session, e)?),
                Arg::Splice(e) => {
                    let v = self.eval_expr(session, e)?;
                    let list = as_list(&v).map_err(Unwind::from)?;
                    out.extend(list.iter().cloned());
                }
            }
        }
        Ok(out)
    }

    fn eval_expr(&mut self, session: &dyn Session, expr: &Expr) -> Result<Var, Unwind> {
        match expr {
            Expr::Value(v) => Ok(v.clone()),
            Expr::Id(name) => Ok(self.get_var(*name)),
            Expr::Assign { left, right } => {
                let value = self.eval_expr(session, right)?;
                self.assign(session, left, value.clone())?;
                Ok(value)
            }
            Expr::Binary(op, l, r) => {
                self.charge_tick()?;
                let lv = self.eval_expr(session, l)?;
                let rv = self.eval_expr(session, r)?;
                self.eval_binary(*op, &lv, &rv)
            }
            Expr::And(l, r) => {
                let lv = self.eval_expr(session, l)?;
                if !lv.is_true() {
                    return Ok(lv);
                }
                self.eval_expr(session, r)
            }
            Expr::Or(l, r) => {
                let lv = self.eval_expr(session, l)?;
                if lv.is_true() {
                    return Ok(lv);
                }
                self.eval_expr(session, r)
            }
            Expr::Unary(op, e) => {
                self.charge_tick()?;
                let v = self.eval_expr(session, e)?;
                match op {
                    UnaryOp::Neg => v.negate().map_err(Unwind::from),
                    UnaryOp::Not => Ok(v_int(if v.is_true() { 0 } else { 1 })),
                }
            }
            Expr::Prop { location, property } => {
                self.charge_tick()?;
                let loc = as_obj(&self.eval_expr(session, location)?).map_err(Unwind::from)?;
                let name = self.eval_expr(session, property)?;
                let name = as_str_ref(&name).map_err(Unwind::from)?.to_string();
                self.read_prop(&loc, &name)
            }
            Expr::Verb { location, verb, args } => {
                self.charge_tick()?;
                let loc = self.eval_expr(session, location)?;
                let verb_name = self.eval_expr(session, verb)?;
                let arg_values = self.eval_args(session, args)?;
                let target = as_obj(&loc).map_err(Unwind::from)?;
                let name = as_str_ref(&verb_name).map_err(Unwind::from)?.to_string();
                self.call_verb(session, target, &name, arg_values)
            }
            Expr::Call { function, args } => {
                self.charge_tick()?;
                let arg_values = self.eval_args(session, args)?;
                crate::builtins::dispatch(self, session, *function, arg_values)
            }
            Expr::Pass { args } => {
                self.charge_tick()?;
                let arg_values = self.eval_args(session, args)?;
                let (definer, verb_name, this) = {
                    let frame = self.frame();
                    (frame.definer, frame.verb_name.clone(), frame.this)
                };
                let definer_attrs = self.db.get_object(&definer).map_err(werr)?;
                let parent = definer_attrs.parent.unwrap_or(NOTHING);
                if parent.is_nothing() {
                    return Err(Unwind::from(Error::from(ErrorCode::E_VERBNF)));
                }
                self.call_verb_from(session, parent, this, &verb_name, arg_values)
            }
            Expr::Range { base, from, to } => {
                self.charge_tick()?;
                let base_val = self.eval_expr(session, base)?;
                let len = sequence_len(&base_val).map_err(Unwind::from)?;
                self.index_length_stack.push(len);
                let from_val = self.eval_expr(session, from);
                let to_val = self.eval_expr(session, to);
                self.index_length_stack.pop();
                let from_i = as_int(&from_val?).map_err(Unwind::from)?;
                let to_i = as_int(&to_val?).map_err(Unwind::from)?;
                match base_val.variant() {
                    Variant::List(l) => {
                        let r = l.range(from_i as isize, to_i as isize).map_err(Unwind::from)?;
                        Ok(v_list(r.as_slice().to_vec()))
                    }
                    Variant::Str(s) => {
                        let r = s.range(from_i as isize, to_i as isize).map_err(Unwind::from)?;
                        Ok(v_string(r.as_str().to_string()))
                    }
                    _ => Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
                }
            }
            Expr::Index(base, idx) => {
                self.charge_tick()?;
                let base_val = self.eval_expr(session, base)?;
                let len = sequence_len(&base_val).map_err(Unwind::from)?;
                self.index_length_stack.push(len);
                let idx_val = self.eval_expr(session, idx);
                self.index_length_stack.pop();
                let idx_val = idx_val?;
                // A list indexed by a string is an association-list lookup rather
                // than an out-of-range numeric index (spec.md §3 "Value":
                // Association-list).
                if let (Variant::List(l), Variant::Str(key)) =
                    (base_val.variant(), idx_val.variant())
                {
                    return assoc_get(l, key.as_str()).map_err(Unwind::from);
                }
                let i = as_int(&idx_val).map_err(Unwind::from)?;
                match base_val.variant() {
                    Variant::List(l) => {
                        if i < 1 {
                            return Err(Unwind::from(Error::from(ErrorCode::E_RANGE)));
                        }
                        l.get((i - 1) as usize).map_err(Unwind::from)
                    }
                    Variant::Str(s) => {
                        let c = s.char_at(i).map_err(Unwind::from)?;
                        Ok(v_string(c.as_str().to_string()))
                    }
                    _ => Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
                }
            }
            Expr::Length => {
                let len = *self
                    .index_length_stack
                    .last()
                    .expect("`$` used outside an index/range subscript");
                Ok(v_int(len))
            }
            Expr::Cond { condition, consequence, alternative } => {
                if self.eval_expr(session, condition)?.is_true() {
                    self.eval_expr(session, consequence)
                } else {
                    self.eval_expr(session, alternative)
                }
            }
            Expr::Catch { trye, codes, except } => match self.eval_expr(session, trye) {
                Ok(v) => Ok(v),
                Err(Unwind::Exception(exc)) => {
                    if self.catch_codes_match(session, codes, &exc.error)? {
                        match except {
                            Some(handler) => self.eval_expr(session, handler),
                            None => Ok(v_error(exc.error)),
                        }
                    } else {
                        Err(Unwind::Exception(exc))
                    }
                }
                Err(other) => Err(other),
            },
            Expr::List(args) => {
                let values = self.eval_args(session, args)?;
                Ok(v_list(values))
            }
            Expr::Scatter(items, rhs) => {
                let value = self.eval_expr(session, rhs)?;
                self.scatter_assign(session, items, &value)?;
                Ok(value)
            }
        }
    }

    fn eval_binary(&self, op: BinaryOp, l: &Var, r: &Var) -> Result<Var, Unwind> {
        match op {
            BinaryOp::Add => l.add(r).map_err(Unwind::from),
            BinaryOp::Sub => l.sub(r).map_err(Unwind::from),
            BinaryOp::Mul => l.mul(r).map_err(Unwind::from),
            BinaryOp::Div => l.div(r).map_err(Unwind::from),
            BinaryOp::Mod => l.modulo(r).map_err(Unwind::from),
            BinaryOp::Exp => l.pow(r).map_err(Unwind::from),
            BinaryOp::Eq => Ok(v_int(i64::from(l == r))),
            BinaryOp::NEq => Ok(v_int(i64::from(l != r))),
            BinaryOp::Lt => Ok(v_int(i64::from(
                l.partial_cmp(r).ok_or(ErrorCode::E_TYPE).map_err(Error::from)? == std::cmp::Ordering::Less,
            ))),
            BinaryOp::LtE => Ok(v_int(i64::from(
                l.partial_cmp(r).ok_or(ErrorCode::E_TYPE).map_err(Error::from)? != std::cmp::Ordering::Greater,
            ))),
            BinaryOp::Gt => Ok(v_int(i64::from(
                l.partial_cmp(r).ok_or(ErrorCode::E_TYPE).map_err(Error::from)? == std::cmp::Ordering::Greater,
            ))),
            BinaryOp::GtE => Ok(v_int(i64::from(
                l.partial_cmp(r).ok_or(ErrorCode::E_TYPE).map_err(Error::from)? != std::cmp::Ordering::Less,
            ))),
            BinaryOp::In => match r.variant() {
                Variant::List(list) => match list.index_in(l, false) {
                    Some(idx) => Ok(v_int((idx + 1) as i64)),
                    None => Ok(v_int(0)),
                },
                _ => Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
            },
        }
    }

    /// Store `value` into the lvalue denoted by `target` (spec.md §4.3 "Lvalues"):
    /// a plain identifier, a built-in/ordinary property, or a (possibly nested)
    /// index/range subscript, recursively fetching, rebuilding, and storing the
    /// enclosing container.
    fn assign(&mut self, session: &dyn Session, target: &Expr, value: Var) -> Result<(), Unwind> {
        match target {
            Expr::Id(name) => {
                self.set_var(*name, value);
                Ok(())
            }
            Expr::Prop { location, property } => {
                let loc = as_obj(&self.eval_expr(session, location)?).map_err(Unwind::from)?;
                let name = self.eval_expr(session, property)?;
                let name = as_str_ref(&name).map_err(Unwind::from)?.to_string();
                self.write_prop(&loc, &name, value)
            }
            Expr::Index(base, idx) => {
                let base_val = self.eval_expr(session, base)?;
                let len = sequence_len(&base_val).map_err(Unwind::from)?;
                self.index_length_stack.push(len);
                let idx_val = self.eval_expr(session, idx);
                self.index_length_stack.pop();
                let idx_val = idx_val?;
                if let (Variant::List(l), Variant::Str(key)) =
                    (base_val.variant(), idx_val.variant())
                {
                    let new_list = assoc_set(l, key.as_str(), value);
                    let new_container = v_list(new_list.as_slice().to_vec());
                    return self.assign(session, base, new_container);
                }
                let i = as_int(&idx_val).map_err(Unwind::from)?;
                let new_container = match base_val.variant() {
                    Variant::List(l) => {
                        if i < 1 {
                            return Err(Unwind::from(Error::from(ErrorCode::E_RANGE)));
                        }
                        let new_list = l.set((i - 1) as usize, value).map_err(Unwind::from)?;
                        v_list(new_list.as_slice().to_vec())
                    }
                    Variant::Str(s) => {
                        let single = as_moo_str(&value).map_err(Unwind::from)?;
                        let r = s.set_char(i, single).map_err(Unwind::from)?;
                        v_string(r.as_str().to_string())
                    }
                    _ => return Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
                };
                self.assign(session, base, new_container)
            }
            Expr::Range { base, from, to } => {
                let base_val = self.eval_expr(session, base)?;
                let len = sequence_len(&base_val).map_err(Unwind::from)?;
                self.index_length_stack.push(len);
                let from_val = self.eval_expr(session, from);
                let to_val = self.eval_expr(session, to);
                self.index_length_stack.pop();
                let from_i = as_int(&from_val?).map_err(Unwind::from)?;
                let to_i = as_int(&to_val?).map_err(Unwind::from)?;
                let new_container = match base_val.variant() {
                    Variant::List(l) => {
                        let with = as_list(&value).map_err(Unwind::from)?;
                        let new_list = l
                            .range_set(from_i as isize, to_i as isize, with)
                            .map_err(Unwind::from)?;
                        v_list(new_list.as_slice().to_vec())
                    }
                    Variant::Str(s) => {
                        let with = as_moo_str(&value).map_err(Unwind::from)?;
                        let r = s
                            .range_set(from_i as isize, to_i as isize, with)
                            .map_err(Unwind::from)?;
                        v_string(r.as_str().to_string())
                    }
                    _ => return Err(Unwind::from(Error::from(ErrorCode::E_TYPE))),
                };
                self.assign(session, base, new_container)
            }
            _ => Err(Unwind::from(Error::from(ErrorCode::E_INVARG))),
        }
    }

    /// Read an object property, synthesizing the built-in pseudo-properties (spec.md
    /// §4.2: `name`, `owner`, `location`, `contents`, `programmer`, `wizard`, `r`,
    /// `w`, `f`) that the store does not hold as ordinary property slots, before
    /// falling back to `WorldState::read_property` for anything else.
    fn read_prop(&mut self, location: &Obj, prop_name: &str) -> Result<Var, Unwind> {
        let perms = self.frame().perms.clone();
        let lower = prop_name.to_ascii_lowercase();
        match lower.as_str() {
            "name" => {
                let attrs = self.db.get_object(location).map_err(werr)?;
                Ok(v_string(attrs.name.unwrap_or_default()))
            }
            "owner" => {
                let attrs = self.db.get_object(location).map_err(werr)?;
                Ok(v_objid(attrs.owner.unwrap_or(NOTHING)))
            }
            "location" => {
                let attrs = self.db.get_object(location).map_err(werr)?;
                Ok(v_objid(attrs.location.unwrap_or(NOTHING)))
            }
            "contents" => {
                let contents = self.db.contents(location).map_err(werr)?;
                Ok(v_list_iter(contents.into_iter().map(v_objid)))
            }
            "programmer" => self.read_obj_flag(location, ObjFlag::Programmer),
            "wizard" => self.read_obj_flag(location, ObjFlag::Wizard),
            "r" => self.read_obj_flag(location, ObjFlag::Read),
            "w" => self.read_obj_flag(location, ObjFlag::Write),
            "f" => self.read_obj_flag(location, ObjFlag::Fertile),
            _ => self
                .db
                .read_property(&perms, location, Symbol::mk(prop_name))
                .map_err(werr),
        }
    }

    fn read_obj_flag(&mut self, location: &Obj, flag: ObjFlag) -> Result<Var, Unwind> {
        let attrs = self.db.get_object(location).map_err(werr)?;
        let flags = attrs.flags.unwrap_or_else(BitEnum::new);
        Ok(v_int(i64::from(flags.contains(flag))))
    }

    /// Write an object property, enforcing the built-in pseudo-properties' special
    /// permission rules (spec.md §4.2: `name` is owner-writable unless the object is
    /// a player, in which case only a wizard may rename it; `owner`/`programmer`/
    /// `wizard`/`r`/`w`/`f` are wizard-only; `location`/`contents` are not writable
    /// through the property path at all).
    fn write_prop(&mut self, location: &Obj, prop_name: &str, value: Var) -> Result<(), Unwind> {
        let perms = self.frame().perms.clone();
        let lower = prop_name.to_ascii_lowercase();
        match lower.as_str() {
            "name" => {
                let attrs = self.db.get_object(location).map_err(werr)?;
                let is_player = attrs
                    .flags
                    .unwrap_or_else(BitEnum::new)
                    .contains(ObjFlag::Player);
                if is_player {
                    perms.check_wizard().map_err(werr)?;
                } else {
                    let owner = attrs.owner.unwrap_or(NOTHING);
                    perms.check_obj_owner_perms(&owner).map_err(werr)?;
                }
                let name = as_str_ref(&value).map_err(Unwind::from)?.to_string();
                self.db
                    .set_object_attrs(&perms, location, Some(name), None)
                    .map_err(werr)
            }
            "owner" => {
                perms.check_wizard().map_err(werr)?;
                let new_owner = as_obj(&value).map_err(Unwind::from)?;
                self.db
                    .set_object_attrs(&perms, location, None, Some(new_owner))
                    .map_err(werr)
            }
            "programmer" | "wizard" | "r" | "w" | "f" => {
                perms.check_wizard().map_err(werr)?;
                let attrs = self.db.get_object(location).map_err(werr)?;
                let flags = attrs.flags.unwrap_or_else(BitEnum::new);
                let flag = match lower.as_str() {
                    "programmer" => ObjFlag::Programmer,
                    "wizard" => ObjFlag::Wizard,
                    "r" => ObjFlag::Read,
                    "w" => ObjFlag::Write,
                    "f" => ObjFlag::Fertile,
                    _ => unreachable!(),
                };
                let flags = if value.is_true() {
                    flags.with(flag)
                } else {
                    flags.without(flag)
                };
                self.db.set_object_flags(&perms, location, flags).map_err(werr)
            }
            "location" | "contents" => Err(Unwind::from(ErrorCode::E_PROPNF.msg(
                "location/contents are not writable as properties; use move()",
            ))),
            _ => self
                .db
                .write_property(&perms, location, Symbol::mk(prop_name), value)
                .map_err(werr),
        }
    }

    /// Scatter-assign `value` (which must be a list) across `items` (spec.md §4.1
    /// "Scatter assignment"): required slots must all be filled; optional slots are
    /// filled left-to-right from whatever is left over after satisfying every
    /// required slot, falling back to their default expression (or `0`) once
    /// exhausted; a `@rest` slot, if present, absorbs everything between the
    /// required/optional prefix and whatever a tail of required items after it
    /// needs reserved for itself.
    fn scatter_assign(
        &mut self,
        session: &dyn Session,
        items: &[ScatterItem],
        value: &Var,
    ) -> Result<(), Unwind> {
        let list = as_list(value).map_err(Unwind::from)?;
        let values = list.as_slice();
        let n = values.len();

        let total_required = items.iter().filter(|i| i.kind == ScatterKind::Required).count();
        let total_optional = items.iter().filter(|i| i.kind == ScatterKind::Optional).count();
        let rest_index = items.iter().position(|i| i.kind == ScatterKind::Rest);

        if n < total_required {
            return Err(Unwind::from(Error::from(ErrorCode::E_ARGS)));
        }
        if rest_index.is_none() && n > total_required + total_optional {
            return Err(Unwind::from(Error::from(ErrorCode::E_ARGS)));
        }

        let optional_filled = total_optional.min(n.saturating_sub(total_required));

        let (before, after): (&[ScatterItem], &[ScatterItem]) = match rest_index {
            Some(ri) => (&items[..ri], &items[ri + 1..]),
            None => (items, &[]),
        };

        let mut front_idx = 0usize;
        let mut optional_seen = 0usize;
        for item in before {
            match item.kind {
                ScatterKind::Required => {
                    self.set_var(item.id, values[front_idx].clone());
                    front_idx += 1;
                }
                ScatterKind::Optional => {
                    if optional_seen < optional_filled {
                        self.set_var(item.id, values[front_idx].clone());
                        front_idx += 1;
                    } else if let Some(default_expr) = &item.default {
                        let v = self.eval_expr(session, default_expr)?;
                        self.set_var(item.id, v);
                    } else {
                        self.set_var(item.id, v_int(0));
                    }
                    optional_seen += 1;
                }
                ScatterKind::Rest => unreachable!("rest excluded from `before`"),
            }
        }

        let after_len = after.len();
        let rest_end = n - after_len;
        for (i, item) in after.iter().enumerate() {
            self.set_var(item.id, values[rest_end + i].clone());
        }

        if let Some(ri) = rest_index {
            let rest_slice = values[front_idx..rest_end].to_vec();
            self.set_var(items[ri].id, v_list(rest_slice));
        }

        Ok(())
    }

    /// Resolve and invoke `verb_name` on `target` (spec.md §4.3 "Verb call"):
    /// `target` both receives the call (`this`) and is where the verb search starts.
    fn call_verb(
        &mut self,
        session: &dyn Session,
        target: Obj,
        verb_name: &str,
        args: Vec<Var>,
    ) -> Result<Var, Unwind> {
        let (caller_this, player) = {
            let frame = self.frame();
            (frame.this, frame.player)
        };
        self.invoke_verb(session, target, target, caller_this, player, verb_name, args)
    }

    /// As [`Task::call_verb`], but lets the caller supply a starting-search object
    /// distinct from `this` — used by `pass()` (spec.md §4.3 "pass"), which
    /// continues the search for the *same* verb name at the current definer's
    /// parent while `this` stays bound to the original receiver.
    fn call_verb_from(
        &mut self,
        session: &dyn Session,
        search_start: Obj,
        this: Obj,
        verb_name: &str,
        args: Vec<Var>,
    ) -> Result<Var, Unwind> {
        let (caller_this, player) = {
            let frame = self.frame();
            (frame.this, frame.player)
        };
        self.invoke_verb(session, search_start, this, caller_this, player, verb_name, args)
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke_verb(
        &mut self,
        session: &dyn Session,
        search_start: Obj,
        this: Obj,
        caller: Obj,
        player: Obj,
        verb_name: &str,
        args: Vec<Var>,
    ) -> Result<Var, Unwind> {
        if self.call_stack.len() >= MAX_STACK_DEPTH {
            return Err(Unwind::from(Error::from(ErrorCode::E_MAXREC)));
        }
        let lookup = self
            .db
            .lookup_verb(&search_start, verb_name, false)
            .map_err(werr)?;
        if !lookup.verb.flags.contains(VerbFlag::Exec) {
            return Err(Unwind::from(Error::from(ErrorCode::E_VERBNF)));
        }
        let owner_attrs = self.db.get_object(&lookup.verb.owner).map_err(werr)?;
        let perms = Perms::new(lookup.verb.owner, owner_attrs.flags.unwrap_or_else(BitEnum::new));
        let program = self
            .db
            .program_for_verb(&lookup.definer, verb_name)
            .map_err(werr)?;
        let debug = lookup.verb.flags.contains(VerbFlag::Debug);

        let activation = Activation::new(
            this,
            player,
            caller,
            verb_name.to_string(),
            lookup.definer,
            perms,
            debug,
            program,
            args,
            None,
            self.call_stack.last(),
        );
        self.call_stack.push(activation);
        let result = self.exec_body(session);
        self.call_stack.pop();
        match result {
            Ok(()) => Ok(v_int(0)),
            Err(Unwind::Return(v)) => Ok(v),
            Err(Unwind::Exception(mut exc)) => {
                exc.stack.push(TracebackFrame {
                    this,
                    verb_name: verb_name.to_string(),
                    line_no: self.current_line,
                });
                Err(Unwind::Exception(exc))
            }
            Err(other) => Err(other),
        }
    }
}

fn werr(e: WorldStateError) -> Unwind {
    Unwind::from(Error::from(e))
}

fn sequence_len(v: &Var) -> Result<i64, Error> {
    match v.variant() {
        Variant::List(l) => Ok(l.len() as i64),
        Variant::Str(s) => Ok(s.len() as i64),
        _ => Err(ErrorCode::E_TYPE.into()),
    }
}
