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

//! End-to-end evaluator tests: hand-assembled `Program`s run through a real `Task`,
//! the same way `Scheduler::call_verb` runs a looked-up verb, but without a database
//! bootstrap in the way.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use moor_common::model::{ObjFlag, Perms};
use moor_common::util::BitEnum;
use moor_compiler::{BinaryOp, Expr, NamesBuilder, Program, Stmt, StmtNode};
use moor_db::{Database, Transaction};
use moor_kernel::tasks::sessions::NoopSession;
use moor_kernel::tasks::task::{Task, TaskIdAllocator, TaskKind};
use moor_kernel::vm::Activation;
use moor_kernel::TaskOutcome;
use moor_var::{v_int, v_list, v_str, Var, NOTHING};

fn stmt(node: StmtNode, line_no: usize) -> Stmt {
    Stmt::new(node, line_no)
}

fn id(name: moor_compiler::Name) -> Expr {
    Expr::Id(name)
}

/// Runs `program` to completion as a one-off task against a fresh in-memory
/// database, mirroring `Scheduler::call_verb`'s construction but without needing a
/// looked-up verb.
fn run(program: Program) -> TaskOutcome {
    let database = Database::new();
    let tx = Transaction::begin(database.clone());
    let perms = Perms::new(NOTHING, BitEnum::new_with(ObjFlag::Programmer));
    let activation = Activation::new(
        NOTHING,
        NOTHING,
        NOTHING,
        "test".to_string(),
        NOTHING,
        perms,
        true,
        program,
        vec![],
        None,
        None,
    );
    let task_ids = Arc::new(TaskIdAllocator::new(1));
    let id = task_ids.reserve();
    let (_wake_tx, wake_rx) = crossbeam_channel::bounded(1);
    let (control_sender, _control_receiver) = crossbeam_channel::unbounded();
    let mut task = Task {
        id,
        player: NOTHING,
        kind: TaskKind::Foreground,
        database,
        db: tx,
        ticks_left: TaskKind::Foreground.ticks_budget(),
        seconds_limit: TaskKind::Foreground.seconds_budget(),
        start_time: Instant::now(),
        call_stack: vec![activation],
        pending_forks: Vec::new(),
        index_length_stack: Vec::new(),
        current_line: 0,
        wake_rx,
        kill_switch: Arc::new(AtomicBool::new(false)),
        task_ids,
        control_sender,
    };
    let session = NoopSession;
    task.run(&session)
}

fn assoc_list(pairs: &[(&str, i64)]) -> Expr {
    let items = pairs
        .iter()
        .map(|(k, v)| {
            let pair = Expr::List(vec![
                moor_compiler::Arg::Normal(Expr::Value(v_str(k))),
                moor_compiler::Arg::Normal(Expr::Value(v_int(*v))),
            ]);
            moor_compiler::Arg::Normal(pair)
        })
        .collect();
    Expr::List(items)
}

fn expect_complete(outcome: TaskOutcome) -> Var {
    match outcome {
        TaskOutcome::Complete(v) => v,
        other => panic!("expected Complete, got {other:?}"),
    }
}

#[test]
fn ordinary_numeric_list_index_still_works() {
    let mut names = NamesBuilder::new();
    let body = vec![stmt(
        StmtNode::Return(Some(Expr::Index(
            Box::new(assoc_list(&[("a", 1), ("b", 2)])),
            Box::new(Expr::Value(v_int(2))),
        ))),
        1,
    )];
    let program = Program::new(body, names.build());
    let result = expect_complete(run(program));
    assert_eq!(result, v_list(vec![v_str("a"), v_int(1)]));
}

#[test]
fn assoc_get_returns_value_for_matching_key() {
    let mut names = NamesBuilder::new();
    let body = vec![stmt(
        StmtNode::Return(Some(Expr::Index(
            Box::new(assoc_list(&[("a", 1), ("b", 2)])),
            Box::new(Expr::Value(v_str("b"))),
        ))),
        1,
    )];
    let program = Program::new(body, names.build());
    let result = expect_complete(run(program));
    assert_eq!(result, v_int(2));
}

#[test]
fn assoc_get_raises_e_range_for_missing_key() {
    let mut names = NamesBuilder::new();
    let body = vec![stmt(
        StmtNode::Return(Some(Expr::Index(
            Box::new(assoc_list(&[("a", 1)])),
            Box::new(Expr::Value(v_str("z"))),
        ))),
        1,
    )];
    let program = Program::new(body, names.build());
    match run(program) {
        TaskOutcome::UncaughtException(exc) => {
            assert_eq!(exc.error.err_type, moor_var::ErrorCode::E_RANGE);
        }
        other => panic!("expected UncaughtException(E_RANGE), got {other:?}"),
    }
}

#[test]
fn assoc_set_replaces_existing_pair() {
    let mut names = NamesBuilder::new();
    let x = names.declare("x");
    let body = vec![
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(id(x)),
                right: Box::new(assoc_list(&[("a", 1)])),
            }),
            1,
        ),
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(Expr::Index(Box::new(id(x)), Box::new(Expr::Value(v_str("a"))))),
                right: Box::new(Expr::Value(v_int(99))),
            }),
            2,
        ),
        stmt(StmtNode::Return(Some(id(x))), 3),
    ];
    let program = Program::new(body, names.build());
    let result = expect_complete(run(program));
    assert_eq!(result, v_list(vec![v_list(vec![v_str("a"), v_int(99)])]));
}

#[test]
fn assoc_set_appends_new_pair_when_key_absent() {
    let mut names = NamesBuilder::new();
    let x = names.declare("x");
    let body = vec![
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(id(x)),
                right: Box::new(assoc_list(&[("a", 1)])),
            }),
            1,
        ),
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(Expr::Index(Box::new(id(x)), Box::new(Expr::Value(v_str("b"))))),
                right: Box::new(Expr::Value(v_int(2))),
            }),
            2,
        ),
        stmt(StmtNode::Return(Some(id(x))), 3),
    ];
    let program = Program::new(body, names.build());
    let result = expect_complete(run(program));
    assert_eq!(
        result,
        v_list(vec![
            v_list(vec![v_str("a"), v_int(1)]),
            v_list(vec![v_str("b"), v_int(2)]),
        ])
    );
}

#[test]
fn arithmetic_still_works_as_a_sanity_check() {
    let mut names = NamesBuilder::new();
    let body = vec![stmt(
        StmtNode::Return(Some(Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Value(v_int(2))),
            Box::new(Expr::Value(v_int(3))),
        ))),
        1,
    )];
    let program = Program::new(body, names.build());
    let result = expect_complete(run(program));
    assert_eq!(result, v_int(5));
}
