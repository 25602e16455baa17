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

//! Seeds a fresh [`Database`] with the one object every world needs before a single
//! connection can log in: object #0, carrying the system verbs spec.md §6's
//! "System-verb contracts" names (`do_login_command` at minimum; the connection
//! driver calls the others best-effort and tolerates their absence).
//!
//! There is no database loader in this build (spec.md's Out-of-scope: "the legacy
//! LambdaMOO/mooR on-disk database file format"), and no source parser either, so
//! these verbs are assembled directly as `Program` ASTs, the way
//! `moor-compiler`'s own builders assemble programs for tests rather than running
//! them through a parser.

use moor_common::model::{
    ObjAttrs, ObjFlag, ObjSpec, Perms, PrepSpec, Verb, VerbArgsSpec, VerbFlag, VerbNames,
    WorldState, WorldStateError,
};
use moor_common::util::BitEnum;
use moor_compiler::{Arg, BinaryOp, CondArm, Expr, NamesBuilder, Program, Stmt, StmtNode};
use moor_db::{Database, Transaction};
use moor_var::{v_int, v_objid, v_str, Obj, Symbol, NOTHING, SYSTEM_OBJECT};

fn bootstrap_perms() -> Perms {
    Perms::new(
        SYSTEM_OBJECT,
        BitEnum::new_with(ObjFlag::Wizard) | ObjFlag::Programmer,
    )
}

fn call(function: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        function: Symbol::mk(function),
        args: args.into_iter().map(Arg::Normal).collect(),
    }
}

fn list(items: Vec<Expr>) -> Expr {
    Expr::List(items.into_iter().map(Arg::Normal).collect())
}

fn stmt(node: StmtNode, line_no: usize) -> Stmt {
    Stmt::new(node, line_no)
}

/// `do_login_command(args)`: `args` is the unparsed command line's words (spec.md
/// §4.6 "login flow"). `connect <name>`/`create <name>` are the only two forms
/// understood — matching an existing player by its `name` property, or minting a
/// fresh one. Anything else, or a name that doesn't match, re-prompts by returning a
/// list shorter than two elements, which the connection driver treats as "stay
/// unauthenticated".
fn do_login_command_program() -> Program {
    let mut names = NamesBuilder::new();
    let args = names.find("args").unwrap();
    let player = names.find("player").unwrap();
    let n = names.declare("n");
    let cmd = names.declare("cmd");
    let pname = names.declare("pname");
    let new = names.declare("new");
    let p = names.declare("p");

    let id = |name: moor_compiler::Name| Expr::Id(name);
    let lit_str = |s: &str| Expr::Value(v_str(s));

    let body = vec![
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(id(n)),
                right: Box::new(call("length", vec![id(args)])),
            }),
            1,
        ),
        stmt(
            StmtNode::Cond {
                arms: vec![CondArm {
                    condition: Expr::Binary(BinaryOp::Lt, Box::new(id(n)), Box::new(Expr::Value(v_int(2)))),
                    statements: vec![
                        stmt(
                            StmtNode::Expr(call(
                                "notify",
                                vec![id(player), lit_str("Usage: connect <name> | create <name>")],
                            )),
                            2,
                        ),
                        stmt(StmtNode::Return(Some(list(vec![]))), 2),
                    ],
                }],
                otherwise: vec![],
            },
            2,
        ),
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(id(cmd)),
                right: Box::new(Expr::Index(Box::new(id(args)), Box::new(Expr::Value(v_int(1))))),
            }),
            3,
        ),
        stmt(
            StmtNode::Expr(Expr::Assign {
                left: Box::new(id(pname)),
                right: Box::new(Expr::Index(Box::new(id(args)), Box::new(Expr::Value(v_int(2))))),
            }),
            4,
        ),
        stmt(
            StmtNode::Cond {
                arms: vec![CondArm {
                    condition: Expr::Binary(BinaryOp::Eq, Box::new(id(cmd)), Box::new(lit_str("create"))),
                    statements: vec![
                        stmt(
                            StmtNode::Expr(Expr::Assign {
                                left: Box::new(id(new)),
                                right: Box::new(call("create", vec![Expr::Value(v_objid(NOTHING))])),
                            }),
                            5,
                        ),
                        stmt(
                            StmtNode::Expr(call(
                                "add_property",
                                vec![
                                    id(new),
                                    lit_str("name"),
                                    id(pname),
                                    list(vec![id(new), lit_str("rc")]),
                                ],
                            )),
                            6,
                        ),
                        stmt(
                            StmtNode::Return(Some(list(vec![id(new), id(new)]))),
                            7,
                        ),
                    ],
                }],
                otherwise: vec![
                    stmt(
                        StmtNode::ForList {
                            id: p,
                            expr: call("children", vec![Expr::Value(v_objid(SYSTEM_OBJECT))]),
                            body: vec![stmt(
                                StmtNode::Cond {
                                    arms: vec![CondArm {
                                        condition: Expr::Binary(
                                            BinaryOp::Eq,
                                            Box::new(Expr::Prop {
                                                location: Box::new(id(p)),
                                                property: Box::new(lit_str("name")),
                                            }),
                                            Box::new(id(pname)),
                                        ),
                                        statements: vec![stmt(
                                            StmtNode::Return(Some(list(vec![
                                                Expr::Value(v_int(0)),
                                                id(p),
                                            ]))),
                                            9,
                                        )],
                                    }],
                                    otherwise: vec![],
                                },
                                9,
                            )],
                        },
                        8,
                    ),
                    stmt(
                        StmtNode::Expr(call("notify", vec![id(player), lit_str("No such player.")])),
                        10,
                    ),
                    stmt(StmtNode::Return(Some(list(vec![]))), 11),
                ],
            },
            5,
        ),
    ];

    Program::new(body, names.build())
}

/// `user_created(player)`/`user_connected(player)`/`user_reconnected(player)`: a
/// one-line greeting. Real worlds hang room-announcement logic off these; this
/// build's bootstrap world has no rooms to announce into.
fn greeting_program(message: &str) -> Program {
    let mut names = NamesBuilder::new();
    let args = names.find("args").unwrap();
    let body = vec![stmt(
        StmtNode::Expr(Expr::Call {
            function: Symbol::mk("notify"),
            args: vec![
                Arg::Normal(Expr::Index(
                    Box::new(Expr::Id(args)),
                    Box::new(Expr::Value(v_int(1))),
                )),
                Arg::Normal(Expr::Value(v_str(message))),
            ],
        }),
        1,
    )];
    Program::new(body, names.build())
}

fn install_verb(
    tx: &mut Transaction,
    perms: &Perms,
    obj: Obj,
    name: &str,
    program: Program,
) -> Result<(), WorldStateError> {
    let verb = Verb {
        names: VerbNames::parse(name),
        owner: obj,
        flags: BitEnum::new_with(VerbFlag::Exec) | VerbFlag::Read,
        args_spec: VerbArgsSpec {
            dobj: ObjSpec::None,
            prep: PrepSpec::None,
            iobj: ObjSpec::None,
        },
    };
    tx.add_verb(perms, &obj, verb)?;
    tx.set_verb_program(perms, &obj, name, program)?;
    Ok(())
}

/// Seeds `db` with object #0 and its system verbs. Only ever meant to run once,
/// against an empty [`Database`] — see `crates/daemon::main` for the "start fresh
/// every run" policy this build adopts in place of persistence.
pub fn bootstrap(db: Database) -> Result<(), WorldStateError> {
    let mut tx = Transaction::begin(db);
    let perms = bootstrap_perms();

    let mut attrs = ObjAttrs::new();
    attrs.name = Some("System Object".to_string());
    attrs.owner = Some(SYSTEM_OBJECT);
    attrs.flags = Some(BitEnum::new_with(ObjFlag::Wizard) | ObjFlag::Programmer);
    let system = tx.create_object(&perms, attrs)?;
    debug_assert_eq!(system, SYSTEM_OBJECT, "bootstrap must be the first object created");

    install_verb(&mut tx, &perms, system, "do_login_command", do_login_command_program())?;
    install_verb(
        &mut tx,
        &perms,
        system,
        "user_created",
        greeting_program("*** Created ***"),
    )?;
    install_verb(
        &mut tx,
        &perms,
        system,
        "user_connected",
        greeting_program("*** Connected ***"),
    )?;
    install_verb(
        &mut tx,
        &perms,
        system,
        "user_reconnected",
        greeting_program("*** Reconnected ***"),
    )?;

    match tx.commit()? {
        moor_common::model::CommitResult::Success => Ok(()),
        moor_common::model::CommitResult::ConflictRetry => {
            unreachable!("nothing else can be writing to a database that was just created")
        }
    }
}
