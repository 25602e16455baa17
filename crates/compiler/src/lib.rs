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

//! AST types and the compiled [`program::Program`] container `moor-kernel` walks.
//! There is no lexer or parser here: programs are assembled directly, the way a
//! stored-verb loader or a test fixture builds one.

pub mod ast;
pub mod names;
pub mod program;

pub use ast::{
    Arg, BinaryOp, CatchCodes, CondArm, ExceptArm, Expr, ScatterItem, ScatterKind, Stmt, StmtNode,
    UnaryOp,
};
pub use names::{GlobalName, Name, Names, NamesBuilder};
pub use program::Program;
