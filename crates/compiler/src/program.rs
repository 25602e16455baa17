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

//! The compiled form of a verb body (spec.md §3 "Verb": "a compiled program (the
//! AST produced from source)"). A `Program` is the AST plus the bound variable-name
//! table the evaluator sizes a frame's environment against.

use crate::ast::Stmt;
use crate::names::Names;
use std::sync::Arc;

/// A compiled verb body. Cheaply clonable: the statement tree and name table are
/// shared behind an `Arc` so that invoking the same verb many times does not clone
/// the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Program(Arc<ProgramInner>);

#[derive(Debug, PartialEq)]
struct ProgramInner {
    body: Vec<Stmt>,
    names: Names,
}

impl Program {
    #[must_use]
    pub fn new(body: Vec<Stmt>, names: Names) -> Self {
        Self(Arc::new(ProgramInner { body, names }))
    }

    #[must_use]
    pub fn body(&self) -> &[Stmt] {
        &self.0.body
    }

    #[must_use]
    pub fn names(&self) -> &Names {
        &self.0.names
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NamesBuilder;

    #[test]
    fn empty_program_reports_empty() {
        let program = Program::new(Vec::new(), NamesBuilder::new().build());
        assert!(program.is_empty());
    }

    #[test]
    fn clone_is_cheap_and_shares_state() {
        let program = Program::new(Vec::new(), NamesBuilder::new().build());
        let cloned = program.clone();
        assert_eq!(program, cloned);
    }
}
