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

//! The variable-name table bound into a [`crate::program::Program`] (spec.md §3
//! "Stack frame": "a variable environment keyed by identifier"). Because there is
//! no parser in this crate, there is no lexical-scope binder either: a `Names` table
//! is just the flat list of symbols a frame's environment is sized for, built once
//! when a `Program` is assembled.

use moor_var::Symbol;

/// An index into a frame's variable environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(pub u16);

/// The set of variable names every verb invocation starts with bound (spec.md §4.3
/// "Verb call"): the six type-tag constants used by `typeof()` comparisons, plus the
/// per-invocation context variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::EnumCount, strum::EnumIter, strum::Display)]
#[repr(usize)]
#[allow(non_camel_case_types)]
pub enum GlobalName {
    NUM = 0,
    OBJ,
    STR,
    LIST,
    ERR,
    INT,
    FLOAT,
    player,
    this,
    caller,
    verb,
    args,
    argstr,
    dobj,
    dobjstr,
    prepstr,
    iobj,
    iobjstr,
}

/// A builder for a [`Names`] table: callers declare names in the order they should
/// occupy the environment, then call [`NamesBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct NamesBuilder {
    bound: Vec<Symbol>,
}

impl NamesBuilder {
    #[must_use]
    pub fn new() -> Self {
        use strum::IntoEnumIterator;
        let mut builder = Self { bound: Vec::new() };
        for global in GlobalName::iter() {
            builder.declare(&global.to_string());
        }
        builder
    }

    /// Declare `name`, reusing the existing slot if already declared (MOO variables
    /// are always mutable and always share one slot per verb invocation).
    pub fn declare(&mut self, name: &str) -> Name {
        if let Some(existing) = self.find(name) {
            return existing;
        }
        let idx = self.bound.len();
        self.bound.push(Symbol::mk(name));
        Name(idx as u16)
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<Name> {
        self.bound
            .iter()
            .position(|s| s.as_str().eq_ignore_ascii_case(name))
            .map(|i| Name(i as u16))
    }

    #[must_use]
    pub fn build(self) -> Names {
        let global_width = self.bound.len();
        Names {
            bound: self.bound,
            global_width,
        }
    }
}

/// The bound variable-name table of a [`crate::program::Program`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    bound: Vec<Symbol>,
    global_width: usize,
}

impl Names {
    #[must_use]
    pub fn width(&self) -> usize {
        self.bound.len()
    }

    #[must_use]
    pub fn global_width(&self) -> usize {
        self.global_width
    }

    #[must_use]
    pub fn find_name(&self, name: &str) -> Option<Name> {
        self.bound
            .iter()
            .position(|s| s.as_str().eq_ignore_ascii_case(name))
            .map(|i| Name(i as u16))
    }

    #[must_use]
    pub fn name_of(&self, name: Name) -> Option<Symbol> {
        self.bound.get(name.0 as usize).cloned()
    }

    #[must_use]
    pub fn global(&self, global: GlobalName) -> Name {
        Name(global as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_seeds_the_global_names() {
        let names = NamesBuilder::new().build();
        assert!(names.find_name("player").is_some());
        assert!(names.find_name("dobjstr").is_some());
        assert_eq!(names.width(), names.global_width());
    }

    #[test]
    fn declaring_twice_reuses_the_slot() {
        let mut builder = NamesBuilder::new();
        let a = builder.declare("x");
        let b = builder.declare("x");
        assert_eq!(a, b);
    }

    #[test]
    fn new_locals_extend_past_global_width() {
        let mut builder = NamesBuilder::new();
        let global_width = builder.clone().build().global_width();
        let local = builder.declare("my_local");
        assert!(local.0 as usize >= global_width);
    }
}
