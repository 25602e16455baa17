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

//! The per-object row held by [`crate::database::Database`]. `children` and
//! `contents` are not stored directly (spec.md §3 "Object": "`children` is the
//! inverse of `parent`"); they are derived by scanning at read time.

use moor_common::model::{ObjAttrs, PropertySlot, Verb};
use moor_compiler::Program;
use moor_var::Obj;

#[derive(Debug, Clone)]
pub struct ObjectRow {
    pub id: Obj,
    pub attrs: ObjAttrs,
    pub properties: Vec<PropertySlot>,
    pub verbs: Vec<Verb>,
    /// Parallel to `verbs`: the compiled body for `verbs[i]`, set once a program is
    /// stored (spec.md §3 "Verb": "a compiled program"). `None` for a verb defined
    /// but never programmed.
    pub programs: Vec<Option<Program>>,
    /// Bumped on every write to this row; used for optimistic-conflict detection.
    pub version: u64,
}

impl ObjectRow {
    #[must_use]
    pub fn new(id: Obj, attrs: ObjAttrs) -> Self {
        Self {
            id,
            attrs,
            properties: Vec::new(),
            verbs: Vec::new(),
            programs: Vec::new(),
            version: 0,
        }
    }
}
