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

use crate::model::objects::{ObjAttrs, ObjFlag};
use crate::model::permissions::Perms;
use crate::model::props::{PropFlag, PropertySlot};
use crate::model::verbs::{Verb, VerbArgsSpec};
use crate::util::BitEnum;
use moor_compiler::Program;
use moor_var::{Error, ErrorCode, Obj, Symbol, Var};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use thiserror::Error;

/// Per-operation call counters for the store, trimmed to the handful of operations
/// worth watching (the teacher's `WorldStatePerf` tracks roughly thirty categories
/// through a metrics-backed `ConcurrentCounter`; there is no metrics exporter in this
/// build, so these are plain atomics a caller can read directly). Shared across every
/// transaction opened against the same database, so the counts accumulate for the
/// life of the process.
#[derive(Debug, Default)]
pub struct WorldStatePerf {
    pub create_object: AtomicU64,
    pub recycle_object: AtomicU64,
    pub retrieve_property: AtomicU64,
    pub get_verb: AtomicU64,
    pub commit: AtomicU64,
}

/// Errors raised by a [`WorldState`] implementation (spec.md §4.2 "World state
/// operations"). Every variant that a built-in can surface to MOO code has a
/// corresponding [`ErrorCode`] via [`WorldStateError::to_error_code`].
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum WorldStateError {
    #[error("object not found: {0}")]
    ObjectNotFound(Obj),
    #[error("recursive move: {0} -> {1}")]
    RecursiveMove(Obj, Obj),
    #[error("permission denied")]
    PermissionDenied,
    #[error("property not found: {0}.{1}")]
    PropertyNotFound(Obj, String),
    #[error("duplicate property definition: {0}.{1}")]
    DuplicatePropertyDefinition(Obj, String),
    #[error("verb not found: {0}:{1}")]
    VerbNotFound(Obj, String),
    #[error("duplicate verb definition: {0}:{1}")]
    DuplicateVerbDefinition(Obj, String),
    #[error("database error: {0}")]
    DatabaseError(String),
    #[error("transaction conflict, retry")]
    RollbackRetry,
}

impl WorldStateError {
    /// The MOO-level error a failed operation should surface (spec.md §3 "Error").
    #[must_use]
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            Self::ObjectNotFound(_) => ErrorCode::E_INVIND,
            Self::RecursiveMove(_, _) => ErrorCode::E_RECMOVE,
            Self::PermissionDenied => ErrorCode::E_PERM,
            Self::PropertyNotFound(_, _) => ErrorCode::E_PROPNF,
            Self::DuplicatePropertyDefinition(_, _) => ErrorCode::E_INVARG,
            Self::VerbNotFound(_, _) => ErrorCode::E_VERBNF,
            Self::DuplicateVerbDefinition(_, _) => ErrorCode::E_INVARG,
            Self::DatabaseError(_) | Self::RollbackRetry => ErrorCode::E_QUOTA,
        }
    }
}

impl From<WorldStateError> for Error {
    fn from(value: WorldStateError) -> Self {
        let msg = value.to_string();
        value.to_error_code().msg(msg)
    }
}

/// The outcome of an attempted commit (spec.md §4.1 "transactional commit").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommitResult {
    Success,
    ConflictRetry,
}

/// A resolved property lookup: the defining object plus the slot found there
/// (spec.md §4.2 "lookup_property" — the handle distinguishes "defined here with
/// no concrete value" from "undefined anywhere in the chain").
#[derive(Debug, Clone)]
pub struct PropertyLookup {
    pub definer: Obj,
    pub slot: PropertySlot,
}

/// A resolved verb lookup: the object that defines the matched verb plus the verb
/// record itself (spec.md §4.2 "lookup_verb").
#[derive(Debug, Clone)]
pub struct VerbLookup {
    pub definer: Obj,
    pub verb: Verb,
}

/// The transactional interface to the object/property/verb store (spec.md §4.2
/// "World state operations"). A single implementation, `InMemoryWorldState`
/// (`moor-db`), backs every task's transaction.
pub trait WorldState {
    fn get_object(&self, obj: &Obj) -> Result<ObjAttrs, WorldStateError>;
    fn valid(&self, obj: &Obj) -> Result<bool, WorldStateError>;

    /// Derived from every object whose `parent` is `obj` (spec.md §3 "Object":
    /// "`children` is the inverse of `parent`").
    fn children(&self, obj: &Obj) -> Result<Vec<Obj>, WorldStateError>;
    /// Derived from every object whose `location` is `obj` (spec.md §3 "Object":
    /// "`contents` is the inverse of `location`").
    fn contents(&self, obj: &Obj) -> Result<Vec<Obj>, WorldStateError>;

    fn create_object(
        &mut self,
        perms: &Perms,
        attrs: ObjAttrs,
    ) -> Result<Obj, WorldStateError>;
    fn recycle_object(&mut self, perms: &Perms, obj: &Obj) -> Result<(), WorldStateError>;
    fn renumber_object(&mut self, perms: &Perms, old: &Obj) -> Result<Obj, WorldStateError>;

    fn chparent(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        new_parent: &Obj,
    ) -> Result<(), WorldStateError>;
    fn move_object(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        new_location: &Obj,
    ) -> Result<(), WorldStateError>;

    fn lookup_property(
        &self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
    ) -> Result<PropertyLookup, WorldStateError>;
    fn read_property(
        &self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
    ) -> Result<Var, WorldStateError>;
    fn write_property(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
        value: Var,
    ) -> Result<(), WorldStateError>;
    fn add_property(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
        owner: Obj,
        flags: BitEnum<PropFlag>,
        value: Option<Var>,
    ) -> Result<(), WorldStateError>;
    fn delete_property(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
    ) -> Result<(), WorldStateError>;

    fn lookup_verb(
        &self,
        obj: &Obj,
        desc: &str,
        numeric_names_allowed: bool,
    ) -> Result<VerbLookup, WorldStateError>;
    fn lookup_verb_with_spec(
        &self,
        obj: &Obj,
        dobj_present: bool,
        args: VerbArgsSpec,
    ) -> Result<VerbLookup, WorldStateError>;
    fn add_verb(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        verb: Verb,
    ) -> Result<(), WorldStateError>;
    fn modify_verb(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        old_name: &str,
        update: Box<dyn FnOnce(&mut Verb)>,
    ) -> Result<(), WorldStateError>;
    fn delete_verb(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: &str,
    ) -> Result<(), WorldStateError>;

    /// The compiled body of the verb named `verb_name` directly on `definer` (spec.md
    /// §3 "Verb": "a compiled program"). `definer` must be the object that actually
    /// holds the verb, i.e. the `definer` returned by `lookup_verb`, not an arbitrary
    /// descendant.
    fn program_for_verb(
        &self,
        definer: &Obj,
        verb_name: &str,
    ) -> Result<Program, WorldStateError>;
    fn set_verb_program(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        verb_name: &str,
        program: Program,
    ) -> Result<(), WorldStateError>;

    fn set_object_flags(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        flags: BitEnum<ObjFlag>,
    ) -> Result<(), WorldStateError>;

    /// Rename an object and/or rechown it (spec.md §4.2's built-in `name`/`owner`
    /// pseudo-properties). `None` leaves that attribute untouched.
    fn set_object_attrs(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Option<String>,
        owner: Option<Obj>,
    ) -> Result<(), WorldStateError>;

    fn commit(&mut self) -> Result<CommitResult, WorldStateError>;
    fn rollback(&mut self) -> Result<(), WorldStateError>;

    /// The store's shared per-operation call counters (see [`WorldStatePerf`]).
    fn perf_counters(&self) -> Arc<WorldStatePerf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_as_spec_requires() {
        assert_eq!(
            WorldStateError::PropertyNotFound(Obj::mk_id(1), "x".into()).to_error_code(),
            ErrorCode::E_PROPNF
        );
        assert_eq!(
            WorldStateError::VerbNotFound(Obj::mk_id(1), "x".into()).to_error_code(),
            ErrorCode::E_VERBNF
        );
        assert_eq!(
            WorldStateError::RecursiveMove(Obj::mk_id(1), Obj::mk_id(2)).to_error_code(),
            ErrorCode::E_RECMOVE
        );
    }
}
