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

//! The object/property/verb data model, permission checks, command matching, and
//! the [`WorldState`] transactional interface (spec.md §3, §4.2).

mod matching;
mod objects;
mod permissions;
mod props;
mod verbs;
mod world_state;

pub use matching::{find_matching_verb, verb_args_match, ParsedCommand};
pub use objects::{ObjAttrs, ObjFlag};
pub use permissions::Perms;
pub use props::{PropFlag, PropertySlot};
pub use verbs::{NameWord, ObjSpec, PrepSpec, Verb, VerbArgsSpec, VerbFlag, VerbNames, PREPOSITIONS};
pub use world_state::{
    CommitResult, PropertyLookup, VerbLookup, WorldState, WorldStateError, WorldStatePerf,
};
