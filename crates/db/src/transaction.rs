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

//! A single task's view of the store (spec.md §4.2 "Concurrency discipline": "each
//! task runs inside a single transaction; on read/write conflict the transaction is
//! retried by the runtime"). Reads are served from a private copy-on-write overlay
//! over the shared [`crate::database::Database`]; writes land only in the overlay
//! until [`Transaction::commit`] validates and publishes them. The overlay lives
//! behind `RefCell`s so that read-only `WorldState` methods (`&self`) can still
//! lazily populate the cache.

use crate::database::Database;
use crate::object_row::ObjectRow;
use moor_common::model::{
    verb_args_match, CommitResult, ObjAttrs, ObjFlag, Perms, PropFlag, PropertyLookup,
    PropertySlot, Verb, VerbArgsSpec, VerbLookup, WorldState, WorldStateError, WorldStatePerf,
};
use moor_common::util::BitEnum;
use moor_compiler::Program;
use moor_var::{Obj, Symbol, Var};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub struct Transaction {
    db: Database,
    /// Row version observed at the moment of first read, per object id.
    read_versions: RefCell<HashMap<i64, u64>>,
    /// Working copy of every row touched this transaction. `None` means deleted.
    local: RefCell<HashMap<i64, Option<ObjectRow>>>,
    /// Object ids actually mutated (as opposed to merely read) this transaction.
    dirty: HashSet<i64>,
    players: HashSet<Obj>,
    players_dirty: bool,
    max_object_id: i64,
    perf: Arc<WorldStatePerf>,
}

impl Transaction {
    #[must_use]
    pub fn begin(db: Database) -> Self {
        let data = db.inner.read();
        let players = data.players.clone();
        let max_object_id = data.max_object_id;
        drop(data);
        let perf = db.perf.clone();
        Self {
            db,
            read_versions: RefCell::new(HashMap::new()),
            local: RefCell::new(HashMap::new()),
            dirty: HashSet::new(),
            players,
            players_dirty: false,
            max_object_id,
            perf,
        }
    }

    /// Fetch a row, preferring the transaction's own overlay over the shared store,
    /// and remember the version it carried the first time it's seen (so `commit`
    /// can tell whether anyone else wrote it since).
    fn load(&self, id: &Obj) -> Option<ObjectRow> {
        if let Some(cached) = self.local.borrow().get(&id.id()) {
            return cached.clone();
        }
        let row = self.db.inner.read().objects.get(&id.id()).cloned();
        self.read_versions
            .borrow_mut()
            .entry(id.id())
            .or_insert_with(|| row.as_ref().map_or(0, |r| r.version));
        self.local.borrow_mut().insert(id.id(), row.clone());
        row
    }

    fn require(&self, id: &Obj) -> Result<ObjectRow, WorldStateError> {
        self.load(id).ok_or(WorldStateError::ObjectNotFound(*id))
    }

    fn put(&mut self, mut row: ObjectRow) {
        row.version += 1;
        self.dirty.insert(row.id.id());
        self.local.borrow_mut().insert(row.id.id(), Some(row));
    }

    fn next_object_id(&self) -> i64 {
        self.max_object_id + 1
    }

    /// Every object id visible to this transaction: committed rows plus anything
    /// only the local overlay knows about yet, minus local tombstones.
    fn all_ids(&self) -> Vec<Obj> {
        let local = self.local.borrow();
        let mut ids: HashSet<i64> = self.db.inner.read().objects.keys().copied().collect();
        for (id, row) in local.iter() {
            match row {
                Some(_) => {
                    ids.insert(*id);
                }
                None => {
                    ids.remove(id);
                }
            }
        }
        ids.into_iter().map(Obj::mk_id).collect()
    }

    /// Does `start` occur anywhere in the chain starting at `candidate_ancestor`
    /// (inclusive)? Used for both parent-cycle and location-cycle checks (spec.md
    /// §7 "Parent acyclicity" / "Location acyclicity").
    fn would_cycle(
        &self,
        start: &Obj,
        candidate_ancestor: &Obj,
        step: impl Fn(&ObjAttrs) -> Option<Obj>,
    ) -> bool {
        if start == candidate_ancestor {
            return true;
        }
        let mut cur = *candidate_ancestor;
        loop {
            let Some(row) = self.load(&cur) else {
                return false;
            };
            match step(&row.attrs) {
                Some(next) if next == *start => return true,
                Some(next) => cur = next,
                None => return false,
            }
        }
    }
}

impl WorldState for Transaction {
    fn get_object(&self, obj: &Obj) -> Result<ObjAttrs, WorldStateError> {
        self.load(obj)
            .map(|r| r.attrs)
            .ok_or(WorldStateError::ObjectNotFound(*obj))
    }

    fn valid(&self, obj: &Obj) -> Result<bool, WorldStateError> {
        Ok(self.load(obj).is_some())
    }

    fn children(&self, obj: &Obj) -> Result<Vec<Obj>, WorldStateError> {
        Ok(self
            .all_ids()
            .into_iter()
            .filter(|id| {
                self.load(id)
                    .is_some_and(|row| row.attrs.parent == Some(*obj))
            })
            .collect())
    }

    fn contents(&self, obj: &Obj) -> Result<Vec<Obj>, WorldStateError> {
        Ok(self
            .all_ids()
            .into_iter()
            .filter(|id| {
                self.load(id)
                    .is_some_and(|row| row.attrs.location == Some(*obj))
            })
            .collect())
    }

    fn create_object(&mut self, perms: &Perms, attrs: ObjAttrs) -> Result<Obj, WorldStateError> {
        self.perf.create_object.fetch_add(1, Ordering::Relaxed);
        perms.check_programmer()?;
        let id = Obj::mk_id(self.next_object_id());
        self.max_object_id = id.id();
        let is_player = attrs
            .flags
            .map(|f| f.contains(ObjFlag::Player))
            .unwrap_or(false);
        let row = ObjectRow::new(id, attrs);
        self.dirty.insert(id.id());
        self.local.borrow_mut().insert(id.id(), Some(row));
        if is_player {
            self.players.insert(id);
            self.players_dirty = true;
        }
        Ok(id)
    }

    fn recycle_object(&mut self, perms: &Perms, obj: &Obj) -> Result<(), WorldStateError> {
        self.perf.recycle_object.fetch_add(1, Ordering::Relaxed);
        let row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        self.dirty.insert(obj.id());
        self.local.borrow_mut().insert(obj.id(), None);
        if self.players.remove(obj) {
            self.players_dirty = true;
        }
        Ok(())
    }

    fn renumber_object(&mut self, perms: &Perms, old: &Obj) -> Result<Obj, WorldStateError> {
        let row = self.require(old)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        let is_free = |candidate: i64| {
            let local = self.local.borrow();
            match local.get(&candidate) {
                Some(cached) => cached.is_none(),
                None => !self.db.inner.read().objects.contains_key(&candidate),
            }
        };
        let new_id = (0..old.id())
            .find(|candidate| is_free(*candidate))
            .map(Obj::mk_id)
            .unwrap_or(*old);
        if new_id == *old {
            return Ok(*old);
        }

        let mut new_row = row.clone();
        new_row.id = new_id;
        self.dirty.insert(old.id());
        self.dirty.insert(new_id.id());
        {
            let mut local = self.local.borrow_mut();
            local.insert(old.id(), None);
            local.insert(new_id.id(), Some(new_row));
        }

        if self.players.remove(old) {
            self.players.insert(new_id);
            self.players_dirty = true;
        }

        // Every other row's parent/location/owner pointer that named `old` has to
        // follow it to `new_id`, or the rest of the object array would be left
        // referencing a dead id.
        for id in self.all_ids() {
            if id == new_id {
                continue;
            }
            let Some(mut other) = self.load(&id) else {
                continue;
            };
            let mut touched = false;
            if other.attrs.parent == Some(*old) {
                other.attrs.parent = Some(new_id);
                touched = true;
            }
            if other.attrs.location == Some(*old) {
                other.attrs.location = Some(new_id);
                touched = true;
            }
            if other.attrs.owner == Some(*old) {
                other.attrs.owner = Some(new_id);
                touched = true;
            }
            for slot in &mut other.properties {
                if slot.owner == *old {
                    slot.owner = new_id;
                    touched = true;
                }
            }
            for verb in &mut other.verbs {
                if verb.owner == *old {
                    verb.owner = new_id;
                    touched = true;
                }
            }
            if touched {
                self.put(other);
            }
        }

        Ok(new_id)
    }

    fn chparent(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        new_parent: &Obj,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        if !new_parent.is_nothing() && self.would_cycle(obj, new_parent, |a| a.parent) {
            return Err(WorldStateError::RecursiveMove(*obj, *new_parent));
        }
        row.attrs.parent = if new_parent.is_nothing() {
            None
        } else {
            Some(*new_parent)
        };
        self.put(row);
        Ok(())
    }

    fn move_object(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        new_location: &Obj,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        if !new_location.is_nothing() && self.would_cycle(obj, new_location, |a| a.location) {
            return Err(WorldStateError::RecursiveMove(*obj, *new_location));
        }
        row.attrs.location = if new_location.is_nothing() {
            None
        } else {
            Some(*new_location)
        };
        self.put(row);
        Ok(())
    }

    fn lookup_property(
        &self,
        _perms: &Perms,
        obj: &Obj,
        name: Symbol,
    ) -> Result<PropertyLookup, WorldStateError> {
        let mut cur = *obj;
        loop {
            let row = self.load(&cur).ok_or(WorldStateError::ObjectNotFound(cur))?;
            if let Some(slot) = row.properties.iter().find(|s| s.name == name) {
                return Ok(PropertyLookup {
                    definer: cur,
                    slot: slot.clone(),
                });
            }
            match row.attrs.parent {
                Some(parent) => cur = parent,
                None => {
                    return Err(WorldStateError::PropertyNotFound(*obj, name.as_str().to_string()))
                }
            }
        }
    }

    fn read_property(
        &self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
    ) -> Result<Var, WorldStateError> {
        self.perf.retrieve_property.fetch_add(1, Ordering::Relaxed);
        let lookup = self.lookup_property(perms, obj, name)?;
        if let Some(value) = lookup.slot.value {
            return Ok(value);
        }
        let mut cur = lookup.definer;
        loop {
            let row = self.load(&cur).ok_or(WorldStateError::ObjectNotFound(cur))?;
            let Some(parent) = row.attrs.parent else {
                return Err(WorldStateError::PropertyNotFound(
                    *obj,
                    name.as_str().to_string(),
                ));
            };
            let parent_row = self
                .load(&parent)
                .ok_or(WorldStateError::ObjectNotFound(parent))?;
            if let Some(value) = parent_row
                .properties
                .iter()
                .find(|s| s.name == name)
                .and_then(|s| s.value.clone())
            {
                return Ok(value);
            }
            cur = parent;
        }
    }

    fn write_property(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
        value: Var,
    ) -> Result<(), WorldStateError> {
        let lookup = self.lookup_property(perms, obj, name)?;
        perms.check_property_allows(&lookup.slot.owner, lookup.slot.flags, PropFlag::Write)?;
        let mut row = self.require(&lookup.definer)?;
        let slot = row
            .properties
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(*obj, name.as_str().to_string()))?;
        slot.value = Some(value);
        self.put(row);
        Ok(())
    }

    fn add_property(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
        owner: Obj,
        flags: BitEnum<PropFlag>,
        value: Option<Var>,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(obj_owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&obj_owner)?;
        }
        if row.properties.iter().any(|s| s.name == name) {
            return Err(WorldStateError::DuplicatePropertyDefinition(
                *obj,
                name.as_str().to_string(),
            ));
        }
        row.properties
            .push(PropertySlot::new(name, owner, flags, value));
        self.put(row);
        Ok(())
    }

    fn delete_property(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Symbol,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(obj_owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&obj_owner)?;
        }
        let before = row.properties.len();
        row.properties.retain(|s| s.name != name);
        if row.properties.len() == before {
            return Err(WorldStateError::PropertyNotFound(
                *obj,
                name.as_str().to_string(),
            ));
        }
        self.put(row);
        Ok(())
    }

    fn lookup_verb(
        &self,
        obj: &Obj,
        desc: &str,
        numeric_names_allowed: bool,
    ) -> Result<VerbLookup, WorldStateError> {
        self.perf.get_verb.fetch_add(1, Ordering::Relaxed);
        let mut cur = *obj;
        loop {
            let row = self.load(&cur).ok_or(WorldStateError::ObjectNotFound(cur))?;
            if numeric_names_allowed {
                if let Ok(index) = desc.parse::<usize>() {
                    if let Some(verb) = row.verbs.get(index) {
                        return Ok(VerbLookup {
                            definer: cur,
                            verb: verb.clone(),
                        });
                    }
                }
            }
            if let Some(verb) = row.verbs.iter().find(|v| v.names.matches(desc)) {
                return Ok(VerbLookup {
                    definer: cur,
                    verb: verb.clone(),
                });
            }
            match row.attrs.parent {
                Some(parent) => cur = parent,
                None => return Err(WorldStateError::VerbNotFound(*obj, desc.to_string())),
            }
        }
    }

    fn lookup_verb_with_spec(
        &self,
        obj: &Obj,
        dobj_present: bool,
        args: VerbArgsSpec,
    ) -> Result<VerbLookup, WorldStateError> {
        let mut cur = *obj;
        loop {
            let row = self.load(&cur).ok_or(WorldStateError::ObjectNotFound(cur))?;
            let found = row
                .verbs
                .iter()
                .find(|v| verb_args_match(v.args_spec, dobj_present, dobj_present, args.prep));
            if let Some(verb) = found {
                return Ok(VerbLookup {
                    definer: cur,
                    verb: verb.clone(),
                });
            }
            match row.attrs.parent {
                Some(parent) => cur = parent,
                None => return Err(WorldStateError::VerbNotFound(*obj, String::new())),
            }
        }
    }

    fn add_verb(&mut self, perms: &Perms, obj: &Obj, verb: Verb) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        row.verbs.push(verb);
        row.programs.push(None);
        self.put(row);
        Ok(())
    }

    fn modify_verb(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        old_name: &str,
        update: Box<dyn FnOnce(&mut Verb)>,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        let verb = row
            .verbs
            .iter_mut()
            .find(|v| v.names.matches(old_name))
            .ok_or_else(|| WorldStateError::VerbNotFound(*obj, old_name.to_string()))?;
        update(verb);
        self.put(row);
        Ok(())
    }

    fn delete_verb(&mut self, perms: &Perms, obj: &Obj, name: &str) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        let before = row.verbs.len();
        let kept: Vec<(Verb, Option<Program>)> = row
            .verbs
            .drain(..)
            .zip(row.programs.drain(..))
            .filter(|(v, _)| !v.names.matches(name))
            .collect();
        if kept.len() == before {
            return Err(WorldStateError::VerbNotFound(*obj, name.to_string()));
        }
        let (verbs, programs) = kept.into_iter().unzip();
        row.verbs = verbs;
        row.programs = programs;
        self.put(row);
        Ok(())
    }

    fn program_for_verb(&self, definer: &Obj, verb_name: &str) -> Result<Program, WorldStateError> {
        let row = self.require(definer)?;
        let index = row
            .verbs
            .iter()
            .position(|v| v.names.matches(verb_name))
            .ok_or_else(|| WorldStateError::VerbNotFound(*definer, verb_name.to_string()))?;
        row.programs
            .get(index)
            .cloned()
            .flatten()
            .ok_or_else(|| WorldStateError::VerbNotFound(*definer, verb_name.to_string()))
    }

    fn set_verb_program(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        verb_name: &str,
        program: Program,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = row.attrs.owner {
            perms.check_obj_owner_perms(&owner)?;
        }
        let index = row
            .verbs
            .iter()
            .position(|v| v.names.matches(verb_name))
            .ok_or_else(|| WorldStateError::VerbNotFound(*obj, verb_name.to_string()))?;
        row.programs[index] = Some(program);
        self.put(row);
        Ok(())
    }

    fn set_object_flags(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        flags: BitEnum<ObjFlag>,
    ) -> Result<(), WorldStateError> {
        perms.check_wizard()?;
        let mut row = self.require(obj)?;
        row.attrs.flags = Some(flags);
        self.put(row);
        Ok(())
    }

    fn set_object_attrs(
        &mut self,
        perms: &Perms,
        obj: &Obj,
        name: Option<String>,
        owner: Option<Obj>,
    ) -> Result<(), WorldStateError> {
        let mut row = self.require(obj)?;
        if let Some(owner) = &row.attrs.owner {
            perms.check_obj_owner_perms(owner)?;
        }
        if let Some(name) = name {
            row.attrs.name = Some(name);
        }
        if let Some(new_owner) = owner {
            perms.check_wizard()?;
            row.attrs.owner = Some(new_owner);
        }
        self.put(row);
        Ok(())
    }

    fn commit(&mut self) -> Result<CommitResult, WorldStateError> {
        self.perf.commit.fetch_add(1, Ordering::Relaxed);
        let mut data = self.db.inner.write();
        for (id, expected_version) in self.read_versions.borrow().iter() {
            let actual = data.objects.get(id).map_or(0, |r| r.version);
            if actual != *expected_version {
                return Ok(CommitResult::ConflictRetry);
            }
        }
        let local = self.local.borrow();
        for id in &self.dirty {
            match local.get(id).and_then(|r| r.clone()) {
                Some(row) => {
                    data.objects.insert(*id, row);
                }
                None => {
                    data.objects.remove(id);
                }
            }
        }
        if self.players_dirty {
            data.players = self.players.clone();
        }
        data.max_object_id = data.max_object_id.max(self.max_object_id);
        Ok(CommitResult::Success)
    }

    fn rollback(&mut self) -> Result<(), WorldStateError> {
        self.local.borrow_mut().clear();
        self.read_versions.borrow_mut().clear();
        self.dirty.clear();
        self.players_dirty = false;
        Ok(())
    }

    fn perf_counters(&self) -> Arc<WorldStatePerf> {
        self.perf.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wizard() -> Perms {
        Perms::new(
            Obj::mk_id(0),
            BitEnum::new_with(ObjFlag::Wizard) | ObjFlag::Programmer,
        )
    }

    #[test]
    fn create_then_read_round_trips_attrs() {
        let db = Database::new();
        let mut tx = Transaction::begin(db);
        let perms = wizard();
        let mut attrs = ObjAttrs::new();
        attrs.name = Some("thing".to_string());
        let id = tx.create_object(&perms, attrs).unwrap();
        assert_eq!(tx.get_object(&id).unwrap().name.as_deref(), Some("thing"));
        assert_eq!(tx.commit().unwrap(), CommitResult::Success);
    }

    #[test]
    fn chparent_to_self_is_rejected_as_recursive() {
        let db = Database::new();
        let mut tx = Transaction::begin(db);
        let perms = wizard();
        let id = tx.create_object(&perms, ObjAttrs::new()).unwrap();
        assert_eq!(
            tx.chparent(&perms, &id, &id),
            Err(WorldStateError::RecursiveMove(id, id))
        );
    }

    #[test]
    fn concurrent_writers_the_second_committer_sees_conflict() {
        let db = Database::new();
        let perms = wizard();
        let id = {
            let mut setup = Transaction::begin(db.clone());
            let id = setup.create_object(&perms, ObjAttrs::new()).unwrap();
            setup.commit().unwrap();
            id
        };

        let mut tx_a = Transaction::begin(db.clone());
        let mut tx_b = Transaction::begin(db.clone());
        let _ = tx_a.get_object(&id).unwrap();
        let _ = tx_b.get_object(&id).unwrap();

        tx_a.move_object(&perms, &id, &Obj::mk_id(0)).unwrap();
        assert_eq!(tx_a.commit().unwrap(), CommitResult::Success);

        tx_b.move_object(&perms, &id, &Obj::mk_id(0)).unwrap();
        assert_eq!(tx_b.commit().unwrap(), CommitResult::ConflictRetry);
    }
}
