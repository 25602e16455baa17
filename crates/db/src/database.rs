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

//! The shared, process-wide object store. Single-writer, optimistic-retry: many
//! [`crate::transaction::Transaction`]s may read concurrently; at commit time each
//! transaction's read-set is checked against the live row versions, and the first
//! transaction to validate wins (spec.md §4.2 "Concurrency discipline").

use crate::object_row::ObjectRow;
use moor_common::model::WorldStatePerf;
use moor_var::Obj;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The data visible to every transaction: a sparse array of object rows (holes are
/// recycled object numbers) and the player set (spec.md §3 "World").
#[derive(Debug, Default)]
pub struct WorldData {
    pub objects: HashMap<i64, ObjectRow>,
    pub players: HashSet<Obj>,
    pub max_object_id: i64,
}

/// A cloneable handle to the shared store (spec.md §3 "World": "an indexed array
/// of object slots"). Cheap to clone: it just shares the inner lock.
#[derive(Clone, Default)]
pub struct Database {
    pub(crate) inner: Arc<RwLock<WorldData>>,
    pub(crate) perf: Arc<WorldStatePerf>,
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        let db = Self::default();
        // Object numbering starts at #0 (spec.md §6 "System-object properties"), so
        // the first `create_object` call must hand out id 0, not 1.
        db.inner.write().max_object_id = -1;
        db
    }

    /// A monotonically increasing snapshot of the store's generation, used so a
    /// transaction can detect whether any row it read has since been written.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<i64, u64> {
        self.inner
            .read()
            .objects
            .iter()
            .map(|(id, row)| (*id, row.version))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moor_common::model::ObjAttrs;

    #[test]
    fn new_database_starts_empty() {
        let db = Database::new();
        assert!(db.inner.read().objects.is_empty());
    }

    #[test]
    fn snapshot_reflects_inserted_rows() {
        let db = Database::new();
        db.inner
            .write()
            .objects
            .insert(0, ObjectRow::new(Obj::mk_id(0), ObjAttrs::new()));
        assert_eq!(db.snapshot().len(), 1);
    }
}
