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

//! Case-insensitive interned identifiers used for variable, property, and verb names
//! (spec.md §3 "Identifier"). Lookup and equality are case-insensitive; the original
//! case given at `mk` time is preserved for display.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

lazy_static::lazy_static! {
    static ref INTERN_TABLE: RwLock<HashMap<String, Arc<str>>> = RwLock::new(HashMap::new());
}

#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Intern `s`, preserving its case for display but keying storage case-insensitively:
    /// the first spelling seen for a given lowercase key wins.
    #[must_use]
    pub fn mk(s: &str) -> Self {
        let key = s.to_lowercase();
        if let Some(existing) = INTERN_TABLE.read().unwrap().get(&key) {
            return Symbol(existing.clone());
        }
        let mut table = INTERN_TABLE.write().unwrap();
        let entry = table.entry(key).or_insert_with(|| Arc::from(s));
        Symbol(entry.clone())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}
impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            b.to_ascii_lowercase().hash(state);
        }
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.to_lowercase().cmp(&other.0.to_lowercase())
    }
}
impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::mk(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_equality_preserves_display_case() {
        let a = Symbol::mk("Foo");
        let b = Symbol::mk("FOO");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Foo");
    }

    #[test]
    fn usable_as_hashmap_key_case_insensitively() {
        let mut map = HashMap::new();
        map.insert(Symbol::mk("Bar"), 1);
        assert_eq!(map.get(&Symbol::mk("bar")), Some(&1));
    }
}
