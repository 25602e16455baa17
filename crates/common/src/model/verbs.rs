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

use crate::util::{BitEnum, BitEnumRepr};
use moor_var::{Obj, Symbol};

/// Verb permission bits: `{x, r, w, d}` (spec.md §3 "Verb"). `d` (debug) controls
/// whether uncaught exceptions propagate or are swallowed into an error value
/// (spec.md §4.3 "Debug handling").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VerbFlag {
    Read = 0,
    Write = 1,
    Exec = 2,
    Debug = 3,
}

impl BitEnumRepr for VerbFlag {
    fn to_bit(self) -> u8 {
        self as u8
    }
}

impl VerbFlag {
    pub fn parse_str(s: &str) -> Option<BitEnum<VerbFlag>> {
        let mut flags = BitEnum::new();
        for c in s.chars() {
            flags = match c {
                'r' => flags | VerbFlag::Read,
                'w' => flags | VerbFlag::Write,
                'x' => flags | VerbFlag::Exec,
                'd' => flags | VerbFlag::Debug,
                _ => return None,
            };
        }
        Some(flags)
    }
}

/// Direct/indirect object specs (spec.md §3 "Verb").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjSpec {
    This,
    Any,
    None,
}

/// The fixed 16 preposition groups plus "any"/"none" (spec.md §3 "Verb").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrepSpec {
    Any,
    None,
    Group(u8),
}

/// The canonical preposition groups, in LambdaMOO's traditional order. Each entry is
/// the set of surface words that match that group.
pub const PREPOSITIONS: &[&[&str]] = &[
    &["with", "using"],
    &["at", "to"],
    &["in front of"],
    &["in", "inside", "into"],
    &["on top of", "on", "onto", "upon"],
    &["out of", "from inside", "from"],
    &["over"],
    &["through"],
    &["under", "underneath", "beneath"],
    &["behind"],
    &["beside"],
    &["for", "about"],
    &["is"],
    &["as"],
    &["off", "off of"],
    &["around"],
];

impl PrepSpec {
    #[must_use]
    pub fn match_word(word: &str) -> Option<PrepSpec> {
        let word = word.to_lowercase();
        for (i, group) in PREPOSITIONS.iter().enumerate() {
            if group.contains(&word.as_str()) {
                return Some(PrepSpec::Group(i as u8));
            }
        }
        None
    }

    #[must_use]
    pub fn matches(&self, other: PrepSpec) -> bool {
        matches!(self, PrepSpec::Any) || *self == other
    }
}

/// The `(dobj, prep, iobj)` triple a verb is registered against (spec.md §3 "Verb").
#[derive(Clone, Copy, Debug)]
pub struct VerbArgsSpec {
    pub dobj: ObjSpec,
    pub prep: PrepSpec,
    pub iobj: ObjSpec,
}

/// One whitespace-separated word of a verb name-pattern, admitting a single `*` to
/// mark where the word may be abbreviated down to a prefix (spec.md §3 "Verb").
#[derive(Clone, Debug)]
pub struct NameWord {
    pub prefix: String,
    pub suffix: String,
}

impl NameWord {
    #[must_use]
    pub fn parse(word: &str) -> Self {
        match word.split_once('*') {
            Some((prefix, suffix)) => NameWord {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            },
            None => NameWord {
                prefix: word.to_string(),
                suffix: String::new(),
            },
        }
    }

    /// Does `token` match this word? Any length from `prefix` up to `prefix+suffix`
    /// (inclusive) is an admitted abbreviation.
    #[must_use]
    pub fn matches(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        let prefix = self.prefix.to_lowercase();
        let full = format!("{prefix}{}", self.suffix.to_lowercase());
        if self.suffix.is_empty() {
            return token == prefix;
        }
        token.len() >= prefix.len() && token.len() <= full.len() && full.starts_with(&token)
    }
}

/// A verb's name-pattern: one or more whitespace-separated words (spec.md §3 "Verb").
#[derive(Clone, Debug)]
pub struct VerbNames {
    pub words: Vec<NameWord>,
    pub original: String,
}

impl VerbNames {
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        Self {
            words: pattern.split_whitespace().map(NameWord::parse).collect(),
            original: pattern.to_string(),
        }
    }

    /// `desc` matches if it equals (case-insensitively, abbreviation-aware) any one
    /// of this verb's name-pattern words.
    #[must_use]
    pub fn matches(&self, desc: &str) -> bool {
        self.words.iter().any(|w| w.matches(desc))
    }
}

/// A verb's metadata, as attached to an object (spec.md §3 "Verb"). The compiled
/// program body is stored separately (see `WorldState::program_for_verb`) and keyed
/// by the same `(object, verb name)` pair, the way `moor-db` keeps verb definitions
/// and verb bodies in separate tables.
#[derive(Clone)]
pub struct Verb {
    pub names: VerbNames,
    pub owner: Obj,
    pub flags: BitEnum<VerbFlag>,
    pub args_spec: VerbArgsSpec,
}

impl Verb {
    #[must_use]
    pub fn name_symbols(&self) -> Vec<Symbol> {
        self.names
            .original
            .split_whitespace()
            .map(Symbol::mk)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_abbreviation_matches_any_admitted_prefix_length() {
        let w = NameWord::parse("l*ook");
        assert!(w.matches("l"));
        assert!(w.matches("lo"));
        assert!(w.matches("look"));
        assert!(!w.matches("lookx"));
        assert!(!w.matches("x"));
    }

    #[test]
    fn no_star_requires_exact_match() {
        let w = NameWord::parse("look");
        assert!(w.matches("look"));
        assert!(!w.matches("loo"));
    }

    #[test]
    fn preposition_groups_resolve_synonyms() {
        assert_eq!(PrepSpec::match_word("inside"), PrepSpec::match_word("in"));
        assert_eq!(PrepSpec::match_word("onto"), PrepSpec::match_word("on"));
        assert_eq!(PrepSpec::match_word("nonsense"), None);
    }
}
