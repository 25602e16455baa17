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

//! Parsing a typed command line into a verb word plus direct/preposition/indirect
//! object strings (spec.md §4.6 "Command dispatch loop" step 7), and matching that
//! against a candidate's verb set (spec.md §4.2 "lookup_verb").

use crate::model::verbs::{ObjSpec, PrepSpec, Verb, VerbArgsSpec};
use crate::util::parse_into_words;

/// The result of splitting a command line into its five traditional parts, the way
/// LambdaMOO's `parse_command` does: `verb dobjstr prep iobjstr`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedCommand {
    pub verb: String,
    pub dobj_str: String,
    pub prep: PrepSpec,
    pub iobj_str: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Split `line` into words, then look for the first word (after the verb) that
    /// names a recognized preposition; everything before it is the direct-object
    /// string, everything after is the indirect-object string.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let words = parse_into_words(line);
        let Some((verb, rest)) = words.split_first() else {
            return ParsedCommand {
                verb: String::new(),
                dobj_str: String::new(),
                prep: PrepSpec::None,
                iobj_str: String::new(),
                args: Vec::new(),
            };
        };

        let prep_index = rest.iter().position(|w| PrepSpec::match_word(w).is_some());
        let (dobj_words, prep, iobj_words) = match prep_index {
            Some(i) => (
                &rest[..i],
                PrepSpec::match_word(&rest[i]).expect("checked above"),
                &rest[i + 1..],
            ),
            None => (rest, PrepSpec::None, &rest[0..0]),
        };

        ParsedCommand {
            verb: verb.clone(),
            dobj_str: dobj_words.join(" "),
            prep,
            iobj_str: iobj_words.join(" "),
            args: rest.to_vec(),
        }
    }
}

/// Does `verb`'s `(dobj, prep, iobj)` spec accept the parsed command's shape?
/// `dobj_present`/`iobj_present` record whether the command supplied a non-empty
/// object string for that slot (spec.md §3 "Verb": `{this, any, none}`).
#[must_use]
pub fn verb_args_match(spec: VerbArgsSpec, dobj_present: bool, iobj_present: bool, prep: PrepSpec) -> bool {
    let dobj_ok = match spec.dobj {
        ObjSpec::None => !dobj_present,
        ObjSpec::Any | ObjSpec::This => true,
    };
    let iobj_ok = match spec.iobj {
        ObjSpec::None => !iobj_present,
        ObjSpec::Any | ObjSpec::This => true,
    };
    let prep_ok = spec.prep.matches(prep) || matches!(spec.prep, PrepSpec::None) && matches!(prep, PrepSpec::None);
    dobj_ok && iobj_ok && prep_ok
}

/// Find the first verb in `verbs` whose name-pattern matches `desc` and whose
/// args-spec accepts the parsed command shape (spec.md §4.2 "lookup_verb").
#[must_use]
pub fn find_matching_verb<'a>(
    verbs: &'a [Verb],
    desc: &str,
    dobj_present: bool,
    iobj_present: bool,
    prep: PrepSpec,
) -> Option<&'a Verb> {
    verbs.iter().find(|v| {
        v.names.matches(desc) && verb_args_match(v.args_spec, dobj_present, iobj_present, prep)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::verbs::{VerbFlag, VerbNames};
    use crate::util::BitEnum;
    use moor_var::Obj;

    fn verb(pattern: &str, spec: VerbArgsSpec) -> Verb {
        Verb {
            names: VerbNames::parse(pattern),
            owner: Obj::mk_id(0),
            flags: BitEnum::new_with(VerbFlag::Exec),
            args_spec: spec,
        }
    }

    #[test]
    fn splits_verb_dobj_prep_iobj() {
        let p = ParsedCommand::parse("put ball in basket");
        assert_eq!(p.verb, "put");
        assert_eq!(p.dobj_str, "ball");
        assert_eq!(p.prep, PrepSpec::Group(3));
        assert_eq!(p.iobj_str, "basket");
    }

    #[test]
    fn no_preposition_puts_everything_in_dobj() {
        let p = ParsedCommand::parse("look sign");
        assert_eq!(p.dobj_str, "sign");
        assert_eq!(p.prep, PrepSpec::None);
        assert!(p.iobj_str.is_empty());
    }

    #[test]
    fn matches_verb_requiring_no_objects() {
        let v = verb(
            "l*ook",
            VerbArgsSpec {
                dobj: ObjSpec::None,
                prep: PrepSpec::None,
                iobj: ObjSpec::None,
            },
        );
        assert!(find_matching_verb(&[v], "look", false, false, PrepSpec::None).is_some());
    }

    #[test]
    fn rejects_verb_when_dobj_not_wanted_but_given() {
        let v = verb(
            "look",
            VerbArgsSpec {
                dobj: ObjSpec::None,
                prep: PrepSpec::None,
                iobj: ObjSpec::None,
            },
        );
        assert!(find_matching_verb(&[v], "look", true, false, PrepSpec::None).is_none());
    }
}
