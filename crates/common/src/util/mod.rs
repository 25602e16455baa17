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

mod bitenum;

pub use bitenum::{BitEnum, BitEnumRepr};

/// Split a command line into whitespace-separated words, the way the connection
/// manager and command-matching rules need (spec.md §4.6 "Command dispatch loop").
#[must_use]
pub fn parse_into_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
