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
use moor_var::{Obj, Symbol, Var};

/// Property permission bits: `{r, w, chown}` (spec.md §3 "Property slot").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PropFlag {
    Read = 0,
    Write = 1,
    Chown = 2,
}

impl BitEnumRepr for PropFlag {
    fn to_bit(self) -> u8 {
        self as u8
    }
}

impl PropFlag {
    pub fn parse_str(s: &str) -> Option<BitEnum<PropFlag>> {
        let mut flags = BitEnum::new();
        for c in s.chars() {
            flags = match c {
                'r' => flags | PropFlag::Read,
                'w' => flags | PropFlag::Write,
                'c' => flags | PropFlag::Chown,
                _ => return None,
            };
        }
        Some(flags)
    }
}

/// A property slot: an optional concrete value plus owner/permission bits (spec.md
/// §3 "Property slot", §4.2 "lookup_property"/"read_property"). A slot with `value ==
/// None` delegates to the nearest ancestor slot carrying a value.
#[derive(Clone, Debug)]
pub struct PropertySlot {
    pub name: Symbol,
    pub owner: Obj,
    pub flags: BitEnum<PropFlag>,
    pub value: Option<Var>,
}

impl PropertySlot {
    #[must_use]
    pub fn new(name: Symbol, owner: Obj, flags: BitEnum<PropFlag>, value: Option<Var>) -> Self {
        Self {
            name,
            owner,
            flags,
            value,
        }
    }

    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.value.is_none()
    }
}
