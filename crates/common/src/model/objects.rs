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

use crate::util::BitEnumRepr;

/// Object flags (spec.md §3 "Object"): `{player, programmer, wizard, readable,
/// writable, fertile}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ObjFlag {
    Player = 0,
    Programmer = 1,
    Wizard = 2,
    Read = 3,
    Write = 4,
    Fertile = 5,
}

impl BitEnumRepr for ObjFlag {
    fn to_bit(self) -> u8 {
        self as u8
    }
}

impl ObjFlag {
    pub fn parse_char(c: char) -> Option<Self> {
        match c {
            'p' => Some(ObjFlag::Player),
            'P' => Some(ObjFlag::Programmer),
            'w' => Some(ObjFlag::Wizard),
            'r' => Some(ObjFlag::Read),
            'W' => Some(ObjFlag::Write),
            'f' => Some(ObjFlag::Fertile),
            _ => None,
        }
    }
}

/// A concrete snapshot of an object's attributes (spec.md §3 "Object").
#[derive(Clone, Debug)]
pub struct ObjAttrs {
    pub owner: Option<moor_var::Obj>,
    pub parent: Option<moor_var::Obj>,
    pub location: Option<moor_var::Obj>,
    pub name: Option<String>,
    pub flags: Option<crate::util::BitEnum<ObjFlag>>,
}

impl ObjAttrs {
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: None,
            parent: None,
            location: None,
            name: None,
            flags: None,
        }
    }
}

impl Default for ObjAttrs {
    fn default() -> Self {
        Self::new()
    }
}
