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

use crate::error::Error;
use crate::list::List;
use crate::obj::Obj;
use crate::string::Str;

/// The tagged variants of a MOO `Var` (spec.md §3 "Value").
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    Int(i64),
    Float(f64),
    Str(Str),
    Obj(Obj),
    Err(Error),
    List(List),
}

impl Variant {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Int(_) => "INT",
            Variant::Float(_) => "FLOAT",
            Variant::Str(_) => "STR",
            Variant::Obj(_) => "OBJ",
            Variant::Err(_) => "ERR",
            Variant::List(_) => "LIST",
        }
    }
}
