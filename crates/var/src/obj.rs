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

use std::fmt::{Debug, Display, Formatter};

/// The "system" object, where most $name style references hang off of.
pub const SYSTEM_OBJECT: Obj = Obj::mk_id(0);

/// Sentinel: "no object".
pub const NOTHING: Obj = Obj::mk_id(-1);
/// Sentinel: a match came back ambiguous.
pub const AMBIGUOUS: Obj = Obj::mk_id(-2);
/// Sentinel: a match failed entirely.
pub const FAILED_MATCH: Obj = Obj::mk_id(-3);
/// The first id handed to an as-yet-unauthenticated connection; ids below this are
/// handed out in decreasing order as more connections arrive (spec.md §3 "Value").
pub const FIRST_UNCLAIMED_CONNECTION: i64 = -4;

/// A reference to an object: a signed integer object number (spec.md §3 "Value").
/// Negative values are sentinels (`NOTHING`, `AMBIGUOUS`, `FAILED_MATCH`) or unclaimed
/// connection ids (`< FIRST_UNCLAIMED_CONNECTION`, i.e. `<= -4`).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Obj(i64);

impl Obj {
    #[must_use]
    pub const fn mk_id(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 >= 0
    }

    #[must_use]
    pub fn is_nothing(&self) -> bool {
        *self == NOTHING
    }

    #[must_use]
    pub fn is_connection_sentinel(&self) -> bool {
        self.0 <= FIRST_UNCLAIMED_CONNECTION
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Display for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for Obj {
    fn from(v: i64) -> Self {
        Obj::mk_id(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_ordered_below_zero() {
        assert!(NOTHING.id() < 0);
        assert!(AMBIGUOUS.id() < NOTHING.id());
        assert!(FAILED_MATCH.id() < AMBIGUOUS.id());
    }

    #[test]
    fn display_uses_hash_prefix() {
        assert_eq!(format!("{}", Obj::mk_id(42)), "#42");
        assert_eq!(format!("{}", NOTHING), "#-1");
    }
}
