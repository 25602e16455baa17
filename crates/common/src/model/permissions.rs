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

use crate::model::objects::ObjFlag;
use crate::model::props::PropFlag;
use crate::model::verbs::VerbFlag;
use crate::model::world_state::WorldStateError;
use crate::util::BitEnum;
use moor_var::Obj;

/// Who is asking, and what object-level flags they carry (spec.md §4.1
/// "Permissions"). Every world-state mutation is checked against a `Perms`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Perms {
    pub who: Obj,
    pub flags: BitEnum<ObjFlag>,
}

impl Perms {
    #[must_use]
    pub fn new(who: Obj, flags: BitEnum<ObjFlag>) -> Self {
        Self { who, flags }
    }

    #[must_use]
    pub fn is_wizard(&self) -> bool {
        self.flags.contains(ObjFlag::Wizard)
    }

    #[must_use]
    pub fn is_programmer(&self) -> bool {
        self.flags.contains(ObjFlag::Programmer)
    }

    pub fn check_wizard(&self) -> Result<(), WorldStateError> {
        if self.is_wizard() {
            Ok(())
        } else {
            Err(WorldStateError::PermissionDenied)
        }
    }

    pub fn check_programmer(&self) -> Result<(), WorldStateError> {
        if self.is_programmer() {
            Ok(())
        } else {
            Err(WorldStateError::PermissionDenied)
        }
    }

    /// Owner, or wizard, may always act; otherwise the relevant flag must be set
    /// (spec.md §4.1 "Permissions": `x owns y`, or `x` is a wizard, or the
    /// permission bit on `y` allows it).
    pub fn check_property_allows(
        &self,
        property_owner: &Obj,
        property_flags: BitEnum<PropFlag>,
        allows: PropFlag,
    ) -> Result<(), WorldStateError> {
        if &self.who == property_owner || self.is_wizard() {
            return Ok(());
        }
        if !property_flags.contains(allows) {
            return Err(WorldStateError::PermissionDenied);
        }
        Ok(())
    }

    pub fn check_verb_allows(
        &self,
        verb_owner: &Obj,
        verb_flags: BitEnum<VerbFlag>,
        allows: VerbFlag,
    ) -> Result<(), WorldStateError> {
        if &self.who == verb_owner || self.is_wizard() {
            return Ok(());
        }
        if !verb_flags.contains(allows) {
            return Err(WorldStateError::PermissionDenied);
        }
        Ok(())
    }

    pub fn check_object_allows(
        &self,
        object_owner: &Obj,
        object_flags: BitEnum<ObjFlag>,
        allows: BitEnum<ObjFlag>,
    ) -> Result<(), WorldStateError> {
        if &self.who == object_owner || self.is_wizard() {
            return Ok(());
        }
        if !object_flags.contains_all(allows) {
            return Err(WorldStateError::PermissionDenied);
        }
        Ok(())
    }

    /// Only the owner (or a wizard) may do this, regardless of flags — used for
    /// `chparent`/recycle/renumber (spec.md §4.2).
    pub fn check_obj_owner_perms(&self, object_owner: &Obj) -> Result<(), WorldStateError> {
        if &self.who == object_owner || self.is_wizard() {
            Ok(())
        } else {
            Err(WorldStateError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_always_allowed_even_without_flag() {
        let owner = Obj::mk_id(7);
        let perms = Perms::new(owner, BitEnum::new());
        assert!(
            perms
                .check_property_allows(&owner, BitEnum::new(), PropFlag::Write)
                .is_ok()
        );
    }

    #[test]
    fn wizard_bypasses_ownership() {
        let wizard = Obj::mk_id(2);
        let owner = Obj::mk_id(7);
        let perms = Perms::new(wizard, BitEnum::new_with(ObjFlag::Wizard));
        assert!(
            perms
                .check_property_allows(&owner, BitEnum::new(), PropFlag::Write)
                .is_ok()
        );
    }

    #[test]
    fn stranger_needs_the_flag() {
        let stranger = Obj::mk_id(99);
        let owner = Obj::mk_id(7);
        let perms = Perms::new(stranger, BitEnum::new());
        assert_eq!(
            perms.check_property_allows(&owner, BitEnum::new(), PropFlag::Write),
            Err(WorldStateError::PermissionDenied)
        );
        assert!(
            perms
                .check_property_allows(&owner, BitEnum::new_with(PropFlag::Write), PropFlag::Write)
                .is_ok()
        );
    }
}
