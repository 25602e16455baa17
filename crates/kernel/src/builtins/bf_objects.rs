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

//! Object/property/verb built-ins (spec.md §4.5 "object built-ins"). These all go
//! through `Task::db`, the task's own transaction, rather than touching the database
//! directly — a conflicting commit elsewhere in the store is exactly what the
//! runtime's retry-the-whole-task discipline (spec.md §4.2 "Concurrency discipline")
//! is there to paper over.

use super::{arg_list, arg_obj, arg_str, arity, err, opt_obj};
use crate::tasks::task::Task;
use crate::vm::Unwind;
use moor_common::model::{
    ObjAttrs, ObjFlag, ObjSpec, Perms, PrepSpec, PropFlag, Verb, VerbArgsSpec, VerbFlag,
    VerbNames, WorldState, WorldStateError,
};
use moor_common::util::BitEnum;
use moor_var::{v_int, v_list_iter, v_objid, Error, ErrorCode, Symbol, Var, Variant, NOTHING};

fn werr(e: WorldStateError) -> Unwind {
    Unwind::from(Error::from(e))
}

fn perms(task: &Task) -> Perms {
    task.call_stack
        .last()
        .map(|a| a.perms.clone())
        .unwrap_or_else(|| Perms::new(task.player, BitEnum::new()))
}

pub(crate) fn call(task: &mut Task, name: &str, args: &[Var]) -> Result<Var, Unwind> {
    match name {
        "create" => create(task, args),
        "recycle" => recycle(task, args),
        "renumber" => renumber(task, args),
        "valid" => valid(task, args),
        "parent" => parent(task, args),
        "children" => children(task, args),
        "chparent" => chparent(task, args),
        "move" => move_(task, args),
        "is_player" => is_player(task, args),
        "add_property" => add_property(task, args),
        "delete_property" => delete_property(task, args),
        "add_verb" => add_verb(task, args),
        "delete_verb" => delete_verb(task, args),
        "set_verb_info" => set_verb_info(task, args),
        "set_verb_args" => set_verb_args(task, args),
        _ => unreachable!("dispatched by builtins::dispatch"),
    }
}

fn create(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 2)?;
    let parent = arg_obj(args, 0)?;
    let owner = opt_obj(args, 1, task.player)?;
    let perms = perms(task);
    let mut attrs = ObjAttrs::new();
    attrs.owner = Some(owner);
    attrs.name = Some(String::new());
    if !parent.is_nothing() {
        attrs.parent = Some(parent);
    }
    let id = task.db.create_object(&perms, attrs).map_err(werr)?;
    if !parent.is_nothing() {
        task.db.chparent(&perms, &id, &parent).map_err(werr)?;
    }
    Ok(v_objid(id))
}

fn recycle(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let obj = arg_obj(args, 0)?;
    let perms = perms(task);
    task.db.recycle_object(&perms, &obj).map_err(werr)?;
    Ok(v_int(0))
}

fn renumber(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let obj = arg_obj(args, 0)?;
    let perms = perms(task);
    let new_id = task.db.renumber_object(&perms, &obj).map_err(werr)?;
    Ok(v_objid(new_id))
}

fn valid(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let obj = arg_obj(args, 0)?;
    let ok = task.db.valid(&obj).map_err(werr)?;
    Ok(v_int(i64::from(ok)))
}

fn parent(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let obj = arg_obj(args, 0)?;
    let attrs = task.db.get_object(&obj).map_err(werr)?;
    Ok(v_objid(attrs.parent.unwrap_or(NOTHING)))
}

fn children(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let obj = arg_obj(args, 0)?;
    let kids = task.db.children(&obj).map_err(werr)?;
    Ok(v_list_iter(kids.into_iter().map(v_objid)))
}

fn chparent(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    let obj = arg_obj(args, 0)?;
    let new_parent = arg_obj(args, 1)?;
    let perms = perms(task);
    task.db.chparent(&perms, &obj, &new_parent).map_err(werr)?;
    Ok(v_int(0))
}

fn move_(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    let obj = arg_obj(args, 0)?;
    let new_location = arg_obj(args, 1)?;
    let perms = perms(task);
    task.db
        .move_object(&perms, &obj, &new_location)
        .map_err(werr)?;
    Ok(v_int(0))
}

fn is_player(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    let obj = arg_obj(args, 0)?;
    let attrs = task.db.get_object(&obj).map_err(werr)?;
    let is_player = attrs
        .flags
        .unwrap_or_else(BitEnum::new)
        .contains(ObjFlag::Player);
    Ok(v_int(i64::from(is_player)))
}

/// `add_property(obj, name, value, info)` where `info` is `{owner, perms_str}`
/// (spec.md §4.2 "add_property").
fn add_property(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 4, 4)?;
    let obj = arg_obj(args, 0)?;
    let name = arg_str(args, 1)?.to_string();
    let value = args[2].clone();
    let info = arg_list(args, 3)?;
    if info.len() != 2 {
        return Err(err(ErrorCode::E_INVARG));
    }
    let owner = match info.get(0).map_err(Unwind::from)?.variant() {
        Variant::Obj(o) => *o,
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let perms_str = match info.get(1).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let flags = PropFlag::parse_str(&perms_str).ok_or_else(|| err(ErrorCode::E_INVARG))?;
    let perms = perms(task);
    task.db
        .add_property(&perms, &obj, Symbol::mk(&name), owner, flags, Some(value))
        .map_err(werr)?;
    Ok(v_int(0))
}

fn delete_property(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    let obj = arg_obj(args, 0)?;
    let name = arg_str(args, 1)?.to_string();
    let perms = perms(task);
    task.db
        .delete_property(&perms, &obj, Symbol::mk(&name))
        .map_err(werr)?;
    Ok(v_int(0))
}

fn parse_objspec(s: &str) -> Result<ObjSpec, Unwind> {
    match s {
        "this" => Ok(ObjSpec::This),
        "any" => Ok(ObjSpec::Any),
        "none" => Ok(ObjSpec::None),
        _ => Err(err(ErrorCode::E_INVARG)),
    }
}

fn parse_prepspec(s: &str) -> Result<PrepSpec, Unwind> {
    match s {
        "any" => Ok(PrepSpec::Any),
        "none" => Ok(PrepSpec::None),
        word => PrepSpec::match_word(word).ok_or_else(|| err(ErrorCode::E_INVARG)),
    }
}

/// `add_verb(obj, info, args)` where `info` is `{owner, perms_str, names}` and
/// `args` is `{dobj, prep, iobj}` (spec.md §4.2 "add_verb").
fn add_verb(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 3, 3)?;
    let obj = arg_obj(args, 0)?;
    let info = arg_list(args, 1)?;
    if info.len() != 3 {
        return Err(err(ErrorCode::E_INVARG));
    }
    let owner = match info.get(0).map_err(Unwind::from)?.variant() {
        Variant::Obj(o) => *o,
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let perms_str = match info.get(1).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let names_str = match info.get(2).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let flags = VerbFlag::parse_str(&perms_str).ok_or_else(|| err(ErrorCode::E_INVARG))?;

    let spec_list = arg_list(args, 2)?;
    if spec_list.len() != 3 {
        return Err(err(ErrorCode::E_INVARG));
    }
    let dobj_str = match spec_list.get(0).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let prep_str = match spec_list.get(1).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let iobj_str = match spec_list.get(2).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let args_spec = VerbArgsSpec {
        dobj: parse_objspec(&dobj_str)?,
        prep: parse_prepspec(&prep_str)?,
        iobj: parse_objspec(&iobj_str)?,
    };

    let perms = perms(task);
    let verb = Verb {
        names: VerbNames::parse(&names_str),
        owner,
        flags,
        args_spec,
    };
    task.db.add_verb(&perms, &obj, verb).map_err(werr)?;
    Ok(v_int(0))
}

fn delete_verb(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    let obj = arg_obj(args, 0)?;
    let verb_desc = arg_str(args, 1)?.to_string();
    let perms = perms(task);
    task.db
        .delete_verb(&perms, &obj, &verb_desc)
        .map_err(werr)?;
    Ok(v_int(0))
}

/// `set_verb_info(obj, verb_desc, {owner, perms_str, names})`.
fn set_verb_info(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 3, 3)?;
    let obj = arg_obj(args, 0)?;
    let verb_desc = arg_str(args, 1)?.to_string();
    let info = arg_list(args, 2)?;
    if info.len() != 3 {
        return Err(err(ErrorCode::E_INVARG));
    }
    let owner = match info.get(0).map_err(Unwind::from)?.variant() {
        Variant::Obj(o) => *o,
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let perms_str = match info.get(1).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let names_str = match info.get(2).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let flags = VerbFlag::parse_str(&perms_str).ok_or_else(|| err(ErrorCode::E_INVARG))?;
    let perms = perms(task);
    task.db
        .modify_verb(
            &perms,
            &obj,
            &verb_desc,
            Box::new(move |v: &mut Verb| {
                v.owner = owner;
                v.flags = flags;
                v.names = VerbNames::parse(&names_str);
            }),
        )
        .map_err(werr)?;
    Ok(v_int(0))
}

/// `set_verb_args(obj, verb_desc, {dobj, prep, iobj})`.
fn set_verb_args(task: &mut Task, args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 3, 3)?;
    let obj = arg_obj(args, 0)?;
    let verb_desc = arg_str(args, 1)?.to_string();
    let spec_list = arg_list(args, 2)?;
    if spec_list.len() != 3 {
        return Err(err(ErrorCode::E_INVARG));
    }
    let dobj_str = match spec_list.get(0).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let prep_str = match spec_list.get(1).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let iobj_str = match spec_list.get(2).map_err(Unwind::from)?.variant() {
        Variant::Str(s) => s.as_str().to_string(),
        _ => return Err(err(ErrorCode::E_TYPE)),
    };
    let args_spec = VerbArgsSpec {
        dobj: parse_objspec(&dobj_str)?,
        prep: parse_prepspec(&prep_str)?,
        iobj: parse_objspec(&iobj_str)?,
    };
    let perms = perms(task);
    task.db
        .modify_verb(
            &perms,
            &obj,
            &verb_desc,
            Box::new(move |v: &mut Verb| {
                v.args_spec = args_spec;
            }),
        )
        .map_err(werr)?;
    Ok(v_int(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objspec_parses_the_three_keywords() {
        assert!(matches!(parse_objspec("this").unwrap(), ObjSpec::This));
        assert!(matches!(parse_objspec("any").unwrap(), ObjSpec::Any));
        assert!(matches!(parse_objspec("none").unwrap(), ObjSpec::None));
        assert!(parse_objspec("bogus").is_err());
    }
}
