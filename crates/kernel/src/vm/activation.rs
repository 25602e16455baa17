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

//! A single verb invocation's stack frame (spec.md §3 "Stack frame"): the bound
//! variable environment, the calling context, and the permission set the verb body
//! runs under. Loop and try-finally contexts are *not* modeled here — since the
//! evaluator is a tree-walker, those boundaries live on the host thread's own native
//! call stack, the way spec.md §9's "trampolining interpreter" note and the
//! thread-per-task suspend/resume design (see `DESIGN.md`) both lean on already.

use moor_common::model::Perms;
use moor_compiler::{GlobalName, Program};
use moor_var::{Obj, Var, v_int, v_list, v_objid, v_str};

/// The integer tags `typeof()` compares results against (spec.md §4.1 "Arithmetic").
/// `NUM` is a historical alias for `INT`.
const TAG_INT: i64 = 0;
const TAG_OBJ: i64 = 1;
const TAG_STR: i64 = 2;
const TAG_LIST: i64 = 3;
const TAG_ERR: i64 = 4;
const TAG_FLOAT: i64 = 5;

/// The resolved command context bound into the top frame of a command-dispatched task
/// (spec.md §4.6 "Command dispatch loop"): which object matched as direct/indirect
/// object, and the raw surface strings the command line supplied for each.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub dobj: Obj,
    pub dobj_str: String,
    pub prep_str: String,
    pub iobj: Obj,
    pub iobj_str: String,
}

/// One entry on a task's call stack.
pub struct Activation {
    pub this: Obj,
    pub player: Obj,
    pub caller: Obj,
    pub verb_name: String,
    pub definer: Obj,
    pub perms: Perms,
    pub debug: bool,
    pub program: Program,
    pub env: Vec<Var>,
}

impl Activation {
    /// Build a fresh frame for invoking `program`, binding the type-tag constants and
    /// the per-invocation context variables (spec.md §4.3 "Verb call"). `dobj`/`iobj`/
    /// `prepstr` etc. come from `command_context` for a command-dispatched top frame,
    /// or are inherited unchanged from `inherited_context` (the calling frame) for a
    /// nested verb call — real MOO code relies on these staying stable down a call
    /// chain started by one command.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        this: Obj,
        player: Obj,
        caller: Obj,
        verb_name: String,
        definer: Obj,
        perms: Perms,
        debug: bool,
        program: Program,
        args: Vec<Var>,
        command_context: Option<&CommandContext>,
        inherited_context: Option<&Activation>,
    ) -> Self {
        let names = program.names();
        let mut env = vec![v_int(0); names.width()];
        env[names.global(GlobalName::NUM).0 as usize] = v_int(TAG_INT);
        env[names.global(GlobalName::INT).0 as usize] = v_int(TAG_INT);
        env[names.global(GlobalName::OBJ).0 as usize] = v_int(TAG_OBJ);
        env[names.global(GlobalName::STR).0 as usize] = v_int(TAG_STR);
        env[names.global(GlobalName::LIST).0 as usize] = v_int(TAG_LIST);
        env[names.global(GlobalName::ERR).0 as usize] = v_int(TAG_ERR);
        env[names.global(GlobalName::FLOAT).0 as usize] = v_int(TAG_FLOAT);
        env[names.global(GlobalName::player).0 as usize] = v_objid(player);
        env[names.global(GlobalName::this).0 as usize] = v_objid(this);
        env[names.global(GlobalName::caller).0 as usize] = v_objid(caller);
        env[names.global(GlobalName::verb).0 as usize] = v_str(&verb_name);

        let argstr = args
            .iter()
            .map(Var::to_display_string)
            .collect::<Vec<_>>()
            .join(" ");
        env[names.global(GlobalName::argstr).0 as usize] = v_str(&argstr);
        env[names.global(GlobalName::args).0 as usize] = v_list(args);

        if let Some(cmd) = command_context {
            env[names.global(GlobalName::dobj).0 as usize] = v_objid(cmd.dobj);
            env[names.global(GlobalName::dobjstr).0 as usize] = v_str(&cmd.dobj_str);
            env[names.global(GlobalName::prepstr).0 as usize] = v_str(&cmd.prep_str);
            env[names.global(GlobalName::iobj).0 as usize] = v_objid(cmd.iobj);
            env[names.global(GlobalName::iobjstr).0 as usize] = v_str(&cmd.iobj_str);
        } else if let Some(parent) = inherited_context {
            let parent_names = parent.program.names();
            for global in [
                GlobalName::dobj,
                GlobalName::dobjstr,
                GlobalName::prepstr,
                GlobalName::iobj,
                GlobalName::iobjstr,
            ] {
                let slot = parent_names.global(global).0 as usize;
                env[names.global(global).0 as usize] = parent.env[slot].clone();
            }
        }

        Self {
            this,
            player,
            caller,
            verb_name,
            definer,
            perms,
            debug,
            program,
            env,
        }
    }
}
