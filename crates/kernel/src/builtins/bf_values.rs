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

//! Value built-ins (spec.md §4.5 "value built-ins"): type introspection, conversion,
//! and the handful of pure-value helpers that never touch the world state or a task.

use super::{arity, err};
use crate::vm::Unwind;
use moor_var::{
    v_err, v_float, v_int, v_list, v_obj, v_objid, v_str, v_string, Error, ErrorCode, Var, Variant,
};
use rand::Rng;

pub(crate) fn call(name: &str, args: &[Var]) -> Result<Var, Unwind> {
    match name {
        "typeof" => typeof_(args),
        "length" => length(args),
        "tostr" => tostr(args),
        "toliteral" => toliteral(args),
        "tonum" => tonum(args),
        "tofloat" => tofloat(args),
        "toobj" => toobj(args),
        "toerr" => toerr(args),
        "equal" => equal(args),
        "random" => random(args),
        "min" => min(args),
        "max" => max(args),
        "abs" => abs(args),
        _ => unreachable!("dispatched by builtins::dispatch"),
    }
}

/// The integer type tags bound as globals on every frame (spec.md §4.1 "Arithmetic");
/// `typeof()` returns the same numbers.
fn type_tag(v: &Var) -> i64 {
    match v.variant() {
        Variant::Int(_) => 0,
        Variant::Obj(_) => 1,
        Variant::Str(_) => 2,
        Variant::List(_) => 3,
        Variant::Err(_) => 4,
        Variant::Float(_) => 5,
    }
}

fn typeof_(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    Ok(v_int(type_tag(&args[0])))
}

fn length(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    match args[0].variant() {
        Variant::List(l) => Ok(v_int(l.len() as i64)),
        Variant::Str(s) => Ok(v_int(s.len() as i64)),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

fn tostr(args: &[Var]) -> Result<Var, Unwind> {
    let parts: Vec<String> = args.iter().map(Var::to_display_string).collect();
    Ok(v_string(parts.join("")))
}

fn toliteral(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    Ok(v_string(args[0].to_literal()))
}

fn tonum(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    match args[0].variant() {
        Variant::Int(i) => Ok(v_int(*i)),
        Variant::Float(f) => Ok(v_int(*f as i64)),
        Variant::Str(s) => {
            let trimmed = s.as_str().trim();
            let digits: String = trimmed
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
                .collect();
            Ok(v_int(digits.parse::<i64>().unwrap_or(0)))
        }
        Variant::Obj(o) => Ok(v_int(o.id())),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

fn tofloat(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    match args[0].variant() {
        Variant::Int(i) => Ok(v_float(*i as f64)),
        Variant::Float(f) => Ok(v_float(*f)),
        Variant::Str(s) => Ok(v_float(s.as_str().trim().parse::<f64>().unwrap_or(0.0))),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

fn toobj(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    match args[0].variant() {
        Variant::Obj(o) => Ok(v_objid(*o)),
        Variant::Int(i) => Ok(v_obj(*i)),
        Variant::Str(s) => {
            let trimmed = s.as_str().trim().trim_start_matches('#');
            let id = trimmed
                .parse::<i64>()
                .map_err(|_| err(ErrorCode::E_INVARG))?;
            Ok(v_obj(id))
        }
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

fn toerr(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    match args[0].variant() {
        Variant::Err(e) => Ok(v_err(e.err_type)),
        Variant::Int(i) => {
            let code = ErrorCode::parse_str(&format!("E_{i}")).unwrap_or(ErrorCode::E_INVARG);
            Ok(v_err(code))
        }
        Variant::Str(s) => {
            let code = ErrorCode::parse_str(s.as_str()).ok_or_else(|| err(ErrorCode::E_INVARG))?;
            Ok(v_err(code))
        }
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

/// Identity-level equality (spec.md §8 "Identity equality"): exact, case-sensitive
/// for strings, unlike the language's own `==`.
fn equal(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 2, 2)?;
    Ok(v_int(i64::from(args[0].identical(&args[1]))))
}

fn random(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 0, 1)?;
    let bound = match args.first() {
        None => i64::MAX,
        Some(v) => match v.variant() {
            Variant::Int(i) => *i,
            _ => return Err(err(ErrorCode::E_TYPE)),
        },
    };
    if bound < 1 {
        return Err(err(ErrorCode::E_INVARG));
    }
    let n = rand::thread_rng().gen_range(1..=bound);
    Ok(v_int(n))
}

fn min(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, usize::MAX)?;
    fold_extreme(args, std::cmp::Ordering::Less)
}

fn max(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, usize::MAX)?;
    fold_extreme(args, std::cmp::Ordering::Greater)
}

fn fold_extreme(args: &[Var], want: std::cmp::Ordering) -> Result<Var, Unwind> {
    let mut best = args[0].clone();
    for candidate in &args[1..] {
        let cmp = candidate
            .partial_cmp(&best)
            .ok_or_else(|| err(ErrorCode::E_TYPE))?;
        if cmp == want {
            best = candidate.clone();
        }
    }
    Ok(best)
}

fn abs(args: &[Var]) -> Result<Var, Unwind> {
    arity(args, 1, 1)?;
    match args[0].variant() {
        Variant::Int(i) => Ok(v_int(i.wrapping_abs())),
        Variant::Float(f) => Ok(v_float(f.abs())),
        _ => Err(err(ErrorCode::E_TYPE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moor_var::v_str;

    #[test]
    fn typeof_matches_the_bound_type_tag_globals() {
        assert_eq!(typeof_(&[v_int(1)]).unwrap(), v_int(0));
        assert_eq!(typeof_(&[v_str("x")]).unwrap(), v_int(2));
        assert_eq!(typeof_(&[v_float(1.0)]).unwrap(), v_int(5));
    }

    #[test]
    fn equal_is_case_sensitive_unlike_language_level_eq() {
        assert_eq!(equal(&[v_str("Foo"), v_str("foo")]).unwrap(), v_int(0));
        assert_eq!(equal(&[v_str("Foo"), v_str("Foo")]).unwrap(), v_int(1));
    }

    #[test]
    fn min_max_pick_extremes_across_mixed_numeric_types() {
        assert_eq!(min(&[v_int(3), v_int(1), v_int(2)]).unwrap(), v_int(1));
        assert_eq!(max(&[v_int(3), v_int(1), v_int(2)]).unwrap(), v_int(3));
    }

    #[test]
    fn tonum_parses_a_leading_integer_prefix() {
        assert_eq!(tonum(&[v_str("42abc")]).unwrap(), v_int(42));
        assert_eq!(tonum(&[v_str("nope")]).unwrap(), v_int(0));
    }
}
