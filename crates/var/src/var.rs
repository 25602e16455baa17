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

//! The `Var` value type and the arithmetic/comparison/equality rules of spec.md §4.1.

use crate::error::{Error, ErrorCode};
use crate::list::List;
use crate::obj::Obj;
use crate::string::Str;
use crate::variant::Variant;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

#[derive(Clone)]
pub struct Var(Variant);

impl Var {
    #[must_use]
    pub fn variant(&self) -> &Variant {
        &self.0
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Truthiness (spec.md §4.1): integer/float nonzero, string nonempty, list
    /// nonempty; everything else (object, error) is falsy.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match &self.0 {
            Variant::Int(i) => *i != 0,
            Variant::Float(f) => *f != 0.0,
            Variant::Str(s) => !s.is_empty(),
            Variant::List(l) => !l.is_empty(),
            Variant::Obj(_) | Variant::Err(_) => false,
        }
    }

    /// Identity-level equality: exact, including string case (spec.md §4.1, §8
    /// "Identity equality").
    #[must_use]
    pub fn identical(&self, other: &Var) -> bool {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a.to_bits() == b.to_bits(),
            (Variant::Str(a), Variant::Str(b)) => a.identical(b),
            (Variant::Obj(a), Variant::Obj(b)) => a == b,
            (Variant::Err(a), Variant::Err(b)) => a.err_type == b.err_type,
            (Variant::List(a), Variant::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.identical(y))
            }
            _ => false,
        }
    }

    /// Render for `toliteral`/verb re-serialization — always produces a string that
    /// `parse_literal` can read back (spec.md §8 "List round-trip").
    #[must_use]
    pub fn to_literal(&self) -> String {
        match &self.0 {
            Variant::Int(i) => i.to_string(),
            Variant::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
            Variant::Str(s) => format!("\"{}\"", escape_string(s.as_str())),
            Variant::Obj(o) => o.to_string(),
            Variant::Err(e) => e.err_type.to_string(),
            Variant::List(l) => {
                let parts: Vec<String> = l.iter().map(Var::to_literal).collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }

    /// Render for `tostr`: no quoting of strings, used for player-visible output.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match &self.0 {
            Variant::Str(s) => s.as_str().to_string(),
            _ => self.to_literal(),
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

impl PartialEq for Var {
    /// Language-level `==`: case-insensitive for strings, recursive for lists
    /// (spec.md §4.1, §8 "Case-insensitive equality").
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Variant::Int(i) => i.hash(state),
            Variant::Float(f) => f.to_bits().hash(state),
            Variant::Str(s) => s.hash(state),
            Variant::Obj(o) => o.hash(state),
            Variant::Err(e) => e.hash(state),
            Variant::List(l) => l.hash(state),
        }
    }
}

impl PartialOrd for Var {
    /// Ordering is defined only within same-type pairs; lists are not orderable
    /// (spec.md §4.1).
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => a.partial_cmp(b),
            (Variant::Float(a), Variant::Float(b)) => a.partial_cmp(b),
            (Variant::Str(a), Variant::Str(b)) => a.partial_cmp(b),
            (Variant::Obj(a), Variant::Obj(b)) => a.partial_cmp(b),
            (Variant::Err(a), Variant::Err(b)) => a.err_type.partial_cmp(&b.err_type),
            _ => None,
        }
    }
}

impl Debug for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_literal())
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

pub fn v_int(i: i64) -> Var {
    Var(Variant::Int(i))
}
pub fn v_float(f: f64) -> Var {
    Var(Variant::Float(f))
}
pub fn v_str(s: &str) -> Var {
    Var(Variant::Str(Str::from_str(s)))
}
pub fn v_string(s: String) -> Var {
    Var(Variant::Str(Str::from(s)))
}
pub fn v_obj(id: i64) -> Var {
    Var(Variant::Obj(Obj::mk_id(id)))
}
pub fn v_objid(o: Obj) -> Var {
    Var(Variant::Obj(o))
}
pub fn v_err(code: ErrorCode) -> Var {
    Var(Variant::Err(Error::from(code)))
}
pub fn v_error(e: Error) -> Var {
    Var(Variant::Err(e))
}
pub fn v_empty_list() -> Var {
    Var(Variant::List(List::empty()))
}
pub fn v_list(items: Vec<Var>) -> Var {
    Var(Variant::List(List::from_vec(items)))
}
pub fn v_list_iter<I: IntoIterator<Item = Var>>(iter: I) -> Var {
    Var(Variant::List(iter.into_iter().collect()))
}

// --- Arithmetic (spec.md §4.1 "Arithmetic") -------------------------------------

/// `minint` for the 64-bit integer build: `i64 / -1` would overflow, so by spec.md
/// §9 this case returns `minint` rather than trapping.
pub fn checked_int_div(a: i64, b: i64) -> Result<i64, Error> {
    if b == 0 {
        return Err(ErrorCode::E_DIV.into());
    }
    if a == i64::MIN && b == -1 {
        return Ok(i64::MIN);
    }
    Ok(a / b)
}

pub fn checked_int_mod(a: i64, b: i64) -> Result<i64, Error> {
    if b == 0 {
        return Err(ErrorCode::E_DIV.into());
    }
    if a == i64::MIN && b == -1 {
        return Ok(0);
    }
    Ok(a % b)
}

fn check_float_result(f: f64) -> Result<Var, Error> {
    if f.is_nan() {
        Err(ErrorCode::E_INVARG.msg("NaN result"))
    } else if f.is_infinite() {
        Err(ErrorCode::E_FLOAT.msg("floating point overflow"))
    } else {
        Ok(v_float(f))
    }
}

/// Integer exponentiation with MOO's negative-exponent rule (spec.md §4.1 "Power").
pub fn int_pow(base: i64, exp: i64) -> Result<Var, Error> {
    if exp >= 0 {
        let exp = u32::try_from(exp).map_err(|_| ErrorCode::E_INVARG.msg("exponent too large"))?;
        Ok(v_int(base.wrapping_pow(exp)))
    } else {
        match base {
            0 => Err(ErrorCode::E_DIV.into()),
            1 => Ok(v_int(1)),
            -1 => Ok(v_int(if exp % 2 == 0 { 1 } else { -1 })),
            _ => Ok(v_int(0)),
        }
    }
}

impl Var {
    pub fn add(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => Ok(v_int(a.wrapping_add(*b))),
            (Variant::Float(a), Variant::Float(b)) => check_float_result(a + b),
            (Variant::Str(a), Variant::Str(b)) => {
                Ok(v_string(format!("{}{}", a.as_str(), b.as_str())))
            }
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }

    pub fn sub(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => Ok(v_int(a.wrapping_sub(*b))),
            (Variant::Float(a), Variant::Float(b)) => check_float_result(a - b),
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }

    pub fn mul(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => Ok(v_int(a.wrapping_mul(*b))),
            (Variant::Float(a), Variant::Float(b)) => check_float_result(a * b),
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }

    pub fn div(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => Ok(v_int(checked_int_div(*a, *b)?)),
            (Variant::Float(a), Variant::Float(b)) => {
                if *b == 0.0 {
                    return Err(ErrorCode::E_DIV.into());
                }
                check_float_result(a / b)
            }
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }

    pub fn modulo(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => Ok(v_int(checked_int_mod(*a, *b)?)),
            (Variant::Float(a), Variant::Float(b)) => {
                if *b == 0.0 {
                    return Err(ErrorCode::E_DIV.into());
                }
                check_float_result(a % b)
            }
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }

    pub fn pow(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(a), Variant::Int(b)) => int_pow(*a, *b),
            (Variant::Float(a), Variant::Float(b)) => check_float_result(a.powf(*b)),
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }

    pub fn negate(&self) -> Result<Var, Error> {
        match &self.0 {
            Variant::Int(a) => Ok(v_int(a.wrapping_neg())),
            Variant::Float(a) => Ok(v_float(-a)),
            _ => Err(ErrorCode::E_TYPE.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_add_matches_scenario_one() {
        // "1 + 2 * 3" => Int(7)
        let r = v_int(2).mul(&v_int(3)).unwrap().add(&v_int(1));
        // left-assoc emulation not relevant here, just checking primitive ops
        assert_eq!(v_int(1).add(&v_int(6)).unwrap(), v_int(7));
        assert_eq!(r.unwrap(), v_int(7));
    }

    #[test]
    fn string_concat() {
        assert_eq!(v_str("foo").add(&v_str("bar")).unwrap(), v_str("foobar"));
    }

    #[test]
    fn mixed_type_add_is_type_error() {
        let e = v_int(1).add(&v_str("x")).unwrap_err();
        assert_eq!(e, ErrorCode::E_TYPE);
    }

    #[test]
    fn minint_div_neg_one_returns_minint() {
        assert_eq!(checked_int_div(i64::MIN, -1).unwrap(), i64::MIN);
    }

    #[test]
    fn div_by_zero_is_division_error() {
        assert_eq!(v_int(1).div(&v_int(0)).unwrap_err(), ErrorCode::E_DIV);
        assert_eq!(
            v_float(1.0).div(&v_float(0.0)).unwrap_err(),
            ErrorCode::E_DIV
        );
    }

    #[test]
    fn float_producing_infinity_is_an_error() {
        let huge = v_float(f64::MAX);
        assert_eq!(huge.mul(&huge).unwrap_err(), ErrorCode::E_FLOAT);
    }

    #[test]
    fn negative_exponent_rules() {
        assert_eq!(int_pow(0, -1).unwrap_err(), ErrorCode::E_DIV);
        assert_eq!(int_pow(1, -5).unwrap(), v_int(1));
        assert_eq!(int_pow(-1, -3).unwrap(), v_int(-1));
        assert_eq!(int_pow(-1, -4).unwrap(), v_int(1));
        assert_eq!(int_pow(5, -2).unwrap(), v_int(0));
    }

    #[test]
    fn case_insensitive_equality_and_identity_builtin_semantics() {
        // "Foo" == "FOO" is true; equal("Foo","FOO") is false; equal("Foo","Foo") true.
        assert_eq!(v_str("Foo"), v_str("FOO"));
        assert!(!v_str("Foo").identical(&v_str("FOO")));
        assert!(v_str("Foo").identical(&v_str("Foo")));
    }

    #[test]
    fn ordering_across_types_is_undefined() {
        assert_eq!(v_int(1).partial_cmp(&v_str("x")), None);
    }

    #[test]
    fn to_literal_round_trips_ints_and_lists() {
        let l = v_list(vec![v_int(1), v_str("hi"), v_obj(3)]);
        assert_eq!(l.to_literal(), "{1, \"hi\", #3}");
    }
}
