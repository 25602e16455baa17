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

use crate::var::Var;
use ErrorCode::*;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// A raised MOO error: an error code, an optional human-readable message, and an
/// optional extra value (the third element of the `{code, message, value, traceback}`
/// tuple handed to `except` clauses).
#[derive(Clone, Eq)]
pub struct Error {
    pub err_type: ErrorCode,
    pub msg: Option<Box<String>>,
    pub value: Option<Box<Var>>,
}

impl Hash for Error {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.err_type.hash(state);
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.err_type == other.err_type
    }
}

impl Error {
    pub fn new(err_type: ErrorCode, msg: Option<String>, value: Option<Var>) -> Self {
        Self {
            err_type,
            msg: msg.map(Box::new),
            value: value.map(Box::new),
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match &self.msg {
            Some(m) => m.as_ref().clone(),
            None => self.err_type.default_message().to_string(),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err_type)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.msg.is_some() {
            write!(f, "{} ({})", self.err_type, self.message())
        } else {
            write!(f, "{}", self.err_type)
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorCode> for Error {
    fn from(val: ErrorCode) -> Self {
        Error::new(val, None, None)
    }
}

impl PartialEq<ErrorCode> for Error {
    fn eq(&self, other: &ErrorCode) -> bool {
        self.err_type == *other
    }
}

/// The fixed enumeration of MOO error codes (spec.md §3 "Error").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    E_TYPE,
    E_DIV,
    E_PERM,
    E_PROPNF,
    E_VERBNF,
    E_VARNF,
    E_INVIND,
    E_RECMOVE,
    E_MAXREC,
    E_RANGE,
    E_ARGS,
    E_NACC,
    E_INVARG,
    E_QUOTA,
    E_FLOAT,
}

impl ErrorCode {
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "E_TYPE" => Some(E_TYPE),
            "E_DIV" => Some(E_DIV),
            "E_PERM" => Some(E_PERM),
            "E_PROPNF" => Some(E_PROPNF),
            "E_VERBNF" => Some(E_VERBNF),
            "E_VARNF" => Some(E_VARNF),
            "E_INVIND" => Some(E_INVIND),
            "E_RECMOVE" => Some(E_RECMOVE),
            "E_MAXREC" => Some(E_MAXREC),
            "E_RANGE" => Some(E_RANGE),
            "E_ARGS" => Some(E_ARGS),
            "E_NACC" => Some(E_NACC),
            "E_INVARG" => Some(E_INVARG),
            "E_QUOTA" => Some(E_QUOTA),
            "E_FLOAT" => Some(E_FLOAT),
            _ => None,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            E_TYPE => "Type mismatch",
            E_DIV => "Division by zero",
            E_PERM => "Permission denied",
            E_PROPNF => "Property not found",
            E_VERBNF => "Verb not found",
            E_VARNF => "Variable not found",
            E_INVIND => "Invalid indirection",
            E_RECMOVE => "Recursive move",
            E_MAXREC => "Too many verb calls",
            E_RANGE => "Range error",
            E_ARGS => "Incorrect number of arguments",
            E_NACC => "Move refused by destination",
            E_INVARG => "Invalid argument",
            E_QUOTA => "Resource limit exceeded",
            E_FLOAT => "Floating-point arithmetic error",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            E_TYPE => "E_TYPE",
            E_DIV => "E_DIV",
            E_PERM => "E_PERM",
            E_PROPNF => "E_PROPNF",
            E_VERBNF => "E_VERBNF",
            E_VARNF => "E_VARNF",
            E_INVIND => "E_INVIND",
            E_RECMOVE => "E_RECMOVE",
            E_MAXREC => "E_MAXREC",
            E_RANGE => "E_RANGE",
            E_ARGS => "E_ARGS",
            E_NACC => "E_NACC",
            E_INVARG => "E_INVARG",
            E_QUOTA => "E_QUOTA",
            E_FLOAT => "E_FLOAT",
        };
        write!(f, "{s}")
    }
}

impl ErrorCode {
    pub fn msg<S: ToString>(self, s: S) -> Error {
        Error::new(self, Some(s.to_string()), None)
    }

    pub fn with_value(self, value: Var) -> Error {
        Error::new(self, None, Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_display() {
        for code in [E_TYPE, E_DIV, E_PERM, E_RANGE, E_QUOTA, E_FLOAT] {
            let s = code.to_string();
            assert_eq!(ErrorCode::parse_str(&s), Some(code));
        }
    }

    #[test]
    fn default_message_is_used_when_none_given() {
        let e: Error = E_DIV.into();
        assert_eq!(e.message(), "Division by zero");
    }
}
