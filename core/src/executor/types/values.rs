//! Runtime value types

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Runtime value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Map(HashMap<String, Val>),
    /// Set of non-negative indices, written `({1 3 5})`
    Bits(BTreeSet<u32>),
}

impl Val {
    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Num(n) => *n != 0.0,
            Val::Str(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Val::List(items) => !items.is_empty(),
            Val::Map(map) => !map.is_empty(),
            Val::Bits(bits) => !bits.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Int(_) => "integer",
            Val::Num(_) => "decimal",
            Val::Str(_) => "string",
            Val::List(_) => "array",
            Val::Map(_) => "map",
            Val::Bits(_) => "bitset",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Num(n) => Some(*n),
            Val::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Val::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            Val::Num(n) if n.is_finite() => Some(n.trunc() as i64),
            Val::Bool(b) => Some(*b as i64),
            Val::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Num(_))
    }

    /// Equality used by `==`, `switch` and `case`: numbers compare by value
    /// across integer and decimal.
    pub fn loose_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }

    pub fn compare(&self, other: &Val) -> Option<Ordering> {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Some(a.cmp(b)),
            (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            _ => None,
        }
    }

    /// Map keys in sorted order
    pub fn sorted_keys(map: &HashMap<String, Val>) -> Vec<String> {
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => write!(f, "{:?}", s),
            Val::Null => write!(f, "null"),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => Ok(()),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(i) => write!(f, "{}", i),
            Val::Num(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{:.1}", n),
            Val::Num(n) => write!(f, "{}", n),
            Val::Str(s) => write!(f, "{}", s),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Val::Map(map) => {
                write!(f, "{{")?;
                for (i, key) in Val::sorted_keys(map).iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: ", key)?;
                    map[key].fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Val::Bits(bits) => {
                write!(f, "({{")?;
                for (i, bit) in bits.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", bit)?;
                }
                write!(f, "}})")
            }
        }
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(s.to_string())
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(s)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn test_loose_eq_crosses_numeric_types() {
        assert!(Val::Int(2).loose_eq(&Val::Num(2.0)));
        assert!(!Val::Int(2).loose_eq(&Val::Str("2".into())));
    }

    #[test]
    fn test_display() {
        let map = Val::Map(hashmap! {
            "b".to_string() => Val::Int(2),
            "a".to_string() => Val::Str("x".into()),
        });
        assert_eq!(map.to_string(), r#"{"a": "x", "b": 2}"#);
        assert_eq!(Val::Bits([1, 3].into_iter().collect()).to_string(), "({1 3})");
        assert_eq!(Val::Num(3.0).to_string(), "3.0");
        assert_eq!(Val::Null.to_string(), "");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Val::Str("false".into()).is_truthy());
        assert!(!Val::Int(0).is_truthy());
        assert!(Val::List(vec![Val::Null]).is_truthy());
    }
}
