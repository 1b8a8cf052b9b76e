// src/spec/variant.rs

//! Variant values.
//!
//! A variant is a named build-time option. Its value is either a boolean
//! (`+mpi` / `~mpi`), a single string from an enumerated domain
//! (`io=etsf`), or a set of strings for multi-valued variants
//! (`profile=time,memory`). Which of these is legal for a given variant is
//! decided by the recipe's [`VariantDefinition`](crate::registry::VariantDefinition).

use std::fmt;

use serde::Deserialize;

/// A concrete variant value.
///
/// `List` values are kept sorted so that equality and display are
/// order-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariantValue {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl VariantValue {
    /// Build a list value, normalising to sorted/deduplicated form.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = items.into_iter().map(Into::into).collect();
        items.sort();
        items.dedup();
        VariantValue::List(items)
    }

    /// Parse the right-hand side of a `name=value` token.
    ///
    /// A comma makes the value a list; `true`/`false` become booleans.
    pub fn parse_token(s: &str) -> Self {
        if s.contains(',') {
            return VariantValue::list(s.split(',').map(str::trim));
        }
        match s {
            "true" => VariantValue::Bool(true),
            "false" => VariantValue::Bool(false),
            other => VariantValue::Str(other.to_string()),
        }
    }

    /// True if `self`, taken as a constraint, is satisfied by the assigned
    /// value `assigned`.
    ///
    /// For scalar values this is equality. A constraint list is satisfied
    /// when it is a subset of the assigned list (`io=etsf` means "etsf is
    /// enabled", not "etsf is the only enabled value"), and a scalar string
    /// constraint against a list means membership.
    pub fn satisfied_by(&self, assigned: &VariantValue) -> bool {
        match (self, assigned) {
            (VariantValue::List(want), VariantValue::List(have)) => {
                want.iter().all(|w| have.contains(w))
            }
            (VariantValue::Str(want), VariantValue::List(have)) => have.contains(want),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Bool(b) => write!(f, "{b}"),
            VariantValue::Str(s) => write!(f, "{s}"),
            VariantValue::List(items) => {
                if items.is_empty() {
                    write!(f, "none")
                } else {
                    write!(f, "{}", items.join(","))
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for VariantValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Str(String),
            List(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => VariantValue::Bool(b),
            Raw::Str(s) => VariantValue::Str(s),
            Raw::List(items) => VariantValue::list(items),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parsing() {
        assert_eq!(VariantValue::parse_token("true"), VariantValue::Bool(true));
        assert_eq!(
            VariantValue::parse_token("etsf"),
            VariantValue::Str("etsf".to_string())
        );
        assert_eq!(
            VariantValue::parse_token("time,memory"),
            VariantValue::list(["memory", "time"])
        );
    }

    #[test]
    fn list_constraints_are_subset_checks() {
        let assigned = VariantValue::list(["time", "memory"]);
        assert!(VariantValue::list(["time"]).satisfied_by(&assigned));
        assert!(VariantValue::Str("memory".to_string()).satisfied_by(&assigned));
        assert!(!VariantValue::list(["io"]).satisfied_by(&assigned));
        assert!(VariantValue::Bool(true).satisfied_by(&VariantValue::Bool(true)));
        assert!(!VariantValue::Bool(true).satisfied_by(&VariantValue::Bool(false)));
    }

    #[test]
    fn lists_normalise_order() {
        assert_eq!(
            VariantValue::list(["b", "a", "b"]),
            VariantValue::list(["a", "b"])
        );
    }
}
