// src/spec/condition.rs

//! Guard predicates over partial variant/version assignments.
//!
//! Conditions gate dependency rules: a rule contributes an edge only when its
//! condition holds under the current assignment. Conditions are plain data
//! (not callbacks) so the solver can evaluate them deterministically and
//! defer evaluation while a referenced variant is still unassigned.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::spec::variant::VariantValue;
use crate::spec::version::{Version, VersionConstraint};

/// Read-only view of one package's partial assignment, as seen by a guard.
pub trait AssignmentView {
    /// Assigned value for a variant, or `None` while it is undecided.
    fn variant_value(&self, name: &str) -> Option<&VariantValue>;

    /// Resolved version, or `None` while it is undecided.
    fn version(&self) -> Option<&Version>;
}

/// A serializable boolean expression over variant/version state.
///
/// The guard grammar is conjunctive (`@2.0: +mpi` means both must hold), so
/// conjunction is the only combinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    /// The named variant is assigned and its value satisfies `value`
    /// (equality for scalars, subset/membership for multi-valued variants).
    VariantEq { variant: String, value: VariantValue },
    /// The package's resolved version lies in the given range.
    VersionIn(VersionConstraint),
    All(Vec<Condition>),
}

impl Condition {
    /// Three-valued lazy evaluation against a partial assignment.
    ///
    /// Returns `None` while some referenced variant or the version is still
    /// unassigned and the outcome is not yet forced. Within one search branch
    /// assignments only grow, so a `Some` result is final for that branch.
    pub fn eval(&self, view: &dyn AssignmentView) -> Option<bool> {
        match self {
            Condition::Always => Some(true),
            Condition::VariantEq { variant, value } => view
                .variant_value(variant)
                .map(|assigned| value.satisfied_by(assigned)),
            Condition::VersionIn(constraint) => {
                view.version().map(|v| constraint.allows(v))
            }
            Condition::All(parts) => {
                let mut undecided = false;
                for part in parts {
                    match part.eval(view) {
                        Some(false) => return Some(false),
                        None => undecided = true,
                        Some(true) => {}
                    }
                }
                if undecided { None } else { Some(true) }
            }
        }
    }

    /// Names of every variant the condition mentions.
    ///
    /// Used to reject guards that reference variants the recipe never
    /// declares.
    pub fn referenced_variants(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variants(&mut out);
        out
    }

    fn collect_variants<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Condition::Always | Condition::VersionIn(_) => {}
            Condition::VariantEq { variant, .. } => {
                out.insert(variant.as_str());
            }
            Condition::All(parts) => {
                for part in parts {
                    part.collect_variants(out);
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        crate::spec::parse::parse_condition(&s).map_err(serde::de::Error::custom)
    }
}
