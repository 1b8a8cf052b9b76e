// src/spec/mod.rs

//! Package specs: versions, variants, guard conditions, and the spec grammar.
//!
//! - [`version`] holds the ordered [`Version`] type and range constraints.
//! - [`variant`] holds concrete variant values.
//! - [`condition`] holds lazily-evaluated guard predicates.
//! - [`parse`] turns spec strings into canonical [`PackageSpec`] values.

pub mod condition;
pub mod parse;
pub mod variant;
pub mod version;

pub use condition::{AssignmentView, Condition};
pub use parse::{parse_condition, parse_spec, PackageSpec};
pub use variant::VariantValue;
pub use version::{Version, VersionConstraint};
