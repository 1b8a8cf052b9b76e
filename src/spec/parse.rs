// src/spec/parse.rs

//! Spec string parsing and normalization.
//!
//! The grammar follows the conventional package-spec syntax:
//!
//! ```text
//! name [@<range>] [+variant] [~variant] [variant=value] [^depspec]...
//! ```
//!
//! Examples: `pkgA@>=2.0 +feature`, `yambo@5.2.1 +mpi io=etsf ^hdf5@1.12:`.
//! The parser has no registry access: whether a referenced variant actually
//! exists is checked lazily at solve time.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::SolveError;
use crate::spec::condition::Condition;
use crate::spec::variant::VariantValue;
use crate::spec::version::VersionConstraint;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("static regex"));

/// A canonical, immutable package request.
///
/// Produced by [`parse_spec`] from user input, or built programmatically by
/// the registry when a dependency rule constrains its target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageSpec {
    pub name: String,
    pub version: VersionConstraint,
    /// Pinned variant values, keyed by variant name.
    pub variants: BTreeMap<String, VariantValue>,
    /// Constraints on named transitive dependencies (`^dep...` tokens).
    pub overrides: Vec<PackageSpec>,
}

impl PackageSpec {
    /// Anonymous constraint set (no package name), used for the constraint
    /// part of dependency rules.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Constraint-only spec for a named package.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.version.is_any() {
            write!(f, "@{}", self.version)?;
        }
        for (name, value) in &self.variants {
            match value {
                VariantValue::Bool(true) => write!(f, " +{name}")?,
                VariantValue::Bool(false) => write!(f, " ~{name}")?,
                other => write!(f, " {name}={other}")?,
            }
        }
        for dep in &self.overrides {
            write!(f, " ^{dep}")?;
        }
        Ok(())
    }
}

/// Parse a full spec string into a canonical [`PackageSpec`].
pub fn parse_spec(input: &str) -> Result<PackageSpec, SolveError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SolveError::MalformedSpec("empty spec".to_string()));
    }
    if input.starts_with('^') {
        return Err(SolveError::MalformedSpec(format!(
            "spec '{input}' starts with a dependency override; a root package is required"
        )));
    }

    let mut segments = input.split('^');
    let head = segments.next().unwrap_or_default();

    let mut spec = parse_segment(head, true)?;
    for segment in segments {
        if segment.trim().is_empty() {
            return Err(SolveError::MalformedSpec(format!(
                "empty dependency override in '{input}'"
            )));
        }
        spec.overrides.push(parse_segment(segment, true)?);
    }
    Ok(spec)
}

/// Parse a guard condition written in spec-token syntax (`+mpi ~shared
/// io=etsf @2.0:`). The empty string means "always".
pub fn parse_condition(input: &str) -> Result<Condition, SolveError> {
    let segment = parse_segment(input, false)?;
    let mut parts = Vec::new();
    if !segment.version.is_any() {
        parts.push(Condition::VersionIn(segment.version));
    }
    for (variant, value) in segment.variants {
        parts.push(Condition::VariantEq { variant, value });
    }
    Ok(match parts.len() {
        0 => Condition::Always,
        1 => parts.into_iter().next().unwrap_or(Condition::Always),
        _ => Condition::All(parts),
    })
}

/// Parse one `^`-free spec segment.
///
/// With `require_name` the first token must be a package name; without it
/// (guard conditions) a name token is rejected.
fn parse_segment(segment: &str, require_name: bool) -> Result<PackageSpec, SolveError> {
    let mut spec = PackageSpec::anonymous();

    for token in tokenize(segment) {
        if let Some(range) = token.strip_prefix('@') {
            let constraint = VersionConstraint::parse(range)?;
            spec.version = spec.version.intersect(&constraint);
            if spec.version.is_empty_range() {
                return Err(SolveError::MalformedSpec(format!(
                    "contradictory version constraints in '{}'",
                    segment.trim()
                )));
            }
        } else if let Some(name) = token.strip_prefix('+') {
            insert_variant(&mut spec, name, VariantValue::Bool(true), segment)?;
        } else if let Some(name) = token.strip_prefix('~') {
            insert_variant(&mut spec, name, VariantValue::Bool(false), segment)?;
        } else if let Some((name, value)) = token.split_once('=') {
            if name.is_empty() || value.is_empty() {
                return Err(SolveError::MalformedSpec(format!(
                    "malformed variant token '{token}'"
                )));
            }
            check_name(name)?;
            insert_variant(&mut spec, name, VariantValue::parse_token(value), segment)?;
        } else {
            // Bare token: the package name.
            if !require_name {
                return Err(SolveError::MalformedSpec(format!(
                    "unexpected package name '{token}' in condition"
                )));
            }
            if !spec.name.is_empty() {
                return Err(SolveError::MalformedSpec(format!(
                    "multiple package names in '{}' ('{}' and '{token}')",
                    segment.trim(),
                    spec.name
                )));
            }
            check_name(&token)?;
            spec.name = token;
        }
    }

    if require_name && spec.name.is_empty() {
        return Err(SolveError::MalformedSpec(format!(
            "missing package name in '{}'",
            segment.trim()
        )));
    }
    Ok(spec)
}

/// Split a segment into marker-prefixed tokens.
///
/// Markers (`@`, `+`, `~`) may be glued to the previous token
/// (`pkgA@>=2.0+feature`), so each marker starts a new token.
fn tokenize(segment: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(segment.len() + 8);
    for ch in segment.chars() {
        if matches!(ch, '@' | '+' | '~') {
            spaced.push(' ');
        }
        spaced.push(ch);
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

fn insert_variant(
    spec: &mut PackageSpec,
    name: &str,
    value: VariantValue,
    segment: &str,
) -> Result<(), SolveError> {
    check_name(name)?;
    if let Some(existing) = spec.variants.get(name) {
        if *existing != value {
            return Err(SolveError::MalformedSpec(format!(
                "conflicting values for variant '{name}' in '{}'",
                segment.trim()
            )));
        }
        return Ok(());
    }
    spec.variants.insert(name.to_string(), value);
    Ok(())
}

fn check_name(name: &str) -> Result<(), SolveError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SolveError::MalformedSpec(format!(
            "invalid identifier '{name}'"
        )))
    }
}
