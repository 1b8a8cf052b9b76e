// src/registry/mod.rs

//! Recipe registry: descriptors for every buildable package and the
//! [`RecipeProvider`] capability the solver consumes.
//!
//! The registry is read-only after construction. It is built once at startup
//! and passed explicitly to the solver (no ambient global lookup).
//!
//! - [`toml`] loads recipe descriptors from TOML files.
//! - [`MemoryRegistry`] backs both the TOML loader and test builders.

pub mod toml;

use std::collections::BTreeMap;

use crate::errors::SolveError;
use crate::spec::{Condition, PackageSpec, VariantValue, Version};

pub use self::toml::TomlRegistry;

/// Kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DepKind {
    Build,
    Link,
    Run,
}

impl DepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DepKind::Build => "build",
            DepKind::Link => "link",
            DepKind::Run => "run",
        }
    }
}

impl std::str::FromStr for DepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "build" => Ok(DepKind::Build),
            "link" => Ok(DepKind::Link),
            "run" => Ok(DepKind::Run),
            other => Err(format!(
                "invalid dependency kind '{other}' (expected build, link or run)"
            )),
        }
    }
}

/// A conditional dependency declaration.
///
/// The rule contributes an edge to `spec.name` only when `when` evaluates
/// true under the owning package's current partial assignment; the remaining
/// fields of `spec` become constraints on the target.
#[derive(Debug, Clone)]
pub struct DependencyRule {
    pub spec: PackageSpec,
    /// Edge kinds, kept sorted. Defaults to build+link, matching the common
    /// case of a compiled library dependency.
    pub kinds: Vec<DepKind>,
    pub when: Condition,
}

impl DependencyRule {
    pub fn new(spec: PackageSpec) -> Self {
        Self {
            spec,
            kinds: vec![DepKind::Build, DepKind::Link],
            when: Condition::Always,
        }
    }
}

/// Largest number of values a multi-valued variant may declare; the solver
/// enumerates every subset of the domain as a candidate assignment.
pub const MULTI_DOMAIN_LIMIT: usize = 16;

/// Domain of legal values for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantDomain {
    Bool,
    /// Exactly one of the listed values.
    Enum(Vec<String>),
    /// Any subset of the listed values.
    Multi(Vec<String>),
}

/// A variant declared by a recipe.
#[derive(Debug, Clone)]
pub struct VariantDefinition {
    pub name: String,
    pub domain: VariantDomain,
    pub default: VariantValue,
    pub description: String,
}

impl VariantDefinition {
    /// Boolean variant with the given default.
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            domain: VariantDomain::Bool,
            default: VariantValue::Bool(default),
            description: String::new(),
        }
    }

    /// True if `value` is a legal assignment for this variant.
    pub fn allows(&self, value: &VariantValue) -> bool {
        match (&self.domain, value) {
            (VariantDomain::Bool, VariantValue::Bool(_)) => true,
            (VariantDomain::Enum(values), VariantValue::Str(s)) => values.contains(s),
            (VariantDomain::Multi(values), VariantValue::List(items)) => {
                items.iter().all(|i| values.contains(i))
            }
            // A single string is accepted for a multi domain ("io=etsf").
            (VariantDomain::Multi(values), VariantValue::Str(s)) => values.contains(s),
            _ => false,
        }
    }

    /// Candidate assignments in solver preference order: the declared default
    /// first, then the remaining legal values deterministically.
    ///
    /// Multi domains enumerate subsets ordered by size then lexicographically,
    /// so smaller (cheaper) combinations are tried before larger ones.
    pub fn candidates(&self) -> Vec<VariantValue> {
        let mut out = vec![self.default.clone()];
        match &self.domain {
            VariantDomain::Bool => {
                if let VariantValue::Bool(d) = self.default {
                    out.push(VariantValue::Bool(!d));
                }
            }
            VariantDomain::Enum(values) => {
                for value in values {
                    let candidate = VariantValue::Str(value.clone());
                    if candidate != self.default {
                        out.push(candidate);
                    }
                }
            }
            VariantDomain::Multi(values) => {
                // validate() caps multi domains at MULTI_DOMAIN_LIMIT values,
                // so the mask covers every subset.
                let mut subsets = Vec::new();
                for mask in 0u32..(1u32 << values.len()) {
                    let subset: Vec<&String> = values
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << i) != 0)
                        .map(|(_, v)| v)
                        .collect();
                    subsets.push(VariantValue::list(subset.into_iter().cloned()));
                }
                subsets.sort_by_key(|v| match v {
                    VariantValue::List(items) => (items.len(), items.clone()),
                    _ => (0, Vec::new()),
                });
                for subset in subsets {
                    if subset != self.default {
                        out.push(subset);
                    }
                }
            }
        }
        out
    }
}

/// Merge behaviour for one exported environment key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Replace any earlier value for the key (last-writer-wins).
    #[default]
    Set,
    /// Prepend to earlier values, `:`-joined (search paths).
    Prepend,
}

/// One environment contribution exported by an installed package.
#[derive(Debug, Clone)]
pub struct EnvExport {
    /// Value template; `{prefix}` expands to the package's install prefix.
    pub value: String,
    pub mode: ExportMode,
}

/// Per-stage shell commands for recipes using the `script` build system.
#[derive(Debug, Clone, Default)]
pub struct StageCommands {
    pub configure: Option<String>,
    pub build: Option<String>,
    pub install: Option<String>,
}

/// Everything the solver and executor need to know about one package.
#[derive(Debug, Clone)]
pub struct RecipeDescriptor {
    pub name: String,
    /// Declared versions, declaration order preserved.
    pub versions: Vec<Version>,
    /// Declared variants, declaration order preserved.
    pub variants: Vec<VariantDefinition>,
    pub dependencies: Vec<DependencyRule>,
    /// Identifier of the [`BuildSystemDriver`](crate::exec::BuildSystemDriver)
    /// to invoke. Selection happens by capability lookup, not inheritance.
    pub build_system: String,
    /// False when the package's build tooling is not parallel-safe; such a
    /// node occupies an exclusive scheduler slot.
    pub parallel: bool,
    /// Exported environment contributions, keyed by variable name.
    pub exports: BTreeMap<String, EnvExport>,
    pub commands: StageCommands,
}

impl RecipeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
            variants: Vec::new(),
            dependencies: Vec::new(),
            build_system: "script".to_string(),
            parallel: true,
            exports: BTreeMap::new(),
            commands: StageCommands::default(),
        }
    }

    /// Look up a declared variant by name.
    pub fn variant(&self, name: &str) -> Option<&VariantDefinition> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Declared versions, highest first (the solver's preference order).
    pub fn versions_desc(&self) -> Vec<&Version> {
        let mut versions: Vec<&Version> = self.versions.iter().collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    /// Structural validation, run once at registry load.
    ///
    /// Checks that the recipe declares at least one version, that variant
    /// defaults lie in their domains, that multi-valued domains stay within
    /// [`MULTI_DOMAIN_LIMIT`], and that dependency-rule guards only reference
    /// declared variants.
    pub fn validate(&self) -> Result<(), SolveError> {
        if self.versions.is_empty() {
            return Err(SolveError::InvalidRecipe {
                package: self.name.clone(),
                reason: "no versions declared".to_string(),
            });
        }
        for variant in &self.variants {
            if let VariantDomain::Multi(values) = &variant.domain {
                if values.len() > MULTI_DOMAIN_LIMIT {
                    return Err(SolveError::InvalidRecipe {
                        package: self.name.clone(),
                        reason: format!(
                            "multi-valued variant '{}' declares {} values (limit {})",
                            variant.name,
                            values.len(),
                            MULTI_DOMAIN_LIMIT
                        ),
                    });
                }
            }
            if !variant.allows(&variant.default) {
                return Err(SolveError::InvalidRecipe {
                    package: self.name.clone(),
                    reason: format!(
                        "default '{}' of variant '{}' is outside its domain",
                        variant.default, variant.name
                    ),
                });
            }
        }
        for rule in &self.dependencies {
            if rule.spec.name.is_empty() {
                return Err(SolveError::InvalidRecipe {
                    package: self.name.clone(),
                    reason: "dependency rule with empty target name".to_string(),
                });
            }
            if rule.kinds.is_empty() {
                return Err(SolveError::InvalidRecipe {
                    package: self.name.clone(),
                    reason: format!(
                        "dependency on '{}' declares no kinds",
                        rule.spec.name
                    ),
                });
            }
            for variant in rule.when.referenced_variants() {
                if self.variant(variant).is_none() {
                    return Err(SolveError::UnknownVariant {
                        package: self.name.clone(),
                        variant: variant.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Lookup capability consumed by the solver.
pub trait RecipeProvider {
    /// Fetch the descriptor for a package.
    fn lookup(&self, name: &str) -> Result<&RecipeDescriptor, SolveError>;
}

/// Simple in-memory registry, also the backing store of [`TomlRegistry`].
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    recipes: BTreeMap<String, RecipeDescriptor>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a recipe after validating it.
    pub fn insert(&mut self, recipe: RecipeDescriptor) -> Result<(), SolveError> {
        recipe.validate()?;
        self.recipes.insert(recipe.name.clone(), recipe);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(|s| s.as_str())
    }
}

impl RecipeProvider for MemoryRegistry {
    fn lookup(&self, name: &str) -> Result<&RecipeDescriptor, SolveError> {
        self.recipes
            .get(name)
            .ok_or_else(|| SolveError::RecipeNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_candidates_prefer_default() {
        let on = VariantDefinition::boolean("mpi", true);
        assert_eq!(
            on.candidates(),
            vec![VariantValue::Bool(true), VariantValue::Bool(false)]
        );
        let off = VariantDefinition::boolean("mpi", false);
        assert_eq!(
            off.candidates(),
            vec![VariantValue::Bool(false), VariantValue::Bool(true)]
        );
    }

    #[test]
    fn multi_candidates_enumerate_subsets() {
        let def = VariantDefinition {
            name: "profile".to_string(),
            domain: VariantDomain::Multi(vec!["time".to_string(), "memory".to_string()]),
            default: VariantValue::list(Vec::<String>::new()),
            description: String::new(),
        };
        let candidates = def.candidates();
        assert_eq!(candidates[0], VariantValue::list(Vec::<String>::new()));
        assert_eq!(candidates.len(), 4);
        assert!(candidates.contains(&VariantValue::list(["memory", "time"])));
    }

    #[test]
    fn validation_rejects_bad_defaults_and_guards() {
        let mut recipe = RecipeDescriptor::new("p");
        recipe.versions.push("1.0".parse().unwrap());
        recipe.variants.push(VariantDefinition {
            name: "io".to_string(),
            domain: VariantDomain::Enum(vec!["a".to_string()]),
            default: VariantValue::Str("b".to_string()),
            description: String::new(),
        });
        assert!(matches!(
            recipe.validate(),
            Err(SolveError::InvalidRecipe { .. })
        ));

        let mut recipe = RecipeDescriptor::new("p");
        recipe.versions.push("1.0".parse().unwrap());
        let mut rule = DependencyRule::new(PackageSpec::named("dep"));
        rule.when = crate::spec::parse_condition("+nonexistent").unwrap();
        recipe.dependencies.push(rule);
        assert!(matches!(
            recipe.validate(),
            Err(SolveError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn validation_rejects_oversized_multi_domains() {
        let values: Vec<String> = (0..=MULTI_DOMAIN_LIMIT).map(|i| format!("v{i}")).collect();
        let mut recipe = RecipeDescriptor::new("p");
        recipe.versions.push("1.0".parse().unwrap());
        recipe.variants.push(VariantDefinition {
            name: "features".to_string(),
            domain: VariantDomain::Multi(values),
            default: VariantValue::list(Vec::<String>::new()),
            description: String::new(),
        });
        match recipe.validate() {
            Err(SolveError::InvalidRecipe { reason, .. }) => {
                assert!(reason.contains("features"), "{reason}");
            }
            other => panic!("expected InvalidRecipe, got: {other:?}"),
        }
    }

    #[test]
    fn lookup_fails_for_unknown_package() {
        let registry = MemoryRegistry::new();
        assert!(matches!(
            registry.lookup("nope"),
            Err(SolveError::RecipeNotFound(_))
        ));
    }
}
