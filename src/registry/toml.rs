// src/registry/toml.rs

//! TOML-backed recipe registry.
//!
//! Each `*.toml` file in the recipe directory describes one package:
//!
//! ```toml
//! name = "yambo"
//! build_system = "autotools"
//! parallel = false
//! versions = ["5.2.1", "5.1.1", "4.2.2"]
//!
//! [[variant]]
//! name = "mpi"
//! default = true
//! description = "Enable MPI support"
//!
//! [[variant]]
//! name = "io"
//! values = ["iotk", "etsf"]
//! default = "iotk"
//!
//! [[dependency]]
//! spec = "hdf5@1.12: +fortran"
//! when = "+mpi"
//! types = ["build", "link"]
//!
//! [exports]
//! PATH = { value = "{prefix}/bin", mode = "prepend" }
//! ```
//!
//! Deserialization is split into a raw serde model plus a validating
//! conversion, so descriptor invariants hold for every loaded recipe.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::registry::{
    DepKind, DependencyRule, EnvExport, ExportMode, MemoryRegistry, RecipeDescriptor,
    RecipeProvider, StageCommands, VariantDefinition, VariantDomain,
};
use crate::spec::{parse_condition, parse_spec, Condition, VariantValue};

/// Registry of recipes loaded from a directory of TOML files.
#[derive(Debug)]
pub struct TomlRegistry {
    inner: MemoryRegistry,
}

impl TomlRegistry {
    /// Load every `*.toml` file under `dir` (non-recursive), sorted by file
    /// name so load order is deterministic.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("reading recipe directory {dir:?}"))?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut inner = MemoryRegistry::new();
        for path in &paths {
            let recipe = load_recipe(path)
                .with_context(|| format!("loading recipe from {path:?}"))?;
            debug!(package = %recipe.name, path = ?path, "loaded recipe");
            inner.insert(recipe)?;
        }

        info!(recipes = inner.len(), dir = ?dir, "recipe registry loaded");
        Ok(Self { inner })
    }

    /// Parse a single recipe from TOML text (used by tests).
    pub fn recipe_from_str(text: &str, fallback_name: &str) -> Result<RecipeDescriptor> {
        let raw: RawRecipe = toml::from_str(text).context("parsing recipe TOML")?;
        raw.into_descriptor(fallback_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.names()
    }
}

impl RecipeProvider for TomlRegistry {
    fn lookup(&self, name: &str) -> Result<&RecipeDescriptor, crate::errors::SolveError> {
        self.inner.lookup(name)
    }
}

fn load_recipe(path: &Path) -> Result<RecipeDescriptor> {
    let contents = fs::read_to_string(path)?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let raw: RawRecipe = toml::from_str(&contents).context("parsing recipe TOML")?;
    raw.into_descriptor(fallback)
}

/// Raw recipe file, a direct mapping of the TOML structure.
#[derive(Debug, Deserialize)]
struct RawRecipe {
    /// Package name; defaults to the file stem.
    name: Option<String>,
    #[serde(default = "default_build_system")]
    build_system: String,
    #[serde(default = "default_true")]
    parallel: bool,
    versions: Vec<String>,
    #[serde(default)]
    variant: Vec<RawVariant>,
    #[serde(default)]
    dependency: Vec<RawDependency>,
    #[serde(default)]
    exports: BTreeMap<String, RawExport>,
    #[serde(default)]
    commands: RawCommands,
}

fn default_build_system() -> String {
    "script".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    name: String,
    /// Legal values; absent means a boolean variant.
    values: Option<Vec<String>>,
    /// With `values`, selects a multi-valued (subset) domain instead of
    /// exactly-one-of.
    #[serde(default)]
    multi: bool,
    default: Option<VariantValue>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    /// Target spec string, e.g. `"hdf5@1.12: +fortran"`.
    spec: String,
    /// Guard condition in spec-token syntax; absent means always.
    when: Option<String>,
    /// Edge kinds; absent means `["build", "link"]`.
    types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawExport {
    Plain(String),
    Full {
        value: String,
        #[serde(default)]
        mode: RawExportMode,
    },
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum RawExportMode {
    #[default]
    Set,
    Prepend,
}

#[derive(Debug, Deserialize, Default)]
struct RawCommands {
    configure: Option<String>,
    build: Option<String>,
    install: Option<String>,
}

impl RawRecipe {
    fn into_descriptor(self, fallback_name: &str) -> Result<RecipeDescriptor> {
        let name = match self.name {
            Some(name) => name,
            None if !fallback_name.is_empty() => fallback_name.to_string(),
            None => return Err(anyhow!("recipe has no name and no usable file stem")),
        };

        let mut recipe = RecipeDescriptor::new(&name);
        recipe.build_system = self.build_system;
        recipe.parallel = self.parallel;

        for version in &self.versions {
            recipe.versions.push(
                version
                    .parse()
                    .with_context(|| format!("version '{version}' of '{name}'"))?,
            );
        }

        for raw in self.variant {
            recipe.variants.push(convert_variant(raw, &name)?);
        }

        for raw in self.dependency {
            let spec = parse_spec(&raw.spec)
                .with_context(|| format!("dependency spec '{}' of '{name}'", raw.spec))?;
            let when = match &raw.when {
                Some(cond) => parse_condition(cond)
                    .with_context(|| format!("guard '{cond}' of '{name}'"))?,
                None => Condition::Always,
            };
            let mut kinds = match raw.types {
                Some(types) => types
                    .iter()
                    .map(|t| t.parse::<DepKind>().map_err(|e| anyhow!(e)))
                    .collect::<Result<Vec<_>>>()?,
                None => vec![DepKind::Build, DepKind::Link],
            };
            kinds.sort();
            kinds.dedup();
            recipe.dependencies.push(DependencyRule { spec, kinds, when });
        }

        for (key, raw) in self.exports {
            let export = match raw {
                RawExport::Plain(value) => EnvExport {
                    value,
                    mode: ExportMode::Set,
                },
                RawExport::Full { value, mode } => EnvExport {
                    value,
                    mode: match mode {
                        RawExportMode::Set => ExportMode::Set,
                        RawExportMode::Prepend => ExportMode::Prepend,
                    },
                },
            };
            recipe.exports.insert(key, export);
        }

        recipe.commands = StageCommands {
            configure: self.commands.configure,
            build: self.commands.build,
            install: self.commands.install,
        };

        recipe.validate()?;
        Ok(recipe)
    }
}

fn convert_variant(raw: RawVariant, package: &str) -> Result<VariantDefinition> {
    let (domain, default) = match raw.values {
        None => {
            let default = match raw.default {
                None => VariantValue::Bool(false),
                Some(VariantValue::Bool(b)) => VariantValue::Bool(b),
                Some(other) => {
                    return Err(anyhow!(
                        "variant '{}' of '{package}' is boolean but defaults to '{other}'",
                        raw.name
                    ));
                }
            };
            (VariantDomain::Bool, default)
        }
        Some(values) if raw.multi => {
            let default = match raw.default {
                None => VariantValue::list(Vec::<String>::new()),
                Some(VariantValue::List(items)) => VariantValue::list(items),
                Some(VariantValue::Str(s)) => {
                    VariantValue::list(s.split(',').map(str::trim))
                }
                Some(other) => {
                    return Err(anyhow!(
                        "variant '{}' of '{package}' is multi-valued but defaults to '{other}'",
                        raw.name
                    ));
                }
            };
            (VariantDomain::Multi(values), default)
        }
        Some(values) => {
            let default = match raw.default {
                Some(VariantValue::Str(s)) => VariantValue::Str(s),
                None => VariantValue::Str(
                    values
                        .first()
                        .ok_or_else(|| {
                            anyhow!(
                                "variant '{}' of '{package}' declares an empty value set",
                                raw.name
                            )
                        })?
                        .clone(),
                ),
                Some(other) => {
                    return Err(anyhow!(
                        "variant '{}' of '{package}' is enumerated but defaults to '{other}'",
                        raw.name
                    ));
                }
            };
            (VariantDomain::Enum(values), default)
        }
    };

    Ok(VariantDefinition {
        name: raw.name,
        domain,
        default,
        description: raw.description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_recipe() {
        let text = r#"
            build_system = "autotools"
            parallel = false
            versions = ["5.2.1", "4.2.2"]

            [[variant]]
            name = "mpi"
            default = true

            [[variant]]
            name = "io"
            values = ["iotk", "etsf"]
            default = "iotk"

            [[dependency]]
            spec = "hdf5@1.12: +fortran"
            when = "+mpi"
            types = ["build", "link"]

            [exports]
            PATH = { value = "{prefix}/bin", mode = "prepend" }
            YAMBO_HOME = "{prefix}"
        "#;
        let recipe = TomlRegistry::recipe_from_str(text, "yambo").unwrap();
        assert_eq!(recipe.name, "yambo");
        assert_eq!(recipe.build_system, "autotools");
        assert!(!recipe.parallel);
        assert_eq!(recipe.versions.len(), 2);
        assert_eq!(recipe.variants.len(), 2);
        assert_eq!(recipe.dependencies.len(), 1);

        let rule = &recipe.dependencies[0];
        assert_eq!(rule.spec.name, "hdf5");
        assert_eq!(rule.kinds, vec![DepKind::Build, DepKind::Link]);
        assert!(rule.when != Condition::Always);

        assert_eq!(recipe.exports["PATH"].mode, ExportMode::Prepend);
        assert_eq!(recipe.exports["YAMBO_HOME"].mode, ExportMode::Set);
        recipe.validate().unwrap();
    }

    #[test]
    fn name_falls_back_to_file_stem() {
        let recipe = TomlRegistry::recipe_from_str(r#"versions = ["1.0"]"#, "zlib").unwrap();
        assert_eq!(recipe.name, "zlib");
        assert_eq!(recipe.build_system, "script");
        assert!(recipe.parallel);
    }

    #[test]
    fn rejects_bad_default_type() {
        let text = r#"
            versions = ["1.0"]
            [[variant]]
            name = "mpi"
            default = "yes"
        "#;
        assert!(TomlRegistry::recipe_from_str(text, "p").is_err());
    }
}
