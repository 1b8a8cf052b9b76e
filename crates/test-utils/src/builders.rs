#![allow(dead_code)]

use pkgplan::registry::{
    DepKind, DependencyRule, EnvExport, ExportMode, MemoryRegistry, RecipeDescriptor,
    VariantDefinition, VariantDomain,
};
use pkgplan::spec::{parse_condition, parse_spec, VariantValue, Version};

/// Builder for `RecipeDescriptor` to simplify test setup.
///
/// Panics on malformed input; these are test fixtures, not user data.
pub struct RecipeBuilder {
    recipe: RecipeDescriptor,
}

impl RecipeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            recipe: RecipeDescriptor::new(name),
        }
    }

    pub fn versions(mut self, versions: &[&str]) -> Self {
        self.recipe.versions = versions
            .iter()
            .map(|v| v.parse::<Version>().expect("invalid version in builder"))
            .collect();
        self
    }

    pub fn bool_variant(mut self, name: &str, default: bool) -> Self {
        self.recipe
            .variants
            .push(VariantDefinition::boolean(name, default));
        self
    }

    pub fn enum_variant(mut self, name: &str, values: &[&str], default: &str) -> Self {
        self.recipe.variants.push(VariantDefinition {
            name: name.to_string(),
            domain: VariantDomain::Enum(values.iter().map(|s| s.to_string()).collect()),
            default: VariantValue::Str(default.to_string()),
            description: String::new(),
        });
        self
    }

    pub fn multi_variant(mut self, name: &str, values: &[&str], default: &[&str]) -> Self {
        self.recipe.variants.push(VariantDefinition {
            name: name.to_string(),
            domain: VariantDomain::Multi(values.iter().map(|s| s.to_string()).collect()),
            default: VariantValue::list(default.iter().copied()),
            description: String::new(),
        });
        self
    }

    /// Unconditional build+link dependency.
    pub fn depends_on(mut self, spec: &str) -> Self {
        self.recipe
            .dependencies
            .push(DependencyRule::new(parse_spec(spec).expect("invalid dep spec")));
        self
    }

    /// Dependency with explicit edge kinds.
    pub fn depends_on_kinds(mut self, spec: &str, kinds: &[DepKind]) -> Self {
        let mut rule = DependencyRule::new(parse_spec(spec).expect("invalid dep spec"));
        rule.kinds = kinds.to_vec();
        self.recipe.dependencies.push(rule);
        self
    }

    /// Dependency guarded by a condition over the owner's assignment.
    pub fn depends_when(mut self, spec: &str, when: &str) -> Self {
        let mut rule = DependencyRule::new(parse_spec(spec).expect("invalid dep spec"));
        rule.when = parse_condition(when).expect("invalid condition");
        self.recipe.dependencies.push(rule);
        self
    }

    pub fn build_system(mut self, id: &str) -> Self {
        self.recipe.build_system = id.to_string();
        self
    }

    /// Mark the package as needing the exclusive build slot.
    pub fn serial(mut self) -> Self {
        self.recipe.parallel = false;
        self
    }

    pub fn export(mut self, key: &str, value: &str) -> Self {
        self.recipe.exports.insert(
            key.to_string(),
            EnvExport {
                value: value.to_string(),
                mode: ExportMode::Set,
            },
        );
        self
    }

    pub fn export_prepend(mut self, key: &str, value: &str) -> Self {
        self.recipe.exports.insert(
            key.to_string(),
            EnvExport {
                value: value.to_string(),
                mode: ExportMode::Prepend,
            },
        );
        self
    }

    pub fn configure_cmd(mut self, cmd: &str) -> Self {
        self.recipe.commands.configure = Some(cmd.to_string());
        self
    }

    pub fn build_cmd(mut self, cmd: &str) -> Self {
        self.recipe.commands.build = Some(cmd.to_string());
        self
    }

    pub fn install_cmd(mut self, cmd: &str) -> Self {
        self.recipe.commands.install = Some(cmd.to_string());
        self
    }

    pub fn build(self) -> RecipeDescriptor {
        self.recipe
            .validate()
            .expect("builder produced an invalid recipe");
        self.recipe
    }
}

/// Builder for an in-memory recipe registry.
pub struct RegistryBuilder {
    registry: MemoryRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: MemoryRegistry::new(),
        }
    }

    pub fn with(mut self, recipe: RecipeBuilder) -> Self {
        self.registry
            .insert(recipe.build())
            .expect("invalid recipe in builder");
        self
    }

    pub fn build(self) -> MemoryRegistry {
        self.registry
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
