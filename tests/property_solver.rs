// tests/property_solver.rs

//! Property tests for the concretizer over randomly generated registries.
//!
//! Acyclicity is guaranteed by construction: package `i` may only depend on
//! packages with a higher index.

use proptest::prelude::*;

use pkgplan::registry::{MemoryRegistry, RecipeProvider};
use pkgplan::solve::Solver;
use pkgplan::spec::parse_spec;
use pkgplan_test_utils::builders::{RecipeBuilder, RegistryBuilder};

const VERSION_POOL: [&str; 3] = ["1.0", "1.5", "2.0"];

/// Per-package recipe description: a non-empty version subset (bitmask over
/// `VERSION_POOL`) plus dependency edges `(target_offset, constraint_code)`.
type RawRecipe = (u8, Vec<(usize, u8)>);

fn registry_strategy(max_packages: usize) -> impl Strategy<Value = Vec<RawRecipe>> {
    (2..=max_packages).prop_flat_map(|count| {
        proptest::collection::vec(
            (
                1u8..8,
                proptest::collection::vec((any::<usize>(), 0u8..3), 0..3),
            ),
            count,
        )
    })
}

fn build_registry(raw: &[RawRecipe]) -> MemoryRegistry {
    let count = raw.len();
    let mut builder = RegistryBuilder::new();
    for (i, (version_mask, deps)) in raw.iter().enumerate() {
        let versions: Vec<&str> = VERSION_POOL
            .iter()
            .enumerate()
            .filter(|(bit, _)| version_mask & (1 << bit) != 0)
            .map(|(_, v)| *v)
            .collect();
        let mut recipe = RecipeBuilder::new(&format!("pkg{i}")).versions(&versions);

        // Only forward edges, so the graph cannot cycle.
        let remaining = count - i - 1;
        if remaining > 0 {
            let mut seen = std::collections::BTreeSet::new();
            for (offset, code) in deps {
                let target = i + 1 + offset % remaining;
                if !seen.insert(target) {
                    continue;
                }
                let constraint = match code {
                    0 => "",
                    1 => "@:1.5",
                    _ => "@1.5:",
                };
                recipe = recipe.depends_on(&format!("pkg{target}{constraint}"));
            }
        }
        builder = builder.with(recipe);
    }
    builder.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn solving_terminates_and_is_deterministic(raw in registry_strategy(8)) {
        let registry = build_registry(&raw);
        let root = parse_spec("pkg0").unwrap();
        let solver = Solver::new(&registry);

        let first = solver.solve(&root);
        let second = solver.solve(&root);
        prop_assert_eq!(first.is_ok(), second.is_ok());

        if let (Ok(a), Ok(b)) = (&first, &second) {
            let render = |g: &pkgplan::solve::DependencyGraph| -> Vec<String> {
                g.topo_iter().map(|n| n.to_string()).collect()
            };
            prop_assert_eq!(render(a), render(b));
        }
    }

    #[test]
    fn solved_graphs_satisfy_every_dependency_constraint(raw in registry_strategy(8)) {
        let registry = build_registry(&raw);
        let root = parse_spec("pkg0").unwrap();

        let Ok(graph) = Solver::new(&registry).solve(&root) else {
            // Unsatisfiable inputs are legal; the property only covers
            // successful solves.
            return Ok(());
        };

        for node in graph.nodes() {
            let recipe = registry.lookup(&node.name).unwrap();
            prop_assert!(
                recipe.versions.contains(&node.version),
                "{} solved to undeclared version {}",
                node.name,
                node.version
            );
            for rule in &recipe.dependencies {
                let target = graph.node(&rule.spec.name);
                prop_assert!(target.is_some(), "missing dependency {}", rule.spec.name);
                let target = target.unwrap();
                prop_assert!(
                    rule.spec.version.allows(&target.version),
                    "{} -> {} violates {}",
                    node.name,
                    rule.spec.name,
                    rule.spec.version
                );
            }
        }
    }
}
