// tests/solver_concretize.rs

use pkgplan::errors::SolveError;
use pkgplan::registry::DepKind;
use pkgplan::solve::Solver;
use pkgplan::spec::{parse_spec, VariantValue};
use pkgplan_test_utils::builders::{RecipeBuilder, RegistryBuilder};
use pkgplan_test_utils::init_tracing;

#[test]
fn picks_highest_version_satisfying_request() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("pkga")
                .versions(&["1.0", "2.0", "2.1"])
                .bool_variant("feature", false),
        )
        .build();

    let root = parse_spec("pkga@2.0: +feature").unwrap();
    let graph = Solver::new(&registry).solve(&root).unwrap();

    let node = graph.node("pkga").unwrap();
    assert_eq!(node.version.to_string(), "2.1");
    assert_eq!(node.variants.get("feature"), Some(&VariantValue::Bool(true)));
}

#[test]
fn unset_variants_take_recipe_defaults() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("pkga")
                .versions(&["1.0"])
                .bool_variant("feature", false)
                .enum_variant("backend", &["openssl", "gnutls"], "openssl"),
        )
        .build();

    let graph = Solver::new(&registry)
        .solve(&parse_spec("pkga").unwrap())
        .unwrap();

    let node = graph.node("pkga").unwrap();
    assert_eq!(node.variants.get("feature"), Some(&VariantValue::Bool(false)));
    assert_eq!(
        node.variants.get("backend"),
        Some(&VariantValue::Str("openssl".to_string()))
    );
}

#[test]
fn disjoint_version_requirements_are_unsatisfiable() {
    init_tracing();
    // app wants lib < 2.0 while mid wants lib >= 2.0.
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("app")
                .versions(&["1.0"])
                .depends_on("lib@:1.9")
                .depends_on("mid"),
        )
        .with(RecipeBuilder::new("mid").versions(&["1.0"]).depends_on("lib@2.0:"))
        .with(RecipeBuilder::new("lib").versions(&["1.9", "2.0", "2.5"]))
        .build();

    let err = Solver::new(&registry)
        .solve(&parse_spec("app").unwrap())
        .unwrap_err();

    match err {
        SolveError::Unsatisfiable { package, constraints } => {
            assert_eq!(package, "lib");
            // Both requesters show up in the reported constraint set.
            let joined = constraints.join("; ");
            assert!(joined.contains("app"), "missing requester in: {joined}");
            assert!(joined.contains("mid"), "missing requester in: {joined}");
        }
        other => panic!("expected Unsatisfiable, got: {other}"),
    }
}

#[test]
fn backtracks_to_older_version_when_a_dependent_demands_it() {
    init_tracing();
    // lib@2.0 is preferred, but shim only works with lib up to 1.5.
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("app")
                .versions(&["1.0"])
                .depends_on("lib")
                .depends_on("shim"),
        )
        .with(RecipeBuilder::new("shim").versions(&["1.0"]).depends_on("lib@:1.5"))
        .with(RecipeBuilder::new("lib").versions(&["1.0", "2.0"]))
        .build();

    let graph = Solver::new(&registry)
        .solve(&parse_spec("app").unwrap())
        .unwrap();

    assert_eq!(graph.node("lib").unwrap().version.to_string(), "1.0");
}

#[test]
fn retries_older_version_when_a_guarded_constraint_conflicts() {
    init_tracing();
    // lib@2.0 demands a zlib that does not exist; the solver must fall back
    // to lib@1.0 after the conflict surfaces.
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("app").versions(&["1.0"]).depends_on("lib").depends_on("zlib"))
        .with(RecipeBuilder::new("lib").versions(&["1.0", "2.0"]).depends_when("zlib@9.9:", "@2.0:"))
        .with(RecipeBuilder::new("zlib").versions(&["1.2", "1.3"]))
        .build();

    let graph = Solver::new(&registry)
        .solve(&parse_spec("app").unwrap())
        .unwrap();

    assert_eq!(graph.node("lib").unwrap().version.to_string(), "1.0");
    assert_eq!(graph.node("zlib").unwrap().version.to_string(), "1.3");
}

#[test]
fn shared_dependency_resolves_to_one_node() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("top")
                .versions(&["1.0"])
                .depends_on("left")
                .depends_on("right"),
        )
        .with(RecipeBuilder::new("left").versions(&["1.0"]).depends_on("zlib@1.2:"))
        .with(RecipeBuilder::new("right").versions(&["1.0"]).depends_on("zlib@:1.3"))
        .with(RecipeBuilder::new("zlib").versions(&["1.1", "1.2", "1.3", "1.4"]))
        .build();

    let graph = Solver::new(&registry)
        .solve(&parse_spec("top").unwrap())
        .unwrap();

    assert_eq!(graph.len(), 4);
    // One zlib node, satisfying both requesters.
    assert_eq!(graph.node("zlib").unwrap().version.to_string(), "1.3");
}

#[test]
fn conditional_dependency_fires_only_when_guard_holds() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("curl")
                .versions(&["8.0"])
                .bool_variant("ssl", false)
                .depends_when("openssl", "+ssl"),
        )
        .with(RecipeBuilder::new("openssl").versions(&["3.0"]))
        .build();

    let solver = Solver::new(&registry);

    let without = solver.solve(&parse_spec("curl").unwrap()).unwrap();
    assert!(without.node("openssl").is_none());
    assert_eq!(without.len(), 1);

    let with = solver.solve(&parse_spec("curl +ssl").unwrap()).unwrap();
    assert!(with.node("openssl").is_some());
    assert_eq!(with.len(), 2);
}

#[test]
fn version_guard_pulls_in_extra_dependency() {
    init_tracing();
    // Newer versions grew a dependency on libuv.
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("server")
                .versions(&["1.9", "2.2"])
                .depends_when("libuv", "@2.0:"),
        )
        .with(RecipeBuilder::new("libuv").versions(&["1.44"]))
        .build();

    let solver = Solver::new(&registry);

    let new = solver.solve(&parse_spec("server").unwrap()).unwrap();
    assert_eq!(new.node("server").unwrap().version.to_string(), "2.2");
    assert!(new.node("libuv").is_some());

    let old = solver.solve(&parse_spec("server@:1.9").unwrap()).unwrap();
    assert_eq!(old.node("server").unwrap().version.to_string(), "1.9");
    assert!(old.node("libuv").is_none());
}

#[test]
fn caret_override_pins_a_dependency() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("app").versions(&["1.0"]).depends_on("zlib"))
        .with(RecipeBuilder::new("zlib").versions(&["1.2", "1.3"]))
        .build();

    let graph = Solver::new(&registry)
        .solve(&parse_spec("app ^zlib@1.2").unwrap())
        .unwrap();

    assert_eq!(graph.node("zlib").unwrap().version.to_string(), "1.2");
}

#[test]
fn unknown_variant_in_spec_is_rejected() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("pkga").versions(&["1.0"]))
        .build();

    let err = Solver::new(&registry)
        .solve(&parse_spec("pkga +nonexistent").unwrap())
        .unwrap_err();

    assert!(matches!(
        err,
        SolveError::UnknownVariant { ref package, ref variant }
            if package == "pkga" && variant == "nonexistent"
    ));
}

#[test]
fn missing_recipe_is_reported_by_name() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("app").versions(&["1.0"]).depends_on("ghost"))
        .build();

    let err = Solver::new(&registry)
        .solve(&parse_spec("app").unwrap())
        .unwrap_err();

    assert!(matches!(err, SolveError::RecipeNotFound(ref name) if name == "ghost"));
}

#[test]
fn dependency_cycle_is_detected() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("a").versions(&["1.0"]).depends_on("b"))
        .with(RecipeBuilder::new("b").versions(&["1.0"]).depends_on("c"))
        .with(RecipeBuilder::new("c").versions(&["1.0"]).depends_on("a"))
        .build();

    let err = Solver::new(&registry)
        .solve(&parse_spec("a").unwrap())
        .unwrap_err();

    assert!(matches!(err, SolveError::CyclicDependency(_)), "got: {err}");
}

#[test]
fn run_only_dependency_keeps_its_edge_kind() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("app")
                .versions(&["1.0"])
                .depends_on_kinds("python", &[DepKind::Run]),
        )
        .with(RecipeBuilder::new("python").versions(&["3.12"]))
        .build();

    let graph = Solver::new(&registry)
        .solve(&parse_spec("app").unwrap())
        .unwrap();

    let edge = graph
        .node("app")
        .unwrap()
        .edges
        .iter()
        .find(|e| e.target == "python")
        .unwrap();
    assert_eq!(edge.kinds, vec![DepKind::Run]);
}

#[test]
fn concretization_is_deterministic() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("top")
                .versions(&["1.0", "2.0"])
                .bool_variant("docs", true)
                .depends_on("left")
                .depends_on("right"),
        )
        .with(
            RecipeBuilder::new("left")
                .versions(&["1.0"])
                .enum_variant("backend", &["a", "b"], "a")
                .depends_on("base@1.0:"),
        )
        .with(RecipeBuilder::new("right").versions(&["1.0"]).depends_on("base@:2.0"))
        .with(RecipeBuilder::new("base").versions(&["1.0", "1.5", "2.0"]))
        .build();

    let solver = Solver::new(&registry);
    let root = parse_spec("top").unwrap();

    let render = |graph: &pkgplan::solve::DependencyGraph| -> Vec<String> {
        graph.topo_iter().map(|n| n.to_string()).collect()
    };

    let first = render(&solver.solve(&root).unwrap());
    let second = render(&solver.solve(&root).unwrap());
    assert_eq!(first, second);
}
