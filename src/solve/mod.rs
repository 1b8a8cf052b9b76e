// src/solve/mod.rs

//! Concretization: constraint solving and the resulting dependency graph.
//!
//! - [`solver`] runs the conflict-driven backtracking search.
//! - [`graph`] holds the immutable concretized DAG it produces.

pub mod graph;
pub mod solver;

pub use graph::{ConcreteNode, DependencyEdge, DependencyGraph, GraphBuilder};
pub use solver::Solver;
