//! # fedopt-core: Federated Graph-Pattern Query Planner Core
//!
//! This crate implements the core data structures and algorithms for planning
//! conjunctive graph-pattern queries over a federation of data sources with
//! constrained lookup capabilities. A source typically answers "all objects for
//! a bound subject of predicate P" but not the reverse, so not every ordering
//! of a pattern set is executable -- and among the executable orderings, costs
//! differ by orders of magnitude.
//!
//! ## Module Overview
//!
//! - **`term`**: Term, triple pattern, and graph pattern type definitions,
//!   plus the resolution `Direction`.
//! - **`registry`**: The capability oracle trait -- which predicates the
//!   federation can resolve, their inverses, and their equivalence classes.
//! - **`stats`**: Performance sample and summary-statistic types, and the
//!   least-squares fit that turns samples into a linear cost model.
//! - **`store`**: The backing-store trait for persisted samples and summary
//!   stats, with an in-memory implementation.
//! - **`statsdb`**: The statistics database -- records samples with bounded
//!   capacity, recomputes cost models, serves cached cost estimates.
//! - **`bindings`**: Query state accumulated while a plan is built (which
//!   variables are bound, and to how many values).
//! - **`cost`**: Pattern cost estimation and the comparator that ranks
//!   candidate patterns.
//! - **`plan`**: Query plan and planning error types.
//! - **`enumerate`**: Exhaustive enumeration of all capability-satisfying
//!   orderings and direction assignments.
//! - **`reorder`**: The `Planner` trait with greedy (comparator-driven) and
//!   exhaustive (enumeration-driven) implementations.

pub mod bindings;
pub mod cost;
pub mod enumerate;
pub mod plan;
pub mod registry;
pub mod reorder;
pub mod stats;
pub mod statsdb;
pub mod store;
pub mod term;
