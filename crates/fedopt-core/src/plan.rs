//! # Query Plans
//!
//! A query plan is an ordered sequence of (pattern, direction) steps. Plans
//! are created per planning request and own no external resources; executing
//! a plan is the caller's concern.

use crate::term::{Direction, TriplePattern};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One scheduled pattern with its resolution direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub pattern: TriplePattern,
    pub direction: Direction,
}

impl PlanStep {
    pub fn new(pattern: TriplePattern, direction: Direction) -> Self {
        Self { pattern, direction }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.pattern, self.direction)
    }
}

/// An ordered resolution plan for one basic graph pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub steps: Vec<PlanStep>,
}

impl QueryPlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.steps {
            if !first {
                write!(f, " . ")?;
            }
            write!(f, "{step}")?;
            first = false;
        }
        Ok(())
    }
}

/// Fatal planning failures. Statistics-path problems never surface here;
/// they degrade estimates instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The query is not a single basic graph pattern.
    #[error("query must consist of a single basic graph pattern (no nesting, UNION, or OPTIONAL)")]
    UnsupportedQueryShape,
    /// No ordering of the patterns is executable by the federation.
    #[error("no resolvable ordering exists for the query")]
    UnresolvableQuery,
}
