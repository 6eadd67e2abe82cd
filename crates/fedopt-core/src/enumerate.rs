//! # Exhaustive Plan Enumeration
//!
//! `PlanEnumerator` produces the *set* of every ordering and direction
//! assignment of a basic graph pattern that the federation can execute.
//! Scanning a candidate plan left to right while accumulating bound
//! variables, each step must satisfy two conditions at its position:
//!
//! - at most one of its subject/object is an unbound variable, and
//! - its direction is resolvable: `Forward` needs the subject bound and the
//!   predicate resolvable; `Reverse` needs the object bound and the
//!   predicate's inverse declared and resolvable.
//!
//! ## Direction Branching
//!
//! A pattern whose subject and object are both bound at scheduling time can
//! be resolved either way, and the two choices are genuinely different plans
//! (they probe different sources with different inputs). Both are emitted --
//! except that forcing reverse on such a pattern is an *inversion*
//! (`(o, inverse(p), s)`), and a literal cannot take the subject position, so
//! reverse-forcing a literal-object pattern is omitted rather than emitted.
//!
//! A pattern scheduled with only its object bound is resolved in reverse
//! without inversion (the direction is forced by which end is bound), so the
//! literal restriction does not apply there.
//!
//! ## Complexity
//!
//! The recursion is combinatorial in the pattern count. Federated conjunctive
//! queries are small, and branches die as soon as no remaining pattern is
//! satisfiable, which keeps the practical cost low.

use crate::plan::{PlanError, PlanStep, QueryPlan};
use crate::registry::PredicateRegistry;
use crate::term::{Direction, GraphPattern, TriplePattern};
use std::collections::HashSet;
use std::sync::Arc;

/// Enumerates all capability-satisfying orderings of a pattern set.
pub struct PlanEnumerator {
    registry: Arc<dyn PredicateRegistry>,
}

impl PlanEnumerator {
    pub fn new(registry: Arc<dyn PredicateRegistry>) -> Self {
        Self { registry }
    }

    /// All resolvable plans for the query, or `UnsupportedQueryShape` if the
    /// query is not a single basic graph pattern.
    pub fn enumerate(&self, query: &GraphPattern) -> Result<HashSet<QueryPlan>, PlanError> {
        let patterns = query.as_basic().ok_or(PlanError::UnsupportedQueryShape)?;
        Ok(self.enumerate_patterns(&patterns, &HashSet::new()))
    }

    /// All resolvable plans for a flat pattern set, with the given variables
    /// already bound (e.g. from an outer execution context).
    pub fn enumerate_patterns(
        &self,
        patterns: &[TriplePattern],
        initially_bound: &HashSet<String>,
    ) -> HashSet<QueryPlan> {
        self.enumerate_remaining(patterns, initially_bound)
    }

    fn enumerate_remaining(
        &self,
        remaining: &[TriplePattern],
        bound: &HashSet<String>,
    ) -> HashSet<QueryPlan> {
        let mut plans = HashSet::new();

        if remaining.is_empty() {
            plans.insert(QueryPlan::default());
            return plans;
        }

        for (i, pattern) in remaining.iter().enumerate() {
            let s_unbound = is_unbound_var(&pattern.subject, bound);
            let o_unbound = is_unbound_var(&pattern.object, bound);

            if s_unbound && o_unbound {
                continue;
            }

            // capability checks need a concrete predicate
            let Some(predicate) = pattern.predicate.as_iri() else {
                continue;
            };

            let forward_ok = !s_unbound && self.registry.is_resolvable(predicate);
            let reverse_ok = !o_unbound && self.registry.is_reverse_resolvable(predicate);
            if !forward_ok && !reverse_ok {
                continue;
            }

            let mut bound_after = bound.clone();
            if let Some(name) = pattern.subject.var_name() {
                bound_after.insert(name.to_string());
            }
            if let Some(name) = pattern.object.var_name() {
                bound_after.insert(name.to_string());
            }

            let rest: Vec<TriplePattern> = remaining
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, p)| p.clone())
                .collect();

            let tails = self.enumerate_remaining(&rest, &bound_after);

            for tail in &tails {
                if forward_ok || (s_unbound && reverse_ok) {
                    // the direction is forced by which end is bound; no
                    // inversion happens here
                    let direction = if forward_ok {
                        Direction::Forward
                    } else {
                        Direction::Reverse
                    };
                    plans.insert(prepend(PlanStep::new(pattern.clone(), direction), tail));
                }

                if reverse_ok && !s_unbound && !o_unbound && !pattern.object.is_literal() {
                    // both ends bound: forcing reverse is a distinct plan,
                    // unless the object is a literal (inversion would put it
                    // in the subject position)
                    plans.insert(prepend(
                        PlanStep::new(pattern.clone(), Direction::Reverse),
                        tail,
                    ));
                }
            }
        }

        plans
    }
}

fn is_unbound_var(term: &crate::term::Term, bound: &HashSet<String>) -> bool {
    match term.var_name() {
        Some(name) => !bound.contains(name),
        None => false,
    }
}

fn prepend(head: PlanStep, tail: &QueryPlan) -> QueryPlan {
    let mut steps = Vec::with_capacity(tail.steps.len() + 1);
    steps.push(head);
    steps.extend(tail.steps.iter().cloned());
    QueryPlan::new(steps)
}
