//! # Pattern Cost Estimation
//!
//! This module ranks triple patterns by how expensive they will be to resolve
//! against the federation, given the current query state. The ranking drives
//! the greedy planner (resolve the cheapest satisfiable pattern next) and the
//! direction choice for patterns whose subject and object are both bound.
//!
//! ## Cost Values
//!
//! A pattern's cost is a tagged value rather than a number with reserved
//! sentinels:
//!
//! - `Estimated(ms)` -- the statistics store produced a model-based estimate.
//! - `NoStats` -- resolvable, but at least one candidate predicate has no
//!   recorded model; the comparator falls back to binding counts.
//! - `Expensive` -- the predicate position is an unbound variable, so the
//!   pattern can only be resolved by blanket lookups; always ranked after
//!   any pattern with a bound predicate.
//! - `Unresolvable` -- no source can answer the pattern in any direction.
//!
//! The derived order (`Estimated < NoStats < Expensive < Unresolvable`) is
//! what "cheaper" means when choosing between two fully-estimated directions.
//!
//! ## Equivalence-Aware Aggregation
//!
//! A bound predicate position may carry several candidate predicates (a
//! variable with accumulated IRI bindings). Predicates declared equivalent
//! resolve through the same sources, so each equivalence class is counted
//! once: candidates are filtered to those resolvable in the relevant
//! direction, then deduplicated against already-counted classes, and the
//! per-class estimates are summed. If any counted class has no stats, the
//! whole aggregate is `NoStats` -- a partial sum would not be comparable.

use crate::bindings::QueryState;
use crate::registry::PredicateRegistry;
use crate::statsdb::StatsDb;
use crate::term::{Direction, TriplePattern};
use std::cmp::Ordering;

/// Estimated cost of resolving one pattern, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatternCost {
    Estimated(u64),
    NoStats,
    Expensive,
    Unresolvable,
}

/// Ranks triple patterns by estimated resolution cost.
pub struct PatternComparator<'a> {
    stats: &'a StatsDb,
    registry: &'a dyn PredicateRegistry,
}

impl<'a> PatternComparator<'a> {
    pub fn new(stats: &'a StatsDb, registry: &'a dyn PredicateRegistry) -> Self {
        Self { stats, registry }
    }

    /// Compare two patterns under the current query state; `Less` means `a`
    /// should be resolved first. Antisymmetric by construction.
    pub async fn compare(
        &self,
        a: &TriplePattern,
        b: &TriplePattern,
        state: &QueryState,
    ) -> Ordering {
        // an unresolvable pattern never wins
        match (self.is_resolvable(a, state), self.is_resolvable(b, state)) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => return Ordering::Equal,
            (true, true) => {}
        }

        // a bound predicate always beats an unbound one
        match (state.is_bound(&a.predicate), state.is_bound(&b.predicate)) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        let cost_a = self.cost_by_stats(a, state).await;
        let cost_b = self.cost_by_stats(b, state).await;

        if let (PatternCost::Estimated(x), PatternCost::Estimated(y)) = (&cost_a, &cost_b) {
            return x.cmp(y);
        }

        // no usable stats on at least one side: fewer inputs first
        self.cost_by_bindings(a, state)
            .cmp(&self.cost_by_bindings(b, state))
    }

    /// True if at least one source can answer this pattern in some direction
    /// under the current bindings.
    pub fn is_resolvable(&self, pattern: &TriplePattern, state: &QueryState) -> bool {
        let s_bound = state.is_bound(&pattern.subject);
        let o_bound = state.is_bound(&pattern.object);

        if !state.is_bound(&pattern.predicate) {
            // an unbound predicate can still be probed as long as one end is
            // bound; we assume some source accepts the bound value
            return s_bound || o_bound;
        }

        let predicates = candidate_predicates(&pattern.predicate, state);
        if predicates.is_empty() {
            // the predicate position has bindings but none are IRIs: the
            // pattern has no solutions, which makes it trivially resolvable
            return true;
        }

        if s_bound && predicates.iter().any(|p| self.registry.is_resolvable(p)) {
            return true;
        }
        if o_bound
            && predicates
                .iter()
                .any(|p| self.registry.is_reverse_resolvable(p))
        {
            return true;
        }
        false
    }

    /// Model-based cost of the pattern in its cheapest available direction.
    pub async fn cost_by_stats(&self, pattern: &TriplePattern, state: &QueryState) -> PatternCost {
        if !self.is_resolvable(pattern, state) {
            return PatternCost::Unresolvable;
        }

        let s_bound = state.is_bound(&pattern.subject);
        let o_bound = state.is_bound(&pattern.object);
        if !s_bound && !o_bound {
            return PatternCost::Unresolvable;
        }

        if !state.is_bound(&pattern.predicate) {
            return PatternCost::Expensive;
        }

        let predicates = candidate_predicates(&pattern.predicate, state);
        if predicates.is_empty() {
            // no IRI bindings for the predicate: no solutions, nothing to send
            return PatternCost::Estimated(0);
        }

        match (s_bound, o_bound) {
            (true, true) => {
                let forward = self
                    .directional_cost(
                        &predicates,
                        Direction::Forward,
                        state.binding_count(&pattern.subject),
                    )
                    .await;
                let reverse = self
                    .directional_cost(
                        &predicates,
                        Direction::Reverse,
                        state.binding_count(&pattern.object),
                    )
                    .await;
                forward.min(reverse)
            }
            (true, false) => {
                self.directional_cost(
                    &predicates,
                    Direction::Forward,
                    state.binding_count(&pattern.subject),
                )
                .await
            }
            (false, true) => {
                self.directional_cost(
                    &predicates,
                    Direction::Reverse,
                    state.binding_count(&pattern.object),
                )
                .await
            }
            (false, false) => PatternCost::Unresolvable,
        }
    }

    /// Cost of resolving one plan step in its assigned direction.
    pub async fn step_cost(
        &self,
        pattern: &TriplePattern,
        direction: Direction,
        state: &QueryState,
    ) -> PatternCost {
        if !state.is_bound(&pattern.predicate) {
            return PatternCost::Expensive;
        }
        let predicates = candidate_predicates(&pattern.predicate, state);
        if predicates.is_empty() {
            return PatternCost::Estimated(0);
        }
        let num_inputs = match direction {
            Direction::Forward => state.binding_count(&pattern.subject),
            Direction::Reverse => state.binding_count(&pattern.object),
        };
        self.directional_cost(&predicates, direction, num_inputs).await
    }

    /// Sum the per-equivalence-class estimates for resolving `num_inputs`
    /// values through the given predicates in one direction.
    async fn directional_cost(
        &self,
        predicates: &[String],
        direction: Direction,
        num_inputs: usize,
    ) -> PatternCost {
        let mut counted: Vec<&str> = Vec::with_capacity(predicates.len());
        let mut total: u64 = 0;

        for predicate in predicates {
            let resolvable = match direction {
                Direction::Forward => self.registry.is_resolvable(predicate),
                Direction::Reverse => self.registry.is_reverse_resolvable(predicate),
            };
            if !resolvable {
                continue;
            }

            // equivalent predicates resolve through the same sources; count
            // each class once
            if counted.iter().any(|c| self.equivalent(c, predicate)) {
                continue;
            }

            match self
                .stats
                .estimated_cost(predicate, direction, num_inputs as u32)
                .await
            {
                Some(cost) => {
                    counted.push(predicate);
                    total += cost;
                }
                None => return PatternCost::NoStats,
            }
        }

        if counted.is_empty() {
            // nothing resolvable in this direction
            return PatternCost::Unresolvable;
        }
        PatternCost::Estimated(total)
    }

    /// Binding-count fallback: the number of inputs the pattern would send.
    pub fn cost_by_bindings(&self, pattern: &TriplePattern, state: &QueryState) -> usize {
        let s = state.binding_count(&pattern.subject);
        let o = state.binding_count(&pattern.object);
        match (s > 0, o > 0) {
            (true, true) => s.min(o),
            (true, false) => s,
            (false, true) => o,
            (false, false) => 0,
        }
    }

    /// Decide the resolution direction for a pattern whose subject and object
    /// are both bound: forward unless reverse is estimated cheaper.
    pub async fn best_direction_is_forward(
        &self,
        pattern: &TriplePattern,
        state: &QueryState,
    ) -> bool {
        // if neither direction is resolvable the choice is irrelevant
        if !self.is_resolvable(pattern, state) {
            return true;
        }

        let s_count = state.binding_count(&pattern.subject);
        let o_count = state.binding_count(&pattern.object);

        if !state.is_bound(&pattern.predicate) {
            return s_count <= o_count;
        }

        let predicates = candidate_predicates(&pattern.predicate, state);
        if predicates.is_empty() {
            return true;
        }

        let forward_resolvable = predicates.iter().any(|p| self.registry.is_resolvable(p));
        let reverse_resolvable = predicates
            .iter()
            .any(|p| self.registry.is_reverse_resolvable(p));
        match (forward_resolvable, reverse_resolvable) {
            (true, false) => return true,
            (false, true) => return false,
            _ => {}
        }

        let forward = self
            .directional_cost(&predicates, Direction::Forward, s_count)
            .await;
        let reverse = self
            .directional_cost(&predicates, Direction::Reverse, o_count)
            .await;

        match (forward, reverse) {
            (PatternCost::Estimated(f), PatternCost::Estimated(r)) => f <= r,
            _ => s_count <= o_count,
        }
    }

    fn equivalent(&self, p1: &str, p2: &str) -> bool {
        p1 == p2 || self.registry.equivalents(p1).iter().any(|e| e == p2)
    }
}

/// IRI candidates in the predicate position: the constant itself, or the IRI
/// values accumulated for a bound predicate variable.
fn candidate_predicates(predicate: &crate::term::Term, state: &QueryState) -> Vec<String> {
    state
        .values(predicate)
        .into_iter()
        .filter_map(|t| t.as_iri().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::stats::Measurement;
    use crate::statsdb::{StatsConfig, StatsDb};
    use crate::store::MemStatsBackend;
    use crate::term::Term;
    use std::sync::Arc;

    const A: &str = "http://example.org/a";
    const B: &str = "http://example.org/b";
    const C: &str = "http://example.org/c";

    async fn stats_with_model(entries: &[(&str, Direction, u64, u64)]) -> StatsDb {
        let db = StatsDb::open(Arc::new(MemStatsBackend::new()), StatsConfig::default()).await;
        for (predicate, direction, base, slope) in entries {
            // two samples on the model line pin the fit exactly
            db.record_sample(predicate, *direction, 1, Measurement::Measured(base + slope)).await;
            db.record_sample(predicate, *direction, 3, Measurement::Measured(base + 3 * slope))
                .await;
            db.recompute_stats(Some(predicate)).await;
        }
        db
    }

    fn registry_with(resolvable: &[&str]) -> InMemoryRegistry {
        let mut registry = InMemoryRegistry::new();
        for p in resolvable {
            registry.add_resolvable(*p);
        }
        registry
    }

    #[tokio::test]
    async fn test_compare_is_monotonic_in_estimated_cost() {
        let stats = stats_with_model(&[
            (A, Direction::Forward, 10, 1),
            (B, Direction::Forward, 500, 1),
        ])
        .await;
        let registry = registry_with(&[A, B]);
        let comparator = PatternComparator::new(&stats, &registry);

        let cheap = TriplePattern::new(Term::iri("http://x/s"), Term::iri(A), Term::var("x"));
        let dear = TriplePattern::new(Term::iri("http://x/s"), Term::iri(B), Term::var("y"));
        let state = QueryState::new();

        assert_eq!(comparator.compare(&cheap, &dear, &state).await, Ordering::Less);
        assert_eq!(comparator.compare(&dear, &cheap, &state).await, Ordering::Greater);
        assert_eq!(comparator.compare(&cheap, &cheap, &state).await, Ordering::Equal);
    }

    #[tokio::test]
    async fn test_unbound_predicate_ranks_last() {
        let stats = stats_with_model(&[(A, Direction::Forward, 10_000, 1_000)]).await;
        let registry = registry_with(&[A]);
        let comparator = PatternComparator::new(&stats, &registry);

        // enormously expensive, but its predicate is bound
        let with_predicate =
            TriplePattern::new(Term::iri("http://x/s"), Term::iri(A), Term::var("x"));
        let without_predicate =
            TriplePattern::new(Term::iri("http://x/s"), Term::var("p"), Term::var("y"));
        let state = QueryState::new();

        assert_eq!(
            comparator.compare(&with_predicate, &without_predicate, &state).await,
            Ordering::Less
        );
        assert_eq!(
            comparator.compare(&without_predicate, &with_predicate, &state).await,
            Ordering::Greater
        );
    }

    #[tokio::test]
    async fn test_equivalence_classes_counted_once() {
        // A ≡ C and B, all with forward model cost(n) = 2 + 2n
        let stats = stats_with_model(&[
            (A, Direction::Forward, 2, 2),
            (B, Direction::Forward, 2, 2),
            (C, Direction::Forward, 2, 2),
        ])
        .await;
        let mut registry = registry_with(&[A, B, C]);
        registry.declare_equivalent(&[A, C]);
        let comparator = PatternComparator::new(&stats, &registry);

        // (?s, A, ?unbound) with ?s bound to two subjects: 2 + 2*2 = 6
        let mut state = QueryState::new();
        state.bind_values("s", vec![Term::iri("http://x/1"), Term::iri("http://x/2")]);
        let single = TriplePattern::new(Term::var("s"), Term::iri(A), Term::var("o"));
        assert_eq!(
            comparator.cost_by_stats(&single, &state).await,
            PatternCost::Estimated(6)
        );

        // (?s2, ?p, ?o2) with ?p bound to {A, B, C} and one subject value:
        // class {A, C} once at 2 + 2*1, plus {B} at 2 + 2*1 = 8, not 12
        let mut state = QueryState::new();
        state.bind_values("s2", vec![Term::iri("http://x/1")]);
        state.bind_values("p", vec![Term::iri(A), Term::iri(B), Term::iri(C)]);
        let multi = TriplePattern::new(Term::var("s2"), Term::var("p"), Term::var("o2"));
        assert_eq!(
            comparator.cost_by_stats(&multi, &state).await,
            PatternCost::Estimated(8)
        );
    }

    #[tokio::test]
    async fn test_missing_stats_poison_the_aggregate() {
        let stats = stats_with_model(&[(A, Direction::Forward, 2, 2)]).await;
        let registry = registry_with(&[A, B]);
        let comparator = PatternComparator::new(&stats, &registry);

        let mut state = QueryState::new();
        state.bind_values("s", vec![Term::iri("http://x/1")]);
        state.bind_values("p", vec![Term::iri(A), Term::iri(B)]);
        let pattern = TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"));

        // B is resolvable but has no model
        assert_eq!(comparator.cost_by_stats(&pattern, &state).await, PatternCost::NoStats);
    }

    #[tokio::test]
    async fn test_no_stats_falls_back_to_binding_counts() {
        let stats = StatsDb::open(Arc::new(MemStatsBackend::new()), StatsConfig::default()).await;
        let registry = registry_with(&[A, B]);
        let comparator = PatternComparator::new(&stats, &registry);

        let mut state = QueryState::new();
        state.bind_values("few", vec![Term::iri("http://x/1")]);
        state.bind_values(
            "many",
            vec![
                Term::iri("http://x/1"),
                Term::iri("http://x/2"),
                Term::iri("http://x/3"),
            ],
        );

        let few = TriplePattern::new(Term::var("few"), Term::iri(A), Term::var("o1"));
        let many = TriplePattern::new(Term::var("many"), Term::iri(B), Term::var("o2"));

        assert_eq!(comparator.compare(&few, &many, &state).await, Ordering::Less);
        assert_eq!(comparator.compare(&many, &few, &state).await, Ordering::Greater);
    }

    #[tokio::test]
    async fn test_best_direction_prefers_cheaper_model() {
        let stats = stats_with_model(&[
            (A, Direction::Forward, 100, 10),
            (A, Direction::Reverse, 5, 1),
        ])
        .await;
        let mut registry = registry_with(&[A, "http://example.org/aInv"]);
        registry.add_inverse_pair(A, "http://example.org/aInv");
        let comparator = PatternComparator::new(&stats, &registry);

        let pattern = TriplePattern::new(
            Term::iri("http://x/s"),
            Term::iri(A),
            Term::iri("http://x/o"),
        );
        let state = QueryState::new();
        assert!(!comparator.best_direction_is_forward(&pattern, &state).await);
    }

    #[tokio::test]
    async fn test_best_direction_short_circuits_on_resolvability() {
        let stats = StatsDb::open(Arc::new(MemStatsBackend::new()), StatsConfig::default()).await;
        let mut registry = InMemoryRegistry::new();
        // only the inverse is resolvable
        registry.add_inverse_pair(A, "http://example.org/aInv");
        registry.add_resolvable("http://example.org/aInv");
        let comparator = PatternComparator::new(&stats, &registry);

        let pattern = TriplePattern::new(
            Term::iri("http://x/s"),
            Term::iri(A),
            Term::iri("http://x/o"),
        );
        let state = QueryState::new();
        assert!(!comparator.best_direction_is_forward(&pattern, &state).await);
    }
}
