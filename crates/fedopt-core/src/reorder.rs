//! # Planners
//!
//! Two strategies solve the same problem -- order a pattern set so that every
//! step is executable and the whole run is cheap -- behind one `Planner`
//! capability:
//!
//! - **`GreedyPlanner`** repeatedly schedules the cheapest currently
//!   satisfiable pattern, as ranked by the cost comparator. Linear in the
//!   number of scheduling decisions, and the default.
//! - **`ExhaustivePlanner`** enumerates every capability-satisfying ordering,
//!   scores each by its summed per-step estimate, and returns the cheapest.
//!   Combinatorial, for small queries or offline analysis.
//!
//! Both share the same state machine: a set of remaining patterns and a
//! growing bound set; scheduling one satisfiable pattern is the transition.
//! The greedy planner's terminal state may leave unschedulable patterns --
//! those are appended unordered with a warning rather than failing the
//! query, because the remainder may still resolve against local data at
//! execution time.

use crate::bindings::QueryState;
use crate::cost::{PatternComparator, PatternCost};
use crate::enumerate::PlanEnumerator;
use crate::plan::{PlanError, PlanStep, QueryPlan};
use crate::registry::PredicateRegistry;
use crate::statsdb::StatsDb;
use crate::term::{Direction, GraphPattern};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which planning strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStrategy {
    #[default]
    Greedy,
    Exhaustive,
}

/// The result of planning: the plan plus whether every pattern was
/// schedulable. A partial plan carries its unschedulable remainder at the
/// end, unordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedQuery {
    pub plan: QueryPlan,
    pub fully_resolvable: bool,
}

/// A query planner: orders a basic graph pattern for execution.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, query: &GraphPattern, state: &QueryState)
        -> Result<PlannedQuery, PlanError>;
}

/// Construct the configured planner.
pub fn planner_for(
    strategy: PlanStrategy,
    stats: Arc<StatsDb>,
    registry: Arc<dyn PredicateRegistry>,
) -> Box<dyn Planner> {
    match strategy {
        PlanStrategy::Greedy => Box::new(GreedyPlanner::new(stats, registry)),
        PlanStrategy::Exhaustive => Box::new(ExhaustivePlanner::new(stats, registry)),
    }
}

/// Greedy comparator-driven planner.
pub struct GreedyPlanner {
    stats: Arc<StatsDb>,
    registry: Arc<dyn PredicateRegistry>,
}

impl GreedyPlanner {
    pub fn new(stats: Arc<StatsDb>, registry: Arc<dyn PredicateRegistry>) -> Self {
        Self { stats, registry }
    }
}

#[async_trait]
impl Planner for GreedyPlanner {
    async fn plan(
        &self,
        query: &GraphPattern,
        state: &QueryState,
    ) -> Result<PlannedQuery, PlanError> {
        let patterns = query.as_basic().ok_or(PlanError::UnsupportedQueryShape)?;
        let comparator = PatternComparator::new(&self.stats, self.registry.as_ref());

        let mut state = state.clone();
        let mut remaining = patterns;
        let mut steps = Vec::with_capacity(remaining.len());

        loop {
            // candidates must satisfy the ≤1-unbound-variable constraint
            let mut best: Option<usize> = None;
            for (i, pattern) in remaining.iter().enumerate() {
                if state.unbound_endpoints(pattern) > 1 {
                    continue;
                }
                best = match best {
                    None => Some(i),
                    Some(b) => {
                        if comparator.compare(pattern, &remaining[b], &state).await
                            == Ordering::Less
                        {
                            Some(i)
                        } else {
                            Some(b)
                        }
                    }
                };
            }

            let Some(i) = best else { break };
            let pattern = remaining.remove(i);

            let direction = match (
                state.is_bound(&pattern.subject),
                state.is_bound(&pattern.object),
            ) {
                (true, true) => {
                    if comparator.best_direction_is_forward(&pattern, &state).await {
                        Direction::Forward
                    } else {
                        Direction::Reverse
                    }
                }
                (true, false) => Direction::Forward,
                (false, true) => Direction::Reverse,
                // unreachable: filtered by the candidate constraint
                (false, false) => Direction::Forward,
            };

            debug!("scheduling pattern {pattern} in the {direction} direction");
            state.bind_pattern(&pattern);
            steps.push(PlanStep::new(pattern, direction));
        }

        let fully_resolvable = remaining.is_empty();
        if !fully_resolvable {
            warn!(
                "query is not fully resolvable by the federation; \
                 appending {} pattern(s) unordered",
                remaining.len()
            );
            for pattern in remaining {
                steps.push(PlanStep::new(pattern, Direction::Forward));
            }
        }

        Ok(PlannedQuery {
            plan: QueryPlan::new(steps),
            fully_resolvable,
        })
    }
}

/// Exhaustive enumeration-driven planner.
pub struct ExhaustivePlanner {
    stats: Arc<StatsDb>,
    registry: Arc<dyn PredicateRegistry>,
}

impl ExhaustivePlanner {
    pub fn new(stats: Arc<StatsDb>, registry: Arc<dyn PredicateRegistry>) -> Self {
        Self { stats, registry }
    }

    /// Summed per-step estimate under a simulated bound set, or `None` when
    /// any step lacks stats.
    async fn plan_cost(
        &self,
        comparator: &PatternComparator<'_>,
        plan: &QueryPlan,
        state: &QueryState,
    ) -> Option<u64> {
        let mut state = state.clone();
        let mut total: u64 = 0;
        let mut known = true;

        for step in &plan.steps {
            match comparator.step_cost(&step.pattern, step.direction, &state).await {
                PatternCost::Estimated(cost) => total += cost,
                _ => known = false,
            }
            state.bind_pattern(&step.pattern);
        }

        known.then_some(total)
    }
}

#[async_trait]
impl Planner for ExhaustivePlanner {
    async fn plan(
        &self,
        query: &GraphPattern,
        state: &QueryState,
    ) -> Result<PlannedQuery, PlanError> {
        let enumerator = PlanEnumerator::new(self.registry.clone());
        let patterns = query.as_basic().ok_or(PlanError::UnsupportedQueryShape)?;

        let bound: HashSet<String> = state.bound_vars().map(str::to_string).collect();
        let plans = enumerator.enumerate_patterns(&patterns, &bound);
        if plans.is_empty() {
            return Err(PlanError::UnresolvableQuery);
        }

        let comparator = PatternComparator::new(&self.stats, self.registry.as_ref());

        // rank by (has-cost, cost, plan text) so the winner is reproducible
        // for a given statistics snapshot
        let mut best: Option<(u64, String, QueryPlan)> = None;
        let total = plans.len();
        for plan in plans {
            let cost = self.plan_cost(&comparator, &plan, state).await;
            let key = (cost.unwrap_or(u64::MAX), plan.to_string());
            let better = match &best {
                None => true,
                Some((best_cost, best_text, _)) => {
                    key.0 < *best_cost || (key.0 == *best_cost && key.1 < *best_text)
                }
            };
            if better {
                best = Some((key.0, key.1, plan));
            }
        }

        // plans is non-empty, so best is always set
        let (cost, _, plan) = best.ok_or(PlanError::UnresolvableQuery)?;
        debug!(
            "picked cheapest of {total} plan(s) (estimated cost {})",
            if cost == u64::MAX { "unknown".to_string() } else { format!("{cost}ms") }
        );

        Ok(PlannedQuery {
            plan,
            fully_resolvable: true,
        })
    }
}
