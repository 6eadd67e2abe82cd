//! # Query State
//!
//! While a plan is built (or executed), variables accumulate bindings: a
//! scheduled pattern resolves its unbound variable, and every later pattern
//! sees that variable as bound. `QueryState` tracks this growing bound set
//! together with what is known about each variable's values, because the cost
//! comparator needs two things from it:
//!
//! - whether a term is bound at all (drives the ≤1-unbound-variable rule and
//!   direction choice), and
//! - how many concrete values feed a pattern's bound side (the `num_inputs`
//!   of the cost model).
//!
//! A constant term is always bound and contributes exactly one value. A
//! variable bound by an earlier plan step whose values are not yet known (the
//! planner runs ahead of execution) is `Planned` and counted as one input.

use crate::term::{Term, TriplePattern};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum VarBindings {
    /// Values gathered by execution; the count feeds the cost model.
    Known(Vec<Term>),
    /// Bound by an earlier plan step, cardinality not yet known.
    Planned,
}

/// The bound set and known bindings at one point in plan construction.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    vars: HashMap<String, VarBindings>,
}

impl QueryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable to a set of known values. Empty value sets are
    /// ignored: a variable with no values is not bound.
    pub fn bind_values(&mut self, var: impl Into<String>, values: Vec<Term>) {
        if !values.is_empty() {
            self.vars.insert(var.into(), VarBindings::Known(values));
        }
    }

    /// Mark a variable as bound by a scheduled pattern whose results are not
    /// yet available. Known values are never downgraded.
    pub fn bind_planned(&mut self, var: impl Into<String>) {
        self.vars
            .entry(var.into())
            .or_insert(VarBindings::Planned);
    }

    /// Mark both endpoint variables of a scheduled pattern as bound.
    pub fn bind_pattern(&mut self, pattern: &TriplePattern) {
        if let Some(name) = pattern.subject.var_name() {
            self.bind_planned(name.to_string());
        }
        if let Some(name) = pattern.object.var_name() {
            self.bind_planned(name.to_string());
        }
    }

    /// A constant term is always bound; a variable is bound once it appears
    /// in the bound set.
    pub fn is_bound(&self, term: &Term) -> bool {
        match term.var_name() {
            Some(name) => self.vars.contains_key(name),
            None => true,
        }
    }

    /// Number of concrete values feeding this term: one for a constant, the
    /// known value count for a bound variable, zero for an unbound one.
    pub fn binding_count(&self, term: &Term) -> usize {
        match term.var_name() {
            None => 1,
            Some(name) => match self.vars.get(name) {
                Some(VarBindings::Known(values)) => values.len(),
                Some(VarBindings::Planned) => 1,
                None => 0,
            },
        }
    }

    /// The concrete values this term stands for: the constant itself, or the
    /// known values of a bound variable.
    pub fn values(&self, term: &Term) -> Vec<Term> {
        match term.var_name() {
            None => vec![term.clone()],
            Some(name) => match self.vars.get(name) {
                Some(VarBindings::Known(values)) => values.clone(),
                _ => Vec::new(),
            },
        }
    }

    /// Variable names currently in the bound set.
    pub fn bound_vars(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// How many of the pattern's endpoints (subject, object) are unbound
    /// variables. A pattern is schedulable only while this is at most one.
    pub fn unbound_endpoints(&self, pattern: &TriplePattern) -> usize {
        usize::from(!self.is_bound(&pattern.subject)) + usize::from(!self.is_bound(&pattern.object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_bound_with_one_value() {
        let state = QueryState::new();
        let iri = Term::iri("http://x/a");
        assert!(state.is_bound(&iri));
        assert_eq!(state.binding_count(&iri), 1);
        assert_eq!(state.values(&iri), vec![iri.clone()]);
    }

    #[test]
    fn test_known_and_planned_binding_counts() {
        let mut state = QueryState::new();
        assert_eq!(state.binding_count(&Term::var("x")), 0);

        state.bind_values("x", vec![Term::iri("http://x/1"), Term::iri("http://x/2")]);
        assert_eq!(state.binding_count(&Term::var("x")), 2);

        state.bind_planned("y");
        assert!(state.is_bound(&Term::var("y")));
        assert_eq!(state.binding_count(&Term::var("y")), 1);

        // planned never downgrades known values
        state.bind_planned("x");
        assert_eq!(state.binding_count(&Term::var("x")), 2);
    }

    #[test]
    fn test_empty_value_set_is_not_a_binding() {
        let mut state = QueryState::new();
        state.bind_values("x", vec![]);
        assert!(!state.is_bound(&Term::var("x")));
    }

    #[test]
    fn test_unbound_endpoints() {
        let mut state = QueryState::new();
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("http://x/p"), Term::var("o"));
        assert_eq!(state.unbound_endpoints(&pattern), 2);
        state.bind_planned("s");
        assert_eq!(state.unbound_endpoints(&pattern), 1);
    }
}
