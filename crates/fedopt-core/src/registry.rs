//! # Capability Registry
//!
//! The registry is the planner's oracle for what the federation can actually
//! answer: whether any source resolves a given predicate (with the subject
//! bound), what a predicate's declared inverse is, and which predicates are
//! declared equivalent to each other. It plays the same role a catalog plays
//! for a relational optimizer -- metadata the planner consults but does not
//! own.
//!
//! ## Trait Design
//!
//! `PredicateRegistry` is a minimal trait behind a trait object so different
//! backends can supply capabilities. In production the registry would be
//! backed by a service ontology; `InMemoryRegistry` provides a HashMap-based
//! implementation populated programmatically, used by tests and the server's
//! registration endpoint.
//!
//! ## Equivalence Closure
//!
//! `equivalents` must return the full, pre-closed equivalence class for a
//! predicate (including the predicate itself). The cost comparator only
//! deduplicates against the supplied classes; it never computes a closure.

use std::collections::{HashMap, HashSet};

/// Capability oracle consumed by the planners and the cost comparator.
pub trait PredicateRegistry: Send + Sync {
    /// True if at least one source can resolve this predicate with the
    /// subject end bound.
    fn is_resolvable(&self, predicate: &str) -> bool;

    /// The declared inverse of this predicate, if any.
    fn inverse(&self, predicate: &str) -> Option<String>;

    /// The full equivalence class of this predicate, including itself.
    fn equivalents(&self, predicate: &str) -> Vec<String>;

    /// True if the pattern can be resolved with the *object* end bound,
    /// i.e. the predicate has a declared inverse that is itself resolvable.
    fn is_reverse_resolvable(&self, predicate: &str) -> bool {
        self.inverse(predicate)
            .map(|inv| self.is_resolvable(&inv))
            .unwrap_or(false)
    }
}

/// In-memory registry for testing and for the server's registration endpoint.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    resolvable: HashSet<String>,
    inverses: HashMap<String, String>,
    equivalence: HashMap<String, Vec<String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a predicate resolvable in the forward direction.
    pub fn add_resolvable(&mut self, predicate: impl Into<String>) {
        self.resolvable.insert(predicate.into());
    }

    /// Declare `predicate` and `inverse` as inverses of each other.
    ///
    /// Registration is symmetric: the inverse of the inverse is the original.
    pub fn add_inverse_pair(&mut self, predicate: impl Into<String>, inverse: impl Into<String>) {
        let p = predicate.into();
        let q = inverse.into();
        self.inverses.insert(p.clone(), q.clone());
        self.inverses.insert(q, p);
    }

    /// Declare a set of predicates mutually equivalent.
    ///
    /// The class replaces any previously declared class for its members --
    /// classes are supplied whole, already closed.
    pub fn declare_equivalent(&mut self, predicates: &[&str]) {
        let class: Vec<String> = predicates.iter().map(|p| p.to_string()).collect();
        for p in &class {
            self.equivalence.insert(p.clone(), class.clone());
        }
    }
}

impl PredicateRegistry for InMemoryRegistry {
    fn is_resolvable(&self, predicate: &str) -> bool {
        self.resolvable.contains(predicate)
    }

    fn inverse(&self, predicate: &str) -> Option<String> {
        self.inverses.get(predicate).cloned()
    }

    fn equivalents(&self, predicate: &str) -> Vec<String> {
        self.equivalence
            .get(predicate)
            .cloned()
            .unwrap_or_else(|| vec![predicate.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_resolvability_requires_resolvable_inverse() {
        let mut registry = InMemoryRegistry::new();
        registry.add_resolvable("http://x/p");
        registry.add_inverse_pair("http://x/p", "http://x/pInv");

        // p's inverse exists but is not itself resolvable
        assert!(registry.is_resolvable("http://x/p"));
        assert!(!registry.is_reverse_resolvable("http://x/p"));

        registry.add_resolvable("http://x/pInv");
        assert!(registry.is_reverse_resolvable("http://x/p"));

        // no declared inverse at all
        registry.add_resolvable("http://x/q");
        assert!(!registry.is_reverse_resolvable("http://x/q"));
    }

    #[test]
    fn test_equivalence_class_includes_self() {
        let mut registry = InMemoryRegistry::new();
        registry.declare_equivalent(&["http://x/a", "http://x/c"]);

        let class = registry.equivalents("http://x/a");
        assert!(class.contains(&"http://x/a".to_string()));
        assert!(class.contains(&"http://x/c".to_string()));

        // an undeclared predicate is its own class
        assert_eq!(registry.equivalents("http://x/b"), vec!["http://x/b".to_string()]);
    }
}
