//! # Term and Pattern Types
//!
//! This module defines the type system for federated graph-pattern queries.
//!
//! ## Terms
//! A `Term` is one position of a triple pattern: a named variable, an IRI
//! constant, or a literal constant with an optional datatype. Literals carry a
//! syntactic restriction that matters to the planner: a literal can never
//! occupy the subject position, so a pattern whose object is a literal cannot
//! be inverted.
//!
//! ## Patterns
//! A `TriplePattern` is a (subject, predicate, object) triple of terms. A
//! `GraphPattern` wraps pattern sets the way a query language would deliver
//! them; only a flat basic graph pattern (a conjunction with no nesting,
//! UNION, or OPTIONAL) is plannable.
//!
//! ## Direction
//! Every scheduled pattern is resolved in one `Direction`. `Forward` sends the
//! bound subject values to a source and asks for objects; `Reverse` treats the
//! pattern as `(object, inverse(predicate), subject)` and sends the bound
//! object values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Term {
    /// A named query variable (`?name`).
    Variable { name: String },
    /// An IRI constant.
    Iri { iri: String },
    /// A literal constant with an optional datatype IRI.
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable { name: name.into() }
    }

    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri { iri: iri.into() }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }

    /// The variable name, if this term is a variable.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Term::Variable { name } => Some(name),
            _ => None,
        }
    }

    /// The IRI, if this term is an IRI constant.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri { iri } => Some(iri),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable { name } => write!(f, "?{}", name),
            Term::Iri { iri } => write!(f, "<{}>", iri),
            Term::Literal {
                value,
                datatype: Some(dt),
            } => write!(f, "\"{}\"^^<{}>", value, dt),
            Term::Literal {
                value,
                datatype: None,
            } => write!(f, "\"{}\"", value),
        }
    }
}

/// A single subject-predicate-object pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// The direction a scheduled pattern is resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Bound subject in, objects out.
    Forward,
    /// Bound object in, subjects out -- the pattern is treated as
    /// `(object, inverse(predicate), subject)`.
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// The query shape as delivered by a query front end.
///
/// The planner only supports a single basic graph pattern. The other variants
/// exist so that unsupported shapes can be rejected explicitly instead of
/// being silently misplanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GraphPattern {
    /// A flat conjunction of triple patterns.
    Basic { patterns: Vec<TriplePattern> },
    /// A group of sub-patterns. Plannable only if every member is basic
    /// (a front end may split one conjunction into several blocks).
    Group { members: Vec<GraphPattern> },
    /// A union of two alternatives. Never plannable.
    Union {
        left: Box<GraphPattern>,
        right: Box<GraphPattern>,
    },
    /// An optional sub-pattern. Never plannable.
    Optional { inner: Box<GraphPattern> },
}

impl GraphPattern {
    pub fn basic(patterns: Vec<TriplePattern>) -> Self {
        GraphPattern::Basic { patterns }
    }

    /// Consolidate this query into one flat basic graph pattern.
    ///
    /// A `Group` whose members are all `Basic` blocks is consolidated into a
    /// single pattern list; any nesting, UNION, or OPTIONAL yields `None`.
    pub fn as_basic(&self) -> Option<Vec<TriplePattern>> {
        match self {
            GraphPattern::Basic { patterns } => Some(patterns.clone()),
            GraphPattern::Group { members } => {
                let mut consolidated = Vec::new();
                for member in members {
                    match member {
                        GraphPattern::Basic { patterns } => {
                            consolidated.extend(patterns.iter().cloned())
                        }
                        _ => return None,
                    }
                }
                Some(consolidated)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_display() {
        assert_eq!(Term::var("x").to_string(), "?x");
        assert_eq!(Term::iri("http://example.org/p").to_string(), "<http://example.org/p>");
        assert_eq!(Term::literal("hi").to_string(), "\"hi\"");
        assert_eq!(
            Term::typed_literal("5", "http://www.w3.org/2001/XMLSchema#int").to_string(),
            "\"5\"^^<http://www.w3.org/2001/XMLSchema#int>"
        );
    }

    #[test]
    fn test_group_of_basics_consolidates() {
        let t1 = TriplePattern::new(Term::var("s"), Term::iri("p1"), Term::var("x"));
        let t2 = TriplePattern::new(Term::var("x"), Term::iri("p2"), Term::var("o"));
        let group = GraphPattern::Group {
            members: vec![
                GraphPattern::basic(vec![t1.clone()]),
                GraphPattern::basic(vec![t2.clone()]),
            ],
        };
        assert_eq!(group.as_basic(), Some(vec![t1, t2]));
    }

    #[test]
    fn test_nested_shapes_are_rejected() {
        let t1 = TriplePattern::new(Term::var("s"), Term::iri("p1"), Term::var("x"));
        let union = GraphPattern::Union {
            left: Box::new(GraphPattern::basic(vec![t1.clone()])),
            right: Box::new(GraphPattern::basic(vec![t1.clone()])),
        };
        assert!(union.as_basic().is_none());

        let nested = GraphPattern::Group {
            members: vec![GraphPattern::Optional {
                inner: Box::new(GraphPattern::basic(vec![t1])),
            }],
        };
        assert!(nested.as_basic().is_none());
    }
}
