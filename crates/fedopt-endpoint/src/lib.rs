//! # fedopt-endpoint: Adaptive Data-Source Client
//!
//! This crate talks to one federated data source over HTTP and copes with the
//! ways real sources misbehave: requests time out, large result sets are
//! silently truncated, and sibling queries fail independently.
//!
//! ## Module Overview
//!
//! - **`error`**: The endpoint error type; timeouts are a first-class kind so
//!   the adaptive probe can branch on them.
//! - **`endpoint`**: The `Endpoint` capability trait and the HTTP
//!   implementation with SPARQL JSON results parsing.
//! - **`probe`**: Adaptive result-count probing -- finding a LIMIT the source
//!   can actually answer -- and best-effort partial results.
//! - **`batch`**: Concurrent batched dispatch with independent failures,
//!   early abandonment, and sampled resolutions that feed the statistics
//!   store.
//! - **`sparql`**: Query templating and the SPARQL-backed statistics backend.

pub mod batch;
pub mod endpoint;
pub mod error;
pub mod probe;
pub mod sparql;

pub use endpoint::{Endpoint, EndpointConfig, HttpSparqlEndpoint, Row};
pub use error::EndpointError;
