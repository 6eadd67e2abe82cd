//! # Endpoint Capability Trait and HTTP Implementation
//!
//! `Endpoint` is the single capability interface for one data source:
//! SELECT, UPDATE, CONSTRUCT, and a liveness probe. Vendors differ in
//! transport details, not in shape, so adapters implement this trait
//! independently -- there is no inheritance chain to subclass.
//!
//! `HttpSparqlEndpoint` is the standard adapter: SPARQL protocol over HTTP
//! with SPARQL 1.1 JSON results. Rows come back as flat
//! variable-name-to-lexical-value maps; term-level RDF parsing is the
//! caller's concern.

use crate::error::EndpointError;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// One result row: variable name to lexical value.
pub type Row = HashMap<String, String>;

/// A data source in the federation.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Identity of this source, used in logs and sample attribution.
    fn uri(&self) -> &str;

    /// Run a SELECT query and return its rows.
    async fn select(&self, query: &str) -> Result<Vec<Row>, EndpointError>;

    /// Run an UPDATE (INSERT/DELETE/CLEAR) statement.
    async fn update(&self, statement: &str) -> Result<(), EndpointError>;

    /// Run a CONSTRUCT query and return the serialized graph as the source
    /// sent it. Parsing the serialization is delegated to the caller.
    async fn construct(&self, query: &str) -> Result<String, EndpointError>;

    /// Cheap liveness check.
    async fn ping(&self) -> bool {
        self.select("SELECT * WHERE { ?s ?p ?o } LIMIT 1").await.is_ok()
    }
}

/// Configuration for an HTTP endpoint client.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Per-request deadline; exceeding it surfaces as `EndpointError::Timeout`.
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_idle_connections: usize,
    /// Results-limit ceiling the source is known to enforce. Resolutions
    /// that fill it are recorded as truncated samples.
    pub results_limit: Option<u64>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: "fedopt/0.1".to_string(),
            max_idle_connections: 8,
            results_limit: None,
        }
    }
}

/// SPARQL 1.1 JSON results document, reduced to what the row conversion
/// needs; the head and term-type annotations are ignored.
#[derive(Debug, Deserialize)]
struct ResultsDocument {
    results: ResultsBindings,
}

#[derive(Debug, Deserialize)]
struct ResultsBindings {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

/// HTTP SPARQL protocol client for one endpoint.
pub struct HttpSparqlEndpoint {
    url: String,
    client: Client,
    config: EndpointConfig,
}

impl HttpSparqlEndpoint {
    pub fn new(url: impl Into<String>, config: EndpointConfig) -> Result<Self, EndpointError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(config.max_idle_connections)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
            config,
        })
    }

    pub fn results_limit(&self) -> Option<u64> {
        self.config.results_limit
    }

    fn check_status(status: StatusCode) -> Result<(), EndpointError> {
        if status == StatusCode::GATEWAY_TIMEOUT {
            // sources behind a proxy report their own timeout as a 504
            return Err(EndpointError::Timeout);
        }
        if !status.is_success() {
            return Err(EndpointError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Endpoint for HttpSparqlEndpoint {
    fn uri(&self) -> &str {
        &self.url
    }

    async fn select(&self, query: &str) -> Result<Vec<Row>, EndpointError> {
        trace!("SELECT against {}: {query}", self.url);
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query)])
            .header(ACCEPT, "application/sparql-results+json")
            .send()
            .await?;
        Self::check_status(response.status())?;

        let body = response.text().await?;
        let document: ResultsDocument =
            serde_json::from_str(&body).map_err(|e| EndpointError::Decode(e.to_string()))?;

        Ok(document
            .results
            .bindings
            .into_iter()
            .map(|binding| {
                binding
                    .into_iter()
                    .map(|(var, value)| (var, value.value))
                    .collect()
            })
            .collect())
    }

    async fn update(&self, statement: &str) -> Result<(), EndpointError> {
        trace!("UPDATE against {}: {statement}", self.url);
        let response = self
            .client
            .post(&self.url)
            .form(&[("update", statement)])
            .send()
            .await?;
        Self::check_status(response.status())
    }

    async fn construct(&self, query: &str) -> Result<String, EndpointError> {
        trace!("CONSTRUCT against {}: {query}", self.url);
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query)])
            .header(ACCEPT, "application/n-triples")
            .send()
            .await?;
        Self::check_status(response.status())?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_document_parsing() {
        let body = r#"{
            "head": { "vars": ["s", "o"] },
            "results": { "bindings": [
                { "s": { "type": "uri", "value": "http://x/1" },
                  "o": { "type": "literal", "value": "hello" } },
                { "s": { "type": "uri", "value": "http://x/2" } }
            ] }
        }"#;
        let document: ResultsDocument = serde_json::from_str(body).unwrap();
        assert_eq!(document.results.bindings.len(), 2);
        assert_eq!(document.results.bindings[0]["o"].value, "hello");
    }

    #[test]
    fn test_empty_results_document() {
        let body = r#"{ "head": { "vars": [] }, "results": { "bindings": [] } }"#;
        let document: ResultsDocument = serde_json::from_str(body).unwrap();
        assert!(document.results.bindings.is_empty());
    }
}
