//! # Application State
//!
//! Shared state for all request handlers, created once at startup and passed
//! around via `Arc`. There are no global singletons: the registry, the
//! statistics database, and the configuration are explicit values wired into
//! everything that needs them.

use fedopt_core::registry::{InMemoryRegistry, PredicateRegistry};
use fedopt_core::reorder::PlanStrategy;
use fedopt_core::statsdb::{StatsConfig, StatsDb};
use fedopt_core::store::{MemStatsBackend, StatsBackend};
use fedopt_endpoint::sparql::SparqlStatsBackend;
use fedopt_endpoint::{EndpointConfig, HttpSparqlEndpoint};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Server-level configuration.
pub struct ServerConfig {
    /// Default planning strategy; requests may override per call.
    pub strategy: PlanStrategy,
    pub stats: StatsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            strategy: PlanStrategy::Greedy,
            stats: StatsConfig::default(),
        }
    }
}

/// Capability registry shared between the registration endpoint (writes) and
/// the planners (reads).
#[derive(Default)]
pub struct SharedRegistry {
    inner: RwLock<InMemoryRegistry>,
}

impl SharedRegistry {
    pub fn update(&self, apply: impl FnOnce(&mut InMemoryRegistry)) {
        let mut registry = self.inner.write().unwrap();
        apply(&mut registry);
    }
}

impl PredicateRegistry for SharedRegistry {
    fn is_resolvable(&self, predicate: &str) -> bool {
        self.inner.read().unwrap().is_resolvable(predicate)
    }

    fn inverse(&self, predicate: &str) -> Option<String> {
        self.inner.read().unwrap().inverse(predicate)
    }

    fn equivalents(&self, predicate: &str) -> Vec<String> {
        self.inner.read().unwrap().equivalents(predicate)
    }
}

/// Shared application state, accessible by all request handlers.
pub struct AppState {
    pub registry: Arc<SharedRegistry>,
    pub stats: Arc<StatsDb>,
    pub config: ServerConfig,
}

impl AppState {
    /// Create the state with the default configuration.
    ///
    /// The statistics backing store is in-memory unless
    /// `FEDOPT_STATS_ENDPOINT` names a SPARQL endpoint to persist through.
    pub async fn new() -> Self {
        let config = ServerConfig::default();

        let backend: Arc<dyn StatsBackend> = match std::env::var("FEDOPT_STATS_ENDPOINT") {
            Ok(url) if !url.is_empty() => {
                match HttpSparqlEndpoint::new(url.clone(), EndpointConfig::default()) {
                    Ok(endpoint) => {
                        info!("persisting statistics through {url}");
                        Arc::new(SparqlStatsBackend::new(Arc::new(endpoint)))
                    }
                    Err(e) => {
                        warn!("invalid stats endpoint {url}, using in-memory store: {e}");
                        Arc::new(MemStatsBackend::new())
                    }
                }
            }
            _ => Arc::new(MemStatsBackend::new()),
        };

        let stats = Arc::new(StatsDb::open(backend, config.stats.clone()).await);

        Self {
            registry: Arc::new(SharedRegistry::default()),
            stats,
            config,
        }
    }
}
