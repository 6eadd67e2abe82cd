//! # Batched Dispatch
//!
//! Resolving a pattern sends one lookup per bound input value, and the
//! lookups are independent: they run concurrently on separate pooled
//! connections, and one failure never aborts its siblings.
//!
//! Sampling variants collect until "enough" responses have arrived and then
//! stop listening; abandoned stragglers keep running detached, and their
//! eventual failures are logged at debug level and discarded.
//!
//! The timed resolution helper is the bridge to the statistics store: it
//! measures the wall-clock cost of a whole batched resolution, marks the
//! sample truncated when a source filled its results ceiling, and records
//! the observation. A statistics failure never fails the resolution.

use crate::endpoint::{Endpoint, Row};
use crate::error::EndpointError;
use fedopt_core::stats::Measurement;
use fedopt_core::statsdb::StatsDb;
use fedopt_core::term::Direction;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Run every query concurrently; each outcome is independent.
pub async fn select_batch(
    endpoint: Arc<dyn Endpoint>,
    queries: Vec<String>,
) -> Vec<Result<Vec<Row>, EndpointError>> {
    let mut handles = Vec::with_capacity(queries.len());
    for query in queries {
        let endpoint = Arc::clone(&endpoint);
        handles.push(tokio::spawn(async move { endpoint.select(&query).await }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or_else(|e| {
            Err(EndpointError::Transport(format!("worker task failed: {e}")))
        }));
    }
    results
}

/// Run every query concurrently but return after `enough` successful
/// responses. Stragglers are abandoned, not awaited; each logs its own
/// outcome when it eventually finishes.
pub async fn select_batch_early(
    endpoint: Arc<dyn Endpoint>,
    queries: Vec<String>,
    enough: usize,
) -> Vec<Vec<Row>> {
    let (tx, mut rx) = mpsc::channel(queries.len().max(1));
    for query in queries {
        let endpoint = Arc::clone(&endpoint);
        let tx = tx.clone();
        tokio::spawn(async move {
            match endpoint.select(&query).await {
                // a closed channel means the batch stopped listening
                Ok(rows) => {
                    let _ = tx.send(rows).await;
                }
                Err(e) => debug!("batched query against {} failed: {e}", endpoint.uri()),
            }
        });
    }
    drop(tx);

    let mut collected = Vec::new();
    while collected.len() < enough {
        match rx.recv().await {
            Some(rows) => collected.push(rows),
            None => break,
        }
    }
    collected
}

/// Resolve `predicate` for the given formatted input terms, one lookup per
/// input, timing the batch and feeding the observation to the statistics
/// store. Returns the merged rows from all successful lookups.
pub async fn resolve_with_sampling(
    endpoint: Arc<dyn Endpoint>,
    stats: &StatsDb,
    predicate: &str,
    direction: Direction,
    inputs: &[String],
    results_limit: Option<u64>,
) -> Vec<Row> {
    if inputs.is_empty() {
        return Vec::new();
    }

    let queries: Vec<String> = inputs
        .iter()
        .map(|input| lookup_query(predicate, direction, input, results_limit))
        .collect();

    let started = Instant::now();
    let outcomes = select_batch(endpoint, queries).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut failures = 0usize;
    for outcome in outcomes {
        match outcome {
            Ok(batch_rows) => {
                if let Some(limit) = results_limit {
                    if batch_rows.len() as u64 >= limit {
                        truncated = true;
                    }
                }
                rows.extend(batch_rows);
            }
            Err(e) => {
                failures += 1;
                debug!("lookup of {predicate} failed: {e}");
            }
        }
    }
    if failures > 0 {
        warn!("{failures} of {} lookups for {predicate} failed", inputs.len());
    }

    let measurement = if truncated {
        Measurement::Truncated
    } else {
        Measurement::Measured(elapsed_ms)
    };
    stats
        .record_sample(predicate, direction, inputs.len() as u32, measurement)
        .await;

    rows
}

/// One lookup query for a single bound input term (already formatted for
/// query text, e.g. `<http://...>` or `"42"`).
fn lookup_query(
    predicate: &str,
    direction: Direction,
    input: &str,
    results_limit: Option<u64>,
) -> String {
    let body = match direction {
        Direction::Forward => format!("SELECT ?object WHERE {{ {input} <{predicate}> ?object }}"),
        Direction::Reverse => format!("SELECT ?subject WHERE {{ ?subject <{predicate}> {input} }}"),
    };
    match results_limit {
        Some(limit) => format!("{body} LIMIT {limit}"),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fedopt_core::statsdb::StatsConfig;
    use fedopt_core::store::MemStatsBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Endpoint that answers with one row per query, fails queries containing
    /// "poison", and stalls on queries containing "slow".
    struct FlakyEndpoint {
        calls: AtomicUsize,
    }

    impl FlakyEndpoint {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Endpoint for FlakyEndpoint {
        fn uri(&self) -> &str {
            "flaky:endpoint"
        }

        async fn select(&self, query: &str) -> Result<Vec<Row>, EndpointError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.contains("poison") {
                return Err(EndpointError::Timeout);
            }
            if query.contains("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(vec![Row::from([("s".to_string(), query.to_string())])])
        }

        async fn update(&self, _statement: &str) -> Result<(), EndpointError> {
            Ok(())
        }

        async fn construct(&self, _query: &str) -> Result<String, EndpointError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn one_failure_never_aborts_siblings() {
        let endpoint: Arc<dyn Endpoint> = Arc::new(FlakyEndpoint::new());
        let results = select_batch(
            Arc::clone(&endpoint),
            vec!["q1".into(), "poison".into(), "q3".into()],
        )
        .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(EndpointError::Timeout)));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn early_abandonment_returns_without_the_stragglers() {
        let endpoint: Arc<dyn Endpoint> = Arc::new(FlakyEndpoint::new());
        let collected = tokio::time::timeout(
            Duration::from_secs(5),
            select_batch_early(
                endpoint,
                vec!["q1".into(), "slow1".into(), "q2".into(), "slow2".into()],
                2,
            ),
        )
        .await
        .expect("early abandonment must not wait for stragglers");

        assert_eq!(collected.len(), 2);
    }

    #[tokio::test]
    async fn early_abandonment_drains_when_enough_is_unreachable() {
        let endpoint: Arc<dyn Endpoint> = Arc::new(FlakyEndpoint::new());
        let collected =
            select_batch_early(endpoint, vec!["q1".into(), "poison".into()], 5).await;
        // only one query can succeed; the batch drains and returns it
        assert_eq!(collected.len(), 1);
    }

    #[tokio::test]
    async fn sampled_resolution_records_one_sample() {
        let endpoint: Arc<dyn Endpoint> = Arc::new(FlakyEndpoint::new());
        let stats = StatsDb::open(Arc::new(MemStatsBackend::new()), StatsConfig::default()).await;

        let rows = resolve_with_sampling(
            endpoint,
            &stats,
            "http://x/p",
            Direction::Forward,
            &["<http://x/1>".to_string(), "<http://x/2>".to_string()],
            None,
        )
        .await;

        assert_eq!(rows.len(), 2);
        assert_eq!(stats.sample_count().await, 1);
    }

    #[tokio::test]
    async fn sampled_resolution_marks_truncation() {
        let endpoint: Arc<dyn Endpoint> = Arc::new(FlakyEndpoint::new());
        let backend = Arc::new(MemStatsBackend::new());
        let stats = StatsDb::open(backend.clone(), StatsConfig::default()).await;

        // the fake returns one row per lookup, and the ceiling is one: the
        // resolution may have been cut short, so the sample is truncated
        resolve_with_sampling(
            Arc::clone(&endpoint),
            &stats,
            "http://x/p",
            Direction::Forward,
            &["<http://x/1>".to_string()],
            Some(1),
        )
        .await;

        use fedopt_core::store::StatsBackend;
        let samples = backend.samples("http://x/p", Direction::Forward).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].response_time.is_truncated());
    }

    #[test]
    fn lookup_queries_place_the_input_on_the_bound_side() {
        let forward = lookup_query("http://x/p", Direction::Forward, "<http://x/s>", None);
        assert_eq!(forward, "SELECT ?object WHERE { <http://x/s> <http://x/p> ?object }");

        let reverse = lookup_query("http://x/p", Direction::Reverse, "\"42\"", Some(10));
        assert_eq!(
            reverse,
            "SELECT ?subject WHERE { ?subject <http://x/p> \"42\" } LIMIT 10"
        );
    }
}
