//! # Adaptive Result-Count Probing
//!
//! A source that cannot materialize a large result set within its deadline
//! times out instead of answering -- so before pulling a big answer, we find
//! a LIMIT the source can actually serve.
//!
//! The trick is that a probe does not need to download anything: asking for
//! `OFFSET (cur - 1) LIMIT 1` forces the source to materialize `cur` rows
//! server-side and ship exactly one. Timeouts and successes at different
//! probe points then drive a bisection:
//!
//! - timeout: remember the failure point and bisect back toward the last
//!   success (the very first failures halve, since the last success starts
//!   at zero). If the probe bisects all the way to zero, the search space is
//!   exhausted and the timeout is re-raised.
//! - timeout at a point that previously succeeded: the boundary is flaky;
//!   take 10% off and settle.
//! - success with no rows: the probe ran past the true result count -- the
//!   full query was answerable after all. Record the point as an exact upper
//!   bound and bisect down.
//! - success with rows: raise the bound -- double while no failure is known,
//!   bisect toward the failure otherwise.
//!
//! The search stops when the bound is tight (`cur == last_failure - 1`) or
//! pinned at zero.

use crate::endpoint::{Endpoint, Row};
use crate::error::EndpointError;
use tracing::{debug, warn};

/// Find a LIMIT the source can answer for `query` without timing out.
///
/// Returns a defensible lower bound for the query's result count; the bound
/// is `> 0` whenever the query has results and some probe succeeds.
pub async fn results_count_lower_bound(
    endpoint: &dyn Endpoint,
    query: &str,
    start_size: u64,
) -> Result<u64, EndpointError> {
    let mut cur = start_size;
    let mut last_success: u64 = 0;
    let mut last_failure: Option<u64> = None;
    let mut answer_is_exact = false;

    while cur != 0 {
        let probe = format!("{query} OFFSET {} LIMIT 1", cur - 1);
        match endpoint.select(&probe).await {
            Err(EndpointError::Timeout) => {
                debug!("probe timed out at limit {cur}");
                if cur == last_success {
                    // this point succeeded earlier; the boundary is flaky,
                    // so shave 10% and call it good
                    cur = cur * 90 / 100;
                    break;
                }
                last_failure = Some(cur);
                cur = last_success + (cur - last_success) / 2;
                if cur == 0 {
                    // even the smallest probe times out
                    return Err(EndpointError::Timeout);
                }
            }
            Err(e) => return Err(e),
            Ok(rows) if rows.is_empty() => {
                debug!("probe succeeded at limit {cur}, beyond the true result count");
                answer_is_exact = true;
                last_failure = Some(cur);
                cur = last_success + (cur - last_success) / 2;
            }
            Ok(_) => {
                if last_failure == Some(cur + 1) {
                    // can't go any higher: the bound is tight
                    break;
                }
                debug!("probe succeeded at limit {cur}");
                last_success = cur;
                cur = match last_failure {
                    Some(failure) => cur + (failure - cur) / 2,
                    None => cur.saturating_mul(2),
                };
            }
        }
    }

    if answer_is_exact {
        warn!("probing indicates the full query was answerable outright");
    }

    Ok(cur)
}

/// Best-effort fallback when the full answer is unaffordable: find a safe
/// LIMIT, then fetch whatever fits under it.
pub async fn partial_query_results(
    endpoint: &dyn Endpoint,
    query: &str,
    start_size: u64,
) -> Result<Vec<Row>, EndpointError> {
    let limit = results_count_lower_bound(endpoint, query, start_size).await?;
    debug!("fetching partial results with limit {limit}");
    endpoint.select(&format!("{query} LIMIT {limit}")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted endpoint: `true_count` rows exist; materializing more than
    /// `timeout_above` rows times out; `flaky_point` succeeds once, then
    /// times out.
    struct ScriptedEndpoint {
        true_count: u64,
        timeout_above: u64,
        flaky_point: Option<u64>,
        seen: Mutex<HashMap<u64, u32>>,
    }

    impl ScriptedEndpoint {
        fn new(true_count: u64, timeout_above: u64) -> Self {
            Self {
                true_count,
                timeout_above,
                flaky_point: None,
                seen: Mutex::new(HashMap::new()),
            }
        }

        /// `... OFFSET <n> LIMIT 1` probes the point n + 1.
        fn probe_point(query: &str) -> Option<u64> {
            query
                .rsplit("OFFSET ")
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|n| n.parse::<u64>().ok())
                .map(|offset| offset + 1)
        }

        fn limit(query: &str) -> Option<u64> {
            query
                .rsplit("LIMIT ")
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|n| n.parse::<u64>().ok())
        }

        fn rows(count: u64) -> Vec<Row> {
            (0..count)
                .map(|i| Row::from([("s".to_string(), format!("row{i}"))]))
                .collect()
        }
    }

    #[async_trait]
    impl Endpoint for ScriptedEndpoint {
        fn uri(&self) -> &str {
            "scripted:endpoint"
        }

        async fn select(&self, query: &str) -> Result<Vec<Row>, EndpointError> {
            if query.contains("OFFSET ") {
                let point = Self::probe_point(query).expect("malformed probe");

                let visits = {
                    let mut seen = self.seen.lock().unwrap();
                    let entry = seen.entry(point).or_insert(0);
                    *entry += 1;
                    *entry
                };

                if self.flaky_point == Some(point) {
                    if visits > 1 {
                        return Err(EndpointError::Timeout);
                    }
                } else if point > self.timeout_above {
                    return Err(EndpointError::Timeout);
                }
                if point > self.true_count {
                    return Ok(vec![]);
                }
                return Ok(Self::rows(1));
            }

            // plain fetch: "query LIMIT n"
            let limit = Self::limit(query).expect("malformed fetch");
            if limit > self.timeout_above {
                return Err(EndpointError::Timeout);
            }
            Ok(Self::rows(limit.min(self.true_count)))
        }

        async fn update(&self, _statement: &str) -> Result<(), EndpointError> {
            unimplemented!("probes never update")
        }

        async fn construct(&self, _query: &str) -> Result<String, EndpointError> {
            unimplemented!("probes never construct")
        }
    }

    #[tokio::test]
    async fn converges_to_the_exact_count_when_nothing_times_out() {
        // K = 10 true results, start = 16: pure bisection on emptiness
        let endpoint = ScriptedEndpoint::new(10, u64::MAX);
        let bound = results_count_lower_bound(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 16)
            .await
            .unwrap();
        assert_eq!(bound, 10);
    }

    #[tokio::test]
    async fn converges_below_the_timeout_frontier() {
        // plenty of rows, but the source dies above 5
        let endpoint = ScriptedEndpoint::new(100, 5);
        let bound = results_count_lower_bound(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 64)
            .await
            .unwrap();
        assert!(bound > 0);
        assert!(bound <= 5, "bound {bound} exceeds what the source can answer");
        // after convergence the returned limit must be answerable
        assert!(endpoint.select(&format!("q OFFSET {} LIMIT 1", bound - 1)).await.is_ok());
    }

    #[tokio::test]
    async fn flaky_boundary_backs_off_ten_percent() {
        // everything above 5 times out, except 6 succeeds exactly once
        let mut endpoint = ScriptedEndpoint::new(100, 5);
        endpoint.flaky_point = Some(6);
        let bound = results_count_lower_bound(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 8)
            .await
            .unwrap();
        // 6 succeeded, then timed out on revisit: 6 * 90 / 100
        assert_eq!(bound, 5);
    }

    #[tokio::test]
    async fn exhausted_search_space_reraises_the_timeout() {
        // even a single row cannot be served
        let endpoint = ScriptedEndpoint::new(100, 0);
        let result = results_count_lower_bound(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 32).await;
        assert!(matches!(result, Err(EndpointError::Timeout)));
    }

    #[tokio::test]
    async fn empty_result_sets_converge_to_zero() {
        let endpoint = ScriptedEndpoint::new(0, u64::MAX);
        let bound = results_count_lower_bound(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 8)
            .await
            .unwrap();
        assert_eq!(bound, 0);
    }

    #[tokio::test]
    async fn partial_results_fetch_under_the_bound() {
        let endpoint = ScriptedEndpoint::new(10, u64::MAX);
        let rows = partial_query_results(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 16)
            .await
            .unwrap();
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn partial_results_stay_answerable_after_truncation() {
        // 100 rows exist but only 5 can be materialized: the partial fetch
        // must come back instead of timing out
        let endpoint = ScriptedEndpoint::new(100, 5);
        let rows = partial_query_results(&endpoint, "SELECT ?s WHERE { ?s ?p ?o }", 64)
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
    }
}
