//! # Statistics Database
//!
//! `StatsDb` is the statistics store the planner consults: it records one
//! sample per real resolution, periodically refits the per-predicate linear
//! cost models, and serves cost estimates through a small read-through cache.
//!
//! ## Capacity and Purging
//!
//! The sample store is bounded. A running counter tracks the number of
//! persisted samples (initialized with one COUNT query at startup); when a
//! record would cross the configured capacity, the store first purges a fixed
//! batch of the oldest samples and only then inserts. The purge cutoff comes
//! from a single "timestamp at rank K" query against the backing store --
//! samples at or before the cutoff are deleted in one statement, and the
//! counter drops by exactly the batch size. Check, purge, and insert happen
//! under one lock so concurrent writers cannot double-purge.
//!
//! ## Recompute Is Explicit
//!
//! Summary stats are recomputed on demand (or on a schedule owned by the
//! caller), not on every insert. The read cache is keyed
//! `predicate:direction` and invalidated by TTL expiry only; the backing
//! store is always the system of record.
//!
//! ## Failure Policy
//!
//! Every backend failure on this path is logged and swallowed. Statistics
//! make planning cheaper; they must never make it fail.

use crate::stats::{fit_linear_model, Measurement, Sample, SummaryStat};
use crate::store::{StatsBackend, StoreError};
use crate::term::Direction;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

/// Configuration for the statistics database.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Maximum number of samples kept in the backing store.
    pub sample_capacity: u64,
    /// How many of the oldest samples are purged when capacity is reached.
    pub purge_batch: u64,
    /// Capacity of the in-process summary-stat cache (entries).
    pub summary_cache_size: usize,
    /// How long a cached summary stat may be served before it is refetched.
    pub summary_ttl: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sample_capacity: 10_000,
            purge_batch: 200,
            summary_cache_size: 5_000,
            summary_ttl: Duration::from_secs(600),
        }
    }
}

struct CachedSummary {
    fetched_at: Instant,
    summary: SummaryStat,
}

struct SampleCounter {
    count: u64,
    /// Last timestamp handed out. Sample timestamps must be strictly
    /// increasing: the purge cutoff is a timestamp, and ties would purge
    /// more than one batch at once.
    last_timestamp_ms: i64,
}

/// The statistics store: bounded sample recording, model recomputation, and
/// cached cost estimation.
pub struct StatsDb {
    backend: Arc<dyn StatsBackend>,
    config: StatsConfig,
    /// Running sample count. The mutex also serializes the capacity
    /// check-purge-insert sequence in `record_sample`.
    counter: Mutex<SampleCounter>,
    cache: Mutex<LruCache<String, CachedSummary>>,
}

impl StatsDb {
    /// Open a statistics database over the given backend.
    ///
    /// Initializes the running sample counter from the store. An unreachable
    /// store is not fatal: the counter starts at zero and the first purge
    /// will straighten it out.
    pub async fn open(backend: Arc<dyn StatsBackend>, config: StatsConfig) -> Self {
        let mut config = config;
        if config.purge_batch > config.sample_capacity {
            warn!(
                "purge batch ({}) exceeds sample capacity ({})",
                config.purge_batch, config.sample_capacity
            );
            config.purge_batch = (config.sample_capacity / 10).max(1);
            warn!("clamped purge batch to {}", config.purge_batch);
        }

        let count = match backend.count_samples().await {
            Ok(n) => n,
            Err(e) => {
                error!("failed to count persisted samples, starting from zero: {e}");
                0
            }
        };
        debug!("statistics store holds {count} samples");

        let cache_size =
            NonZeroUsize::new(config.summary_cache_size).unwrap_or(NonZeroUsize::MIN);

        Self {
            backend,
            config,
            counter: Mutex::new(SampleCounter {
                count,
                last_timestamp_ms: 0,
            }),
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Record one resolution sample, purging the oldest batch first if the
    /// store is at capacity. Failures are logged and swallowed.
    pub async fn record_sample(
        &self,
        predicate: &str,
        direction: Direction,
        num_inputs: u32,
        response_time: Measurement,
    ) {
        let mut counter = self.counter.lock().await;

        if counter.count >= self.config.sample_capacity {
            debug!(
                "sample store reached capacity of {}, purging {} oldest samples",
                self.config.sample_capacity, self.config.purge_batch
            );
            match self.purge_oldest_batch().await {
                Ok(()) => counter.count = counter.count.saturating_sub(self.config.purge_batch),
                Err(e) => error!("failed to purge sample store: {e}"),
            }
        }

        debug!(
            "recording sample (predicate = {predicate}, direction = {direction}, \
             numInputs = {num_inputs}, responseTime = {response_time:?})"
        );

        let timestamp_ms = now_ms().max(counter.last_timestamp_ms + 1);
        counter.last_timestamp_ms = timestamp_ms;

        let sample = Sample {
            predicate: predicate.to_string(),
            direction,
            num_inputs,
            response_time,
            timestamp_ms,
        };

        match self.backend.insert_sample(&sample).await {
            Ok(()) => counter.count += 1,
            Err(e) => error!("failed to record sample: {e}"),
        }
    }

    async fn purge_oldest_batch(&self) -> Result<(), StoreError> {
        let rank = self.config.purge_batch - 1;
        let cutoff = self.backend.timestamp_at_rank(rank).await?.ok_or_else(|| {
            StoreError::MalformedRow(format!("no timestamp at rank {rank} in a full store"))
        })?;
        self.backend.purge_samples_through(cutoff).await
    }

    /// Refit the summary stats for one predicate, or for every predicate with
    /// samples. Failures are logged per key and do not stop the sweep.
    pub async fn recompute_stats(&self, predicate: Option<&str>) {
        let predicates = match predicate {
            Some(p) => vec![p.to_string()],
            None => match self.backend.predicates_with_samples().await {
                Ok(ps) => ps,
                Err(e) => {
                    error!("failed to list predicates with samples: {e}");
                    return;
                }
            },
        };

        debug!("recomputing summary stats for {} predicate(s)", predicates.len());

        for p in &predicates {
            for direction in [Direction::Forward, Direction::Reverse] {
                if let Err(e) = self.recompute_one(p, direction).await {
                    error!("failed to recompute stats for {p} ({direction}): {e}");
                }
            }
        }
    }

    async fn recompute_one(&self, predicate: &str, direction: Direction) -> Result<(), StoreError> {
        let samples = self.backend.samples(predicate, direction).await?;
        if samples.is_empty() {
            trace!("no {direction} samples for {predicate}, skipping");
            return Ok(());
        }

        let points: Vec<(u32, u64)> = samples
            .iter()
            .filter_map(|s| s.response_time.as_measured().map(|ms| (s.num_inputs, ms)))
            .collect();

        let Some((base, slope)) = fit_linear_model(&points) else {
            debug!("only truncated {direction} samples for {predicate}, skipping model fit");
            return Ok(());
        };

        debug!(
            "computed {direction} stats for {predicate}: baseTime = {base}ms, \
             timePerInput = {slope}ms, samples = {}",
            points.len()
        );

        self.backend
            .put_summary(&SummaryStat {
                predicate: predicate.to_string(),
                direction,
                base_time_ms: base,
                time_per_input_ms: slope,
                sample_count: points.len() as u32,
            })
            .await
    }

    /// Estimated resolution time for `num_inputs` inputs, or `None` when no
    /// summary stat exists for the (predicate, direction).
    pub async fn estimated_cost(
        &self,
        predicate: &str,
        direction: Direction,
        num_inputs: u32,
    ) -> Option<u64> {
        let key = cache_key(predicate, direction);

        if let Some(summary) = self.cached(&key).await {
            return Some(summary.estimate(num_inputs));
        }

        match self.backend.summary(predicate, direction).await {
            Ok(Some(summary)) => {
                let cost = summary.estimate(num_inputs);
                self.cache.lock().await.put(
                    key,
                    CachedSummary {
                        fetched_at: Instant::now(),
                        summary,
                    },
                );
                Some(cost)
            }
            Ok(None) => {
                trace!("no stats available for {predicate} in the {direction} direction");
                None
            }
            Err(e) => {
                error!("failed to read summary stats, treating as no stats: {e}");
                None
            }
        }
    }

    async fn cached(&self, key: &str) -> Option<SummaryStat> {
        let mut cache = self.cache.lock().await;
        match cache.get(key) {
            Some(entry) if entry.fetched_at.elapsed() <= self.config.summary_ttl => {
                Some(entry.summary.clone())
            }
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Drop all samples and all summary stats.
    pub async fn clear(&self) {
        debug!("clearing statistics store");
        self.clear_samples().await;
        self.clear_stats().await;
    }

    /// Drop all samples and reset the running counter.
    pub async fn clear_samples(&self) {
        let mut counter = self.counter.lock().await;
        match self.backend.clear_samples().await {
            Ok(()) => counter.count = 0,
            Err(e) => error!("failed to clear samples: {e}"),
        }
    }

    /// Drop all summary stats. Cached summaries linger until their TTL
    /// expires; the cache is never an invalidation target.
    pub async fn clear_stats(&self) {
        if let Err(e) = self.backend.clear_summaries().await {
            error!("failed to clear summary stats: {e}");
        }
    }

    /// Current value of the running sample counter.
    pub async fn sample_count(&self) -> u64 {
        self.counter.lock().await.count
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }
}

fn cache_key(predicate: &str, direction: Direction) -> String {
    format!("{predicate}:{direction}")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStatsBackend;

    const P: &str = "http://example.org/p";

    async fn db_with(config: StatsConfig) -> StatsDb {
        StatsDb::open(Arc::new(MemStatsBackend::new()), config).await
    }

    #[tokio::test]
    async fn test_capacity_purges_exactly_one_batch() {
        let db = db_with(StatsConfig {
            sample_capacity: 10,
            purge_batch: 4,
            ..StatsConfig::default()
        })
        .await;

        for i in 0..10 {
            db.record_sample(P, Direction::Forward, i, Measurement::Measured(50)).await;
        }
        assert_eq!(db.sample_count().await, 10);

        // the next record crosses capacity: purge 4, insert 1
        db.record_sample(P, Direction::Forward, 99, Measurement::Measured(50)).await;
        assert_eq!(db.sample_count().await, 7);
        assert_eq!(db.backend.count_samples().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_purge_batch_clamped_to_capacity() {
        let db = db_with(StatsConfig {
            sample_capacity: 100,
            purge_batch: 500,
            ..StatsConfig::default()
        })
        .await;
        assert_eq!(db.config().purge_batch, 10);
    }

    #[tokio::test]
    async fn test_recompute_identical_inputs_yields_mean() {
        let db = db_with(StatsConfig::default()).await;
        for ms in [100, 200, 300] {
            db.record_sample(P, Direction::Forward, 5, Measurement::Measured(ms)).await;
        }
        db.recompute_stats(Some(P)).await;

        let summary = db.backend.summary(P, Direction::Forward).await.unwrap().unwrap();
        assert_eq!(summary.base_time_ms, 200);
        assert_eq!(summary.time_per_input_ms, 0);
        assert_eq!(summary.sample_count, 3);
    }

    #[tokio::test]
    async fn test_truncated_samples_excluded_from_fit() {
        let db = db_with(StatsConfig::default()).await;
        db.record_sample(P, Direction::Forward, 1, Measurement::Measured(10)).await;
        db.record_sample(P, Direction::Forward, 2, Measurement::Measured(20)).await;
        db.record_sample(P, Direction::Forward, 100, Measurement::Truncated).await;
        db.recompute_stats(Some(P)).await;

        let summary = db.backend.summary(P, Direction::Forward).await.unwrap().unwrap();
        // fit over (1,10) and (2,20) only: y = 0 + 10x
        assert_eq!(summary.base_time_ms, 0);
        assert_eq!(summary.time_per_input_ms, 10);
        assert_eq!(summary.sample_count, 2);
    }

    #[tokio::test]
    async fn test_all_truncated_key_is_skipped() {
        let db = db_with(StatsConfig::default()).await;
        db.record_sample(P, Direction::Reverse, 10, Measurement::Truncated).await;
        db.recompute_stats(Some(P)).await;
        assert!(db.backend.summary(P, Direction::Reverse).await.unwrap().is_none());
        assert_eq!(db.estimated_cost(P, Direction::Reverse, 1).await, None);
    }

    #[tokio::test]
    async fn test_estimated_cost_reads_through() {
        let db = db_with(StatsConfig::default()).await;
        for n in 1..=4 {
            db.record_sample(P, Direction::Forward, n, Measurement::Measured(2 + 2 * u64::from(n)))
                .await;
        }
        db.recompute_stats(Some(P)).await;

        // cost(n) = 2 + 2n
        assert_eq!(db.estimated_cost(P, Direction::Forward, 2).await, Some(6));
        // second read is served from the cache
        assert_eq!(db.estimated_cost(P, Direction::Forward, 3).await, Some(8));
        // unknown key stays a sentinel, not an error
        assert_eq!(db.estimated_cost("http://example.org/q", Direction::Forward, 1).await, None);
    }

    #[tokio::test]
    async fn test_clear_samples_resets_counter() {
        let db = db_with(StatsConfig::default()).await;
        db.record_sample(P, Direction::Forward, 1, Measurement::Measured(5)).await;
        assert_eq!(db.sample_count().await, 1);
        db.clear_samples().await;
        assert_eq!(db.sample_count().await, 0);
    }
}
