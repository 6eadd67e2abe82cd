//! # Statistics Backing Store
//!
//! The statistics database persists samples and summary stats through the
//! `StatsBackend` trait, which captures the logical schema as typed
//! operations. The trait is deliberately narrow: everything the statistics
//! database needs can be expressed as parametrized inserts, filtered selects,
//! one COUNT, and one "timestamp at rank K" probe -- so a remote SPARQL store,
//! a SQL database, or an in-memory map can all serve as backends.
//!
//! `MemStatsBackend` is the in-process implementation used by tests and by
//! deployments that do not share statistics across processes. The
//! SPARQL-backed implementation lives in the endpoint crate, next to the
//! client it is built on.

use crate::stats::{Sample, SummaryStat};
use crate::term::Direction;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Failure talking to the backing statistics store.
///
/// These errors are always recovered locally: statistics collection must
/// never abort query planning or execution.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("statistics store unreachable: {0}")]
    Unreachable(String),
    /// The store answered, but with rows the schema does not allow.
    #[error("malformed row in statistics store: {0}")]
    MalformedRow(String),
}

/// Typed operations over the persisted sample/summary schema.
#[async_trait]
pub trait StatsBackend: Send + Sync {
    async fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError>;

    async fn count_samples(&self) -> Result<u64, StoreError>;

    /// All samples for one (predicate, direction).
    async fn samples(
        &self,
        predicate: &str,
        direction: Direction,
    ) -> Result<Vec<Sample>, StoreError>;

    /// Distinct predicates that have at least one sample, in either direction.
    async fn predicates_with_samples(&self) -> Result<Vec<String>, StoreError>;

    /// Timestamp of the `rank`-th oldest sample (0-based), or `None` when the
    /// store holds fewer than `rank + 1` samples.
    async fn timestamp_at_rank(&self, rank: u64) -> Result<Option<i64>, StoreError>;

    /// Delete every sample with `timestamp_ms <= cutoff_ms`.
    async fn purge_samples_through(&self, cutoff_ms: i64) -> Result<(), StoreError>;

    /// Overwrite the summary stat for the sample's (predicate, direction).
    async fn put_summary(&self, summary: &SummaryStat) -> Result<(), StoreError>;

    async fn summary(
        &self,
        predicate: &str,
        direction: Direction,
    ) -> Result<Option<SummaryStat>, StoreError>;

    async fn clear_samples(&self) -> Result<(), StoreError>;

    async fn clear_summaries(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemState {
    samples: Vec<Sample>,
    summaries: HashMap<(String, Direction), SummaryStat>,
}

/// In-memory statistics backend.
#[derive(Debug, Default)]
pub struct MemStatsBackend {
    state: RwLock<MemState>,
}

impl MemStatsBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsBackend for MemStatsBackend {
    async fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        self.state.write().await.samples.push(sample.clone());
        Ok(())
    }

    async fn count_samples(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.samples.len() as u64)
    }

    async fn samples(
        &self,
        predicate: &str,
        direction: Direction,
    ) -> Result<Vec<Sample>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .samples
            .iter()
            .filter(|s| s.predicate == predicate && s.direction == direction)
            .cloned()
            .collect())
    }

    async fn predicates_with_samples(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let mut predicates: Vec<String> = state.samples.iter().map(|s| s.predicate.clone()).collect();
        predicates.sort();
        predicates.dedup();
        Ok(predicates)
    }

    async fn timestamp_at_rank(&self, rank: u64) -> Result<Option<i64>, StoreError> {
        let state = self.state.read().await;
        let mut timestamps: Vec<i64> = state.samples.iter().map(|s| s.timestamp_ms).collect();
        timestamps.sort_unstable();
        Ok(timestamps.get(rank as usize).copied())
    }

    async fn purge_samples_through(&self, cutoff_ms: i64) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .samples
            .retain(|s| s.timestamp_ms > cutoff_ms);
        Ok(())
    }

    async fn put_summary(&self, summary: &SummaryStat) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .summaries
            .insert((summary.predicate.clone(), summary.direction), summary.clone());
        Ok(())
    }

    async fn summary(
        &self,
        predicate: &str,
        direction: Direction,
    ) -> Result<Option<SummaryStat>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .summaries
            .get(&(predicate.to_string(), direction))
            .cloned())
    }

    async fn clear_samples(&self) -> Result<(), StoreError> {
        self.state.write().await.samples.clear();
        Ok(())
    }

    async fn clear_summaries(&self) -> Result<(), StoreError> {
        self.state.write().await.summaries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Measurement;

    fn sample(predicate: &str, timestamp_ms: i64) -> Sample {
        Sample {
            predicate: predicate.into(),
            direction: Direction::Forward,
            num_inputs: 1,
            response_time: Measurement::Measured(10),
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn test_timestamp_at_rank_is_oldest_first() {
        let backend = MemStatsBackend::new();
        for ts in [30, 10, 20] {
            backend.insert_sample(&sample("http://x/p", ts)).await.unwrap();
        }
        assert_eq!(backend.timestamp_at_rank(0).await.unwrap(), Some(10));
        assert_eq!(backend.timestamp_at_rank(2).await.unwrap(), Some(30));
        assert_eq!(backend.timestamp_at_rank(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_through_cutoff() {
        let backend = MemStatsBackend::new();
        for ts in 1..=5 {
            backend.insert_sample(&sample("http://x/p", ts)).await.unwrap();
        }
        backend.purge_samples_through(3).await.unwrap();
        assert_eq!(backend.count_samples().await.unwrap(), 2);
    }
}
