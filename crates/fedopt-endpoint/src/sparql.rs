//! # Query Templating and the SPARQL Statistics Backend
//!
//! The statistics database needs parametrized SELECT/INSERT/DELETE/CLEAR, a
//! COUNT aggregate, and an "order by timestamp, offset K, limit 1" probe.
//! Query text is produced by filling placeholder templates:
//!
//! - `%u%` -- an IRI, angle-bracketed and validated,
//! - `%s%` -- a string literal, quoted and escaped,
//! - `%v%` -- a verbatim token (numbers, booleans).
//!
//! `SparqlStatsBackend` implements the statistics backing store over any
//! `Endpoint`, persisting samples and summary stats in two named graphs.
//! Truncated measurements are stored as a `-1` sentinel -- the wire schema
//! keeps a reserved value so that foreign consumers need no union type, but
//! it is mapped back to the tagged `Measurement` at the boundary.

use crate::endpoint::{Endpoint, Row};
use async_trait::async_trait;
use fedopt_core::stats::{Measurement, Sample, SummaryStat};
use fedopt_core::store::{StatsBackend, StoreError};
use fedopt_core::term::Direction;
use std::sync::Arc;

/// Property IRIs of the persisted sample/summary schema.
///
/// The statement templates below embed these IRIs literally (templates are
/// compile-time constants); keep the two in sync.
pub mod vocab {
    pub const PREDICATE: &str = "http://fedopt.io/ns/stats#predicate";
    pub const DIRECTION_IS_FORWARD: &str = "http://fedopt.io/ns/stats#directionIsForward";
    pub const NUM_INPUTS: &str = "http://fedopt.io/ns/stats#numInputs";
    pub const RESPONSE_TIME: &str = "http://fedopt.io/ns/stats#responseTimeMs";
    pub const TIMESTAMP: &str = "http://fedopt.io/ns/stats#timestampMs";
    pub const BASE_TIME: &str = "http://fedopt.io/ns/stats#baseTimeMs";
    pub const TIME_PER_INPUT: &str = "http://fedopt.io/ns/stats#timePerInputMs";
    pub const SAMPLE_COUNT: &str = "http://fedopt.io/ns/stats#sampleCount";

    /// Stored in place of a response time when the measurement was capped by
    /// a results limit.
    pub const TRUNCATED_SENTINEL: i64 = -1;
}

pub const DEFAULT_SAMPLES_GRAPH: &str = "http://fedopt.io/stats/samples";
pub const DEFAULT_SUMMARY_GRAPH: &str = "http://fedopt.io/stats/summary";

/// Fill `%u%` / `%s%` / `%v%` placeholders with the given arguments in order.
pub fn str_from_template(template: &str, args: &[&str]) -> Result<String, StoreError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut next_arg = 0usize;

    while let Some(start) = rest.find('%') {
        let Some(kind) = rest[start + 1..].chars().next() else {
            return Err(StoreError::MalformedRow("dangling % in template".into()));
        };
        let close = start + 1 + kind.len_utf8();
        if !rest[close..].starts_with('%') {
            return Err(StoreError::MalformedRow(format!(
                "unterminated placeholder in template: {template}"
            )));
        }

        let arg = args.get(next_arg).ok_or_else(|| {
            StoreError::MalformedRow(format!("template expects more than {next_arg} argument(s)"))
        })?;
        next_arg += 1;

        out.push_str(&rest[..start]);
        match kind {
            'u' => {
                if arg.contains(['<', '>', ' ']) {
                    return Err(StoreError::MalformedRow(format!("invalid IRI: {arg}")));
                }
                out.push('<');
                out.push_str(arg);
                out.push('>');
            }
            's' => {
                out.push('"');
                out.push_str(&arg.replace('\\', "\\\\").replace('"', "\\\""));
                out.push('"');
            }
            'v' => out.push_str(arg),
            other => {
                return Err(StoreError::MalformedRow(format!(
                    "unknown placeholder %{other}% in template"
                )))
            }
        }
        rest = &rest[close + 1..];
    }

    if next_arg != args.len() {
        return Err(StoreError::MalformedRow(format!(
            "template consumed {next_arg} of {} argument(s)",
            args.len()
        )));
    }

    out.push_str(rest);
    Ok(out)
}

const INSERT_SAMPLE: &str = "INSERT DATA { GRAPH %u% { \
     [] <http://fedopt.io/ns/stats#predicate> %u% ; \
        <http://fedopt.io/ns/stats#directionIsForward> %v% ; \
        <http://fedopt.io/ns/stats#numInputs> %v% ; \
        <http://fedopt.io/ns/stats#responseTimeMs> %v% ; \
        <http://fedopt.io/ns/stats#timestampMs> %v% } }";

const COUNT_SAMPLES: &str = "SELECT (COUNT(?s) AS ?count) FROM %u% \
     WHERE { ?s <http://fedopt.io/ns/stats#timestampMs> ?timestamp }";

const SAMPLES_BY_PREDICATE: &str = "SELECT ?numInputs ?responseTime ?timestamp FROM %u% \
     WHERE { ?s <http://fedopt.io/ns/stats#predicate> %u% ; \
                <http://fedopt.io/ns/stats#directionIsForward> %v% ; \
                <http://fedopt.io/ns/stats#numInputs> ?numInputs ; \
                <http://fedopt.io/ns/stats#responseTimeMs> ?responseTime ; \
                <http://fedopt.io/ns/stats#timestampMs> ?timestamp }";

const PREDICATES_WITH_SAMPLES: &str = "SELECT DISTINCT ?predicate FROM %u% \
     WHERE { ?s <http://fedopt.io/ns/stats#predicate> ?predicate }";

const TIMESTAMP_AT_RANK: &str = "SELECT ?timestamp FROM %u% \
     WHERE { ?s <http://fedopt.io/ns/stats#timestampMs> ?timestamp } \
     ORDER BY ?timestamp OFFSET %v% LIMIT 1";

const PURGE_SAMPLES_THROUGH: &str = "WITH %u% DELETE { ?s ?p ?o } \
     WHERE { ?s ?p ?o . ?s <http://fedopt.io/ns/stats#timestampMs> ?timestamp . \
             FILTER (?timestamp <= %v%) }";

const DELETE_SUMMARY: &str = "WITH %u% DELETE { ?s ?p ?o } \
     WHERE { ?s ?p ?o . ?s <http://fedopt.io/ns/stats#predicate> %u% ; \
                           <http://fedopt.io/ns/stats#directionIsForward> %v% }";

const INSERT_SUMMARY: &str = "INSERT DATA { GRAPH %u% { \
     [] <http://fedopt.io/ns/stats#predicate> %u% ; \
        <http://fedopt.io/ns/stats#directionIsForward> %v% ; \
        <http://fedopt.io/ns/stats#baseTimeMs> %v% ; \
        <http://fedopt.io/ns/stats#timePerInputMs> %v% ; \
        <http://fedopt.io/ns/stats#sampleCount> %v% } }";

const GET_SUMMARY: &str = "SELECT ?baseTime ?timePerInput ?sampleCount FROM %u% \
     WHERE { ?s <http://fedopt.io/ns/stats#predicate> %u% ; \
                <http://fedopt.io/ns/stats#directionIsForward> %v% ; \
                <http://fedopt.io/ns/stats#baseTimeMs> ?baseTime ; \
                <http://fedopt.io/ns/stats#timePerInputMs> ?timePerInput ; \
                <http://fedopt.io/ns/stats#sampleCount> ?sampleCount }";

const CLEAR_GRAPH: &str = "CLEAR GRAPH %u%";

fn direction_flag(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "true",
        Direction::Reverse => "false",
    }
}

fn parse_field<T: std::str::FromStr>(row: &Row, field: &str) -> Result<T, StoreError> {
    row.get(field)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| StoreError::MalformedRow(format!("missing or non-numeric ?{field}")))
}

/// Statistics backing store persisted in two named graphs of a SPARQL
/// endpoint.
pub struct SparqlStatsBackend {
    endpoint: Arc<dyn Endpoint>,
    samples_graph: String,
    summary_graph: String,
}

impl SparqlStatsBackend {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self::with_graphs(endpoint, DEFAULT_SAMPLES_GRAPH, DEFAULT_SUMMARY_GRAPH)
    }

    pub fn with_graphs(
        endpoint: Arc<dyn Endpoint>,
        samples_graph: impl Into<String>,
        summary_graph: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            samples_graph: samples_graph.into(),
            summary_graph: summary_graph.into(),
        }
    }

    async fn select(&self, query: String) -> Result<Vec<Row>, StoreError> {
        self.endpoint
            .select(&query)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    async fn update(&self, statement: String) -> Result<(), StoreError> {
        self.endpoint
            .update(&statement)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }
}

#[async_trait]
impl StatsBackend for SparqlStatsBackend {
    async fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        let response_time = match sample.response_time {
            Measurement::Measured(ms) => ms as i64,
            Measurement::Truncated => vocab::TRUNCATED_SENTINEL,
        };
        let statement = str_from_template(
            INSERT_SAMPLE,
            &[
                &self.samples_graph,
                &sample.predicate,
                direction_flag(sample.direction),
                &sample.num_inputs.to_string(),
                &response_time.to_string(),
                &sample.timestamp_ms.to_string(),
            ],
        )?;
        self.update(statement).await
    }

    async fn count_samples(&self) -> Result<u64, StoreError> {
        let query = str_from_template(COUNT_SAMPLES, &[&self.samples_graph])?;
        let rows = self.select(query).await?;
        // a COUNT query always has one row, even over an empty graph
        let row = rows
            .first()
            .ok_or_else(|| StoreError::MalformedRow("COUNT query returned no rows".into()))?;
        parse_field(row, "count")
    }

    async fn samples(
        &self,
        predicate: &str,
        direction: Direction,
    ) -> Result<Vec<Sample>, StoreError> {
        let query = str_from_template(
            SAMPLES_BY_PREDICATE,
            &[&self.samples_graph, predicate, direction_flag(direction)],
        )?;
        let rows = self.select(query).await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            let response_time: i64 = parse_field(row, "responseTime")?;
            samples.push(Sample {
                predicate: predicate.to_string(),
                direction,
                num_inputs: parse_field(row, "numInputs")?,
                response_time: if response_time == vocab::TRUNCATED_SENTINEL {
                    Measurement::Truncated
                } else {
                    Measurement::Measured(response_time.max(0) as u64)
                },
                timestamp_ms: parse_field(row, "timestamp")?,
            });
        }
        Ok(samples)
    }

    async fn predicates_with_samples(&self) -> Result<Vec<String>, StoreError> {
        let query = str_from_template(PREDICATES_WITH_SAMPLES, &[&self.samples_graph])?;
        let rows = self.select(query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("predicate").cloned())
            .collect())
    }

    async fn timestamp_at_rank(&self, rank: u64) -> Result<Option<i64>, StoreError> {
        let query = str_from_template(
            TIMESTAMP_AT_RANK,
            &[&self.samples_graph, &rank.to_string()],
        )?;
        let rows = self.select(query).await?;
        match rows.first() {
            Some(row) => Ok(Some(parse_field(row, "timestamp")?)),
            None => Ok(None),
        }
    }

    async fn purge_samples_through(&self, cutoff_ms: i64) -> Result<(), StoreError> {
        let statement = str_from_template(
            PURGE_SAMPLES_THROUGH,
            &[&self.samples_graph, &cutoff_ms.to_string()],
        )?;
        self.update(statement).await
    }

    async fn put_summary(&self, summary: &SummaryStat) -> Result<(), StoreError> {
        // delete any existing entry before inserting the new values
        let delete = str_from_template(
            DELETE_SUMMARY,
            &[
                &self.summary_graph,
                &summary.predicate,
                direction_flag(summary.direction),
            ],
        )?;
        self.update(delete).await?;

        let insert = str_from_template(
            INSERT_SUMMARY,
            &[
                &self.summary_graph,
                &summary.predicate,
                direction_flag(summary.direction),
                &summary.base_time_ms.to_string(),
                &summary.time_per_input_ms.to_string(),
                &summary.sample_count.to_string(),
            ],
        )?;
        self.update(insert).await
    }

    async fn summary(
        &self,
        predicate: &str,
        direction: Direction,
    ) -> Result<Option<SummaryStat>, StoreError> {
        let query = str_from_template(
            GET_SUMMARY,
            &[&self.summary_graph, predicate, direction_flag(direction)],
        )?;
        let rows = self.select(query).await?;
        match rows.first() {
            Some(row) => Ok(Some(SummaryStat {
                predicate: predicate.to_string(),
                direction,
                base_time_ms: parse_field(row, "baseTime")?,
                time_per_input_ms: parse_field(row, "timePerInput")?,
                sample_count: parse_field(row, "sampleCount")?,
            })),
            None => Ok(None),
        }
    }

    async fn clear_samples(&self) -> Result<(), StoreError> {
        let statement = str_from_template(CLEAR_GRAPH, &[&self.samples_graph])?;
        self.update(statement).await
    }

    async fn clear_summaries(&self) -> Result<(), StoreError> {
        let statement = str_from_template(CLEAR_GRAPH, &[&self.summary_graph])?;
        self.update(statement).await
    }
}
