//! # HTTP Route Handlers
//!
//! JSON endpoints over the planning and statistics core. Structural problems
//! (bad pattern shapes, unresolvable queries) map to 400 with a message;
//! statistics-path failures never surface here because the core swallows
//! them by design.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use fedopt_core::bindings::QueryState;
use fedopt_core::enumerate::PlanEnumerator;
use fedopt_core::plan::{PlanError, QueryPlan};
use fedopt_core::reorder::{planner_for, PlanStrategy, PlannedQuery};
use fedopt_core::stats::Measurement;
use fedopt_core::term::{Direction, GraphPattern, Term, TriplePattern};

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_string() })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// POST /registry — declare federation capabilities.
pub async fn register_capabilities(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistryRequest>,
) -> impl IntoResponse {
    let declared = request.resolvable.len()
        + request.inverse_pairs.len()
        + request.equivalence_classes.len();

    state.registry.update(|registry| {
        for predicate in &request.resolvable {
            registry.add_resolvable(predicate);
        }
        for pair in &request.inverse_pairs {
            registry.add_inverse_pair(&pair.predicate, &pair.inverse);
        }
        for class in &request.equivalence_classes {
            let members: Vec<&str> = class.iter().map(String::as_str).collect();
            registry.declare_equivalent(&members);
        }
    });

    Json(serde_json::json!({ "status": "ok", "declared": declared }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRequest {
    #[serde(default)]
    pub resolvable: Vec<String>,
    #[serde(default)]
    pub inverse_pairs: Vec<InversePair>,
    #[serde(default)]
    pub equivalence_classes: Vec<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InversePair {
    pub predicate: String,
    pub inverse: String,
}

/// POST /plan — order a pattern set for execution.
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlannedQuery>, (StatusCode, String)> {
    let strategy = request.strategy.unwrap_or(state.config.strategy);
    let planner = planner_for(strategy, state.stats.clone(), state.registry.clone());

    let query = GraphPattern::basic(request.patterns);
    let query_state = query_state_from(request.bindings);

    let planned = planner
        .plan(&query, &query_state)
        .await
        .map_err(plan_error_response)?;
    Ok(Json(planned))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub patterns: Vec<TriplePattern>,
    pub strategy: Option<PlanStrategy>,
    /// Variables already bound by the caller, with their known values.
    #[serde(default)]
    pub bindings: HashMap<String, Vec<Term>>,
}

/// POST /plans/enumerate — all resolvable orderings of a pattern set.
pub async fn enumerate_plans(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnumerateRequest>,
) -> Result<Json<EnumerateResponse>, (StatusCode, String)> {
    let enumerator = PlanEnumerator::new(state.registry.clone());
    let plans = enumerator
        .enumerate(&GraphPattern::basic(request.patterns))
        .map_err(plan_error_response)?;

    // sort for a reproducible response body
    let mut plans: Vec<QueryPlan> = plans.into_iter().collect();
    plans.sort();

    Ok(Json(EnumerateResponse { count: plans.len(), plans }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerateRequest {
    pub patterns: Vec<TriplePattern>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerateResponse {
    pub count: usize,
    pub plans: Vec<QueryPlan>,
}

/// POST /stats/samples — record one resolution sample.
pub async fn record_sample(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SampleRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let measurement = match (request.truncated, request.response_time_ms) {
        (true, _) => Measurement::Truncated,
        (false, Some(ms)) => Measurement::Measured(ms),
        (false, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "either responseTimeMs or truncated is required".to_string(),
            ))
        }
    };

    state
        .stats
        .record_sample(&request.predicate, request.direction, request.num_inputs, measurement)
        .await;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRequest {
    pub predicate: String,
    pub direction: Direction,
    pub num_inputs: u32,
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub truncated: bool,
}

/// POST /stats/recompute — refit summary stats.
pub async fn recompute_stats(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecomputeRequest>,
) -> impl IntoResponse {
    state.stats.recompute_stats(request.predicate.as_deref()).await;
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeRequest {
    pub predicate: Option<String>,
}

/// GET /stats/estimate — estimated cost for one (predicate, direction).
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EstimateParams>,
) -> impl IntoResponse {
    let cost = state
        .stats
        .estimated_cost(&params.predicate, params.direction, params.num_inputs)
        .await;
    Json(EstimateResponse { cost })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateParams {
    pub predicate: String,
    pub direction: Direction,
    #[serde(default)]
    pub num_inputs: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResponse {
    /// `null` when no statistics exist for the key.
    pub cost: Option<u64>,
}

/// POST /stats/clear — administrative reset.
pub async fn clear_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.stats.clear().await;
    Json(serde_json::json!({ "status": "ok" }))
}

fn plan_error_response(error: PlanError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, error.to_string())
}

fn query_state_from(bindings: HashMap<String, Vec<Term>>) -> QueryState {
    let mut state = QueryState::new();
    for (var, values) in bindings {
        state.bind_values(var, values);
    }
    state
}
