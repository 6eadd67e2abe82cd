//! # fedopt-server: HTTP Planning and Statistics Service
//!
//! This binary exposes the federated query planner as a network service, so
//! that query front ends can delegate ordering decisions and feed resolution
//! samples back without linking the planner in-process.
//!
//! ## Endpoints
//!
//! - `GET  /health`           - Health check
//! - `POST /registry`         - Declare federation capabilities
//! - `POST /plan`             - Order a pattern set (greedy or exhaustive)
//! - `POST /plans/enumerate`  - All resolvable orderings of a pattern set
//! - `POST /stats/samples`    - Record one resolution sample
//! - `POST /stats/recompute`  - Refit summary statistics
//! - `GET  /stats/estimate`   - Estimated cost for a predicate/direction
//! - `POST /stats/clear`      - Administrative reset
//!
//! ## Configuration
//!
//! The server listens on `0.0.0.0:3000` unless `FEDOPT_ADDR` says otherwise.
//! Statistics live in memory unless `FEDOPT_STATS_ENDPOINT` names a SPARQL
//! endpoint to persist through. Logging is controlled by the `RUST_LOG`
//! environment variable (defaults to `fedopt=debug`).

mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fedopt=debug".parse().unwrap()),
        )
        .init();

    let state = Arc::new(state::AppState::new().await);

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/registry", post(routes::register_capabilities))
        .route("/plan", post(routes::plan))
        .route("/plans/enumerate", post(routes::enumerate_plans))
        .route("/stats/samples", post(routes::record_sample))
        .route("/stats/recompute", post(routes::recompute_stats))
        .route("/stats/estimate", get(routes::estimate))
        .route("/stats/clear", post(routes::clear_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("FEDOPT_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("fedopt-server listening on http://{addr}");
    axum::serve(listener, app).await.unwrap();
}
