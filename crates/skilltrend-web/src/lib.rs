//! Read-only JSON API over the skill statistics.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use skilltrend_core::analytics::projection_cutoff;
use skilltrend_core::{AppConfig, Clock, SystemClock, Taxonomy};
use skilltrend_store::{JobStore, PgStore};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub const CRATE_NAME: &str = "skilltrend-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub taxonomy: Arc<Taxonomy>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, taxonomy: Taxonomy) -> Self {
        Self {
            store,
            taxonomy: Arc::new(taxonomy),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    status: &'static str,
    data: T,
}

fn success<T: Serialize>(data: T) -> Response {
    Json(Envelope {
        status: "success",
        data,
    })
    .into_response()
}

fn server_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "detail": err.to_string() })),
    )
        .into_response()
}

fn bad_request(detail: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "detail": detail })),
    )
        .into_response()
}

fn respond<T: Serialize, E: std::fmt::Display>(result: Result<T, E>) -> Response {
    match result {
        Ok(data) => success(data),
        Err(err) => server_error(err),
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/skills/statistics", get(statistics_handler))
        .route("/api/skills/categories", get(categories_handler))
        .route("/api/skills/category/{category}", get(category_skills_handler))
        .route("/api/skills/growth", get(category_growth_handler))
        .route("/api/skills/growth/skill/{skill}", get(skill_growth_handler))
        .route("/api/skills/percentage/{skill}", get(skill_share_handler))
        .route("/api/skills/projection", get(projection_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving skill statistics");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Connects to Postgres and serves on the configured port.
pub async fn serve_from_config(config: &AppConfig) -> anyhow::Result<()> {
    let taxonomy = config.load_taxonomy().context("loading taxonomy")?;
    let store = PgStore::from_config(config)
        .await
        .context("connecting to database")?;
    serve(AppState::new(Arc::new(store), taxonomy), config.web_port).await
}

#[derive(Debug, Default, Deserialize)]
struct CategoryFilter {
    category: Option<String>,
}

impl CategoryFilter {
    fn category(&self) -> Option<&str> {
        self.category.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

async fn statistics_handler(State(state): State<Arc<AppState>>) -> Response {
    respond(state.store.skill_statistics().await)
}

async fn categories_handler(State(state): State<Arc<AppState>>) -> Response {
    success(state.taxonomy.category_names())
}

async fn category_skills_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Response {
    respond(state.store.skills_by_category(&category).await)
}

async fn category_growth_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CategoryFilter>,
) -> Response {
    let Some(category) = filter.category() else {
        return bad_request("category query parameter is required");
    };
    respond(state.store.category_growth(category).await)
}

async fn skill_growth_handler(
    State(state): State<Arc<AppState>>,
    Path(skill): Path<String>,
) -> Response {
    respond(state.store.skill_growth(&skill).await)
}

async fn skill_share_handler(
    State(state): State<Arc<AppState>>,
    Path(skill): Path<String>,
) -> Response {
    respond(state.store.skill_share(&skill).await)
}

async fn projection_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CategoryFilter>,
) -> Response {
    let since = projection_cutoff(state.clock.now().date_naive());
    respond(state.store.projected_growth(filter.category(), since).await)
}
