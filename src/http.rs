use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path as AxPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::models::SearchResult;
use crate::search::SearchService;

pub struct AppState {
    settings: Settings,
    services: HashMap<String, Arc<SearchService>>,
    ready: AtomicBool,
}

/// Builds a `SearchService` for every configured engine up front so the
/// search routes never pay model-load latency on the request path.
pub async fn build_state(settings: Settings) -> anyhow::Result<Arc<AppState>> {
    let mut services = HashMap::new();
    for tag in settings.engines.keys() {
        let service = SearchService::new(&settings, tag).await?;
        services.insert(tag.clone(), Arc::new(service));
    }

    Ok(Arc::new(AppState {
        settings,
        services,
        ready: AtomicBool::new(true),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search/:engine", post(search_engine))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(flatten)]
    models: HashMap<String, String>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.ready.load(Ordering::Relaxed) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"status": "initializing"}))).into_response();
    }

    let models = state
        .settings
        .engines
        .iter()
        .map(|(tag, cfg)| (format!("{tag}_model"), cfg.model_name.clone()))
        .collect();

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            models,
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    source_filter: Option<String>,
    min_time: Option<f64>,
}

fn default_limit() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
}

async fn search_engine(
    AxPath(engine): AxPath<String>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    if req.query.trim().is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({"error": "query must not be empty"}))).into_response();
    }
    if !(1..=100).contains(&req.limit) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": "limit must be between 1 and 100"})),
        )
            .into_response();
    }

    let Some(service) = state.services.get(&engine) else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": format!("unknown engine '{engine}'")}))).into_response();
    };

    match service.execute_query(&req.query, req.source_filter.as_deref(), req.limit, req.min_time).await {
        Ok(results) => (
            StatusCode::OK,
            Json(SearchResponse {
                query: req.query,
                results,
            }),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()}))).into_response(),
    }
}
