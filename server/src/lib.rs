use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use docseek_core::config::EngineConfig;
use docseek_core::persist;
use docseek_core::{DocId, Document, FieldType, IndexError, PositionMap, RawDocument, SearchIndex, SearchMode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on `k` for ranked queries.
pub const MAX_K: usize = 100;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
    #[serde(default)]
    pub field: FieldType,
    #[serde(default)]
    pub phrase: bool,
    pub proximity: Option<usize>,
    /// Snippet window in tokens; 0 disables snippets.
    pub window: Option<usize>,
}

#[derive(Deserialize)]
pub struct BooleanParams {
    pub q: String,
    #[serde(default)]
    pub field: FieldType,
    pub window: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_lang: Option<String>,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: DocId,
    /// Absent for boolean queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub title: String,
    pub lang: Option<String>,
    pub snippet: Option<String>,
    pub snippet_html: Option<String>,
    pub highlights: Vec<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum DocsPayload {
    One(RawDocument),
    Many(Vec<RawDocument>),
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<RwLock<SearchIndex>>,
    pub config: Arc<EngineConfig>,
    pub admin_token: Option<String>,
}

/// Loads (or creates) the configured index and builds the router.
pub fn build_app_from_config(config: EngineConfig) -> anyhow::Result<Router> {
    let index = persist::load_or_create(&config)?;
    Ok(build_app(config, index))
}

pub fn build_app(config: EngineConfig, index: SearchIndex) -> Router {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState { index: Arc::new(RwLock::new(index)), config: Arc::new(config), admin_token };
    router(state)
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/boolean", get(boolean_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/docs", post(add_docs))
        .route("/docs/:doc_id", put(update_doc).delete(delete_doc))
        .route("/index/save", post(save_index))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn internal(e: IndexError) -> ApiError {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn hit(index: &SearchIndex, id: DocId, score: Option<f32>, positions: &PositionMap, window: usize) -> Option<SearchHit> {
    let doc = index.get(id)?;
    let snippet = if window > 0 { index.snippet(id, positions, window) } else { None };
    Some(SearchHit {
        id,
        score,
        title: doc.title.clone(),
        lang: doc.lang.clone(),
        snippet_html: snippet.as_ref().map(|s| s.marked("<em>", "</em>")),
        highlights: snippet.as_ref().map(|s| s.highlights.clone()).unwrap_or_default(),
        snippet: snippet.map(|s| s.text),
    })
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let mode = match (params.phrase, params.proximity) {
        (true, _) => SearchMode::Phrase,
        (false, Some(n)) if n > 0 => SearchMode::Proximity(n),
        _ => SearchMode::Plain,
    };
    let k = params.k.unwrap_or(state.config.default_k).clamp(1, MAX_K);
    let window = params.window.unwrap_or(state.config.snippet_window);

    let index = state.index.read();
    let ranked = index.search_ranked(&params.q, index.len(), params.field, mode).map_err(internal)?;
    // documents sharing no term with the query still get a (zero) score
    let total_hits = ranked.scores.iter().filter(|&&s| s > 0.0).count();
    let results = ranked
        .iter()
        .take(k)
        .filter_map(|(id, score)| hit(&index, id, Some(score), &ranked.positions, window))
        .collect();
    let query_lang = index.detect_query_language(&params.q);

    let elapsed = start.elapsed();
    tracing::info!(q = %params.q, field = %params.field, ?mode, total_hits, took_ms = elapsed.as_millis() as u64, "search");
    Ok(Json(SearchResponse { query: params.q, query_lang, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn boolean_handler(State(state): State<AppState>, Query(params): Query<BooleanParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let window = params.window.unwrap_or(state.config.snippet_window);

    let index = state.index.read();
    let matches = index.search_boolean(&params.q, params.field);
    let results = matches
        .doc_ids
        .iter()
        .filter_map(|&id| hit(&index, id, None, &matches.positions, window))
        .collect();

    let elapsed = start.elapsed();
    tracing::info!(q = %params.q, field = %params.field, total_hits = matches.doc_ids.len(), "boolean search");
    Json(SearchResponse {
        query: params.q,
        query_lang: None,
        took_s: elapsed.as_secs_f64(),
        total_hits: matches.doc_ids.len(),
        results,
    })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    match state.index.read().get(doc_id) {
        Some(doc) => Ok(Json(doc.clone())),
        None => {
            tracing::warn!(doc_id, "document not found");
            Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found")))
        }
    }
}

// --- Admin endpoints ---
async fn add_docs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DocsPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let raws = match payload {
        DocsPayload::One(raw) => vec![raw],
        DocsPayload::Many(raws) => raws,
    };
    let ids = state.index.write().add_documents(raws);
    Ok(Json(serde_json::json!({ "ids": ids })))
}

async fn update_doc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
    Json(raw): Json<RawDocument>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    match state.index.write().update_document(doc_id, raw) {
        Ok(()) => Ok(Json(serde_json::json!({ "id": doc_id }))),
        Err(IndexError::DocumentNotFound(id)) => Err((StatusCode::NOT_FOUND, format!("document {id} not found"))),
        Err(e) => Err(internal(e)),
    }
}

async fn delete_doc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    if state.index.write().remove_documents(&[doc_id]).is_empty() {
        return Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found")));
    }
    Ok(Json(serde_json::json!({ "removed": doc_id })))
}

async fn save_index(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let index = state.index.read();
    persist::save_index(&state.config, &index).map_err(internal)?;
    Ok(Json(serde_json::json!({
        "path": state.config.index_path.display().to_string(),
        "documents": index.len(),
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
