use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use docseek_core::config::EngineConfig;
use docseek_core::{RawDocument, SearchIndex};
use docseek_server::{router, AppState};
use http_body_util::BodyExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "secret";

fn tiny_index() -> SearchIndex {
    let mut index = SearchIndex::new();
    index.add_documents(vec![
        RawDocument::new("Geralt of Rivia", "geralt hunts monsters"),
        RawDocument::new("Witcher Lore", "geralt geralt geralt geralt rides"),
        RawDocument::new("Kaer Morhen", "keep in the mountains"),
    ]);
    index
}

fn app_with(config: EngineConfig) -> Router {
    router(AppState {
        index: Arc::new(RwLock::new(tiny_index())),
        config: Arc::new(config),
        admin_token: Some(TOKEN.to_string()),
    })
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-ADMIN-TOKEN", TOKEN)
        .header("content-type", "application/json");
    match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn search_returns_ranked_results_with_snippets() {
    let app = app_with(EngineConfig::default());
    let (status, json) = send(&app, get("/search?q=geralt&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    let hits = json["results"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["id"], 0);
    assert_eq!(hits[1]["id"], 1);
    assert_eq!(hits[0]["title"], "Geralt of Rivia");
    assert_eq!(hits[0]["snippet"], "geralt hunts monsters");
    assert_eq!(hits[0]["highlights"], serde_json::json!([0]));
    assert!(json["took_s"].as_f64().is_some());

    let (_, json) = send(&app, get("/search?q=geralt&field=content")).await;
    assert_eq!(json["results"][0]["id"], 1);
}

#[tokio::test]
async fn total_hits_counts_only_matching_documents() {
    let app = app_with(EngineConfig::default());
    let (_, json) = send(&app, get("/search?q=mountains")).await;
    assert_eq!(json["total_hits"], 1);
    assert_eq!(json["results"][0]["id"], 2);

    let (_, json) = send(&app, get("/search?q=dragon")).await;
    assert_eq!(json["total_hits"], 0);
}

#[tokio::test]
async fn boolean_and_doc_endpoints() {
    let app = app_with(EngineConfig::default());
    let (status, json) = send(&app, get("/boolean?q=geralt%20AND%20NOT%20ride&field=content")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<u64> = json["results"].as_array().unwrap().iter().map(|h| h["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![0]);
    assert!(json["results"][0].get("score").is_none());

    let (status, json) = send(&app, get("/doc/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Kaer Morhen");

    let (status, _) = send(&app, get("/doc/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = app_with(EngineConfig::default());
    let req = Request::post("/docs")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"title": "Ciri", "content": "elder blood"}"#))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mutations_are_visible_to_the_next_search() {
    let app = app_with(EngineConfig::default());

    let docs = serde_json::json!([{"title": "Ciri", "content": "elder blood"}, {"title": "Yennefer", "content": "sorceress"}]);
    let (status, json) = send(&app, admin("POST", "/docs", Some(docs))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ids"], serde_json::json!([3, 4]));

    let (_, json) = send(&app, get("/search?q=blood")).await;
    assert_eq!(json["results"][0]["id"], 3);

    let update = serde_json::json!({"title": "Ciri", "content": "lady of space and time"});
    let (status, _) = send(&app, admin("PUT", "/docs/3", Some(update))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send(&app, get("/boolean?q=blood")).await;
    assert_eq!(json["total_hits"], 0);

    let (status, _) = send(&app, admin("DELETE", "/docs/3", None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/doc/3")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, admin("DELETE", "/docs/3", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, admin("PUT", "/docs/3", Some(serde_json::json!({"title": "x"})))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn save_writes_the_configured_index() {
    let dir = tempdir().unwrap();
    let config = EngineConfig { index_path: dir.path().join("index.json"), ..EngineConfig::default() };
    let app = app_with(config);
    let (status, json) = send(&app, admin("POST", "/index/save", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["documents"], 3);
    assert!(dir.path().join("index.json").is_file());
}
