// HTTP API end to end over an in-memory router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use storymint::app_state::AppState;
use storymint::config::MarketConfig;
use storymint::record_store_sled::SledRecordStore;
use storymint::security::USER_HEADER;
use storymint::wallet_rpc::JsonRpcBridge;
use storymint::web::build_router;

fn test_router() -> Router {
    let config = MarketConfig::default();
    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let bridge = Arc::new(JsonRpcBridge::from_config(&config.wallet).unwrap());
    build_router(Arc::new(AppState::new(config, store, bridge)))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(USER_HEADER, user);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Creates category "Fantasy" and a story with a free and a paid chapter.
async fn seed(app: &Router) -> String {
    let (status, _) = send(app, "POST", "/api/categories", Some("author"), Some(json!({ "name": "Fantasy" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, story) = send(
        app,
        "POST",
        "/api/stories",
        Some("author"),
        Some(json!({
            "title": "The Salt Road",
            "description": "A caravan crosses the dry sea",
            "category": "Fantasy",
            "price_per_chapter": "0.001"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let story_id = story["id"].as_str().unwrap().to_string();

    for (title, free) in [("Departure", true), ("The Dunes", false)] {
        let (status, _) = send(
            app,
            "POST",
            &format!("/api/stories/{story_id}/chapters"),
            Some("author"),
            Some(json!({ "title": title, "content": format!("{title} text"), "is_free": free })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    story_id
}

#[tokio::test]
async fn health_check_responds() {
    let app = test_router();
    let (status, body) = send(&app, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn writes_require_a_user() {
    let app = test_router();
    let (status, _) = send(&app, "POST", "/api/categories", None, Some(json!({ "name": "Fantasy" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_category_is_not_found() {
    let app = test_router();
    let (status, body) = send(
        &app,
        "POST",
        "/api/stories",
        Some("author"),
        Some(json!({
            "title": "Curtain Call",
            "description": "",
            "category": "Drama",
            "price_per_chapter": "0.001"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["category"], "CategoryNotFound");

    let (_, stories) = send(&app, "GET", "/api/stories", None, None).await;
    assert_eq!(stories.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn chapter_listing_gates_content() {
    let app = test_router();
    let story_id = seed(&app).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/stories/{story_id}/chapters?expand=all"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["story"]["total_chapters"], 2);

    let chapters = body["chapters"].as_array().unwrap();
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0]["chapter_number"], 1);
    assert_eq!(chapters[0]["unlocked"], true);
    assert_eq!(chapters[0]["content"], "Departure text");
    assert_eq!(chapters[1]["unlocked"], false);
    assert_eq!(chapters[1]["expanded"], true);
    assert!(chapters[1]["content"].is_null());
}

#[tokio::test]
async fn only_the_author_adds_chapters() {
    let app = test_router();
    let story_id = seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/stories/{story_id}/chapters"),
        Some("someone-else"),
        Some(json!({ "title": "Hijack", "content": "..." })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["category"], "NotStoryAuthor");
}

#[tokio::test]
async fn missing_story_is_not_found() {
    let app = test_router();
    let (status, body) = send(&app, "GET", "/api/stories/999/chapters", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["category"], "StoryNotFound");
}

#[tokio::test]
async fn purchases_start_empty() {
    let app = test_router();
    let story_id = seed(&app).await;

    let uri = format!("/api/stories/{story_id}/purchases");
    let (status, _) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", &uri, Some("reader"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}
