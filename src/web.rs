use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{
    access::ChapterIdSet,
    api_errors::AppError,
    app_state::AppState,
    chapter_view::{ChapterView, Notification},
    errors::MarketError,
    security::{CurrentUser, MaybeUser},
    story::{Category, Chapter, NewChapter, NewStory, PurchaseRecord, Story},
};

#[derive(Debug, Default, Deserialize)]
pub struct ChapterQuery {
    /// Comma-separated chapter ids to expand, or `all`.
    #[serde(default)]
    pub expand: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChapterListResponse {
    pub story: Story,
    pub chapters: Vec<ChapterView>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
pub struct NewCategoryRequest {
    pub name: String,
}

/// Reader and author API. Purchasing goes through the CLI, which owns a wallet.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/stories", get(list_stories).post(create_story))
        .route(
            "/api/stories/{story_id}/chapters",
            get(list_chapters).post(add_chapter),
        )
        .route("/api/stories/{story_id}/purchases", get(list_purchases))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_categories(
    State(st): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(st.authoring.list_categories().await?))
}

async fn create_category(
    State(st): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Json(req): Json<NewCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = st.authoring.create_category(&req.name).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn list_stories(State(st): State<Arc<AppState>>) -> Result<Json<Vec<Story>>, AppError> {
    Ok(Json(st.store.list_stories().await?))
}

async fn create_story(
    State(st): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewStory>,
) -> Result<(StatusCode, Json<Story>), AppError> {
    let story = st.authoring.create_story(req, &user.user_id).await?;
    Ok((StatusCode::CREATED, Json(story)))
}

async fn add_chapter(
    State(st): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewChapter>,
) -> Result<(StatusCode, Json<Chapter>), AppError> {
    let chapter = st.authoring.add_chapter(&story_id, req, &user.user_id).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

async fn list_chapters(
    State(st): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    MaybeUser(session): MaybeUser,
    Query(query): Query<ChapterQuery>,
) -> Result<Json<ChapterListResponse>, AppError> {
    let view = st.chapter_view(&story_id, session);
    view.refresh_chapters().await?;
    view.refresh_purchases().await?;

    match query.expand.as_deref().map(str::trim) {
        Some("all") => {
            for chapter in view.chapters()? {
                view.toggle_expanded(&chapter.id)?;
            }
        }
        Some(ids) => {
            let ids: ChapterIdSet = ids.split(',').map(str::trim).filter(|id| !id.is_empty()).collect();
            for id in ids.iter() {
                view.toggle_expanded(id)?;
            }
        }
        None => {}
    }

    let story = view
        .story()?
        .ok_or_else(|| MarketError::story_not_found(&story_id))?;

    Ok(Json(ChapterListResponse {
        story,
        chapters: view.render()?,
        notifications: view.drain_notifications()?,
    }))
}

async fn list_purchases(
    State(st): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<PurchaseRecord>>, AppError> {
    Ok(Json(st.store.list_purchases(&user.user_id, &story_id).await?))
}
