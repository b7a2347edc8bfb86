//! HTTP request handlers.

use crate::assist::{self, EnrichGoal, EnrichResult, PromptContext, PromptResult};
use crate::db::{
    self, ActivityEntry, Book, BookElement, BookStatus, Chapter, ElementKind, Image, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::events::BookEventKind;
use crate::export::{self, ExportFormat};
use crate::layout::{ImageLayout, TextWrap};
use crate::server::AppState;
use crate::toc::TocItem;
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, Response},
};
use serde::{Deserialize, Serialize};

/// Build a response, returning 500 on error (which shouldn't happen).
fn build_response(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal error"))
                .unwrap_or_default()
        })
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

async fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<db::User> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state
        .auth
        .validate_token(&token)?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// Fetch a book scoped to the caller. Someone else's book is a 404.
fn get_owned_book(state: &AppState, id: &str, owner_id: &str) -> Result<Book> {
    state
        .db
        .get_book(id, owner_id)?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
}

// ============================================================================
// WEB PAGES
// ============================================================================

/// Index page (simple HTML).
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 2rem auto; padding: 0 1rem; }}
        h1 {{ color: #333; }}
        code {{ background: #e8e8e8; padding: 0.2rem 0.4rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <p>Book writing server. All functionality is under <code>/api</code>.</p>
    <ul>
        <li><code>POST /api/auth/register</code>, <code>POST /api/auth/login</code></li>
        <li><code>GET /api/books</code>, <code>GET /api/books/:id/toc</code></li>
        <li><code>GET /api/books/:id/export?format=epub|pdf|docx|html|json</code></li>
    </ul>
</body>
</html>"#,
        title = state.config.server.title,
    );

    Html(html)
}

// ============================================================================
// AUTH
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_id: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: db::User,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

pub async fn auth_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<db::User>)> {
    let user = state.auth.register(&req.username, &req.password)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = state
        .auth
        .login(&req.username, &req.password, req.device_id)?;

    Ok(Json(LoginResponse { token, user }))
}

pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<db::User>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct ProfileRequest {
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_path: Option<String>,
}

pub async fn auth_update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<db::User>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let updated = state.auth.update_profile(
        &user.id,
        req.display_name.as_deref(),
        req.first_name.as_deref(),
        req.last_name.as_deref(),
        req.bio.as_deref(),
        req.avatar_path.as_deref(),
    )?;
    Ok(Json(updated))
}

// ============================================================================
// BOOKS
// ============================================================================

#[derive(Deserialize)]
pub struct BookRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<BookStatus>,
}

pub async fn book_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Book>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.db.list_books(&user.id)?))
}

pub async fn book_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<Book>)> {
    let user = get_authenticated_user(&state, &headers).await?;

    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let now = now_timestamp();
    let book = Book {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: user.id,
        title: req.title.trim().to_string(),
        description: req.description,
        status: req.status.unwrap_or(BookStatus::Draft),
        created_at: now,
        updated_at: now,
    };
    state.db.create_book(&book)?;

    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn book_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Book>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(get_owned_book(&state, &id, &user.id)?))
}

pub async fn book_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<BookRequest>,
) -> Result<Json<Book>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let book = get_owned_book(&state, &id, &user.id)?;

    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    state.db.update_book(
        &id,
        &user.id,
        req.title.trim(),
        req.description.as_deref(),
        req.status.unwrap_or(book.status),
    )?;
    state.events.publish(&id, BookEventKind::BookChanged);

    Ok(Json(get_owned_book(&state, &id, &user.id)?))
}

pub async fn book_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &id, &user.id)?;

    // Collect storage paths before the rows cascade away.
    let images = state.db.list_book_images(&id)?;

    state.db.delete_book(&id, &user.id)?;
    for image in images {
        state.storage.remove(&image.storage_path);
    }
    state.toc.evict(&id);

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// CHAPTERS
// ============================================================================

#[derive(Deserialize)]
pub struct ChapterRequest {
    pub title: String,
    pub content: Option<String>,
}

pub async fn chapter_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<Chapter>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;
    Ok(Json(state.db.list_chapters(&book_id)?))
}

pub async fn chapter_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Json(req): Json<ChapterRequest>,
) -> Result<(StatusCode, Json<Chapter>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;

    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let now = now_timestamp();
    let chapter = Chapter {
        id: uuid::Uuid::new_v4().to_string(),
        book_id: book_id.clone(),
        author_id: user.id,
        title: req.title.trim().to_string(),
        content: req.content,
        order_index: state.db.next_chapter_order(&book_id)?,
        created_at: now,
        updated_at: now,
    };
    state.db.create_chapter(&chapter)?;
    state.db.touch_book(&book_id)?;
    state.events.publish(&book_id, BookEventKind::ChaptersChanged);

    Ok((StatusCode::CREATED, Json(chapter)))
}

pub async fn chapter_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Chapter>> {
    let user = get_authenticated_user(&state, &headers).await?;
    state
        .db
        .get_chapter(&id, &user.id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Chapter not found".to_string()))
}

pub async fn chapter_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ChapterRequest>,
) -> Result<Json<Chapter>> {
    let user = get_authenticated_user(&state, &headers).await?;

    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    if !state
        .db
        .update_chapter(&id, &user.id, req.title.trim(), req.content.as_deref())?
    {
        return Err(AppError::NotFound("Chapter not found".to_string()));
    }

    let chapter = state
        .db
        .get_chapter(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Chapter not found".to_string()))?;
    state.db.touch_book(&chapter.book_id)?;
    state
        .events
        .publish(&chapter.book_id, BookEventKind::ChaptersChanged);

    Ok(Json(chapter))
}

pub async fn chapter_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;

    let chapter = state
        .db
        .get_chapter(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Chapter not found".to_string()))?;

    state.db.delete_chapter(&id, &user.id)?;
    state.db.touch_book(&chapter.book_id)?;
    state
        .events
        .publish(&chapter.book_id, BookEventKind::ChaptersChanged);

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    /// Chapter ids in the desired order.
    pub chapter_ids: Vec<String>,
}

pub async fn chapter_reorder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<Chapter>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;

    if req.chapter_ids.is_empty() {
        return Err(AppError::Validation("No chapter ids given".to_string()));
    }

    state.db.reorder_chapters(&book_id, &req.chapter_ids)?;
    state.db.touch_book(&book_id)?;
    state.events.publish(&book_id, BookEventKind::ChaptersChanged);

    Ok(Json(state.db.list_chapters(&book_id)?))
}

// ============================================================================
// ELEMENTS
// ============================================================================

#[derive(Deserialize)]
pub struct ElementCreateRequest {
    pub kind: ElementKind,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ElementUpdateRequest {
    pub title: String,
    pub content: Option<String>,
    pub enabled: bool,
    pub order_index: i64,
}

pub async fn element_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<BookElement>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;
    Ok(Json(state.db.list_elements(&book_id)?))
}

pub async fn element_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Json(req): Json<ElementCreateRequest>,
) -> Result<(StatusCode, Json<BookElement>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;

    let element = BookElement {
        id: uuid::Uuid::new_v4().to_string(),
        book_id: book_id.clone(),
        kind: req.kind,
        title: req
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| req.kind.default_title().to_string()),
        content: req.content,
        order_index: state.db.next_element_order(&book_id)?,
        enabled: true,
    };
    state.db.create_element(&element)?;
    state.db.touch_book(&book_id)?;
    state.events.publish(&book_id, BookEventKind::ElementsChanged);

    Ok((StatusCode::CREATED, Json(element)))
}

pub async fn element_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ElementUpdateRequest>,
) -> Result<Json<BookElement>> {
    let user = get_authenticated_user(&state, &headers).await?;

    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    if !state.db.update_element(
        &id,
        &user.id,
        req.title.trim(),
        req.content.as_deref(),
        req.enabled,
        req.order_index,
    )? {
        return Err(AppError::NotFound("Element not found".to_string()));
    }

    let element = state
        .db
        .get_element(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Element not found".to_string()))?;
    state.db.touch_book(&element.book_id)?;
    state
        .events
        .publish(&element.book_id, BookEventKind::ElementsChanged);

    Ok(Json(element))
}

pub async fn element_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;

    let element = state
        .db
        .get_element(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Element not found".to_string()))?;

    state.db.delete_element(&id, &user.id)?;
    state.db.touch_book(&element.book_id)?;
    state
        .events
        .publish(&element.book_id, BookEventKind::ElementsChanged);

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// IMAGES
// ============================================================================

#[derive(Deserialize)]
pub struct ImageUploadQuery {
    /// Place the image in a chapter rather than at book level.
    pub chapter_id: Option<String>,
    pub alt_text: Option<String>,
}

pub async fn image_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<Image>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;
    Ok(Json(state.db.list_book_images(&book_id)?))
}

pub async fn image_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Query(query): Query<ImageUploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Image>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;

    if let Some(ref chapter_id) = query.chapter_id {
        let chapter = state
            .db
            .get_chapter(chapter_id, &user.id)?
            .ok_or_else(|| AppError::NotFound("Chapter not found".to_string()))?;
        if chapter.book_id != book_id {
            return Err(AppError::Validation(
                "Chapter belongs to another book".to_string(),
            ));
        }
    }

    let image_id = uuid::Uuid::new_v4().to_string();
    let scope_id = query.chapter_id.as_deref().unwrap_or(&book_id);
    let stored = state
        .storage
        .store_image(&user.id, scope_id, &image_id, &body)?;

    let image = Image {
        id: image_id,
        owner_id: user.id,
        book_id: Some(book_id.clone()),
        chapter_id: query.chapter_id,
        storage_path: stored.relative_path.clone(),
        alt_text: query.alt_text,
        file_size: Some(stored.file_size),
        mime_type: Some(stored.mime_type),
        position_x: 0.0,
        position_y: 0.0,
        scale: 1.0,
        z_index: 0,
        layout: ImageLayout::default(),
        text_wrap: TextWrap::default(),
        created_at: now_timestamp(),
    };

    // Compensating delete: an upload without a row would be orphaned.
    if let Err(e) = state.db.create_image(&image) {
        state.storage.remove(&stored.relative_path);
        return Err(e);
    }

    state.events.publish(&book_id, BookEventKind::ImagesChanged);
    Ok((StatusCode::CREATED, Json(image)))
}

pub async fn image_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response> {
    let user = get_authenticated_user(&state, &headers).await?;
    let image = state
        .db
        .get_image(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

    let bytes = state.storage.read(&image.storage_path)?;
    let content_type = image
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(build_response(StatusCode::OK, &content_type, bytes))
}

#[derive(Deserialize)]
pub struct PositionRequest {
    pub position_x: f64,
    pub position_y: f64,
}

/// Position is written once per drag, on release.
pub async fn image_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PositionRequest>,
) -> Result<Json<Image>> {
    let user = get_authenticated_user(&state, &headers).await?;

    if !state
        .db
        .update_image_position(&id, &user.id, req.position_x, req.position_y)?
    {
        return Err(AppError::NotFound("Image not found".to_string()));
    }

    let image = state
        .db
        .get_image(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    if let Some(ref book_id) = image.book_id {
        state.events.publish(book_id, BookEventKind::ImagesChanged);
    }

    Ok(Json(image))
}

#[derive(Deserialize)]
pub struct LayoutRequest {
    pub scale: f64,
    pub z_index: i64,
    pub layout: ImageLayout,
    pub text_wrap: TextWrap,
    pub alt_text: Option<String>,
}

pub async fn image_layout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<LayoutRequest>,
) -> Result<Json<Image>> {
    let user = get_authenticated_user(&state, &headers).await?;

    if req.scale <= 0.0 {
        return Err(AppError::Validation("Scale must be positive".to_string()));
    }

    if !state.db.update_image_layout(
        &id,
        &user.id,
        req.scale,
        req.z_index,
        req.layout,
        req.text_wrap,
        req.alt_text.as_deref(),
    )? {
        return Err(AppError::NotFound("Image not found".to_string()));
    }

    let image = state
        .db
        .get_image(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    if let Some(ref book_id) = image.book_id {
        state.events.publish(book_id, BookEventKind::ImagesChanged);
    }

    Ok(Json(image))
}

pub async fn image_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Image>> {
    let user = get_authenticated_user(&state, &headers).await?;

    if !state.db.reset_image_layout(&id, &user.id)? {
        return Err(AppError::NotFound("Image not found".to_string()));
    }

    let image = state
        .db
        .get_image(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    if let Some(ref book_id) = image.book_id {
        state.events.publish(book_id, BookEventKind::ImagesChanged);
    }

    Ok(Json(image))
}

pub async fn image_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;

    let image = state
        .db
        .get_image(&id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

    state.db.delete_image(&id, &user.id)?;
    state.storage.remove(&image.storage_path);
    if let Some(ref book_id) = image.book_id {
        state.events.publish(book_id, BookEventKind::ImagesChanged);
    }

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// COVERS
// ============================================================================

#[derive(Deserialize)]
pub struct CoverRequest {
    pub image_id: String,
}

pub async fn cover_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Json(req): Json<CoverRequest>,
) -> Result<Json<db::BookCover>> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;

    // The cover image must exist and be the caller's.
    state
        .db
        .get_image(&req.image_id, &user.id)?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

    state.db.set_book_cover(&book_id, &req.image_id)?;
    state.db.touch_book(&book_id)?;
    state.events.publish(&book_id, BookEventKind::BookChanged);

    state
        .db
        .get_book_cover(&book_id)?
        .map(Json)
        .ok_or_else(|| AppError::Internal("Cover row missing after insert".to_string()))
}

pub async fn cover_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<db::BookCover>> {
    let user = get_authenticated_user(&state, &headers).await?;
    get_owned_book(&state, &book_id, &user.id)?;

    state
        .db
        .get_book_cover(&book_id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Book has no cover".to_string()))
}

// ============================================================================
// TABLE OF CONTENTS
// ============================================================================

pub async fn toc_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<TocItem>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let book = get_owned_book(&state, &book_id, &user.id)?;
    Ok(Json(state.toc.compute(&book)?))
}

// ============================================================================
// WRITING ASSIST
// ============================================================================

#[derive(Deserialize)]
pub struct EnrichRequest {
    pub text: String,
    pub goal: EnrichGoal,
    pub book_id: Option<String>,
    pub chapter_id: Option<String>,
}

pub async fn ai_enrich(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EnrichRequest>,
) -> Result<Json<EnrichResult>> {
    let user = get_authenticated_user(&state, &headers).await?;

    let result = assist::enrich_text(&req.text, req.goal)?;
    assist::audit(
        &state.db,
        &user.id,
        req.book_id.as_deref(),
        req.chapter_id.as_deref(),
        req.goal.as_str(),
        &req.text,
        &result.enriched_text,
    )?;

    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct PromptRequest {
    pub text: String,
    #[serde(default)]
    pub context: PromptContext,
    pub book_id: Option<String>,
    pub chapter_id: Option<String>,
}

pub async fn ai_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PromptRequest>,
) -> Result<Json<PromptResult>> {
    let user = get_authenticated_user(&state, &headers).await?;

    let result = assist::build_prompt(&req.text, &req.context)?;
    assist::audit(
        &state.db,
        &user.id,
        req.book_id.as_deref(),
        req.chapter_id.as_deref(),
        "prompt",
        &req.text,
        &result.prompt,
    )?;

    Ok(Json(result))
}

// ============================================================================
// EXPORT
// ============================================================================

#[derive(Deserialize)]
pub struct ExportQuery {
    pub format: String,
    /// Inclusive order_index range bounds.
    pub from: Option<i64>,
    pub to: Option<i64>,
}

pub async fn book_export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let user = get_authenticated_user(&state, &headers).await?;
    let book = get_owned_book(&state, &book_id, &user.id)?;

    let format = ExportFormat::parse(&query.format)
        .ok_or_else(|| AppError::Validation(format!("Unsupported format '{}'", query.format)))?;

    let chapters = match (query.from, query.to) {
        (None, None) => state.db.list_chapters(&book_id)?,
        (from, to) => state.db.list_chapters_in_range(
            &book_id,
            from.unwrap_or(0),
            to.unwrap_or(i64::MAX),
        )?,
    };

    let output = export::generate(&book, &user.author_name(), &chapters, format)?;

    state.db.log_activity(&ActivityEntry {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        book_id: Some(book_id.clone()),
        action: "export".to_string(),
        detail: Some(format.extension().to_string()),
        created_at: now_timestamp(),
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, output.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", output.filename),
        )
        .body(Body::from(output.bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

// ============================================================================
// ACTIVITY
// ============================================================================

pub async fn activity_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActivityEntry>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.db.list_activity(&user.id)?))
}
