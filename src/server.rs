//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth_register))
        .route("/login", post(handlers::auth_login))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me))
        .route("/me", put(handlers::auth_update_profile));

    let book_routes = Router::new()
        .route("/", get(handlers::book_list))
        .route("/", post(handlers::book_create))
        .route("/{id}", get(handlers::book_get))
        .route("/{id}", put(handlers::book_update))
        .route("/{id}", delete(handlers::book_delete))
        .route("/{id}/chapters", get(handlers::chapter_list))
        .route("/{id}/chapters", post(handlers::chapter_create))
        .route("/{id}/chapters/reorder", put(handlers::chapter_reorder))
        .route("/{id}/elements", get(handlers::element_list))
        .route("/{id}/elements", post(handlers::element_create))
        .route("/{id}/images", get(handlers::image_list))
        .route("/{id}/images", post(handlers::image_upload))
        .route("/{id}/cover", get(handlers::cover_get))
        .route("/{id}/cover", put(handlers::cover_set))
        .route("/{id}/toc", get(handlers::toc_get))
        .route("/{id}/export", get(handlers::book_export));

    let chapter_routes = Router::new()
        .route("/{id}", get(handlers::chapter_get))
        .route("/{id}", put(handlers::chapter_update))
        .route("/{id}", delete(handlers::chapter_delete));

    let element_routes = Router::new()
        .route("/{id}", put(handlers::element_update))
        .route("/{id}", delete(handlers::element_delete));

    let image_routes = Router::new()
        .route("/{id}/file", get(handlers::image_file))
        .route("/{id}/position", put(handlers::image_position))
        .route("/{id}/layout", put(handlers::image_layout))
        .route("/{id}/reset", post(handlers::image_reset))
        .route("/{id}", delete(handlers::image_delete));

    let ai_routes = Router::new()
        .route("/enrich", post(handlers::ai_enrich))
        .route("/prompt", post(handlers::ai_prompt));

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api/auth", auth_routes)
        .nest("/api/books", book_routes)
        .nest("/api/chapters", chapter_routes)
        .nest("/api/elements", element_routes)
        .nest("/api/images", image_routes)
        .nest("/api/ai", ai_routes)
        .route("/api/activity", get(handlers::activity_list))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
