//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth_register))
        .route("/login", post(handlers::auth_login))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me))
        .route("/password", put(handlers::auth_change_password));

    let user_routes = Router::new().route(
        "/profile",
        get(handlers::profile_get).put(handlers::profile_update),
    );

    let author_routes = Router::new()
        .route("/", get(handlers::authors_list).post(handlers::author_create))
        .route("/{id}", get(handlers::author_get).put(handlers::author_update))
        .route("/{id}/books", get(handlers::author_books));

    let upload_limit = DefaultBodyLimit::max(state.files.body_limit());

    let book_routes = Router::new()
        .route("/", get(handlers::books_list).post(handlers::book_create))
        .route("/search", get(handlers::books_search))
        .route(
            "/{id}",
            get(handlers::book_get)
                .put(handlers::book_update)
                .delete(handlers::book_delete),
        )
        .route(
            "/{id}/file",
            get(handlers::book_download)
                .post(handlers::book_upload_file)
                .layer(upload_limit.clone()),
        )
        .route(
            "/{id}/cover",
            get(handlers::book_cover)
                .post(handlers::book_upload_cover)
                .layer(upload_limit),
        )
        .route("/{id}/thumbnail", get(handlers::book_thumbnail))
        .route("/{id}/start-reading", post(handlers::reading_start))
        .route(
            "/{id}/progress",
            get(handlers::reading_get)
                .put(handlers::reading_update)
                .delete(handlers::reading_reset),
        )
        .route("/{id}/stats", get(handlers::book_stats));

    let reading_routes = Router::new()
        .route("/current", get(handlers::reading_current))
        .route("/history", get(handlers::reading_history));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/authors", author_routes)
        .nest("/books", book_routes)
        .nest("/reading", reading_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
