//! HTTP request handlers.

use crate::auth::{Identity, NewAccount, Session, authorize};
use crate::catalog::{BookDraft, BookPage, BookPatch, PageRequest};
use crate::config::BookFormat;
use crate::db::{self, Author, Book, BookReadingStats, User};
use crate::error::{AppError, Result};
use crate::reading::{ProgressUpdate, ProgressView, ReadingPage};
use crate::server::AppState;
use crate::validate;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::io::ReaderStream;

/// Build a response, returning 500 on error (which shouldn't happen).
fn build_response(content_type: &str, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body.into())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal error"))
                .unwrap_or_default()
        })
}

/// Health check.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// AUTH HANDLERS
// ============================================================================

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    is_author: bool,
}

/// Login request; `username` may also be an email address.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// Token response.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_at: i64,
    user: User,
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    let user = state.auth.register(NewAccount {
        username: req.username,
        email: req.email,
        password: req.password,
        first_name: req.first_name,
        last_name: req.last_name,
        bio: req.bio,
        is_author: req.is_author,
    })?;

    let issued = state.auth.issue_token(&user, db::now_timestamp())?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token: issued.token,
            token_type: "bearer",
            expires_at: issued.claims.exp,
            user,
        }),
    ))
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let (user, issued) = state
        .auth
        .login(&req.username, &req.password, db::now_timestamp())?;

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer",
        expires_at: issued.claims.exp,
        user,
    }))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let session = get_session(&state, &headers)?;
    state.auth.logout(&session.claims)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user with author profile, if any.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    user: User,
    author: Option<Author>,
}

/// Get current user info.
pub async fn auth_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>> {
    let identity = get_identity(&state, &headers)?;
    let user = load_user(&state, &identity)?;
    let author = state.db.get_author_by_user(&user.id)?;
    Ok(Json(MeResponse { user, author }))
}

/// Password change request.
#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    current_password: String,
    new_password: String,
}

/// Change own password.
pub async fn auth_change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<StatusCode> {
    let identity = get_identity(&state, &headers)?;
    state
        .auth
        .change_password(&identity.user_id, &req.current_password, &req.new_password)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// PROFILE HANDLERS
// ============================================================================

/// Profile update request.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

/// Get own profile.
pub async fn profile_get(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>> {
    let identity = get_identity(&state, &headers)?;
    Ok(Json(load_user(&state, &identity)?))
}

/// Update own profile.
pub async fn profile_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<User>> {
    let identity = get_identity(&state, &headers)?;
    let mut user = load_user(&state, &identity)?;

    if let Some(first_name) = req.first_name {
        user.first_name = Some(limit_len(first_name, 100, "First name")?);
    }
    if let Some(last_name) = req.last_name {
        user.last_name = Some(limit_len(last_name, 100, "Last name")?);
    }
    if let Some(bio) = req.bio {
        user.bio = Some(bio);
    }
    user.updated_at = db::now_timestamp();

    state.db.update_user_profile(&user)?;
    Ok(Json(user))
}

// ============================================================================
// AUTHOR HANDLERS
// ============================================================================

/// Pagination query.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

impl PageQuery {
    fn page(&self) -> PageRequest {
        PageRequest {
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Author listing.
#[derive(Debug, Serialize)]
pub struct AuthorPage {
    authors: Vec<Author>,
    total_count: i64,
    skip: i64,
    limit: i64,
    has_more: bool,
}

/// List authors.
pub async fn authors_list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<AuthorPage>> {
    let (skip, limit) = query.page().normalized();
    let (authors, total_count) = state.db.list_authors(skip, limit)?;
    let has_more = skip + (authors.len() as i64) < total_count;

    Ok(Json(AuthorPage {
        authors,
        total_count,
        skip,
        limit,
        has_more,
    }))
}

/// Become-an-author request.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorCreateRequest {
    #[serde(default)]
    pen_name: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

/// Create an author profile for the requester.
pub async fn author_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AuthorCreateRequest>,
) -> Result<(StatusCode, Json<Author>)> {
    let identity = get_identity(&state, &headers)?;
    let author = state
        .auth
        .become_author(&identity.user_id, req.pen_name, req.bio)?;
    Ok((StatusCode::CREATED, Json(author)))
}

/// Get an author.
pub async fn author_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Author>> {
    let author = state
        .db
        .get_author(&id)?
        .ok_or_else(|| AppError::NotFound("Author not found".to_string()))?;
    Ok(Json(author))
}

/// Author update request.
#[derive(Debug, Deserialize)]
pub struct AuthorUpdateRequest {
    #[serde(default)]
    pen_name: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    social_links: Option<BTreeMap<String, String>>,
}

/// Update an author profile (owner or admin).
pub async fn author_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AuthorUpdateRequest>,
) -> Result<Json<Author>> {
    let identity = get_identity(&state, &headers)?;
    let existing = state.db.get_author(&id)?;
    let mut author = authorize(&identity, existing.as_ref(), "Author")?.clone();

    if let Some(pen_name) = req.pen_name {
        validate::pen_name(&pen_name)?;
        author.pen_name = pen_name.trim().to_string();
    }
    if let Some(bio) = req.bio {
        author.bio = Some(bio);
    }
    if let Some(url) = req.profile_image_url {
        author.profile_image_url = Some(limit_len(url, 500, "Profile image URL")?);
    }
    if let Some(links) = req.social_links {
        author.social_links = links;
    }
    author.updated_at = db::now_timestamp();

    state.db.update_author(&author)?;
    tracing::info!(author_id = %author.id, "Author updated");
    Ok(Json(author))
}

/// Books of an author.
pub async fn author_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<BookPage>> {
    let identity = optional_identity(&state, &headers)?;
    let page = state
        .catalog
        .author_books(identity.as_ref(), &id, query.page())?;
    Ok(Json(page))
}

// ============================================================================
// BOOK HANDLERS
// ============================================================================

/// Book listing query.
#[derive(Debug, Deserialize)]
pub struct BookListQuery {
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

/// List published books.
pub async fn books_list(
    State(state): State<AppState>,
    Query(query): Query<BookListQuery>,
) -> Result<Json<BookPage>> {
    let page = PageRequest {
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(state.catalog.list(query.genre, query.author_id, page)?))
}

/// Search query.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

/// Search published books.
pub async fn books_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<BookPage>> {
    let page = PageRequest {
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(state.catalog.search(&query.q, query.genre, page)?))
}

/// Create a book.
pub async fn book_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<BookDraft>,
) -> Result<(StatusCode, Json<Book>)> {
    let identity = get_identity(&state, &headers)?;
    let book = state.catalog.create(&identity, draft)?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Book metadata.
pub async fn book_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Book>> {
    let identity = optional_identity(&state, &headers)?;
    Ok(Json(state.catalog.get(identity.as_ref(), &id)?))
}

/// Update a book.
pub async fn book_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<BookPatch>,
) -> Result<Json<Book>> {
    let identity = get_identity(&state, &headers)?;
    Ok(Json(state.catalog.update(&identity, &id, patch)?))
}

/// Delete a book and its files.
pub async fn book_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let identity = get_identity(&state, &headers)?;
    let book = state.catalog.delete(&identity, &id)?;
    state.files.remove_book_files(&book);
    Ok(StatusCode::NO_CONTENT)
}

/// Upload the book file (multipart field `file`).
pub async fn book_upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Book>> {
    let identity = get_identity(&state, &headers)?;
    let book = state.catalog.get_owned(&identity, &id)?;

    let (filename, data) = read_field(multipart, "file").await?;
    let stored = state.files.save_book_file(&book.id, &filename, &data)?;

    Ok(Json(state.catalog.attach_file(&identity, &book.id, &stored)?))
}

/// Download the book file.
pub async fn book_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let identity = optional_identity(&state, &headers)?;
    let book = state.catalog.get(identity.as_ref(), &id)?;

    let (Some(path), Some(format)) = (
        book.file_path.as_ref(),
        book.file_type.as_deref().and_then(BookFormat::from_extension),
    ) else {
        return Err(AppError::NotFound("Book has no file".to_string()));
    };

    let file = tokio::fs::File::open(path).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let filename = format!(
        "{}.{}",
        validate::sanitize_filename(&book.title),
        format.extension()
    );
    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.mime_type())
        .header(header::CONTENT_DISPOSITION, content_disposition);
    if let Some(size) = book.file_size {
        response = response.header(header::CONTENT_LENGTH, size);
    }

    Ok(response.body(body).unwrap_or_else(|_| Response::default()))
}

/// Upload a cover image (multipart field `cover`).
pub async fn book_upload_cover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Book>> {
    let identity = get_identity(&state, &headers)?;
    let book = state.catalog.get_owned(&identity, &id)?;

    let (_, data) = read_field(multipart, "cover").await?;
    let path = state.files.save_cover(&book.id, &data)?;

    Ok(Json(state.catalog.attach_cover(
        &identity,
        &book.id,
        &path.to_string_lossy(),
    )?))
}

/// Book cover image.
pub async fn book_cover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let identity = optional_identity(&state, &headers)?;
    let book = state.catalog.get(identity.as_ref(), &id)?;

    let (data, mime) = state
        .files
        .cover(&book)?
        .ok_or_else(|| AppError::NotFound("Book has no cover".to_string()))?;

    Ok(build_response(mime, data))
}

/// Book thumbnail image.
pub async fn book_thumbnail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let identity = optional_identity(&state, &headers)?;
    let book = state.catalog.get(identity.as_ref(), &id)?;

    let data = state
        .files
        .thumbnail(&book)?
        .ok_or_else(|| AppError::NotFound("Book has no cover".to_string()))?;

    Ok(build_response("image/png", data))
}

/// Reader statistics for a book.
pub async fn book_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookReadingStats>> {
    let identity = optional_identity(&state, &headers)?;
    Ok(Json(state.reading.book_stats(identity.as_ref(), &id)?))
}

// ============================================================================
// READING HANDLERS
// ============================================================================

/// Start reading a book.
pub async fn reading_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ProgressView>)> {
    let identity = get_identity(&state, &headers)?;
    let (progress, created) = state.reading.start_reading(&identity, &id)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(progress)))
}

/// Get reading progress.
pub async fn reading_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ProgressView>> {
    let identity = get_identity(&state, &headers)?;
    Ok(Json(state.reading.get_progress(&identity, &id)?))
}

/// Update reading progress.
pub async fn reading_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<ProgressView>> {
    let identity = get_identity(&state, &headers)?;
    Ok(Json(state.reading.update_progress(&identity, &id, update)?))
}

/// Reset reading progress.
pub async fn reading_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let identity = get_identity(&state, &headers)?;
    state.reading.reset_progress(&identity, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Books in progress.
pub async fn reading_current(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ReadingPage>> {
    let identity = get_identity(&state, &headers)?;
    Ok(Json(state.reading.currently_reading(&identity, query.page())?))
}

/// Finished books.
pub async fn reading_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ReadingPage>> {
    let identity = get_identity(&state, &headers)?;
    Ok(Json(state.reading.history(&identity, query.page())?))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

/// Verify the bearer token.
fn get_session(state: &AppState, headers: &HeaderMap) -> Result<Session> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state.auth.verify_token(&token, db::now_timestamp())
}

/// Get the authenticated requester.
fn get_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity> {
    get_session(state, headers).map(|session| session.identity)
}

/// Requester if a token was presented. A bad token is still an error.
fn optional_identity(state: &AppState, headers: &HeaderMap) -> Result<Option<Identity>> {
    if headers.contains_key(header::AUTHORIZATION) {
        get_identity(state, headers).map(Some)
    } else {
        Ok(None)
    }
}

fn load_user(state: &AppState, identity: &Identity) -> Result<User> {
    state
        .db
        .get_user_by_id(&identity.user_id)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn limit_len(value: String, max: usize, what: &str) -> Result<String> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            what, max
        )));
    }
    Ok(value)
}

/// Read one named multipart field, returning its filename and bytes.
async fn read_field(mut multipart: Multipart, name: &str) -> Result<(String, Vec<u8>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(name) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok((filename, data.to_vec()));
    }

    Err(AppError::Validation(format!(
        "Missing multipart field '{}'",
        name
    )))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}
