//! Integration tests for the HTTP API
//!
//! Requests are driven through tower::ServiceExt::oneshot() against an
//! in-memory database, without binding a socket.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use shelf_rs::config::Config;
use shelf_rs::db::Database;
use shelf_rs::server::{AppState, create_router};
use tempfile::TempDir;
use tower::ServiceExt;

const PASSWORD: &str = "Str0ng!pass";

/// Create a router over a fresh database, with uploads in a temp directory
fn test_app(temp_dir: &TempDir) -> Router {
    let mut config = Config::default();
    config.uploads.dir = temp_dir.path().join("uploads");

    let state = AppState::new(&config, Database::open_memory().unwrap(), b"test-secret");
    state.files.ensure_dirs().unwrap();
    create_router(state)
}

/// Send a request and decode the JSON body (Null when empty)
async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Register a user and return their access token
async fn register(app: &Router, username: &str, is_author: bool) -> String {
    let body = json!({
        "username": username,
        "email": format!("{}@example.com", username),
        "password": PASSWORD,
        "is_author": is_author,
    });
    let (status, json) = send(app, json_request("POST", "/auth/register", None, body)).await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", json);
    json["access_token"].as_str().unwrap().to_string()
}

/// Create and publish a book, returning its ID
async fn publish_book(app: &Router, token: &str, title: &str, total_pages: i64) -> String {
    let body = json!({
        "title": title,
        "description": "A test book",
        "genre": "Fantasy",
        "total_pages": total_pages,
    });
    let (status, book) = send(app, json_request("POST", "/books", Some(token), body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", book);
    let id = book["id"].as_str().unwrap().to_string();

    let uri = format!("/books/{}", id);
    let body = json!({ "is_published": true });
    let (status, _) = send(app, json_request("PUT", &uri, Some(token), body)).await;
    assert_eq!(status, StatusCode::OK);
    id
}

#[tokio::test]
async fn test_health_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);

    let (status, json) = send(&app, empty_request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);

    let token = register(&app, "reader", false).await;

    let login = json!({ "username": "reader@example.com", "password": PASSWORD });
    let (status, json) = send(&app, json_request("POST", "/auth/login", None, login)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["token_type"], "bearer");
    assert_eq!(json["user"]["username"], "reader");
    assert!(json["user"].get("password_hash").is_none());

    let (status, me) = send(&app, empty_request("GET", "/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "reader");
    assert!(me["author"].is_null());
}

#[tokio::test]
async fn test_duplicate_registration_conflict() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    register(&app, "dupe", false).await;

    let body = json!({
        "username": "other",
        "email": "DUPE@example.com",
        "password": PASSWORD,
    });
    let (status, json) = send(&app, json_request("POST", "/auth/register", None, body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "conflict");
}

#[tokio::test]
async fn test_bad_credentials_unauthorized() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    register(&app, "reader", false).await;

    let login = json!({ "username": "reader", "password": "Wr0ng!pass" });
    let (status, json) = send(&app, json_request("POST", "/auth/login", None, login)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn test_missing_and_bad_tokens_unauthorized() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);

    let (status, _) = send(&app, empty_request("GET", "/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, empty_request("GET", "/auth/me", Some("not.a.token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Presenting a bad token on a public route is still rejected
    let (status, _) = send(&app, empty_request("GET", "/books/any", Some("not.a.token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let token = register(&app, "leaver", false).await;

    let (status, _) = send(&app, empty_request("POST", "/auth/logout", Some(&token))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, empty_request("GET", "/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_author_cannot_create_book() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let token = register(&app, "reader", false).await;

    let body = json!({ "title": "Not Mine" });
    let (status, json) = send(&app, json_request("POST", "/books", Some(&token), body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn test_non_owner_edit_forbidden() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let rival = register(&app, "rival", true).await;
    let id = publish_book(&app, &owner, "Guarded", 10).await;

    let uri = format!("/books/{}", id);
    let body = json!({ "title": "Taken Over" });
    let (status, _) = send(&app, json_request("PUT", &uri, Some(&rival), body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, empty_request("DELETE", &uri, Some(&rival))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, book) = send(&app, empty_request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["title"], "Guarded");
}

#[tokio::test]
async fn test_draft_hidden_from_public() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;

    let body = json!({ "title": "Work In Progress" });
    let (_, book) = send(&app, json_request("POST", "/books", Some(&owner), body)).await;
    let uri = format!("/books/{}", book["id"].as_str().unwrap());

    let (status, _) = send(&app, empty_request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, empty_request("GET", &uri, Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_search_without_matches_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    publish_book(&app, &owner, "Dragons", 10).await;

    let (status, page) = send(
        &app,
        empty_request("GET", "/books/search?q=dragons&genre=Cookbook", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 0);
    assert_eq!(page["books"].as_array().unwrap().len(), 0);
    assert_eq!(page["has_more"], false);

    let (status, page) = send(&app, empty_request("GET", "/books/search?q=dragons", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 1);
}

#[tokio::test]
async fn test_reading_flow() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;
    let id = publish_book(&app, &owner, "Short Story", 20).await;

    let start = format!("/books/{}/start-reading", id);
    let (status, progress) = send(&app, empty_request("POST", &start, Some(&reader))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(progress["current_page"], 0);

    let (status, _) = send(&app, empty_request("POST", &start, Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/books/{}/progress", id);
    let body = json!({ "current_page": 21, "reading_time_minutes": 5 });
    let (status, json) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    let body = json!({ "current_page": 20, "reading_time_minutes": 5 });
    let (status, progress) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["is_completed"], true);
    assert_eq!(progress["percentage"], 100.0);

    let history_req = empty_request("GET", "/reading/history", Some(&reader));
    let (status, history) = send(&app, history_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total_count"], 1);

    let stats = format!("/books/{}/stats", id);
    let (status, json) = send(&app, empty_request("GET", &stats, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_readers"], 1);
    assert_eq!(json["completion_rate"], 100.0);

    let (_, book) = send(&app, empty_request("GET", &format!("/books/{}", id), None)).await;
    assert_eq!(book["read_count"], 1);
}

#[tokio::test]
async fn test_progress_requires_start() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;
    let id = publish_book(&app, &owner, "Unopened", 20).await;

    let uri = format!("/books/{}/progress", id);
    let body = json!({ "current_page": 3 });
    let (status, _) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_book_removes_progress() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;
    let id = publish_book(&app, &owner, "Ephemeral", 20).await;

    let start = format!("/books/{}/start-reading", id);
    send(&app, empty_request("POST", &start, Some(&reader))).await;

    let uri = format!("/books/{}", id);
    let (status, _) = send(&app, empty_request("DELETE", &uri, Some(&owner))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, empty_request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let progress = format!("/books/{}/progress", id);
    let (status, _) = send(&app, empty_request("GET", &progress, Some(&reader))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, current) = send(&app, empty_request("GET", "/reading/current", Some(&reader))).await;
    assert_eq!(current["total_count"], 0);
}

#[tokio::test]
async fn test_upload_and_download_text_file() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let id = publish_book(&app, &owner, "Plain Words", 1).await;

    let boundary = "shelfboundary";
    let content = "Chapter 1\nOnce upon a time.\n";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"words.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        c = content
    );
    let req = Request::builder()
        .method("POST")
        .uri(format!("/books/{}/file", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", owner))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, book) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", book);
    assert_eq!(book["file_type"], "txt");
    assert_eq!(book["file_size"], content.len());

    let resp = app
        .clone()
        .oneshot(empty_request("GET", &format!("/books/{}/file", id), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], content.as_bytes());
}

#[tokio::test]
async fn test_upload_rejects_unknown_extension() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let id = publish_book(&app, &owner, "Wrong Kind", 1).await;

    let boundary = "shelfboundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"run.exe\"\r\n\
         Content-Type: application/octet-stream\r\n\r\nMZ\r\n--{b}--\r\n",
        b = boundary
    );
    let req = Request::builder()
        .method("POST")
        .uri(format!("/books/{}/file", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", owner))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_only_progress_update() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;
    let id = publish_book(&app, &owner, "Long Novel", 300).await;

    let start = format!("/books/{}/start-reading", id);
    send(&app, empty_request("POST", &start, Some(&reader))).await;

    let uri = format!("/books/{}/progress", id);
    let body = json!({ "current_page": 40 });
    let (status, _) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({ "status": "paused" });
    let (status, progress) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["current_page"], 40);
    assert_eq!(progress["is_completed"], false);

    let body = json!({ "status": "completed" });
    let (status, progress) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["current_page"], 40);
    assert_eq!(progress["is_completed"], true);
}

#[tokio::test]
async fn test_reading_time_overflow_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;
    let id = publish_book(&app, &owner, "Endless", 10).await;

    let start = format!("/books/{}/start-reading", id);
    send(&app, empty_request("POST", &start, Some(&reader))).await;

    let uri = format!("/books/{}/progress", id);
    let body = json!({ "current_page": 1, "reading_time_minutes": i64::MAX });
    let (status, _) = send(&app, json_request("PUT", &uri, Some(&reader), body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, json_request("PUT", &uri, Some(&reader), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    let (status, progress) = send(&app, empty_request("GET", &uri, Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["reading_time_minutes"], i64::MAX);
}

#[tokio::test]
async fn test_current_reading_paginated() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;

    for title in ["First", "Second", "Third"] {
        let id = publish_book(&app, &owner, title, 50).await;
        let start = format!("/books/{}/start-reading", id);
        send(&app, empty_request("POST", &start, Some(&reader))).await;
    }

    let req = empty_request("GET", "/reading/current?skip=0&limit=2", Some(&reader));
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 3);
    assert_eq!(page["entries"].as_array().unwrap().len(), 2);
    assert_eq!(page["has_more"], true);
}

#[tokio::test]
async fn test_profile_get_and_update() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let token = register(&app, "reader", false).await;

    let (status, _) = send(&app, empty_request("GET", "/users/profile", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, profile) = send(&app, empty_request("GET", "/users/profile", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "reader");
    assert!(profile.get("password_hash").is_none());

    let body = json!({ "first_name": "Ada", "last_name": "Lovelace", "bio": "Reads a lot" });
    let req = json_request("PUT", "/users/profile", Some(&token), body);
    let (status, profile) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["first_name"], "Ada");
    assert_eq!(profile["last_name"], "Lovelace");

    let body = json!({ "first_name": "x".repeat(101) });
    let req = json_request("PUT", "/users/profile", Some(&token), body);
    let (status, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    let (_, profile) = send(&app, empty_request("GET", "/users/profile", Some(&token))).await;
    assert_eq!(profile["first_name"], "Ada");
    assert_eq!(profile["bio"], "Reads a lot");
}

/// Author ID of the account behind a token
async fn author_id_of(app: &Router, token: &str) -> String {
    let (_, me) = send(app, empty_request("GET", "/auth/me", Some(token))).await;
    me["author"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_authors_list() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    register(&app, "first", true).await;
    register(&app, "second", true).await;
    register(&app, "reader", false).await;

    let (status, page) = send(&app, empty_request("GET", "/authors?limit=1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["authors"].as_array().unwrap().len(), 1);
    assert_eq!(page["has_more"], true);

    let (_, rest) = send(&app, empty_request("GET", "/authors?skip=1&limit=1", None)).await;
    assert_eq!(rest["authors"].as_array().unwrap().len(), 1);
    assert_eq!(rest["has_more"], false);
}

#[tokio::test]
async fn test_author_update_by_owner() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let uri = format!("/authors/{}", author_id_of(&app, &owner).await);

    let body = json!({
        "pen_name": "  Mary O'Brien-Smith ",
        "bio": "Writes mysteries",
        "social_links": { "website": "https://example.com", "mastodon": "@mary" },
    });
    let (status, author) = send(&app, json_request("PUT", &uri, Some(&owner), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(author["pen_name"], "Mary O'Brien-Smith");

    let (status, author) = send(&app, empty_request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(author["bio"], "Writes mysteries");
    assert_eq!(author["social_links"]["website"], "https://example.com");
    assert_eq!(author["social_links"]["mastodon"], "@mary");
}

#[tokio::test]
async fn test_author_update_rejects_bad_pen_name() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let uri = format!("/authors/{}", author_id_of(&app, &owner).await);

    for pen_name in ["X", "R2-D2", "Name<script>"] {
        let body = json!({ "pen_name": pen_name });
        let (status, json) = send(&app, json_request("PUT", &uri, Some(&owner), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {:?}", pen_name);
        assert_eq!(json["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_author_update_by_other_forbidden() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let rival = register(&app, "rival", true).await;
    let uri = format!("/authors/{}", author_id_of(&app, &owner).await);

    let body = json!({ "pen_name": "Impostor" });
    let (status, json) = send(&app, json_request("PUT", &uri, Some(&rival), body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");

    let (_, author) = send(&app, empty_request("GET", &uri, None)).await;
    assert_ne!(author["pen_name"], "Impostor");

    let body = json!({ "bio": "anything" });
    let (status, _) = send(&app, json_request("PUT", "/authors/missing", Some(&owner), body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_author_books_hide_drafts_from_others() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(&temp_dir);
    let owner = register(&app, "owner", true).await;
    let reader = register(&app, "reader", false).await;
    publish_book(&app, &owner, "Released", 10).await;
    let body = json!({ "title": "Unfinished" });
    let (status, _) = send(&app, json_request("POST", "/books", Some(&owner), body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/authors/{}/books", author_id_of(&app, &owner).await);

    let (status, page) = send(&app, empty_request("GET", &uri, Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 2);

    for token in [None, Some(reader.as_str())] {
        let (status, page) = send(&app, empty_request("GET", &uri, token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_count"], 1);
        assert_eq!(page["books"][0]["title"], "Released");
    }

    let (status, _) = send(&app, empty_request("GET", "/authors/missing/books", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
