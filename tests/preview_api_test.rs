mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use cms_media_uploads::config::MediaConfig;
use cms_media_uploads::context::MediaContext;
use cms_media_uploads::services::lease_sweeper::LeaseSweeper;
use cms_media_uploads::services::storage::StorageService;
use cms_media_uploads::{AppState, create_app};
use common::{FlakyStorage, png};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------974767299852498929531610575";

fn setup() -> (Router, AppState, Arc<FlakyStorage>) {
    let storage = FlakyStorage::new();
    let config = MediaConfig::development();
    let media = MediaContext::new(storage.clone(), &config);
    let state = AppState::new(media, config);
    (create_app(state.clone()), state, storage)
}

fn multipart(file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
            Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/objects")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn stage(app: &Router, file_name: &str, content_type: &str, data: &[u8]) -> Value {
    let response = app
        .clone()
        .oneshot(multipart(file_name, content_type, data))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn test_staged_object_is_served_until_revoked() {
    let (app, state, _) = setup();
    let staged = stage(&app, "poster.png", "image/png", &png(48)).await;

    let id = staged["id"].as_str().unwrap();
    assert_eq!(staged["name"], "poster.png");
    assert_eq!(staged["size"], 48);
    assert_eq!(staged["content_type"], "image/png");
    assert_eq!(staged["kind"], "image");
    assert_eq!(
        staged["url"].as_str().unwrap(),
        format!("http://127.0.0.1:8080/objects/{}", id)
    );

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/objects/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &png(48)[..]);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/objects/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.media.urls.stats().live, 0);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/objects/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request("DELETE", &format!("/objects/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_declared_type_used_when_content_is_not_sniffable() {
    let (app, _, _) = setup();
    let staged = stage(&app, "notes.txt", "text/plain", b"opening hours").await;

    assert_eq!(staged["content_type"], "text/plain");
    assert_eq!(staged["kind"], "link");
}

#[tokio::test]
async fn test_request_without_file_is_rejected() {
    let (app, _, _) = setup();
    let body = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\r\n\
        About us\r\n\
        --{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/objects")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No file in request");
}

#[tokio::test]
async fn test_persist_uploads_and_revokes_lease() {
    let (app, state, storage) = setup();
    let staged = stage(&app, "teaser.png", "image/png", &png(64)).await;
    let id = staged["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/objects/{}/persist", id),
            json!({ "prefix": "events/summer", "replaces": "events/summer/1_old.png" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let remote = body_json(response).await;

    let path = remote["path"].as_str().unwrap();
    assert!(path.starts_with("events/summer/"));
    assert!(path.ends_with("_teaser.png"));
    assert_eq!(
        remote["url"].as_str().unwrap(),
        storage.public_url(path)
    );
    assert_eq!(remote["content_type"], "image/png");
    assert!(remote["uploaded_at"].is_string());

    assert_eq!(storage.ops()[0], "delete events/summer/1_old.png");
    assert_eq!(
        storage.list_objects("events/summer/").await.unwrap(),
        vec![path.to_string()]
    );
    assert!(state.leases.is_empty());
    assert_eq!(state.media.urls.stats().live, 0);
    assert_eq!(state.media.coordinator.snapshot().active_jobs, 0);
}

#[tokio::test]
async fn test_failed_persist_keeps_lease_for_retry() {
    let (app, state, storage) = setup();
    storage.fail_uploads_of("teaser.png");
    let staged = stage(&app, "teaser.png", "image/png", &png(64)).await;
    let id = staged["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/objects/{}/persist", id),
            json!({ "prefix": "events" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert_eq!(state.leases.len(), 1);
    let response = app
        .oneshot(empty_request("GET", &format!("/objects/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_status_idle() {
    let (app, _, _) = setup();
    let response = app
        .oneshot(empty_request("GET", "/uploads/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["active_jobs"], 0);
    assert_eq!(status["progress"], 0.0);
    assert_eq!(status["blocking"], false);
}

#[tokio::test]
async fn test_preview_modal_lifecycle() {
    let (app, state, _) = setup();

    let response = app.clone().oneshot(empty_request("GET", "/preview")).await.unwrap();
    assert_eq!(body_json(response).await, Value::Null);

    let staged = stage(&app, "reel.png", "image/png", &png(32)).await;
    let url = staged["url"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/preview",
            json!({ "url": url, "title": "Showreel" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let shown = body_json(response).await;
    assert_eq!(shown["kind"], "image");
    assert_eq!(shown["owned"], false);
    assert_eq!(shown["title"], "Showreel");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/preview",
            json!({ "url": "https://www.youtube.com/embed/abc", "kind": "video" }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["kind"], "video");

    // Replacing the borrowed preview leaves the staged object alive.
    assert!(state.media.urls.resolve_url(url).is_some());

    let response = app.clone().oneshot(empty_request("DELETE", "/preview")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!state.media.previews.is_open());

    let response = app
        .oneshot(json_request("POST", "/preview", json!({ "url": " " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_live_urls() {
    let (app, _, _) = setup();
    stage(&app, "a.png", "image/png", &png(16)).await;
    stage(&app, "b.png", "image/png", &png(16)).await;

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["storage"], "memory");
    assert_eq!(health["live_object_urls"], 2);
    assert_eq!(health["active_uploads"], 0);
}

#[tokio::test]
async fn test_abandoned_leases_are_swept() {
    let (app, state, _) = setup();
    let kept = stage(&app, "kept.png", "image/png", &png(16)).await;
    let abandoned = stage(&app, "abandoned.png", "image/png", &png(16)).await;

    let (_, shutdown) = tokio::sync::watch::channel(false);
    let sweeper = LeaseSweeper::new(state.clone(), Duration::from_secs(3600), shutdown.clone());
    assert_eq!(sweeper.period(), Duration::from_secs(60));
    assert_eq!(sweeper.sweep_once(), 0);
    assert_eq!(state.leases.len(), 2);

    let kept_id = kept["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/objects/{}", kept_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let sweeper = LeaseSweeper::new(state.clone(), Duration::ZERO, shutdown);
    assert_eq!(sweeper.period(), Duration::from_secs(1));
    assert_eq!(sweeper.sweep_once(), 1);
    assert!(state.leases.is_empty());
    assert_eq!(state.media.urls.stats().live, 0);

    let abandoned_id = abandoned["id"].as_str().unwrap();
    let response = app
        .oneshot(empty_request("GET", &format!("/objects/{}", abandoned_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lease_sweeper_stops_on_shutdown() {
    let (_, state, _) = setup();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(LeaseSweeper::new(state, Duration::from_secs(60), shutdown_rx).run());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_client_disconnect_does_not_cancel_persist() {
    let (app, state, storage) = setup();
    storage.slow_writes();
    let staged = stage(&app, "teaser.png", "image/png", &png(64)).await;
    let id = staged["id"].as_str().unwrap().to_string();

    let mut activity = state.media.coordinator.subscribe();
    let mut request = Box::pin(app.clone().oneshot(json_request(
        "POST",
        &format!("/objects/{}/persist", id),
        json!({ "prefix": "events" }),
    )));
    tokio::select! {
        _ = &mut request => panic!("persist finished before the client left"),
        _ = activity.wait_for(|a| a.blocking) => {}
    }
    drop(request);

    tokio::time::timeout(Duration::from_secs(5), state.media.coordinator.wait_idle())
        .await
        .unwrap();
    for _ in 0..100 {
        if state.leases.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(storage.list_objects("events/").await.unwrap().len(), 1);
    assert!(state.leases.is_empty());
    assert_eq!(state.media.urls.stats().live, 0);
}
