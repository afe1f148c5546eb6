//! Web front end: routes, sessions and the server loop.

use std::num::NonZeroU16;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{error, info};

use crate::constants::{MAX_UPLOAD_BODY_BYTES, SESSION_INACTIVITY_MINUTES};
use crate::controller::RequestController;

mod csrf;
pub(crate) mod flash;
mod images;
mod prelude;
mod views;

use views::{
    clear_uploads_handler, generate_handler, result_image_handler, root_handler, script_handler,
    status_handler, styles_handler, upload_handler,
};

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    controller: RequestController,
}

impl AppState {
    fn new(controller: RequestController) -> Self {
        Self { controller }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/generate", post(generate_handler))
        .route(
            "/uploads",
            post(upload_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route("/uploads/clear", post(clear_uploads_handler))
        .route("/api/status", get(status_handler))
        .route("/result/image", get(result_image_handler))
        .route("/static/styles.css", get(styles_handler))
        .route("/static/app.js", get(script_handler))
}

fn build_app(controller: RequestController) -> Router {
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            SESSION_INACTIVITY_MINUTES,
        )));
    create_router()
        .with_state(AppState::new(controller))
        .layer(sessions)
}

async fn shutdown_signal(controller: RequestController) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
    controller.shutdown().await;
}

/// Binds the listener and serves until ctrl-c.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    controller: RequestController,
) -> Result<(), anyhow::Error> {
    let app = build_app(controller.clone());

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller))
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, IF_NONE_MATCH, LOCATION, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::ControllerSettings;
    use crate::controller::tests::{StubBackend, ok_image, status};
    use crate::imagen::{BackendError, RawResponse};
    use crate::session::tests::png_bytes;

    const BOUNDARY: &str = "picturaboundary";

    fn test_app(responses: Vec<Result<RawResponse, BackendError>>) -> (Router, RequestController) {
        let backend = StubBackend::with(responses);
        let controller = RequestController::new(
            backend,
            ControllerSettings {
                request_delay: Duration::ZERO,
                success_cooldown_secs: 30,
                ..ControllerSettings::default()
            },
        );
        (build_app(controller.clone()), controller)
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    /// Loads the home page, returning the session cookie and CSRF token.
    async fn open_session(app: &Router) -> (String, String) {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .expect("session cookie")
            .to_string();
        let body = read_body(response).await;
        let marker = "name=\"csrf_token\" value=\"";
        let start = body.find(marker).expect("csrf field") + marker.len();
        let token = body[start..]
            .split('"')
            .next()
            .expect("csrf value")
            .to_string();
        (cookie, token)
    }

    async fn get_page(app: &Router, cookie: &str) -> String {
        let request = Request::builder()
            .uri("/")
            .header(COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        read_body(app.clone().oneshot(request).await.unwrap()).await
    }

    async fn post_form(app: &Router, cookie: &str, uri: &str, form: String) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(COOKIE, cookie)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        if response.status() == StatusCode::SEE_OTHER {
            assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
        }
        response.status()
    }

    fn multipart_body(token: &str, files: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"csrf_token\"\r\n\r\n{token}\r\n"
            )
            .as_bytes(),
        );
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_uploads(app: &Router, cookie: &str, body: Vec<u8>) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/uploads")
            .header(COOKIE, cookie)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        app.clone().oneshot(request).await.unwrap().status()
    }

    async fn status_json(app: &Router) -> serde_json::Value {
        let request = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let body = read_body(app.clone().oneshot(request).await.unwrap()).await;
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    async fn home_page_renders_open_gate() {
        let (app, _controller) = test_app(vec![]);
        let (cookie, _token) = open_session(&app).await;
        let body = get_page(&app, &cookie).await;
        assert!(body.contains("Generate Image"));
        assert!(body.contains("0 / 4"));
        assert!(!body.contains("disabled"));
    }

    #[tokio::test]
    async fn empty_prompt_flashes_notice_without_calling_backend() {
        let (app, controller) = test_app(vec![ok_image("AAAA")]);
        let (cookie, token) = open_session(&app).await;

        let status = post_form(
            &app,
            &cookie,
            "/generate",
            format!("csrf_token={token}&prompt=+++&mode=direct"),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let body = get_page(&app, &cookie).await;
        assert!(body.contains("Please enter a prompt."));
        let snapshot = controller.snapshot().await;
        assert!(snapshot.request_gate);
        assert!(snapshot.last_result.is_none());
    }

    #[tokio::test]
    async fn generate_requires_csrf_token() {
        let (app, controller) = test_app(vec![ok_image("AAAA")]);
        let (cookie, _token) = open_session(&app).await;

        let status = post_form(
            &app,
            &cookie,
            "/generate",
            "csrf_token=wrong&prompt=a+cat".to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(controller.snapshot().await.request_gate);
    }

    #[tokio::test]
    async fn successful_generation_shows_image_and_closes_gate() {
        let (app, controller) = test_app(vec![ok_image("AAAA")]);
        let (cookie, token) = open_session(&app).await;

        let status = post_form(
            &app,
            &cookie,
            "/generate",
            format!("csrf_token={token}&prompt=a+goat+on+a+roof&mode=direct"),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        // wait for the background request to settle
        for _ in 0..100 {
            if controller.snapshot().await.result_version >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let json = status_json(&app).await;
        assert_eq!(json["request_gate"], false);
        assert_eq!(json["result_kind"], "image");
        assert_eq!(json["phase"], "cooling_down");

        let body = get_page(&app, &cookie).await;
        assert!(body.contains("data:image/png;base64,AAAA"));
        assert!(body.contains("a goat on a roof"));
        assert!(body.contains("disabled"));

        // a second submit is turned away while cooling down
        post_form(
            &app,
            &cookie,
            "/generate",
            format!("csrf_token={token}&prompt=again"),
        )
        .await;
        let body = get_page(&app, &cookie).await;
        assert!(body.contains("Please wait before making another request."));

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn result_image_endpoint_serves_bytes_and_revalidates() {
        let (app, controller) = test_app(vec![ok_image("iVBORw0KGgo=")]);
        controller
            .set_draft("x", crate::prompt::GenerationMode::Direct)
            .await;

        let request = Request::builder()
            .uri("/result/image")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        controller.submit().await.unwrap().outcome().await;

        let request = Request::builder()
            .uri("/result/image")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
        let etag = response.headers().get("etag").unwrap().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"\x89PNG\r\n\x1a\n");

        let request = Request::builder()
            .uri("/result/image")
            .header(IF_NONE_MATCH, etag)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn throttled_generation_reports_rate_limit() {
        let (app, controller) = test_app(vec![status(429, "")]);
        controller
            .set_draft("x", crate::prompt::GenerationMode::Direct)
            .await;
        controller.submit().await.unwrap().outcome().await;

        let json = status_json(&app).await;
        assert_eq!(json["request_gate"], false);
        assert_eq!(json["cooldown_remaining"], 60);
        assert_eq!(json["result_kind"], "notice");
        assert_eq!(json["button_label"], "Please wait... (60s)");

        let (cookie, _token) = open_session(&app).await;
        let body = get_page(&app, &cookie).await;
        assert!(body.contains("Rate limit exceeded. Please wait 60 seconds before trying again."));

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn uploads_keep_first_four_and_flash_discards() {
        let (app, controller) = test_app(vec![]);
        let (cookie, token) = open_session(&app).await;

        let files: Vec<(&str, Vec<u8>)> = ["one.png", "two.png", "three.png", "four.png", "five.png"]
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name, png_bytes(idx as u8 * 10)))
            .collect();
        let status = post_uploads(&app, &cookie, multipart_body(&token, &files)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let snapshot = controller.snapshot().await;
        let names: Vec<&str> = snapshot
            .uploads
            .iter()
            .map(|upload| upload.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["one.png", "two.png", "three.png", "four.png"]);

        let body = get_page(&app, &cookie).await;
        assert!(body.contains("extra uploads were discarded"));
        assert!(body.contains("4 / 4"));
    }

    #[tokio::test]
    async fn uploads_past_capacity_are_discarded_without_decoding() {
        let (app, controller) = test_app(vec![]);
        let (cookie, token) = open_session(&app).await;
        controller
            .add_uploads(vec![crate::session::tests::upload("held.png")])
            .await;

        // only three slots left, the garbage file lands past them
        let files = vec![
            ("a.png", png_bytes(1)),
            ("b.png", png_bytes(2)),
            ("c.png", png_bytes(3)),
            ("notes.txt", b"definitely not an image".to_vec()),
        ];
        let status = post_uploads(&app, &cookie, multipart_body(&token, &files)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(controller.snapshot().await.uploads.len(), 4);

        let body = get_page(&app, &cookie).await;
        assert!(body.contains("extra uploads were discarded"));
        assert!(!body.contains("were skipped"));
    }

    #[tokio::test]
    async fn invalid_uploads_are_skipped() {
        let (app, controller) = test_app(vec![]);
        let (cookie, token) = open_session(&app).await;

        let files = vec![
            ("notes.txt", b"definitely not an image".to_vec()),
            ("ok.png", png_bytes(1)),
            ("", Vec::new()),
        ];
        let status = post_uploads(&app, &cookie, multipart_body(&token, &files)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(controller.snapshot().await.uploads.len(), 1);

        let body = get_page(&app, &cookie).await;
        assert!(body.contains("were skipped"));
    }

    #[tokio::test]
    async fn collage_flow_requires_and_uses_uploads() {
        let (app, controller) = test_app(vec![ok_image("AAAA")]);
        let (cookie, token) = open_session(&app).await;

        post_form(
            &app,
            &cookie,
            "/generate",
            format!("csrf_token={token}&prompt=family+picnic&mode=collage"),
        )
        .await;
        let body = get_page(&app, &cookie).await;
        assert!(body.contains("Please upload at least one photo"));
        assert!(controller.snapshot().await.request_gate);

        post_uploads(
            &app,
            &cookie,
            multipart_body(&token, &[("a.png", png_bytes(3))]),
        )
        .await;
        let status = post_form(
            &app,
            &cookie,
            "/uploads/clear",
            format!("csrf_token={token}"),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert!(controller.snapshot().await.uploads.is_empty());
    }

    #[tokio::test]
    async fn static_assets_are_served() {
        let (app, _controller) = test_app(vec![]);
        for (uri, content_type) in [
            ("/static/styles.css", "text/css"),
            ("/static/app.js", "application/javascript"),
        ] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), content_type);
        }
    }

    #[test]
    fn stub_backend_is_object_safe() {
        let backend: Arc<dyn crate::imagen::ImageBackend> = StubBackend::with(vec![]);
        drop(backend);
    }
}
