use super::images::result_image_response;
use super::prelude::*;
use crate::constants::MAX_UPLOADS;
use crate::controller::{GateStatus, Phase, Snapshot};
use crate::prompt::GenerationMode;
use crate::session::{LastResult, ResultKind, UploadError, UploadedImage};
use axum::Json;
use axum::extract::Multipart;
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Serialize;

#[derive(Deserialize)]
pub(crate) struct GenerateForm {
    csrf_token: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    mode: GenerationMode,
}

#[derive(Deserialize)]
pub(crate) struct CsrfForm {
    csrf_token: String,
}

#[derive(Clone, Debug)]
pub(crate) struct UploadView {
    pub(crate) file_name: String,
    pub(crate) data_uri: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub(crate) struct HomeTemplate {
    csrf_token: String,
    prompt_text: String,
    is_collage: bool,
    uploads: Vec<UploadView>,
    has_uploads: bool,
    upload_count: usize,
    max_uploads: usize,
    uploads_full: bool,
    can_request: bool,
    loading: bool,
    cooldown_remaining: u64,
    button_label: String,
    result_version: u64,
    has_result_image: bool,
    result_image_uri: String,
    generated_at: String,
    has_result_notice: bool,
    result_notice: String,
    has_flash: bool,
    flash_message: String,
    flash_class: String,
}

impl HomeTemplate {
    fn new(snapshot: Snapshot, csrf_token: String, flash: Option<flash::FlashMessage>) -> Self {
        let (has_flash, flash_message, flash_class) = flash::flash_fields(flash);
        let button_label = snapshot.button_label();
        let (result_image_uri, generated_at, result_notice) = match &snapshot.last_result {
            Some(LastResult::Image(image)) => (
                image.data_uri.clone(),
                image.generated_at.format("%H:%M:%S UTC").to_string(),
                String::new(),
            ),
            Some(LastResult::Notice(text)) => (String::new(), String::new(), text.clone()),
            None => (String::new(), String::new(), String::new()),
        };
        let uploads: Vec<UploadView> = snapshot
            .uploads
            .iter()
            .map(|upload| UploadView {
                file_name: upload.file_name.clone(),
                data_uri: upload.data_uri.clone(),
            })
            .collect();

        Self {
            csrf_token,
            prompt_text: snapshot.draft.prompt_text.clone(),
            is_collage: snapshot.draft.mode == GenerationMode::Collage,
            has_uploads: !uploads.is_empty(),
            upload_count: uploads.len(),
            max_uploads: MAX_UPLOADS,
            uploads_full: snapshot.uploads_full,
            uploads,
            can_request: snapshot.request_gate,
            loading: snapshot.loading,
            cooldown_remaining: snapshot.cooldown_remaining,
            button_label,
            result_version: snapshot.result_version,
            has_result_image: snapshot.result_kind() == ResultKind::Image,
            result_image_uri,
            generated_at,
            has_result_notice: snapshot.result_kind() == ResultKind::Notice,
            result_notice,
            has_flash,
            flash_message,
            flash_class,
        }
    }
}

/// What the page polls once a second while the gate is closed.
#[derive(Debug, Serialize)]
pub(crate) struct StatusView {
    request_gate: bool,
    loading: bool,
    cooldown_remaining: u64,
    result_version: u64,
    result_kind: ResultKind,
    button_label: String,
    #[serde(flatten)]
    phase: Phase,
}

impl From<GateStatus> for StatusView {
    fn from(status: GateStatus) -> Self {
        Self {
            request_gate: status.request_gate(),
            loading: status.phase == Phase::InFlight,
            cooldown_remaining: status.phase.cooldown_remaining(),
            result_version: status.result_version,
            result_kind: status.result_kind,
            button_label: status.button_label(),
            phase: status.phase,
        }
    }
}

/// handles the / GET
pub(crate) async fn root_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<HomeTemplate, PicturaError> {
    let csrf_token = csrf_token(&session).await?;
    let flash = flash::take_flash_message(&session).await?;
    let snapshot = state.controller.snapshot().await;
    Ok(HomeTemplate::new(snapshot, csrf_token, flash))
}

/// handles the /generate POST
pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<GenerateForm>,
) -> Result<Redirect, PicturaError> {
    validate_csrf(&session, &form.csrf_token).await?;

    state.controller.set_draft(&form.prompt, form.mode).await;
    match state.controller.submit().await {
        // the request keeps running after the handle is dropped
        Ok(_in_flight) => {}
        Err(err) => {
            info!("Generation rejected: {}", err);
            flash::set_flash(&session, flash::flag_for(err)).await?;
        }
    }
    Ok(Redirect::to("/"))
}

/// handles the /uploads multipart POST
pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Redirect, PicturaError> {
    let mut csrf_token_value: Option<String> = None;
    let mut images: Vec<UploadedImage> = Vec::new();
    let mut invalid = 0usize;
    let mut over_capacity = 0usize;
    let capacity = state.controller.upload_capacity().await;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "csrf_token" => {
                csrf_token_value = Some(field.text().await?);
            }
            "images" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await?;
                // an untouched file input still sends an empty part
                if bytes.is_empty() {
                    continue;
                }
                if images.len() >= capacity {
                    debug!("No room for upload {}, not decoding it", file_name);
                    over_capacity += 1;
                    continue;
                }
                match UploadedImage::from_bytes(&file_name, &bytes) {
                    Ok(image) => images.push(image),
                    Err(UploadError::Empty) => {}
                    Err(err) => {
                        debug!("Skipping upload {}: {}", file_name, err);
                        invalid += 1;
                    }
                }
            }
            _ => {}
        }
    }

    let csrf_token_value = csrf_token_value.ok_or(PicturaError::BadRequest)?;
    validate_csrf(&session, &csrf_token_value).await?;

    let report = state.controller.add_uploads(images).await;
    let flag = if invalid > 0 {
        Some(flash::FLASH_UPLOAD_INVALID)
    } else if report.discarded + over_capacity > 0 {
        Some(flash::FLASH_UPLOADS_DISCARDED)
    } else if report.accepted > 0 {
        Some(flash::FLASH_UPLOADS_ADDED)
    } else {
        None
    };
    if let Some(flag) = flag {
        flash::set_flash(&session, flag).await?;
    }
    Ok(Redirect::to("/"))
}

/// handles the /uploads/clear POST
pub(crate) async fn clear_uploads_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfForm>,
) -> Result<Redirect, PicturaError> {
    validate_csrf(&session, &form.csrf_token).await?;
    state.controller.clear_uploads().await;
    flash::set_flash(&session, flash::FLASH_UPLOADS_CLEARED).await?;
    Ok(Redirect::to("/"))
}

/// handles the /api/status GET
pub(crate) async fn status_handler(State(state): State<AppState>) -> Json<StatusView> {
    Json(StatusView::from(state.controller.status().await))
}

/// handles the /result/image GET
pub(crate) async fn result_image_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, PicturaError> {
    match state.controller.result_image().await {
        Some((version, image)) => result_image_response(version, &image, &headers),
        None => Err(PicturaError::NotFound("result image".to_string())),
    }
}

pub(crate) async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(axum::http::header::CONTENT_TYPE, "text/css")], STYLES)
}

pub(crate) async fn script_handler() -> impl IntoResponse {
    const SCRIPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/app.js"));
    (
        [(axum::http::header::CONTENT_TYPE, "application/javascript")],
        SCRIPT,
    )
}
