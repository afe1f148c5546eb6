pub(crate) use crate::error::PicturaError;
pub(crate) use crate::web::AppState;
pub(crate) use crate::web::csrf::{csrf_token, validate_csrf};
pub(crate) use crate::web::flash;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Form, State};
pub(crate) use axum::response::{IntoResponse, Redirect};
pub(crate) use serde::Deserialize;
pub(crate) use tower_sessions::Session;
pub(crate) use tracing::{debug, info};
