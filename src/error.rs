//! Error handling

use axum::response::IntoResponse;
use tracing::info;

/// Web-facing errors for the pictura application.
#[derive(Debug)]
pub enum PicturaError {
    /// When you didn't do the right thing
    BadRequest,
    /// Missing or invalid session / CSRF token
    Unauthorized,
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for PicturaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PicturaError::BadRequest => write!(f, "bad request"),
            PicturaError::Unauthorized => write!(f, "unauthorized"),
            PicturaError::NotFound(what) => write!(f, "not found: {what}"),
            PicturaError::InternalServerError(message) => {
                write!(f, "internal server error: {message}")
            }
        }
    }
}

impl From<std::io::Error> for PicturaError {
    fn from(err: std::io::Error) -> Self {
        PicturaError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for PicturaError {
    fn from(err: axum::http::Error) -> Self {
        PicturaError::InternalServerError(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for PicturaError {
    fn from(err: tower_sessions::session::Error) -> Self {
        PicturaError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for PicturaError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        info!("Multipart error: {}", err);
        PicturaError::BadRequest
    }
}

impl IntoResponse for PicturaError {
    fn into_response(self) -> axum::response::Response {
        match self {
            PicturaError::BadRequest => {
                info!("Bad request received");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Bad Request"));
                *response.status_mut() = axum::http::StatusCode::BAD_REQUEST;
                response
            }
            PicturaError::Unauthorized => {
                info!("Unauthorized request received");
                let mut response = axum::response::Response::new(axum::body::Body::from(
                    "Unauthorized: invalid or missing session.",
                ));
                *response.status_mut() = axum::http::StatusCode::UNAUTHORIZED;
                response
            }
            PicturaError::NotFound(what) => {
                tracing::debug!("404 {what}");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Not Found"));
                *response.status_mut() = axum::http::StatusCode::NOT_FOUND;
                response
            }
            PicturaError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Internal server error"));
                *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}
