//! Imagen `:predict` client.
//!
//! The client only moves bytes: it posts the request and hands back the raw
//! status and body. Deciding what a response means (throttled, failed,
//! generated) happens in [`crate::controller`].

use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ImagenSettings;
use crate::constants::API_KEY_HEADER;

/// Request body for POST /models/{model}:predict
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PredictRequest {
    /// One entry per prompt, we always send exactly one.
    pub instances: Vec<PredictInstance>,
    /// Generation parameters.
    pub parameters: PredictParameters,
}

/// A single prompt instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PredictInstance {
    /// The text instruction.
    pub prompt: String,
}

/// Generation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictParameters {
    /// Number of images to generate.
    pub sample_count: u8,
    /// Aspect ratio such as `1:1`.
    pub aspect_ratio: String,
    /// Things the model should avoid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl PredictRequest {
    /// Builds a single-instance request.
    pub fn new(
        prompt: impl Into<String>,
        sample_count: u8,
        aspect_ratio: impl Into<String>,
        negative_prompt: Option<String>,
    ) -> Self {
        Self {
            instances: vec![PredictInstance {
                prompt: prompt.into(),
            }],
            parameters: PredictParameters {
                sample_count,
                aspect_ratio: aspect_ratio.into(),
                negative_prompt,
            },
        }
    }

    /// The prompt of the first (only) instance.
    pub fn prompt(&self) -> &str {
        self.instances
            .first()
            .map(|instance| instance.prompt.as_str())
            .unwrap_or_default()
    }
}

/// Successful response shape. Every field is optional because a 2xx without
/// predictions is a legitimate (if useless) answer.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PredictResponse {
    #[serde(default)]
    pub(crate) predictions: Vec<Prediction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Prediction {
    #[serde(default)]
    pub(crate) bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub(crate) mime_type: Option<String>,
}

/// Google-style error envelope, `{"error": {"message": "..."}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub(crate) error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// What came back over the wire, unclassified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Convenience constructor, mostly for tests and stubs.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failures that happen before we have a status and body in hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection, TLS or protocol failure.
    Transport(String),
    /// The response body couldn't be read.
    Body(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Transport(message) => write!(f, "request failed: {message}"),
            BackendError::Body(message) => write!(f, "failed reading response body: {message}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Boxed future type returned by [`ImageBackend::predict`].
pub type PredictFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawResponse, BackendError>> + Send + 'a>>;

/// Something that can answer a predict request.
pub trait ImageBackend: Send + Sync {
    /// Issue one predict call.
    fn predict<'a>(&'a self, request: &'a PredictRequest) -> PredictFuture<'a>;
}

/// reqwest-backed client for the Imagen REST API.
#[derive(Clone, Debug)]
pub struct ImagenClient {
    client: reqwest::Client,
    settings: ImagenSettings,
}

impl ImagenClient {
    /// New client with a fresh connection pool.
    pub fn new(settings: ImagenSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    async fn send(&self, request: &PredictRequest) -> Result<RawResponse, BackendError> {
        let url = self.settings.predict_url();
        debug!("POST {} ({} chars of prompt)", url, request.prompt().len());

        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.settings.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.without_url().to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|err| BackendError::Body(err.without_url().to_string()))?;
        debug!("Imagen answered {} with {} bytes", status, body.len());

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl ImageBackend for ImagenClient {
    fn predict<'a>(&'a self, request: &'a PredictRequest) -> PredictFuture<'a> {
        Box::pin(self.send(request))
    }
}
