//! Classifying a predict response into exactly one outcome.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::ControllerSettings;
use crate::constants::{
    DEFAULT_RESULT_MIME, GENERIC_ERROR_NOTICE, NO_RESULT_NOTICE, REMOTE_ERROR_FALLBACK,
};
use crate::imagen::{ErrorEnvelope, PredictResponse, RawResponse};
use crate::session::{GeneratedImage, LastResult, data_uri};

/// How a request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The remote returned an image.
    Generated(GeneratedImage),
    /// The remote answered 429.
    Throttled,
    /// Any other non-2xx, with the remote's message (or a fallback).
    RemoteFailure(String),
    /// 2xx without usable image data.
    Empty,
    /// We never got a status and body back.
    Transport,
}

impl Outcome {
    /// Seconds the gate stays closed afterwards, `None` when it reopens at once.
    pub fn cooldown_secs(&self, settings: &ControllerSettings) -> Option<u64> {
        match self {
            Outcome::Generated(_) => Some(settings.success_cooldown_secs),
            Outcome::Throttled => Some(settings.throttle_cooldown_secs),
            Outcome::RemoteFailure(_) | Outcome::Empty | Outcome::Transport => None,
        }
    }

    /// What gets stored as the session's last result.
    pub fn to_last_result(&self, throttle_cooldown_secs: u64) -> LastResult {
        match self {
            Outcome::Generated(image) => LastResult::Image(Arc::new(image.clone())),
            Outcome::Throttled => LastResult::Notice(format!(
                "Rate limit exceeded. Please wait {throttle_cooldown_secs} seconds before trying again."
            )),
            Outcome::RemoteFailure(message) => {
                LastResult::Notice(format!("Generation failed: {message}"))
            }
            Outcome::Empty => LastResult::Notice(NO_RESULT_NOTICE.to_string()),
            Outcome::Transport => LastResult::Notice(GENERIC_ERROR_NOTICE.to_string()),
        }
    }
}

/// Sorts a raw response into an [`Outcome`].
pub(crate) fn classify(response: &RawResponse, now: DateTime<Utc>) -> Outcome {
    if response.status == StatusCode::TOO_MANY_REQUESTS {
        return Outcome::Throttled;
    }

    if !response.status.is_success() {
        let message = serde_json::from_slice::<ErrorEnvelope>(&response.body)
            .ok()
            .and_then(|envelope| envelope.error)
            .and_then(|error| error.message)
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| REMOTE_ERROR_FALLBACK.to_string());
        warn!("Imagen returned {}: {}", response.status, message);
        return Outcome::RemoteFailure(message);
    }

    let parsed: PredictResponse = match serde_json::from_slice(&response.body) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!("Unparseable 2xx body: {}", err);
            return Outcome::Empty;
        }
    };

    let Some(prediction) = parsed.predictions.into_iter().next() else {
        return Outcome::Empty;
    };
    let Some(encoded) = prediction
        .bytes_base64_encoded
        .filter(|encoded| !encoded.is_empty())
    else {
        return Outcome::Empty;
    };

    let bytes = match general_purpose::STANDARD.decode(&encoded) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Imagen returned undecodable image data: {}", err);
            return Outcome::RemoteFailure("response contained invalid image data".to_string());
        }
    };

    let mime = prediction
        .mime_type
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or_else(|| DEFAULT_RESULT_MIME.to_string());

    Outcome::Generated(GeneratedImage {
        data_uri: data_uri(&mime, &encoded),
        bytes,
        mime,
        generated_at: now,
    })
}
