use std::time::{Duration, UNIX_EPOCH};

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use httpdate::fmt_http_date;

use crate::error::PicturaError;
use crate::session::GeneratedImage;

/// Results change in place, so browsers must revalidate every time.
const RESULT_CACHE_CONTROL: &str = "private, no-cache";

/// Validators for the current result image.
#[derive(Clone, Debug)]
pub(crate) struct ResultCacheHeaders {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl ResultCacheHeaders {
    /// Derives validators from the result version and generation time.
    pub(crate) fn for_result(version: u64, image: &GeneratedImage) -> Self {
        // HTTP dates only carry whole seconds
        let secs = u64::try_from(image.generated_at.timestamp()).unwrap_or_default();
        let modified_at = UNIX_EPOCH + Duration::from_secs(secs);
        let etag = HeaderValue::from_str(&format!("\"r{}-{}\"", version, image.bytes.len())).ok();
        let last_modified = HeaderValue::from_str(&fmt_http_date(modified_at)).ok();
        Self {
            etag,
            last_modified,
        }
    }

    fn apply(&self, mut builder: Builder) -> Builder {
        builder = builder.header(CACHE_CONTROL, RESULT_CACHE_CONTROL);
        if let Some(etag) = &self.etag {
            builder = builder.header(ETAG, etag.clone());
        }
        if let Some(last_modified) = &self.last_modified {
            builder = builder.header(LAST_MODIFIED, last_modified.clone());
        }
        builder
    }

    /// Only the ETag validates. If-Modified-Since is ignored because two
    /// results can land inside the same second.
    pub(crate) fn is_not_modified(&self, headers: &HeaderMap) -> bool {
        let Some(candidates) = headers
            .get(IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
        else {
            return false;
        };
        let Some(etag) = self.etag.as_ref().and_then(|value| value.to_str().ok()) else {
            return false;
        };
        candidates
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
    }
}

/// 200 with the image bytes, or 304 when the client already has them.
pub(crate) fn result_image_response(
    version: u64,
    image: &GeneratedImage,
    request_headers: &HeaderMap,
) -> Result<Response, PicturaError> {
    let cache = ResultCacheHeaders::for_result(version, image);
    if cache.is_not_modified(request_headers) {
        return cache
            .apply(Response::builder().status(StatusCode::NOT_MODIFIED))
            .body(Body::empty())
            .map_err(PicturaError::from);
    }

    let content_type = HeaderValue::from_str(&image.mime)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    cache
        .apply(Response::builder().header(CONTENT_TYPE, content_type))
        .body(Body::from(image.bytes.clone()))
        .map_err(PicturaError::from)
}
