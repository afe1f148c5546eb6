//! Shared constants/defaults for things
//!

/// Maximum number of photos kept for collage mode, extra uploads are discarded.
pub const MAX_UPLOADS: usize = 4;

/// Largest single upload we'll accept, in bytes.
pub const MAX_UPLOAD_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Request body limit for the upload form (all files plus multipart overhead).
pub const MAX_UPLOAD_BODY_BYTES: usize = MAX_UPLOADS * MAX_UPLOAD_FILE_BYTES + 64 * 1024;

/// Seconds to hold the gate closed after a successful generation.
pub const DEFAULT_SUCCESS_COOLDOWN_SECS: u64 = 5;

/// Seconds to hold the gate closed after the remote service throttles us.
pub const DEFAULT_THROTTLE_COOLDOWN_SECS: u64 = 60;

/// Pause before the outbound call so the loading state is visible.
pub const DEFAULT_REQUEST_DELAY_SECS: u64 = 2;

/// Default Imagen API base.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Imagen model.
pub const DEFAULT_MODEL: &str = "imagen-4.0-generate-001";

/// Default aspect ratio sent with every request.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Number of images requested per generation.
pub const SAMPLE_COUNT: u8 = 1;

/// Header carrying the API credential.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// MIME type assumed when the remote doesn't say.
pub const DEFAULT_RESULT_MIME: &str = "image/png";

/// Notice shown when the remote answers 2xx without image data.
pub const NO_RESULT_NOTICE: &str = "No image generated. Please try a different prompt.";

/// Notice shown on transport or otherwise unexpected failures.
pub const GENERIC_ERROR_NOTICE: &str = "Error generating image. Please try again.";

/// Fallback when a remote error body carries no message.
pub const REMOTE_ERROR_FALLBACK: &str = "API request failed";

/// Instruction wrapped around the description in collage mode.
pub const COLLAGE_INSTRUCTION: &str = "A single cohesive photo collage";

/// Negative prompt sent in collage mode.
pub const COLLAGE_NEGATIVE_PROMPT: &str =
    "blurry, distorted faces, extra limbs, duplicated people, watermark, text, low quality";

/// Length of CSRF session tokens
pub const CSRF_TOKEN_LENGTH: usize = 32;

/// Idle session lifetime, in minutes.
pub const SESSION_INACTIVITY_MINUTES: i64 = 60;
