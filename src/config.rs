//! Config handling

use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;
use crate::constants::{
    DEFAULT_ASPECT_RATIO, DEFAULT_REQUEST_DELAY_SECS, DEFAULT_SUCCESS_COOLDOWN_SECS,
    DEFAULT_THROTTLE_COOLDOWN_SECS, SAMPLE_COUNT,
};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("tower_sessions", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Errors raised while turning CLI options into settings.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The aspect ratio isn't `W:H` with positive integers.
    InvalidAspectRatio(String),
    /// The API base isn't an absolute http(s) URL.
    InvalidApiBase(String),
    /// The model name is blank.
    EmptyModel,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidAspectRatio(value) => {
                write!(f, "invalid aspect ratio {value:?}, expected W:H")
            }
            ConfigError::InvalidApiBase(value) => write!(f, "invalid API base URL {value:?}"),
            ConfigError::EmptyModel => write!(f, "model name must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Timing and request parameters for the request controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Pause inserted before each outbound call.
    pub request_delay: Duration,
    /// Cooldown armed after a successful generation, in seconds.
    pub success_cooldown_secs: u64,
    /// Cooldown armed after being throttled, in seconds.
    pub throttle_cooldown_secs: u64,
    /// Aspect ratio sent with every request.
    pub aspect_ratio: String,
    /// Images requested per call.
    pub sample_count: u8,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(DEFAULT_REQUEST_DELAY_SECS),
            success_cooldown_secs: DEFAULT_SUCCESS_COOLDOWN_SECS,
            throttle_cooldown_secs: DEFAULT_THROTTLE_COOLDOWN_SECS,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            sample_count: SAMPLE_COUNT,
        }
    }
}

impl ControllerSettings {
    /// Builds controller settings from the CLI, validating the aspect ratio.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            request_delay: Duration::from_secs(cli.request_delay_secs),
            success_cooldown_secs: cli.success_cooldown_secs,
            throttle_cooldown_secs: cli.throttle_cooldown_secs,
            aspect_ratio: parse_aspect_ratio(&cli.aspect_ratio)?,
            sample_count: SAMPLE_COUNT,
        })
    }
}

/// Where and how to reach the Imagen API.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagenSettings {
    /// API base, without a trailing slash.
    pub api_base: Url,
    /// Model name, eg `imagen-4.0-generate-001`.
    pub model: String,
    /// API credential.
    pub api_key: String,
}

// keeps the key out of debug logs
impl std::fmt::Debug for ImagenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagenSettings")
            .field("api_base", &self.api_base.as_str())
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ImagenSettings {
    /// Builds Imagen settings, validating the base URL and model name.
    pub fn new(api_base: &str, model: &str, api_key: &str) -> Result<Self, ConfigError> {
        let trimmed = api_base.trim().trim_end_matches('/');
        let api_base = Url::parse(trimmed)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .ok_or_else(|| ConfigError::InvalidApiBase(api_base.to_string()))?;
        let model = model.trim().trim_start_matches("models/").to_string();
        if model.is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        Ok(Self {
            api_base,
            model,
            api_key: api_key.to_string(),
        })
    }

    /// Builds Imagen settings from the CLI.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, ConfigError> {
        Self::new(&cli.api_base, &cli.model, &cli.api_key)
    }

    /// Full `:predict` URL for the configured model.
    pub fn predict_url(&self) -> String {
        format!(
            "{}/models/{}:predict",
            self.api_base.as_str().trim_end_matches('/'),
            self.model
        )
    }
}

/// Normalises `W:H` (also accepting `W/H`), both sides positive integers.
pub fn parse_aspect_ratio(raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim().replace('/', ":");
    let invalid = || ConfigError::InvalidAspectRatio(raw.to_string());
    let (width, height) = value.split_once(':').ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok(format!("{width}:{height}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::constants::{DEFAULT_API_BASE, DEFAULT_MODEL};

    #[test]
    fn aspect_ratio_parsing() {
        assert_eq!(parse_aspect_ratio("1:1").unwrap(), "1:1");
        assert_eq!(parse_aspect_ratio(" 16/9 ").unwrap(), "16:9");
        assert!(parse_aspect_ratio("wide").is_err());
        assert!(parse_aspect_ratio("0:1").is_err());
        assert!(parse_aspect_ratio("4:").is_err());
    }

    #[test]
    fn predict_url_strips_trailing_slash_and_prefix() {
        let settings =
            ImagenSettings::new("http://127.0.0.1:8080/v1beta/", "models/imagen-4", "k").unwrap();
        assert_eq!(
            settings.predict_url(),
            "http://127.0.0.1:8080/v1beta/models/imagen-4:predict"
        );
    }

    #[test]
    fn default_settings_use_public_endpoint() {
        let settings = ImagenSettings::new(DEFAULT_API_BASE, DEFAULT_MODEL, "k").unwrap();
        assert_eq!(
            settings.predict_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/imagen-4.0-generate-001:predict"
        );
    }

    #[test]
    fn bad_api_base_is_rejected() {
        assert!(matches!(
            ImagenSettings::new("not a url", "m", "k"),
            Err(ConfigError::InvalidApiBase(_))
        ));
        assert!(matches!(
            ImagenSettings::new("ftp://example.org", "m", "k"),
            Err(ConfigError::InvalidApiBase(_))
        ));
        assert_eq!(
            ImagenSettings::new("https://example.org", "  ", "k"),
            Err(ConfigError::EmptyModel)
        );
    }

    #[test]
    fn debug_output_hides_key() {
        let settings =
            ImagenSettings::new(DEFAULT_API_BASE, DEFAULT_MODEL, "super-secret").unwrap();
        assert!(!format!("{settings:?}").contains("super-secret"));
    }
}
