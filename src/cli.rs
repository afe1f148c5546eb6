//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_ASPECT_RATIO, DEFAULT_MODEL, DEFAULT_REQUEST_DELAY_SECS,
    DEFAULT_SUCCESS_COOLDOWN_SECS, DEFAULT_THROTTLE_COOLDOWN_SECS,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "PICTURA_DEBUG")]
    /// Enable debug logging. Env: PICTURA_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "PICTURA_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: PICTURA_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "PICTURA_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: PICTURA_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "PICTURA_API_KEY", hide_env_values = true)]
    /// Imagen API key. Never rendered into the page.
    /// Env: PICTURA_API_KEY
    pub api_key: String,
    #[clap(long, default_value = DEFAULT_API_BASE, env = "PICTURA_API_BASE")]
    /// Imagen API base URL.
    /// Env: PICTURA_API_BASE
    pub api_base: String,
    #[clap(long, default_value = DEFAULT_MODEL, env = "PICTURA_MODEL")]
    /// Imagen model name.
    /// Env: PICTURA_MODEL
    pub model: String,
    #[clap(long, default_value = DEFAULT_ASPECT_RATIO, env = "PICTURA_ASPECT_RATIO")]
    /// Aspect ratio as `W:H`, eg `16:9`.
    /// Env: PICTURA_ASPECT_RATIO
    pub aspect_ratio: String,

    #[clap(long, default_value_t = DEFAULT_REQUEST_DELAY_SECS, env = "PICTURA_REQUEST_DELAY_SECS")]
    /// Pause before each outbound call, in seconds.
    /// Env: PICTURA_REQUEST_DELAY_SECS
    pub request_delay_secs: u64,
    #[clap(long, default_value_t = DEFAULT_SUCCESS_COOLDOWN_SECS, env = "PICTURA_SUCCESS_COOLDOWN_SECS")]
    /// Cooldown after a successful generation, in seconds.
    /// Env: PICTURA_SUCCESS_COOLDOWN_SECS
    pub success_cooldown_secs: u64,
    #[clap(long, default_value_t = DEFAULT_THROTTLE_COOLDOWN_SECS, env = "PICTURA_THROTTLE_COOLDOWN_SECS")]
    /// Cooldown after the remote throttles us (HTTP 429), in seconds.
    /// Env: PICTURA_THROTTLE_COOLDOWN_SECS
    pub throttle_cooldown_secs: u64,
}
