//! Configuration for the voxcall demo.
//!
//! Everything is environment-driven: a `.env` file (loaded in `main` via
//! dotenvy) or process environment variables. There is no persisted state
//! and no config file format.
//!
//! # Variables
//! - `OPENAI_API_KEY`: long-lived secret used to mint session credentials
//! - `VOXCALL_MODEL`, `VOXCALL_INSTRUCTIONS`: session-creation parameters
//! - `VOXCALL_SESSIONS_URL`, `VOXCALL_REALTIME_URL`: endpoint overrides
//! - `VOXCALL_SESSION_ENDPOINT`: mint via a running proxy instead of the secret
//! - `VOXCALL_HOST`, `VOXCALL_PORT`: proxy bind address
//! - `VOXCALL_COMMIT_INTERVAL_MS`, `VOXCALL_CAPTURE_BUFFER`,
//!   `VOXCALL_PLAYBACK_SAMPLE_RATE`: session tuning

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{VoiceError, VoiceResult};

/// Default session-creation endpoint.
pub const DEFAULT_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";

/// Default realtime streaming endpoint (model appended as a query parameter).
pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Default session instructions sent when minting a credential.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a friendly, concise voice agent.";

/// Default period of the commit/response timer.
pub const DEFAULT_COMMIT_INTERVAL_MS: u64 = 1400;

/// Default capture buffer size in samples.
pub const DEFAULT_CAPTURE_BUFFER: usize = 4096;

/// Sample rate of inbound PCM16 fragments.
pub const DEFAULT_PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Demo configuration.
///
/// Covers both halves of the binary: the credential proxy (`serve`) and the
/// interactive voice client (`talk`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Long-lived secret for direct credential minting.
    /// Its absence is a hard failure at mint time, not at load time.
    pub openai_api_key: Option<String>,
    /// Realtime model requested at session creation and on the stream URL.
    pub model: String,
    /// Instructions sent in the session-creation body.
    pub instructions: String,
    /// Session-creation endpoint.
    pub sessions_url: Url,
    /// Realtime streaming endpoint.
    pub realtime_url: Url,
    /// When set, `talk` mints its credential from this proxy endpoint
    /// instead of calling the sessions endpoint with the secret.
    pub session_endpoint: Option<Url>,

    // Proxy server settings
    pub host: String,
    pub port: u16,

    // Session tuning
    /// Period of the commit/response timer while a connection is open.
    pub commit_interval_ms: u64,
    /// Capture buffer size in samples.
    pub capture_buffer: usize,
    /// Sample rate used to interpret inbound PCM16 fragments.
    pub playback_sample_rate: u32,
}

/// Zeroize the secret when the config is dropped so the key does not
/// linger in freed memory.
impl Drop for Config {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except the secret.
    pub fn from_env() -> VoiceResult<Self> {
        let config = Self {
            openai_api_key: env_var("OPENAI_API_KEY"),
            model: env_var("VOXCALL_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            instructions: env_var("VOXCALL_INSTRUCTIONS")
                .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            sessions_url: env_url("VOXCALL_SESSIONS_URL")?
                .unwrap_or_else(|| Url::parse(DEFAULT_SESSIONS_URL).unwrap()),
            realtime_url: env_url("VOXCALL_REALTIME_URL")?
                .unwrap_or_else(|| Url::parse(DEFAULT_REALTIME_URL).unwrap()),
            session_endpoint: env_url("VOXCALL_SESSION_ENDPOINT")?,
            host: env_var("VOXCALL_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parsed("VOXCALL_PORT")?.unwrap_or(8080),
            commit_interval_ms: env_parsed("VOXCALL_COMMIT_INTERVAL_MS")?
                .unwrap_or(DEFAULT_COMMIT_INTERVAL_MS),
            capture_buffer: env_parsed("VOXCALL_CAPTURE_BUFFER")?
                .unwrap_or(DEFAULT_CAPTURE_BUFFER),
            playback_sample_rate: env_parsed("VOXCALL_PLAYBACK_SAMPLE_RATE")?
                .unwrap_or(DEFAULT_PLAYBACK_SAMPLE_RATE),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate tuning values that would otherwise fail deep inside a
    /// session (a zero-period tokio interval panics).
    pub fn validate(&self) -> VoiceResult<()> {
        if self.commit_interval_ms == 0 {
            return Err(VoiceError::Config(
                "VOXCALL_COMMIT_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.capture_buffer == 0 {
            return Err(VoiceError::Config(
                "VOXCALL_CAPTURE_BUFFER must be greater than zero".to_string(),
            ));
        }
        if self.playback_sample_rate == 0 {
            return Err(VoiceError::Config(
                "VOXCALL_PLAYBACK_SAMPLE_RATE must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Proxy bind address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Commit/response timer period.
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an environment variable, reporting the variable name on
/// parse failure.
fn env_parsed<T>(name: &str) -> VoiceResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| VoiceError::Config(format!("{name}: invalid value {raw:?}: {e}"))),
    }
}

/// Read and parse an environment variable as a URL.
fn env_url(name: &str) -> VoiceResult<Option<Url>> {
    match env_var(name) {
        None => Ok(None),
        Some(raw) => Url::parse(&raw)
            .map(Some)
            .map_err(|e| VoiceError::Config(format!("{name}: invalid URL {raw:?}: {e}"))),
    }
}
