//! Configuration system for the `lmschat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/lmschat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::directory::DEFAULT_ONLINE_PROBABILITY;
use crate::view::NARROW_BREAKPOINT;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A probability outside `0.0..=1.0` (or NaN).
    #[error("{key} must be between 0 and 1, got {value}")]
    InvalidProbability {
        /// Config key, e.g. `delivery.reply_probability`.
        key: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Clamp a probability into `0.0..=1.0`. NaN counts as never.
#[must_use]
pub fn probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    delivery: DeliveryFileConfig,
    retry: RetryFileConfig,
    view: ViewFileConfig,
    roster: RosterFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
    seed: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[delivery]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DeliveryFileConfig {
    reply_probability: Option<f64>,
    reply_delay_min_ms: Option<u64>,
    reply_delay_max_ms: Option<u64>,
    upload_tick_ms: Option<u64>,
    upload_step: Option<u8>,
    upload_duration_ms: Option<u64>,
    ack_delay_ms: Option<u64>,
    online_probability: Option<f64>,
}

/// `[retry]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RetryFileConfig {
    send_retries: Option<u32>,
    backoff_ms: Option<u64>,
}

/// `[view]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ViewFileConfig {
    narrow_breakpoint: Option<u32>,
    initial_width: Option<u32>,
}

/// `[roster]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RosterFileConfig {
    path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Timing and probabilities of the delivery simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Chance that an outgoing text message gets a reply.
    pub reply_probability: f64,
    /// Lower bound (inclusive) of the reply delay.
    pub reply_delay_min: Duration,
    /// Upper bound (exclusive) of the reply delay.
    pub reply_delay_max: Duration,
    /// Interval between upload progress ticks.
    pub upload_tick: Duration,
    /// Progress points added per tick.
    pub upload_step: u8,
    /// Time from upload start to completion.
    pub upload_duration: Duration,
    /// Delay before the counterpart acknowledges a received file.
    pub ack_delay: Duration,
    /// Chance that a directory entry is shown as online.
    pub online_probability: f64,
}

impl DeliveryConfig {
    /// Check that both probabilities are within `0.0..=1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProbability`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("delivery.reply_probability", self.reply_probability),
            ("delivery.online_probability", self.online_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { key, value });
            }
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            reply_probability: 0.5,
            reply_delay_min: Duration::from_millis(1000),
            reply_delay_max: Duration::from_millis(3000),
            upload_tick: Duration::from_millis(100),
            upload_step: 10,
            upload_duration: Duration::from_millis(1000),
            ack_delay: Duration::from_millis(1500),
            online_probability: DEFAULT_ONLINE_PROBABILITY,
        }
    }
}

/// Retry policy for appends that fail with a transient store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub send_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            send_retries: 2,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Everything a `ChatSession` needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Delivery simulator settings.
    pub delivery: DeliveryConfig,
    /// Append retry policy.
    pub retry: RetryConfig,
    /// Viewport width at or below which the layout is narrow.
    pub narrow_breakpoint: u32,
    /// Viewport width at session start.
    pub initial_width: u32,
    /// Buffer size for the session event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            retry: RetryConfig::default(),
            narrow_breakpoint: NARROW_BREAKPOINT,
            initial_width: 1280,
            event_buffer: 256,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    /// User to sign in as when no session is stored.
    pub user_id: Option<String>,
    /// Seed for the simulator rng. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Roster file; `None` uses the built-in roster.
    pub roster_path: Option<PathBuf>,
    /// Session settings.
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/lmschat/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or holds an out-of-range probability.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.session.delivery.validate()?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let d = &defaults.session.delivery;
        let f = &file.delivery;

        let delivery = DeliveryConfig {
            reply_probability: f.reply_probability.unwrap_or(d.reply_probability),
            reply_delay_min: f
                .reply_delay_min_ms
                .map_or(d.reply_delay_min, Duration::from_millis),
            reply_delay_max: f
                .reply_delay_max_ms
                .map_or(d.reply_delay_max, Duration::from_millis),
            upload_tick: f
                .upload_tick_ms
                .map_or(d.upload_tick, Duration::from_millis),
            upload_step: f.upload_step.unwrap_or(d.upload_step),
            upload_duration: f
                .upload_duration_ms
                .map_or(d.upload_duration, Duration::from_millis),
            ack_delay: f.ack_delay_ms.map_or(d.ack_delay, Duration::from_millis),
            online_probability: f.online_probability.unwrap_or(d.online_probability),
        };

        let retry = RetryConfig {
            send_retries: file
                .retry
                .send_retries
                .unwrap_or(defaults.session.retry.send_retries),
            backoff: file
                .retry
                .backoff_ms
                .map_or(defaults.session.retry.backoff, Duration::from_millis),
        };

        Self {
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.session.user_id.clone()),
            seed: cli.seed.or(file.session.seed),
            roster_path: cli.roster.clone().or_else(|| file.roster.path.clone()),
            session: SessionConfig {
                delivery,
                retry,
                narrow_breakpoint: file
                    .view
                    .narrow_breakpoint
                    .unwrap_or(defaults.session.narrow_breakpoint),
                initial_width: cli
                    .width
                    .or(file.view.initial_width)
                    .unwrap_or(defaults.session.initial_width),
                event_buffer: file
                    .session
                    .event_buffer
                    .unwrap_or(defaults.session.event_buffer),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Classroom messaging simulator")]
pub struct CliArgs {
    /// User to sign in as (overrides the stored session).
    #[arg(long, env = "LMSCHAT_USER")]
    pub user_id: Option<String>,

    /// Seed for presence and reply randomness.
    #[arg(long, env = "LMSCHAT_SEED")]
    pub seed: Option<u64>,

    /// Initial viewport width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Path to config file (default: `~/.config/lmschat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to a TOML roster file (default: built-in demo roster).
    #[arg(long)]
    pub roster: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "LMSCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/lmschat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("lmschat").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
