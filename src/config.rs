//! Scheduler configuration.
//!
//! # Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: builder methods on [`SchedulerConfig`]
//! 2. **Environment variables**: `PROMISSORY_*`
//! 3. **Config file**: TOML (requires the `config-file` feature)
//! 4. **Defaults**: [`SchedulerConfig::default()`]
//!
//! # Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PROMISSORY_TICK_INTERVAL_US` | `u64` | `tick_interval` (microseconds) |
//! | `PROMISSORY_CLOCK` | `wall` / `virtual` | `clock` |
//! | `PROMISSORY_REPORT_UNHANDLED` | `bool` | `report_unhandled_rejections` |
//! | `PROMISSORY_MAX_TICKS` | `u64` (0 = unbounded) | `max_ticks` |

use std::time::Duration;
use thiserror::Error;

/// Environment variable for the tick interval in microseconds.
pub const ENV_TICK_INTERVAL_US: &str = "PROMISSORY_TICK_INTERVAL_US";
/// Environment variable selecting the clock (`wall` or `virtual`).
pub const ENV_CLOCK: &str = "PROMISSORY_CLOCK";
/// Environment variable toggling the unhandled-rejection log warning.
pub const ENV_REPORT_UNHANDLED: &str = "PROMISSORY_REPORT_UNHANDLED";
/// Environment variable bounding `block_on` (0 = unbounded).
pub const ENV_MAX_TICKS: &str = "PROMISSORY_MAX_TICKS";

/// One frame at 60 Hz: the smallest delay a timer can be scheduled for.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_nanos(16_666_667);

/// Errors produced while building a [`SchedulerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set to an unparseable value.
    #[error("invalid value for {var}: {reason}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
    /// A setting failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// The config file could not be read.
    #[cfg(feature = "config-file")]
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[cfg(feature = "config-file")]
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which clock the scheduler reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(rename_all = "lowercase"))]
pub enum ClockMode {
    /// Monotonic wall clock; idle waits sleep the thread.
    #[default]
    Wall,
    /// Manually advanced clock; idle waits jump straight to the next timer.
    Virtual,
}

impl ClockMode {
    fn parse(var: &'static str, val: &str) -> Result<Self, ConfigError> {
        match val.trim().to_lowercase().as_str() {
            "wall" | "real" => Ok(Self::Wall),
            "virtual" | "lab" => Ok(Self::Virtual),
            _ => Err(ConfigError::InvalidEnv {
                var,
                value: val.to_owned(),
                reason: "expected `wall` or `virtual`",
            }),
        }
    }
}

/// Configuration for the thread-local scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum timer granularity; shorter delays are clamped up to it.
    pub tick_interval: Duration,
    /// Clock source.
    pub clock: ClockMode,
    /// Emit a `warn!` record for every unhandled rejection.
    pub report_unhandled_rejections: bool,
    /// Upper bound on ticks spent inside `block_on`; `None` is unbounded.
    pub max_ticks: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            clock: ClockMode::Wall,
            report_unhandled_rejections: true,
            max_ticks: None,
        }
    }
}

impl SchedulerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration on a virtual clock, for deterministic tests.
    #[must_use]
    pub fn virtual_time() -> Self {
        Self {
            clock: ClockMode::Virtual,
            ..Self::default()
        }
    }

    /// Defaults with `PROMISSORY_*` overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the tick interval.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the clock mode.
    #[must_use]
    pub fn clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    /// Enables or disables the unhandled-rejection warning.
    #[must_use]
    pub fn report_unhandled_rejections(mut self, enabled: bool) -> Self {
        self.report_unhandled_rejections = enabled;
        self
    }

    /// Bounds `block_on` to `ticks` ticks.
    #[must_use]
    pub fn max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Checks that the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid("tick_interval must be non-zero".into()));
        }
        if self.max_ticks == Some(0) {
            return Err(ConfigError::Invalid(
                "max_ticks must be positive (omit it for unbounded)".into(),
            ));
        }
        Ok(())
    }
}

/// Applies `PROMISSORY_*` environment overrides to `config`.
///
/// Only variables that are set are applied. A set but unparseable variable is
/// an error rather than silently ignored.
pub fn apply_env_overrides(config: &mut SchedulerConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_TICK_INTERVAL_US) {
        config.tick_interval = Duration::from_micros(parse_u64(ENV_TICK_INTERVAL_US, &val)?);
    }
    if let Some(val) = read_env(ENV_CLOCK) {
        config.clock = ClockMode::parse(ENV_CLOCK, &val)?;
    }
    if let Some(val) = read_env(ENV_REPORT_UNHANDLED) {
        config.report_unhandled_rejections = parse_bool(ENV_REPORT_UNHANDLED, &val)?;
    }
    if let Some(val) = read_env(ENV_MAX_TICKS) {
        let ticks = parse_u64(ENV_MAX_TICKS, &val)?;
        config.max_ticks = (ticks > 0).then_some(ticks);
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: val.to_owned(),
        reason: "expected unsigned integer",
    })
}

fn parse_bool(var: &'static str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: val.to_owned(),
            reason: "expected bool (true/false/1/0/yes/no)",
        }),
    }
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML layout of the scheduler configuration.
///
/// ```toml
/// [scheduler]
/// tick_interval_us = 16667
/// clock = "virtual"
/// report_unhandled_rejections = false
/// max_ticks = 10000
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct TomlConfig {
    /// Scheduler section.
    #[serde(default)]
    pub scheduler: SchedulerToml,
}

/// `[scheduler]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SchedulerToml {
    /// Tick interval in microseconds.
    pub tick_interval_us: Option<u64>,
    /// Clock source.
    pub clock: Option<ClockMode>,
    /// Unhandled-rejection warning toggle.
    pub report_unhandled_rejections: Option<bool>,
    /// `block_on` tick bound (0 = unbounded).
    pub max_ticks: Option<u64>,
}

#[cfg(feature = "config-file")]
impl SchedulerConfig {
    /// Defaults, then `toml_str`, then environment overrides.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(toml_str)?;
        let mut config = Self::default();
        apply_toml_config(&mut config, &parsed);
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` and delegates to [`SchedulerConfig::from_toml_str`].
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

/// Applies the `Some` fields of a parsed TOML config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut SchedulerConfig, toml: &TomlConfig) {
    if let Some(us) = toml.scheduler.tick_interval_us {
        config.tick_interval = Duration::from_micros(us);
    }
    if let Some(clock) = toml.scheduler.clock {
        config.clock = clock;
    }
    if let Some(v) = toml.scheduler.report_unhandled_rejections {
        config.report_unhandled_rejections = v;
    }
    if let Some(ticks) = toml.scheduler.max_ticks {
        config.max_ticks = (ticks > 0).then_some(ticks);
    }
}
