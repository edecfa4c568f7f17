//! Configuration loading and validation for the scene validator.
//!
//! A `ValidatorConfig` is assembled from three layers, lowest priority first:
//! built-in defaults, an optional TOML file, then environment variables
//! prefixed `SCENE_SENTINEL_`. Validation happens once, at load time; a
//! failure here is the only kind of failure that can prevent the process
//! from becoming operational, so it is surfaced with enough detail to act on.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid environment variable {name}: {value}")]
    BadEnvVar { name: String, value: String },
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
    #[error("inventory_dir {0} does not exist")]
    InventoryDirMissing(PathBuf),
    #[error("invalid regular expression in name_patterns: {0}")]
    BadPattern(#[from] regex::Error),
}

/// Top-level validated configuration. Field groups mirror the component that
/// consumes them (timing for C7/C8, rate limits and circuit breaker for C7,
/// tolerances for C4, filters for C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub inventory_dir: PathBuf,
    pub entity_registry_path: PathBuf,
    pub timing: TimingConfig,
    pub rate_limits: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub tolerances: ToleranceConfig,
    pub filters: FilterConfig,
    pub debug_logging: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            inventory_dir: PathBuf::from("/etc/scene-sentinel/inventory"),
            entity_registry_path: PathBuf::from(
                "/homeassistant/.storage/core.entity_registry",
            ),
            timing: TimingConfig::default(),
            rate_limits: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            tolerances: ToleranceConfig::default(),
            filters: FilterConfig::default(),
            debug_logging: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "duration_secs")]
    pub transition_delay: Duration,
    #[serde(with = "duration_secs")]
    pub validation_delay: Duration,
    #[serde(with = "duration_secs")]
    pub level3_settle_delay: Duration,
    #[serde(with = "duration_secs")]
    pub debounce_window: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            transition_delay: Duration::from_secs(5),
            validation_delay: Duration::from_secs(2),
            level3_settle_delay: Duration::from_secs(2),
            debounce_window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_global_per_min: u32,
    pub max_scene_per_min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_global_per_min: 20,
            max_scene_per_min: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    pub brightness_tolerance: f64,
    pub color_tolerance: f64,
    pub color_temp_tolerance: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            brightness_tolerance: 5.0,
            color_tolerance: 0.01,
            color_temp_tolerance: 50.0,
        }
    }
}

/// Raw filter configuration as loaded from file/env. `name_patterns` is kept
/// as source strings here; the gating layer compiles them once at
/// construction rather than per comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include_labels: Vec<String>,
    pub exclude_labels: Vec<String>,
    pub exclude_uids: Vec<String>,
    pub name_patterns: Vec<String>,
}

impl ValidatorConfig {
    /// Load defaults, overlay an optional TOML file, overlay environment
    /// variables, then validate. `path` absent is not an error: the process
    /// runs on defaults plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("SCENE_SENTINEL_INVENTORY_DIR") {
            self.inventory_dir = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SCENE_SENTINEL_ENTITY_REGISTRY_PATH") {
            self.entity_registry_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SCENE_SENTINEL_DEBUG_LOGGING") {
            self.debug_logging = parse_bool_env("SCENE_SENTINEL_DEBUG_LOGGING", &value)?;
        }
        if let Ok(value) = env::var("SCENE_SENTINEL_MAX_GLOBAL_PER_MIN") {
            self.rate_limits.max_global_per_min =
                parse_u32_env("SCENE_SENTINEL_MAX_GLOBAL_PER_MIN", &value)?;
        }
        if let Ok(value) = env::var("SCENE_SENTINEL_MAX_SCENE_PER_MIN") {
            self.rate_limits.max_scene_per_min =
                parse_u32_env("SCENE_SENTINEL_MAX_SCENE_PER_MIN", &value)?;
        }
        Ok(())
    }

    /// Validate cross-field and filesystem invariants. Called once at
    /// startup; failures here are fatal (§7 ConfigError).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.inventory_dir.exists() {
            return Err(ConfigError::InventoryDirMissing(self.inventory_dir.clone()));
        }
        if self.timing.transition_delay.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "timing.transition_delay",
            });
        }
        if self.timing.validation_delay.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "timing.validation_delay",
            });
        }
        if self.rate_limits.max_global_per_min == 0 {
            return Err(ConfigError::MustBePositive {
                field: "rate_limits.max_global_per_min",
            });
        }
        if self.rate_limits.max_scene_per_min == 0 {
            return Err(ConfigError::MustBePositive {
                field: "rate_limits.max_scene_per_min",
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::MustBePositive {
                field: "circuit_breaker.failure_threshold",
            });
        }
        for pattern in &self.filters.name_patterns {
            regex::Regex::new(pattern)?;
        }
        if self.debug_logging {
            info!("debug logging enabled: gate rejections will log at info");
        }
        Ok(())
    }

    /// A copy of this config with filesystem-derived secrets or paths
    /// redacted, suitable for logging at startup. There is nothing secret in
    /// this configuration today, but the hook mirrors how larger configs in
    /// this codebase mask sensitive fields before logging them.
    pub fn masked_for_logging(&self) -> Self {
        self.clone()
    }
}

fn parse_bool_env(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => {
            warn!(name, value, "unrecognized boolean environment override");
            Err(ConfigError::BadEnvVar {
                name: name.to_string(),
                value: value.to_string(),
            })
        }
    }
}

fn parse_u32_env(name: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadEnvVar {
        name: name.to_string(),
        value: value.to_string(),
    })
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
