//! Engine configuration with hierarchical merging.

use std::path::Path;
use std::time::Duration;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::IntensityProfile;
use crate::{
    COLLECTION_BUDGET_MS, CONFIDENT_CLAIM_THRESHOLD, DETECTOR_TIMEOUT_MS, GOVERNOR_THRESHOLD,
    LOOP_MAX_SILENCES, LOOP_PARADIGM_MISMATCH_THRESHOLD, LOOP_SILENCE_TIMEOUT_MS,
    PC_ATTEMPT_DECAY, SESSION_IDLE_TIMEOUT_SECS, SESSION_MAX_HISTORY, SESSION_SWEEP_INTERVAL_SECS,
};

/// Default project config file
pub const CONFIG_FILE: &str = "arbiter.yaml";

/// Environment prefix for overrides (`ARBITER_SESSION__IDLE_TIMEOUT_SECS=60`)
pub const ENV_PREFIX: &str = "ARBITER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Claims at or above this confidence are "confident"
    pub confident_threshold: f64,
    /// Governor forces the fallback below this confidence
    pub governor_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confident_threshold: CONFIDENT_CLAIM_THRESHOLD,
            governor_threshold: GOVERNOR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Soft budget; exceeding it only logs a warning
    pub budget_ms: u64,
    /// Hard per-detector timeout
    pub detector_timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            budget_ms: COLLECTION_BUDGET_MS,
            detector_timeout_ms: DETECTOR_TIMEOUT_MS,
        }
    }
}

impl CollectorConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: SESSION_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: SESSION_SWEEP_INTERVAL_SECS,
            max_history: SESSION_MAX_HISTORY,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopingConfig {
    /// Profile used when a turn does not carry one
    pub default_profile: IntensityProfile,
    pub silence_timeout_ms: u64,
    pub paradigm_mismatch_threshold: u32,
    pub max_silences: u32,
}

impl Default for LoopingConfig {
    fn default() -> Self {
        Self {
            default_profile: IntensityProfile::Full,
            silence_timeout_ms: LOOP_SILENCE_TIMEOUT_MS,
            paradigm_mismatch_threshold: LOOP_PARADIGM_MISMATCH_THRESHOLD,
            max_silences: LOOP_MAX_SILENCES,
        }
    }
}

impl LoopingConfig {
    pub fn silence_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.silence_timeout_ms as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub ring_capacity: usize,
    pub alert_window_secs: u64,
    pub alert_threshold: usize,
    pub critical_threshold: usize,
    pub default_locale: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 100,
            alert_window_secs: 900,
            alert_threshold: 3,
            critical_threshold: 5,
            default_locale: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptConfig {
    /// Protocol confidence multiplier per prior attempt
    pub attempt_decay: f64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self { attempt_decay: PC_ATTEMPT_DECAY }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArbiterConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub looping: LoopingConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub interrupt: InterruptConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `arbiter.yaml` in the working directory (optional)
    /// 3. Environment variables (`ARBITER_*`, `__` separates sections)
    pub fn load() -> Result<ArbiterConfig, ConfigError> {
        Self::load_from(Figment::new()
            .merge(Serialized::defaults(ArbiterConfig::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from a specific file, environment still wins
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<ArbiterConfig, ConfigError> {
        Self::load_from(Figment::new()
            .merge(Serialized::defaults(ArbiterConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn load_from(figment: Figment) -> Result<ArbiterConfig, ConfigError> {
        let config: ArbiterConfig = figment.extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &ArbiterConfig) -> Result<(), ConfigError> {
        let unit = [
            ("resolver.confident_threshold", config.resolver.confident_threshold),
            ("resolver.governor_threshold", config.resolver.governor_threshold),
            ("interrupt.attempt_decay", config.interrupt.attempt_decay),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }

        if config.resolver.governor_threshold < config.resolver.confident_threshold {
            return Err(ConfigError::GovernorBelowConfident {
                governor: config.resolver.governor_threshold,
                confident: config.resolver.confident_threshold,
            });
        }

        if config.safety.alert_threshold >= config.safety.critical_threshold {
            return Err(ConfigError::SafetyThresholds {
                alert: config.safety.alert_threshold,
                critical: config.safety.critical_threshold,
            });
        }

        let positive = [
            ("collector.budget_ms", config.collector.budget_ms),
            ("collector.detector_timeout_ms", config.collector.detector_timeout_ms),
            ("session.idle_timeout_secs", config.session.idle_timeout_secs),
            ("session.sweep_interval_secs", config.session.sweep_interval_secs),
            ("session.max_history", config.session.max_history as u64),
            ("safety.ring_capacity", config.safety.ring_capacity as u64),
            ("looping.paradigm_mismatch_threshold", config.looping.paradigm_mismatch_threshold as u64),
            ("looping.max_silences", config.looping.max_silences as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        match config.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}
