//! Engine behaviour: directories, depth caps, background cadences, and
//! self-improvement feature flags.

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ConfigValidationError;

/// Core engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Directory holding per-process caches (pattern cache files).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Flat directory of tool source files.
    #[serde(default = "default_tool_directory")]
    pub tool_directory: PathBuf,
    /// Interpreter command the process sandbox runs.
    #[serde(default = "default_sandbox_command")]
    pub sandbox_command: String,
    /// Hard recursion cap for the orchestrator.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Seconds between autonomous health investigations.
    #[serde(default = "default_investigation_interval")]
    pub investigation_interval_secs: u64,
    /// Health score under which critical status alerts.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Seconds between statistics rollups.
    #[serde(default = "default_statistics_interval")]
    pub statistics_interval_secs: u64,
    /// Seconds between improvement cycles.
    #[serde(default = "default_improvement_interval")]
    pub improvement_interval_secs: u64,
    /// When false, improvements are placeholders and never touch disk.
    #[serde(default)]
    pub enable_real_improvements: bool,
    /// When false, validated improvements queue for manual review.
    #[serde(default)]
    pub enable_auto_improvement: bool,
    /// Minimum executions before a tool is eligible for improvement.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: i64,
    /// Validation confidence the auto-deploy gate requires.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Redis URL for the event bus; unset means in-memory events only.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Channel engine events are published on.
    #[serde(default = "default_events_channel")]
    pub events_channel: String,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("var/cache")
}

fn default_tool_directory() -> PathBuf {
    PathBuf::from("var/tools")
}

fn default_sandbox_command() -> String {
    "python3".to_string()
}

fn default_max_depth() -> u32 {
    8
}

fn default_investigation_interval() -> u64 {
    300
}

fn default_alert_threshold() -> f64 {
    0.6
}

fn default_statistics_interval() -> u64 {
    600
}

fn default_improvement_interval() -> u64 {
    3_600
}

fn default_min_sample_size() -> i64 {
    5
}

fn default_confidence_threshold() -> f64 {
    0.80
}

fn default_events_channel() -> String {
    "synapse.events".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            tool_directory: default_tool_directory(),
            sandbox_command: default_sandbox_command(),
            max_depth: default_max_depth(),
            investigation_interval_secs: default_investigation_interval(),
            alert_threshold: default_alert_threshold(),
            statistics_interval_secs: default_statistics_interval(),
            improvement_interval_secs: default_improvement_interval(),
            enable_real_improvements: false,
            enable_auto_improvement: false,
            min_sample_size: default_min_sample_size(),
            confidence_threshold: default_confidence_threshold(),
            redis_url: None,
            events_channel: default_events_channel(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_depth == 0 {
            return Err(ConfigValidationError::invalid(
                "engine.max_depth",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(ConfigValidationError::invalid(
                "engine.alert_threshold",
                "must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigValidationError::invalid(
                "engine.confidence_threshold",
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_thresholds_fail() {
        let config = EngineConfig {
            alert_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn improvement_flags_default_off() {
        let config = EngineConfig::default();
        assert!(!config.enable_real_improvements);
        assert!(!config.enable_auto_improvement);
    }
}
