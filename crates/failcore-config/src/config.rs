// crates/failcore-config/src/config.rs
// ============================================================================
// Module: Failcore Configuration
// Description: Configuration loading and validation for Failcore.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: failcore-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits and
//! `deny_unknown_fields` on every section. Values have code defaults; the
//! file only overrides them and is optional. Options are flat, enumerated,
//! and deeply immutable after load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use failcore_core::Budget;
use failcore_core::SinkConfig;
use failcore_core::core::effects::BoundaryPreset;
use failcore_core::sink::FileSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "failcore.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "FAILCORE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Minimum accepted scan budget in characters.
const MIN_SCAN_CHARS: usize = 64;
/// Maximum accepted sink queue size.
const MAX_QUEUE_SIZE: usize = 1_048_576;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {cause}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying cause.
        cause: String,
    },
    /// The file exceeds the size cap.
    #[error("config file {path} exceeds {limit} bytes")]
    TooLarge {
        /// Offending path.
        path: PathBuf,
        /// Size cap in bytes.
        limit: usize,
    },
    /// The file failed to parse.
    #[error("invalid config: {0}")]
    Parse(String),
    /// A value failed cross-field validation.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Engine options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineSection {
    /// Directory holding policy documents.
    pub policy_dir: Option<PathBuf>,
    /// Registry source path; builtin content when absent.
    pub registry_source: Option<PathBuf>,
    /// Reject unknown trace fields outside extension points.
    pub strict_schema: bool,
}

/// DLP options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DlpSection {
    /// Guard mode: `block`, `sanitize`, or `warn`.
    pub mode: String,
    /// Redact matched content in trace evidence.
    pub redact: bool,
    /// Cap on scanned characters per parameter.
    pub max_scan_chars: usize,
}

impl Default for DlpSection {
    fn default() -> Self {
        Self {
            mode: "block".to_string(),
            redact: true,
            max_scan_chars: 16_384,
        }
    }
}

/// Semantic options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SemanticSection {
    /// Minimum rule severity evaluated.
    pub min_severity: u8,
    /// Category allowlist; all categories when empty.
    pub enabled_categories: Vec<String>,
}

impl Default for SemanticSection {
    fn default() -> Self {
        Self {
            min_severity: 1,
            enabled_categories: Vec::new(),
        }
    }
}

/// Effects options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EffectsSection {
    /// Declared boundary preset.
    pub boundary_preset: BoundaryPreset,
    /// Enforce the boundary with blocking decisions.
    pub enforce_boundary: bool,
}

/// Taint options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TaintSection {
    /// Propagation granularity: `whole` or `paths`.
    pub propagation_mode: String,
    /// Depth cap for flow chains.
    pub max_path_depth: usize,
}

impl Default for TaintSection {
    fn default() -> Self {
        Self {
            propagation_mode: "paths".to_string(),
            max_path_depth: 10,
        }
    }
}

/// Drift options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DriftSection {
    /// Analysis only; drift never blocks regardless.
    pub analysis_only: bool,
    /// Numeric ratio at which a change counts as medium drift.
    pub magnitude_threshold_medium: f64,
    /// Numeric ratio at which a change counts as high drift.
    pub magnitude_threshold_high: f64,
}

impl Default for DriftSection {
    fn default() -> Self {
        Self {
            analysis_only: true,
            magnitude_threshold_medium: 2.0,
            magnitude_threshold_high: 5.0,
        }
    }
}

/// Cost options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostSection {
    /// Total spend limit in USD.
    pub max_cost_usd: Option<f64>,
    /// Total token limit.
    pub max_tokens: Option<u64>,
    /// Total API call limit.
    pub max_api_calls: Option<u64>,
    /// Burn-rate limit in USD per minute.
    pub max_usd_per_minute: Option<f64>,
    /// Burn-rate limit in USD per hour.
    pub max_usd_per_hour: Option<f64>,
}

/// Sink options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SinkSection {
    /// Bounded queue capacity.
    pub queue_size: usize,
    /// Drop non-critical events when the queue is full.
    pub drop_on_full: bool,
    /// Durability point: `run_end` or `every_event`.
    pub file_sync_at: FileSyncMode,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            drop_on_full: true,
            file_sync_at: FileSyncMode::RunEnd,
        }
    }
}

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Root Failcore configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FailcoreConfig {
    /// Engine options.
    pub engine: EngineSection,
    /// DLP options.
    pub dlp: DlpSection,
    /// Semantic options.
    pub semantic: SemanticSection,
    /// Effects options.
    pub effects: EffectsSection,
    /// Taint options.
    pub taint: TaintSection,
    /// Drift options.
    pub drift: DriftSection,
    /// Cost options.
    pub cost: CostSection,
    /// Sink options.
    pub sink: SinkSection,
}

impl FailcoreConfig {
    /// Loads configuration from the given path, the `FAILCORE_CONFIG`
    /// environment variable, or `failcore.toml`; absent files yield the
    /// code defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on read failures, oversized files, parse
    /// failures, or invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path.map_or_else(
            || env::var(CONFIG_ENV_VAR).map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from),
            Path::to_path_buf,
        );
        if !resolved.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&resolved).map_err(|err| ConfigError::Io {
            path: resolved.clone(),
            cause: err.to_string(),
        })?;
        if raw.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path: resolved,
                limit: MAX_CONFIG_FILE_SIZE,
            });
        }
        Self::from_toml_str(&raw)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse failures or invalid values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation; fails closed on nonsense values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dlp.max_scan_chars < MIN_SCAN_CHARS {
            return Err(ConfigError::Invalid(format!(
                "dlp.max_scan_chars must be at least {MIN_SCAN_CHARS}"
            )));
        }
        if !matches!(self.dlp.mode.as_str(), "block" | "sanitize" | "warn") {
            return Err(ConfigError::Invalid(format!(
                "dlp.mode '{}' is not one of block, sanitize, warn",
                self.dlp.mode
            )));
        }
        if !matches!(self.taint.propagation_mode.as_str(), "whole" | "paths") {
            return Err(ConfigError::Invalid(format!(
                "taint.propagation_mode '{}' is not one of whole, paths",
                self.taint.propagation_mode
            )));
        }
        if !(1..=10).contains(&self.semantic.min_severity) {
            return Err(ConfigError::Invalid(
                "semantic.min_severity must be within 1..=10".to_string(),
            ));
        }
        if self.drift.magnitude_threshold_medium >= self.drift.magnitude_threshold_high {
            return Err(ConfigError::Invalid(
                "drift.magnitude_threshold_medium must be below the high threshold".to_string(),
            ));
        }
        if self.sink.queue_size == 0 || self.sink.queue_size > MAX_QUEUE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "sink.queue_size must be within 1..={MAX_QUEUE_SIZE}"
            )));
        }
        if let Some(limit) = self.cost.max_cost_usd
            && limit < 0.0
        {
            return Err(ConfigError::Invalid("cost.max_cost_usd must not be negative".to_string()));
        }
        Ok(())
    }

    /// Returns the budget the cost section describes.
    #[must_use]
    pub const fn budget(&self) -> Budget {
        Budget {
            max_cost_usd: self.cost.max_cost_usd,
            max_tokens: self.cost.max_tokens,
            max_api_calls: self.cost.max_api_calls,
            max_usd_per_minute: self.cost.max_usd_per_minute,
            max_usd_per_hour: self.cost.max_usd_per_hour,
        }
    }

    /// Returns the sink configuration the sink section describes.
    #[must_use]
    pub const fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            queue_size: self.sink.queue_size,
            drop_on_full: self.sink.drop_on_full,
            file_sync: self.sink.file_sync_at,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::FailcoreConfig;

    /// Tests defaults load from an empty document.
    #[test]
    fn test_defaults() {
        let config = FailcoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, FailcoreConfig::default());
        assert_eq!(config.sink.queue_size, 1024);
        assert!(config.sink.drop_on_full);
        assert_eq!(config.dlp.mode, "block");
    }

    /// Tests overrides apply over defaults.
    #[test]
    fn test_overrides() {
        let config = FailcoreConfig::from_toml_str(
            "[dlp]\nmode = \"sanitize\"\n\n[cost]\nmax_cost_usd = 0.5\n",
        )
        .unwrap();
        assert_eq!(config.dlp.mode, "sanitize");
        let budget = config.budget();
        assert_eq!(budget.max_cost_usd, Some(0.5));
        assert_eq!(config.semantic.min_severity, 1);
    }

    /// Tests unknown sections are rejected.
    #[test]
    fn test_unknown_section_rejected() {
        assert!(FailcoreConfig::from_toml_str("[surprise]\nx = 1\n").is_err());
    }

    /// Tests invalid values fail closed.
    #[test]
    fn test_invalid_values_rejected() {
        assert!(FailcoreConfig::from_toml_str("[dlp]\nmode = \"maybe\"\n").is_err());
        assert!(FailcoreConfig::from_toml_str("[dlp]\nmax_scan_chars = 8\n").is_err());
        assert!(FailcoreConfig::from_toml_str("[sink]\nqueue_size = 0\n").is_err());
        assert!(
            FailcoreConfig::from_toml_str(
                "[drift]\nmagnitude_threshold_medium = 9.0\nmagnitude_threshold_high = 5.0\n"
            )
            .is_err()
        );
    }
}
