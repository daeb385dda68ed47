// crates/failcore-core/src/validators/drift.rs
// ============================================================================
// Module: Failcore Drift Analyser
// Description: Post-run structural drift over observed parameter histories.
// Purpose: Surface parameter-level deviation from a tool's baseline.
// Dependencies: crate::{core, parsers, validators}, serde, serde_json
// ============================================================================

//! ## Overview
//! The drift analyser runs after a completed run over the per-tool history
//! of observed parameters. A baseline is selected per field using the
//! configured strategy, paths are normalised to directory-plus-extension
//! patterns, and set-valued fields compare order-insensitively. WARN
//! decisions are emitted at inflection points (the step where a field first
//! deviates from its previous value) and at steps whose numeric magnitude
//! crosses the high threshold. Drift is always informational; it never
//! blocks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::context::Params;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::ErrorCode;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::hashing::ContentHash;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;
use crate::core::identifiers::ValidatorId;
use crate::parsers::parse_path;
use crate::validators::ID_DRIFT;
use crate::validators::ValidatorSettings;
use crate::validators::setting_bool;
use crate::validators::setting_str;
use crate::validators::setting_str_list;

// ============================================================================
// SECTION: Input Records
// ============================================================================

/// One observed step in a completed run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepParamsRecord {
    /// Trace sequence number of the ATTEMPT.
    pub seq: u64,
    /// Step identifier.
    pub step_id: StepId,
    /// Tool invoked.
    pub tool: ToolName,
    /// Observed parameters.
    pub params: Params,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Baseline selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStrategy {
    /// First observed value per field.
    FirstOccurrence,
    /// Median for numeric fields, modal value otherwise.
    #[default]
    Median,
    /// Configured percentile for numeric fields, modal value otherwise.
    Percentile,
    /// Baseline drawn from the first half of the history.
    Segmented,
}

impl BaselineStrategy {
    /// Returns the stable label recorded in evidence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstOccurrence => "first_occurrence",
            Self::Median => "median",
            Self::Percentile => "percentile",
            Self::Segmented => "segmented",
        }
    }
}

/// Drift analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Baseline selection strategy.
    #[serde(default)]
    pub strategy: BaselineStrategy,
    /// Percentile used by [`BaselineStrategy::Percentile`].
    #[serde(default = "default_percentile")]
    pub percentile: u8,
    /// Fields excluded from comparison.
    #[serde(default)]
    pub ignore_fields: Vec<String>,
    /// Fields compared as unordered sets.
    #[serde(default)]
    pub unordered_set_fields: Vec<String>,
    /// Normalise path-like values to directory-plus-extension patterns.
    #[serde(default = "default_true")]
    pub normalise_paths: bool,
    /// Numeric ratio at which a change counts as medium drift.
    #[serde(default = "default_medium")]
    pub magnitude_threshold_medium: f64,
    /// Numeric ratio at which a change counts as high drift.
    #[serde(default = "default_high")]
    pub magnitude_threshold_high: f64,
}

/// Serde default helper.
const fn default_percentile() -> u8 {
    90
}
/// Serde default helper.
const fn default_true() -> bool {
    true
}
/// Serde default helper.
const fn default_medium() -> f64 {
    2.0
}
/// Serde default helper.
const fn default_high() -> f64 {
    5.0
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            strategy: BaselineStrategy::default(),
            percentile: default_percentile(),
            ignore_fields: Vec::new(),
            unordered_set_fields: Vec::new(),
            normalise_paths: true,
            magnitude_threshold_medium: default_medium(),
            magnitude_threshold_high: default_high(),
        }
    }
}

// ============================================================================
// SECTION: Normalised Values
// ============================================================================

/// Comparable normalised field value.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    /// Numeric value.
    Number(f64),
    /// Path normalised to a directory-plus-extension pattern.
    PathPattern(String),
    /// Opaque text, compared by content.
    Text(String),
}

impl FieldValue {
    /// Returns the evidence rendering; opaque text becomes a hash.
    fn evidence_form(&self) -> Value {
        match self {
            Self::Number(value) => json!(value),
            Self::PathPattern(pattern) => json!(pattern),
            Self::Text(text) => json!(format!("hash:{}", ContentHash::of_str(text).short())),
        }
    }
}

// ============================================================================
// SECTION: Drift Analyser
// ============================================================================

/// Post-run drift analysis entry point.
#[derive(Debug, Clone, Default)]
pub struct DriftAnalyzer {
    /// Analysis configuration.
    config: DriftConfig,
}

impl DriftAnalyzer {
    /// Creates an analyser over a configuration.
    #[must_use]
    pub const fn new(config: DriftConfig) -> Self {
        Self {
            config,
        }
    }

    /// Builds the analyser from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        let strategy = setting_str(settings, "strategy")
            .and_then(|raw| serde_json::from_value(Value::String(raw)).ok())
            .unwrap_or_default();
        let config = DriftConfig {
            strategy,
            percentile: settings
                .get("percentile")
                .and_then(Value::as_u64)
                .and_then(|value| u8::try_from(value).ok())
                .unwrap_or_else(default_percentile),
            ignore_fields: setting_str_list(settings, "ignore_fields"),
            unordered_set_fields: setting_str_list(settings, "unordered_set_fields"),
            normalise_paths: setting_bool(settings, "normalise_paths", true),
            magnitude_threshold_medium: settings
                .get("magnitude_threshold_medium")
                .and_then(Value::as_f64)
                .unwrap_or_else(default_medium),
            magnitude_threshold_high: settings
                .get("magnitude_threshold_high")
                .and_then(Value::as_f64)
                .unwrap_or_else(default_high),
        };
        Self::new(config)
    }

    /// Analyses a completed run's history into WARN decisions.
    #[must_use]
    pub fn analyze(&self, records: &[StepParamsRecord]) -> Vec<DecisionV1> {
        let mut by_tool: BTreeMap<&ToolName, Vec<&StepParamsRecord>> = BTreeMap::new();
        for record in records {
            by_tool.entry(&record.tool).or_default().push(record);
        }

        let mut decisions = Vec::new();
        for (tool, history) in by_tool {
            if history.len() < 2 {
                continue;
            }
            decisions.extend(self.analyze_tool(tool, &history));
        }
        decisions
    }

    /// Analyses one tool's ordered history.
    fn analyze_tool(&self, tool: &ToolName, history: &[&StepParamsRecord]) -> Vec<DecisionV1> {
        let window = (
            history.iter().map(|record| record.seq).min().unwrap_or(0),
            history.iter().map(|record| record.seq).max().unwrap_or(0),
        );
        let fields = self.field_names(history);
        let baselines: BTreeMap<&String, FieldValue> = fields
            .iter()
            .filter_map(|field| self.baseline(field, history).map(|value| (field, value)))
            .collect();

        let mut decisions = Vec::new();
        let mut previous: BTreeMap<&String, FieldValue> = BTreeMap::new();
        for record in history {
            let mut changes = Vec::new();
            let mut worst = RiskLevel::Low;
            for field in &fields {
                let Some(observed) = self.normalised(field, record) else {
                    continue;
                };
                let Some(baseline) = baselines.get(field) else {
                    continue;
                };
                let deviation = compare(baseline, &observed, &self.config);
                let inflection = previous.get(field).is_none_or(|prior| prior != &observed);
                if let Some((reason, risk)) = deviation
                    && (inflection || risk == RiskLevel::High)
                {
                    changes.push(json!({
                        "field": field,
                        "reason": reason,
                        "baseline": baseline.evidence_form(),
                        "observed": observed.evidence_form(),
                    }));
                    if risk > worst {
                        worst = risk;
                    }
                }
                previous.insert(field, observed);
            }
            if changes.is_empty() {
                continue;
            }
            let mut decision = DecisionV1::new(
                ValidatorId::new(ID_DRIFT),
                ErrorCode::ContractDrift,
                Verdict::Warn,
                worst.max(RiskLevel::Medium),
                DecisionDomain::Drift,
                format!("parameters of tool '{tool}' drifted from their baseline"),
            );
            decision.evidence.insert("strategy".to_string(), json!(self.config.strategy.as_str()));
            decision.evidence.insert("window".to_string(), json!([window.0, window.1]));
            decision.evidence.insert("seq".to_string(), json!(record.seq));
            decision.evidence.insert("step_id".to_string(), json!(record.step_id));
            decision.evidence.insert("changes".to_string(), json!(changes));
            decisions.push(decision);
        }
        decisions
    }

    /// Collects the comparable field names across a history.
    fn field_names(&self, history: &[&StepParamsRecord]) -> Vec<String> {
        let mut names = BTreeSet::new();
        for record in history {
            for name in record.params.keys() {
                if !self.config.ignore_fields.contains(name) {
                    names.insert(name.clone());
                }
            }
        }
        names.into_iter().collect()
    }

    /// Returns the normalised value of one field in one record.
    fn normalised(&self, field: &str, record: &StepParamsRecord) -> Option<FieldValue> {
        let value = record.params.get(field)?;
        Some(self.normalise_value(field, value))
    }

    /// Normalises one raw value for comparison.
    fn normalise_value(&self, field: &str, value: &Value) -> FieldValue {
        if let Some(number) = value.as_f64() {
            return FieldValue::Number(number);
        }
        if let Value::Array(items) = value
            && self.config.unordered_set_fields.iter().any(|name| name == field)
        {
            let mut rendered: Vec<String> =
                items.iter().map(std::string::ToString::to_string).collect();
            rendered.sort();
            return FieldValue::Text(rendered.join(","));
        }
        if let Some(text) = value.as_str() {
            if self.config.normalise_paths && looks_like_path(text) {
                return FieldValue::PathPattern(path_pattern(text));
            }
            return FieldValue::Text(text.to_string());
        }
        FieldValue::Text(value.to_string())
    }

    /// Selects the baseline value of one field per the strategy.
    fn baseline(&self, field: &str, history: &[&StepParamsRecord]) -> Option<FieldValue> {
        let values: Vec<FieldValue> =
            history.iter().filter_map(|record| self.normalised(field, record)).collect();
        if values.is_empty() {
            return None;
        }
        let pool: &[FieldValue] = match self.config.strategy {
            BaselineStrategy::FirstOccurrence => return values.first().cloned(),
            BaselineStrategy::Segmented => &values[..values.len().div_ceil(2)],
            BaselineStrategy::Median | BaselineStrategy::Percentile => &values,
        };
        let numbers: Vec<f64> = pool
            .iter()
            .filter_map(|value| match value {
                FieldValue::Number(number) => Some(*number),
                FieldValue::PathPattern(_) | FieldValue::Text(_) => None,
            })
            .collect();
        if numbers.len() == pool.len() {
            let rank = if self.config.strategy == BaselineStrategy::Percentile {
                f64::from(self.config.percentile) / 100.0
            } else {
                0.5
            };
            return Some(FieldValue::Number(percentile_of(&numbers, rank)));
        }
        modal(pool)
    }
}

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Compares a value to its baseline; returns the change reason and risk.
fn compare(
    baseline: &FieldValue,
    observed: &FieldValue,
    config: &DriftConfig,
) -> Option<(&'static str, RiskLevel)> {
    match (baseline, observed) {
        (FieldValue::Number(base), FieldValue::Number(seen)) => {
            let low = base.abs().min(seen.abs()).max(f64::EPSILON);
            let high = base.abs().max(seen.abs());
            let ratio = high / low;
            if ratio >= config.magnitude_threshold_high {
                Some(("magnitude_changed", RiskLevel::High))
            } else if ratio >= config.magnitude_threshold_medium {
                Some(("magnitude_changed", RiskLevel::Medium))
            } else {
                None
            }
        }
        (FieldValue::PathPattern(base), FieldValue::PathPattern(seen)) => {
            (base != seen).then_some(("path_changed", RiskLevel::Medium))
        }
        (base, seen) => (base != seen).then_some(("value_changed", RiskLevel::Medium)),
    }
}

/// Returns the most frequent value; ties resolve to the earliest.
fn modal(values: &[FieldValue]) -> Option<FieldValue> {
    let mut best: Option<(usize, &FieldValue)> = None;
    for candidate in values {
        let count = values.iter().filter(|value| *value == candidate).count();
        let better = best.is_none_or(|(best_count, _)| count > best_count);
        if better {
            best = Some((count, candidate));
        }
    }
    best.map(|(_, value)| value.clone())
}

/// Returns the rank-percentile of a numeric sample.
fn percentile_of(numbers: &[f64], rank: f64) -> f64 {
    let mut sorted = numbers.to_vec();
    sorted.sort_by(f64::total_cmp);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "Sample sizes are small; rank indexing is safe."
    )]
    let index = ((sorted.len() - 1) as f64 * rank).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Heuristic path detection for normalisation.
fn looks_like_path(text: &str) -> bool {
    (text.contains('/') || text.contains('\\')) && !text.contains("://")
}

/// Reduces a path to a directory-plus-extension pattern.
fn path_pattern(text: &str) -> String {
    let ast = parse_path(text);
    let mut segments = ast.segments.clone();
    let file = segments.pop().unwrap_or_default();
    let extension = file.rsplit_once('.').map(|(_, ext)| ext.to_string());
    let directory = if ast.absolute {
        format!("/{}", segments.join("/"))
    } else {
        segments.join("/")
    };
    match extension {
        Some(ext) => format!("{directory}/*.{ext}"),
        None => format!("{directory}/*"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::BaselineStrategy;
    use super::DriftAnalyzer;
    use super::DriftConfig;
    use super::StepParamsRecord;
    use crate::core::context::Params;
    use crate::core::decision::Verdict;

    /// Builds a `file_write` record.
    fn record(seq: u64, path: &str) -> StepParamsRecord {
        let mut params = Params::new();
        params.insert("path".to_string(), json!(path));
        StepParamsRecord {
            seq,
            step_id: format!("step-{seq}").into(),
            tool: "file_write".into(),
            params,
        }
    }

    /// Tests the path inflection scenario: drift flagged at the switch step.
    #[test]
    fn test_path_inflection() {
        let mut records = Vec::new();
        for seq in 1..=6 {
            records.push(record(seq, &format!("./data/app{seq}.log")));
        }
        for seq in 7..=10 {
            records.push(record(seq, &format!("/etc/conf{seq}.conf")));
        }
        let analyzer = DriftAnalyzer::new(DriftConfig::default());
        let decisions = analyzer.analyze(&records);

        assert_eq!(decisions.len(), 1, "only the inflection step should fire");
        let decision = &decisions[0];
        assert_eq!(decision.decision, Verdict::Warn);
        assert_eq!(decision.evidence.get("seq"), Some(&json!(7)));
        assert_eq!(decision.evidence.get("strategy"), Some(&json!("median")));
        assert_eq!(decision.evidence.get("window"), Some(&json!([1, 10])));
        let changes = decision.evidence.get("changes").unwrap().as_array().unwrap();
        assert_eq!(changes[0]["reason"], json!("path_changed"));
    }

    /// Tests numeric magnitude thresholds.
    #[test]
    fn test_magnitude_thresholds() {
        let mut records = Vec::new();
        for (seq, size) in [(1, 100.0), (2, 110.0), (3, 105.0), (4, 900.0)] {
            let mut params = Params::new();
            params.insert("size".to_string(), json!(size));
            records.push(StepParamsRecord {
                seq,
                step_id: format!("step-{seq}").into(),
                tool: "alloc".into(),
                params,
            });
        }
        let analyzer = DriftAnalyzer::new(DriftConfig::default());
        let decisions = analyzer.analyze(&records);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].evidence.get("seq"), Some(&json!(4)));
    }

    /// Tests ignored fields never drift.
    #[test]
    fn test_ignore_fields() {
        let records =
            vec![record(1, "./data/a.log"), record(2, "./data/b.log"), record(3, "/etc/x.conf")];
        let analyzer = DriftAnalyzer::new(DriftConfig {
            ignore_fields: vec!["path".to_string()],
            ..DriftConfig::default()
        });
        assert!(analyzer.analyze(&records).is_empty());
    }

    /// Tests unordered set fields compare order-insensitively.
    #[test]
    fn test_unordered_sets() {
        let mut records = Vec::new();
        for (seq, tags) in [(1, json!(["a", "b"])), (2, json!(["b", "a"]))] {
            let mut params = Params::new();
            params.insert("tags".to_string(), tags);
            records.push(StepParamsRecord {
                seq,
                step_id: format!("step-{seq}").into(),
                tool: "label".into(),
                params,
            });
        }
        let analyzer = DriftAnalyzer::new(DriftConfig {
            unordered_set_fields: vec!["tags".to_string()],
            ..DriftConfig::default()
        });
        assert!(analyzer.analyze(&records).is_empty());
    }

    /// Tests first-occurrence baselines flag later deviation only.
    #[test]
    fn test_first_occurrence_strategy() {
        let records =
            vec![record(1, "./data/a.log"), record(2, "./data/b.log"), record(3, "/etc/x.conf")];
        let analyzer = DriftAnalyzer::new(DriftConfig {
            strategy: BaselineStrategy::FirstOccurrence,
            ..DriftConfig::default()
        });
        let decisions = analyzer.analyze(&records);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].evidence.get("seq"), Some(&json!(3)));
    }
}
