// crates/failcore-core/src/core/effects.rs
// ============================================================================
// Module: Failcore Side-Effect Taxonomy
// Description: Closed effect types, categories, boundaries, and observed events.
// Purpose: Provide the declarative effect model used by validators and enrichers.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Side effects are classified into a closed taxonomy grouped by category.
//! A run declares an effect boundary (an allow-set of categories or types);
//! the effects validator rejects predicted effects outside the boundary and
//! the effects enricher annotates observed effects on EGRESS.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Effect Category
// ============================================================================

/// Broad side-effect category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCategory {
    /// Filesystem effects.
    Filesystem,
    /// Network effects.
    Network,
    /// Process effects.
    Process,
}

// ============================================================================
// SECTION: Effect Type
// ============================================================================

/// Closed set of concrete side-effect types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    /// Filesystem read.
    FilesystemRead,
    /// Filesystem write.
    FilesystemWrite,
    /// Filesystem delete.
    FilesystemDelete,
    /// Filesystem metadata change.
    FilesystemMetadata,
    /// Outbound network traffic.
    NetworkEgress,
    /// DNS resolution.
    NetworkDns,
    /// Inbound network traffic.
    NetworkIngress,
    /// Process spawn.
    ProcessSpawn,
    /// Process kill.
    ProcessKill,
    /// Process signal.
    ProcessSignal,
}

impl EffectType {
    /// Returns the category grouping for this effect type.
    #[must_use]
    pub const fn category(self) -> EffectCategory {
        match self {
            Self::FilesystemRead
            | Self::FilesystemWrite
            | Self::FilesystemDelete
            | Self::FilesystemMetadata => EffectCategory::Filesystem,
            Self::NetworkEgress | Self::NetworkDns | Self::NetworkIngress => {
                EffectCategory::Network
            }
            Self::ProcessSpawn | Self::ProcessKill | Self::ProcessSignal => {
                EffectCategory::Process
            }
        }
    }

    /// Returns the stable dotted wire label for this effect type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilesystemRead => "filesystem.read",
            Self::FilesystemWrite => "filesystem.write",
            Self::FilesystemDelete => "filesystem.delete",
            Self::FilesystemMetadata => "filesystem.metadata",
            Self::NetworkEgress => "network.egress",
            Self::NetworkDns => "network.dns",
            Self::NetworkIngress => "network.ingress",
            Self::ProcessSpawn => "process.spawn",
            Self::ProcessKill => "process.kill",
            Self::ProcessSignal => "process.signal",
        }
    }
}

// ============================================================================
// SECTION: Effect Boundary
// ============================================================================

/// Named boundary presets for common run profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPreset {
    /// No declared boundary; every effect is in bounds.
    #[default]
    None,
    /// No side effects permitted at all.
    Strict,
    /// Filesystem reads only.
    Readonly,
    /// Filesystem and network, no process control.
    Permissive,
}

/// Declarative allow-set of effect types for a run.
///
/// # Invariants
/// - An empty `allowed_types` with `unbounded = true` permits everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectBoundary {
    /// Effect types permitted inside the boundary.
    pub allowed_types: Vec<EffectType>,
    /// When `true`, the boundary permits every effect.
    pub unbounded: bool,
}

impl EffectBoundary {
    /// Builds a boundary from a named preset.
    #[must_use]
    pub fn from_preset(preset: BoundaryPreset) -> Self {
        match preset {
            BoundaryPreset::None => Self {
                allowed_types: Vec::new(),
                unbounded: true,
            },
            BoundaryPreset::Strict => Self {
                allowed_types: Vec::new(),
                unbounded: false,
            },
            BoundaryPreset::Readonly => Self {
                allowed_types: vec![EffectType::FilesystemRead],
                unbounded: false,
            },
            BoundaryPreset::Permissive => Self {
                allowed_types: vec![
                    EffectType::FilesystemRead,
                    EffectType::FilesystemWrite,
                    EffectType::FilesystemDelete,
                    EffectType::FilesystemMetadata,
                    EffectType::NetworkEgress,
                    EffectType::NetworkDns,
                    EffectType::NetworkIngress,
                ],
                unbounded: false,
            },
        }
    }

    /// Returns `true` when the effect type is inside the boundary.
    #[must_use]
    pub fn permits(&self, effect: EffectType) -> bool {
        self.unbounded || self.allowed_types.contains(&effect)
    }
}

// ============================================================================
// SECTION: Observed Effects
// ============================================================================

/// Observed side-effect event annotated onto EGRESS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectEvent {
    /// Concrete effect type.
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    /// Target path, host, or command.
    pub target: String,
    /// Category grouping (redundant but wire-stable).
    pub category: EffectCategory,
    /// Tool that caused the effect.
    pub tool: ToolName,
    /// Step during which the effect was observed.
    pub step_id: StepId,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::BoundaryPreset;
    use super::EffectBoundary;
    use super::EffectCategory;
    use super::EffectType;

    /// Tests category grouping.
    #[test]
    fn test_effect_categories() {
        assert_eq!(EffectType::FilesystemDelete.category(), EffectCategory::Filesystem);
        assert_eq!(EffectType::NetworkDns.category(), EffectCategory::Network);
        assert_eq!(EffectType::ProcessKill.category(), EffectCategory::Process);
    }

    /// Tests the readonly preset only permits filesystem reads.
    #[test]
    fn test_readonly_preset() {
        let boundary = EffectBoundary::from_preset(BoundaryPreset::Readonly);
        assert!(boundary.permits(EffectType::FilesystemRead));
        assert!(!boundary.permits(EffectType::FilesystemWrite));
        assert!(!boundary.permits(EffectType::NetworkEgress));
    }

    /// Tests the none preset is unbounded.
    #[test]
    fn test_none_preset_unbounded() {
        let boundary = EffectBoundary::from_preset(BoundaryPreset::None);
        assert!(boundary.permits(EffectType::ProcessKill));
    }
}
