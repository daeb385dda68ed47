// crates/failcore-core/src/taint/mod.rs
// ============================================================================
// Module: Failcore Taint Flow Tracker
// Description: Run-scoped provenance graph over step outputs and inputs.
// Purpose: Propagate taint tags across declared step dependencies.
// Dependencies: crate::{core, parsers}, serde_json
// ============================================================================

//! ## Overview
//! The tracker marks outputs of classified source tools as tainted and
//! detects when those outputs reappear in later step parameters. Detection
//! is lightweight and tool-boundary only; it is not program analysis. Field
//! binding uses three tiers: step-id substring match (high confidence),
//! common parameter names (medium), and recursive content traversal
//! (medium); a declared dependency with no located field binds the whole
//! parameter map at low confidence.
//!
//! Nodes live in an arena with stable integer indices; flow chains are
//! sequences of edges with a configurable depth cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use serde_json::Value;

use crate::core::context::Params;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;
use crate::core::taint::BindingConfidence;
use crate::core::taint::DEFAULT_MAX_FLOW_DEPTH;
use crate::core::taint::FlowEdge;
use crate::core::taint::TaintTag;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter names treated as likely data carriers.
const COMMON_CARRIER_NAMES: &[&str] = &["input", "content", "data", "value", "text"];

/// Minimum output string length considered for content matching.
const MIN_CONTENT_MATCH_LEN: usize = 8;

// ============================================================================
// SECTION: Arena Node
// ============================================================================

/// One marked step output in the arena.
#[derive(Debug)]
struct TaintNode {
    /// Step that produced the output.
    step_id: StepId,
    /// Tag attached to the output.
    tag: TaintTag,
    /// Flattened string values of the output, for content matching.
    output_strings: Vec<String>,
}

/// Mutable tracker state behind the lock.
#[derive(Debug, Default)]
struct TrackerState {
    /// Node arena; indices are stable for the run.
    nodes: Vec<TaintNode>,
    /// Step-id to arena index.
    by_step: HashMap<StepId, usize>,
    /// Recorded flow edges, in detection order.
    edges: Vec<FlowEdge>,
}

// ============================================================================
// SECTION: Taint Context
// ============================================================================

/// Run-scoped taint context shared through the state side-channel.
///
/// # Invariants
/// - Safe for many readers and a single writer per step (interior lock).
/// - Never shared across runs.
#[derive(Debug, Default)]
pub struct TaintContext {
    /// Arena, index, and edge state.
    state: RwLock<TrackerState>,
}

impl TaintContext {
    /// Creates an empty taint context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a step output as tainted.
    ///
    /// Re-marking a step replaces its tag and output snapshot.
    pub fn mark(&self, step_id: StepId, _tool: &ToolName, output: &Value, tag: TaintTag) {
        let output_strings = crate::parsers::parse_payload_value(output)
            .string_values
            .into_iter()
            .filter(|text| text.len() >= MIN_CONTENT_MATCH_LEN)
            .collect();
        let Ok(mut state) = self.state.write() else {
            return;
        };
        if let Some(&index) = state.by_step.get(&step_id) {
            state.nodes[index].tag = tag;
            state.nodes[index].output_strings = output_strings;
            return;
        }
        let index = state.nodes.len();
        state.nodes.push(TaintNode {
            step_id: step_id.clone(),
            tag,
            output_strings,
        });
        state.by_step.insert(step_id, index);
    }

    /// Detects tainted inputs among a step's parameters.
    ///
    /// Returns the tags of every declared dependency whose output is marked,
    /// and records a flow edge into `sink_step` for each.
    #[must_use]
    pub fn detect_tainted_inputs(
        &self,
        sink_step: &StepId,
        params: &Params,
        dependencies: &[StepId],
    ) -> Vec<TaintTag> {
        let Ok(mut state) = self.state.write() else {
            return Vec::new();
        };
        let mut tags = Vec::new();
        for dependency in dependencies {
            let Some(&index) = state.by_step.get(dependency) else {
                continue;
            };
            let node = &state.nodes[index];
            let (field_path, binding_confidence) = locate_binding(node, params);
            tags.push(node.tag.clone());
            state.edges.push(FlowEdge {
                source_step: dependency.clone(),
                sink_step: sink_step.clone(),
                field_path,
                binding_confidence,
            });
        }
        tags
    }

    /// Returns the flow chain ending at a sink step, source-first.
    ///
    /// The walk follows edges backwards from the sink, skipping already
    /// visited steps so cyclic declarations terminate, and stops at
    /// `max_depth` hops (defaulting to [`DEFAULT_MAX_FLOW_DEPTH`] when zero).
    #[must_use]
    pub fn get_flow_chain(&self, sink_step: &StepId, max_depth: usize) -> Vec<FlowEdge> {
        let depth_cap = if max_depth == 0 { DEFAULT_MAX_FLOW_DEPTH } else { max_depth };
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        let mut visited: HashSet<StepId> = HashSet::new();
        let mut frontier = vec![sink_step.clone()];
        for _ in 0..depth_cap {
            let mut next = Vec::new();
            for sink in frontier.drain(..) {
                if !visited.insert(sink.clone()) {
                    continue;
                }
                for edge in state.edges.iter().filter(|edge| edge.sink_step == sink) {
                    chain.push(edge.clone());
                    next.push(edge.source_step.clone());
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        chain.reverse();
        chain
    }

    /// Returns the tag marked for a step, if any.
    #[must_use]
    pub fn tag_for(&self, step_id: &StepId) -> Option<TaintTag> {
        let state = self.state.read().ok()?;
        let index = *state.by_step.get(step_id)?;
        Some(state.nodes[index].tag.clone())
    }

    /// Returns the tags of every source step with an edge into a sink step.
    #[must_use]
    pub fn tags_for_sink(&self, sink_step: &StepId) -> Vec<TaintTag> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut tags = Vec::new();
        for edge in state.edges.iter().filter(|edge| &edge.sink_step == sink_step) {
            if let Some(&index) = state.by_step.get(&edge.source_step) {
                let tag = state.nodes[index].tag.clone();
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }
}

// ============================================================================
// SECTION: Binding Detection
// ============================================================================

/// Locates the field binding a source output to the sink parameters.
fn locate_binding(node: &TaintNode, params: &Params) -> (Option<String>, BindingConfidence) {
    // Tier one: a value embeds the producing step id.
    if let Some(path) = find_string(params, &mut |text| text.contains(node.step_id.as_str())) {
        return (Some(path), BindingConfidence::High);
    }
    // Tier two: a common carrier name is present at the top level.
    for name in COMMON_CARRIER_NAMES {
        if params.contains_key(*name) {
            return (Some((*name).to_string()), BindingConfidence::Medium);
        }
    }
    // Tier three: nested traversal finds source output content.
    if let Some(path) =
        find_string(params, &mut |text| node.output_strings.iter().any(|out| text.contains(out)))
    {
        return (Some(path), BindingConfidence::Medium);
    }
    // Declared dependency with no located field: whole-params binding.
    (None, BindingConfidence::Low)
}

/// Finds the dotted path of the first string value satisfying the predicate.
fn find_string(params: &Params, predicate: &mut dyn FnMut(&str) -> bool) -> Option<String> {
    for (name, value) in params {
        if let Some(path) = find_string_in_value(value, name, predicate) {
            return Some(path);
        }
    }
    None
}

/// Recursive walk over one value.
fn find_string_in_value(
    value: &Value,
    path: &str,
    predicate: &mut dyn FnMut(&str) -> bool,
) -> Option<String> {
    match value {
        Value::String(text) => predicate(text).then(|| path.to_string()),
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                if let Some(found) = find_string_in_value(child, &child_path, predicate) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let child_path = format!("{path}[{index}]");
                if let Some(found) = find_string_in_value(child, &child_path, predicate) {
                    return Some(found);
                }
            }
            None
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
