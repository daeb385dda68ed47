// crates/failcore-core/src/cost/pricing.rs
// ============================================================================
// Module: Failcore Price Providers
// Description: Layered model pricing lookup for cost estimation.
// Purpose: Resolve USD-per-token prices without the engine touching I/O.
// Dependencies: crate::cost, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Pricing resolves through a provider chain: a JSON table, a host-injected
//! map (typically sourced from environment configuration by the embedder),
//! then static defaults. The engine itself performs no I/O; any networked
//! provider is supplied by the host behind the same trait with its own
//! timeouts. Missing pricing yields a zero-cost estimate flagged
//! `estimated` and never blocks on its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::cost::CostEstimate;

// ============================================================================
// SECTION: Model Price
// ============================================================================

/// USD pricing for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// USD per thousand input tokens.
    pub input_usd_per_1k: f64,
    /// USD per thousand output tokens.
    pub output_usd_per_1k: f64,
}

// ============================================================================
// SECTION: Provider Trait
// ============================================================================

/// Pricing source consulted by the guardian's estimator.
pub trait PriceProvider: Send + Sync {
    /// Returns pricing for a model, when known.
    fn price_for(&self, model: &str) -> Option<ModelPrice>;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading a pricing table.
#[derive(Debug, Error)]
pub enum PricingError {
    /// The pricing document failed to parse.
    #[error("invalid pricing table: {0}")]
    InvalidTable(String),
}

// ============================================================================
// SECTION: JSON Provider
// ============================================================================

/// Pricing table loaded from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonPriceProvider {
    /// Model name to price mapping.
    prices: BTreeMap<String, ModelPrice>,
}

impl JsonPriceProvider {
    /// Parses a `{"model": {"input_usd_per_1k": .., "output_usd_per_1k": ..}}` table.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidTable`] when the document fails to parse.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, PricingError> {
        let prices: BTreeMap<String, ModelPrice> = serde_json::from_slice(bytes)
            .map_err(|err| PricingError::InvalidTable(err.to_string()))?;
        Ok(Self {
            prices,
        })
    }
}

impl PriceProvider for JsonPriceProvider {
    fn price_for(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }
}

// ============================================================================
// SECTION: Map Provider
// ============================================================================

/// Host-injected pricing map (typically sourced from environment config).
#[derive(Debug, Clone, Default)]
pub struct MapPriceProvider {
    /// Model name to price mapping.
    prices: BTreeMap<String, ModelPrice>,
}

impl MapPriceProvider {
    /// Creates a provider over a prepared map.
    #[must_use]
    pub const fn new(prices: BTreeMap<String, ModelPrice>) -> Self {
        Self {
            prices,
        }
    }
}

impl PriceProvider for MapPriceProvider {
    fn price_for(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }
}

// ============================================================================
// SECTION: Static Provider
// ============================================================================

/// Built-in fallback pricing for well-known model families.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPriceProvider;

impl PriceProvider for StaticPriceProvider {
    fn price_for(&self, model: &str) -> Option<ModelPrice> {
        let lower = model.to_ascii_lowercase();
        if lower.contains("mini") || lower.contains("haiku") || lower.contains("flash") {
            return Some(ModelPrice {
                input_usd_per_1k: 0.000_25,
                output_usd_per_1k: 0.001_25,
            });
        }
        if lower.contains("gpt") || lower.contains("sonnet") || lower.contains("pro") {
            return Some(ModelPrice {
                input_usd_per_1k: 0.003,
                output_usd_per_1k: 0.015,
            });
        }
        if lower.contains("opus") {
            return Some(ModelPrice {
                input_usd_per_1k: 0.015,
                output_usd_per_1k: 0.075,
            });
        }
        None
    }
}

// ============================================================================
// SECTION: Provider Chain
// ============================================================================

/// First-hit chain over registered pricing providers.
#[derive(Default)]
pub struct ProviderChain {
    /// Providers in consultation order.
    providers: Vec<Box<dyn PriceProvider>>,
}

impl ProviderChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default chain: static fallback only.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut chain = Self::new();
        chain.push(Box::new(StaticPriceProvider));
        chain
    }

    /// Appends a provider to the end of the chain.
    pub fn push(&mut self, provider: Box<dyn PriceProvider>) {
        self.providers.push(provider);
    }

    /// Estimates the cost of an operation against the chain.
    ///
    /// When no provider knows the model, the estimate is zero-cost and
    /// flagged `estimated`.
    #[must_use]
    pub fn estimate(&self, model: &str, input_tokens: u64, output_tokens: u64) -> CostEstimate {
        let tokens = input_tokens.saturating_add(output_tokens);
        match self.price_for(model) {
            Some(price) => CostEstimate {
                cost_usd: token_cost(input_tokens, price.input_usd_per_1k)
                    + token_cost(output_tokens, price.output_usd_per_1k),
                tokens,
                estimated: false,
            },
            None => CostEstimate {
                cost_usd: 0.0,
                tokens,
                estimated: true,
            },
        }
    }
}

impl PriceProvider for ProviderChain {
    fn price_for(&self, model: &str) -> Option<ModelPrice> {
        self.providers.iter().find_map(|provider| provider.price_for(model))
    }
}

/// Converts a token count and per-1k price into USD.
fn token_cost(tokens: u64, usd_per_1k: f64) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "Token counts fit f64 for pricing purposes.")]
    let tokens = tokens as f64;
    tokens / 1000.0 * usd_per_1k
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::JsonPriceProvider;
    use super::ModelPrice;
    use super::PriceProvider;
    use super::ProviderChain;

    /// Tests chain ordering: earlier providers win.
    #[test]
    fn test_chain_first_hit_wins() {
        let table = br#"{"demo-model": {"input_usd_per_1k": 1.0, "output_usd_per_1k": 2.0}}"#;
        let mut chain = ProviderChain::with_defaults();
        chain.providers.insert(0, Box::new(JsonPriceProvider::from_json_bytes(table).unwrap()));
        let price = chain.price_for("demo-model").unwrap();
        assert!((price.input_usd_per_1k - 1.0).abs() < f64::EPSILON);
    }

    /// Tests estimation math over a known price.
    #[test]
    fn test_estimate_known_model() {
        let table = br#"{"demo-model": {"input_usd_per_1k": 1.0, "output_usd_per_1k": 2.0}}"#;
        let mut chain = ProviderChain::new();
        chain.push(Box::new(JsonPriceProvider::from_json_bytes(table).unwrap()));
        let estimate = chain.estimate("demo-model", 500, 250);
        assert!(!estimate.estimated);
        assert!((estimate.cost_usd - 1.0).abs() < 1e-9);
        assert_eq!(estimate.tokens, 750);
    }

    /// Tests unknown models produce flagged zero-cost estimates.
    #[test]
    fn test_estimate_unknown_model() {
        let chain = ProviderChain::new();
        let estimate = chain.estimate("mystery", 10, 10);
        assert!(estimate.estimated);
        assert!((estimate.cost_usd).abs() < f64::EPSILON);
    }

    /// Tests malformed tables are rejected.
    #[test]
    fn test_invalid_table_rejected() {
        assert!(JsonPriceProvider::from_json_bytes(b"[1,2]").is_err());
    }

    /// Tests a price value survives the json shape.
    #[test]
    fn test_price_shape() {
        let price = ModelPrice {
            input_usd_per_1k: 0.5,
            output_usd_per_1k: 0.7,
        };
        let rendered = serde_json::to_string(&price).unwrap();
        assert!(rendered.contains("input_usd_per_1k"));
    }
}
