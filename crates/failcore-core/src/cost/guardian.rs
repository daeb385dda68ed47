// crates/failcore-core/src/cost/guardian.rs
// ============================================================================
// Module: Failcore Cost Guardian
// Description: Budget enforcement, burn-rate windows, and streaming watchdog.
// Purpose: Feed the gate with deterministic economic deny decisions.
// Dependencies: crate::{core, cost}, serde
// ============================================================================

//! ## Overview
//! The guardian tracks cumulative run totals and recent spend events in
//! sliding windows keyed by caller-supplied timestamps. `check_operation`
//! answers before execution; `record_usage` accumulates afterwards and
//! raises threshold alerts at 80/90/95 percent of each enforced limit, at
//! most once per threshold per run. The streaming watchdog is a cooperative
//! checkpoint: the producer reports generated tokens and receives a budget
//! exceeded code once the safety margin of the token cap is reached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::decision::ErrorCode;
use crate::core::time::Timestamp;
use crate::cost::ALERT_THRESHOLDS;
use crate::cost::Budget;
use crate::cost::CostAlert;
use crate::cost::CostCheck;
use crate::cost::CostEstimate;
use crate::cost::CostTotals;
use crate::cost::CostUsage;
use crate::cost::LimitKind;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Guardian tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardianConfig {
    /// Sliding window backing the per-minute rate, in milliseconds.
    pub minute_window_ms: i64,
    /// Sliding window backing the per-hour rate, in milliseconds.
    pub hour_window_ms: i64,
    /// Streaming watchdog check interval, in tokens.
    pub stream_check_interval: u64,
    /// Fraction of the token cap at which the watchdog trips.
    pub stream_safety_margin: f64,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            minute_window_ms: 300_000,
            hour_window_ms: 3_600_000,
            stream_check_interval: 50,
            stream_safety_margin: 0.95,
        }
    }
}

// ============================================================================
// SECTION: Guardian State
// ============================================================================

/// Mutable guardian state behind the lock.
#[derive(Debug, Default)]
struct GuardianState {
    /// Cumulative run totals.
    totals: CostTotals,
    /// Recent spend events `(time, usd)`, newest last.
    spend_events: VecDeque<(Timestamp, f64)>,
    /// Alert thresholds already fired, keyed by `(limit, threshold index)`.
    alerts_fired: BTreeSet<(LimitKind, usize)>,
    /// Tokens observed by the streaming watchdog.
    stream_tokens: u64,
    /// Tokens since the last watchdog check.
    tokens_since_check: u64,
}

// ============================================================================
// SECTION: Cost Guardian
// ============================================================================

/// Run-scoped budget enforcement.
#[derive(Debug)]
pub struct CostGuardian {
    /// Enforced budget.
    budget: Budget,
    /// Tuning knobs.
    config: GuardianConfig,
    /// Mutable state.
    state: Mutex<GuardianState>,
}

impl CostGuardian {
    /// Creates a guardian over a budget with default tuning.
    #[must_use]
    pub fn new(budget: Budget) -> Self {
        Self::with_config(budget, GuardianConfig::default())
    }

    /// Creates a guardian with explicit tuning.
    #[must_use]
    pub fn with_config(budget: Budget, config: GuardianConfig) -> Self {
        Self {
            budget,
            config,
            state: Mutex::new(GuardianState::default()),
        }
    }

    /// Returns the enforced budget.
    #[must_use]
    pub const fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Returns a snapshot of the cumulative totals.
    #[must_use]
    pub fn totals(&self) -> CostTotals {
        self.state.lock().map_or_else(|_| CostTotals::default(), |state| state.totals)
    }

    /// Checks whether an estimated operation fits every enforced limit.
    ///
    /// The first violated limit denies the operation; dimension order is
    /// total cost, tokens, API calls, then burn rates.
    #[must_use]
    pub fn check_operation(&self, estimate: &CostEstimate, now: Timestamp) -> CostCheck {
        let Ok(mut state) = self.state.lock() else {
            return CostCheck::allowed();
        };
        prune_window(&mut state.spend_events, now, self.config.hour_window_ms);

        if let Some(limit) = self.budget.max_cost_usd {
            let projected = state.totals.cost_usd + estimate.cost_usd;
            if projected > limit {
                return CostCheck::denied(
                    LimitKind::CostUsd,
                    format!("projected spend {projected:.4} USD exceeds budget {limit:.4} USD"),
                );
            }
        }
        if let Some(limit) = self.budget.max_tokens {
            let projected = state.totals.total_tokens.saturating_add(estimate.tokens);
            if projected > limit {
                return CostCheck::denied(
                    LimitKind::Tokens,
                    format!("projected {projected} tokens exceeds cap {limit}"),
                );
            }
        }
        if let Some(limit) = self.budget.max_api_calls {
            let projected = state.totals.api_calls.saturating_add(1);
            if projected > limit {
                return CostCheck::denied(
                    LimitKind::ApiCalls,
                    format!("projected {projected} api calls exceeds cap {limit}"),
                );
            }
        }
        if let Some(limit) = self.budget.max_usd_per_minute {
            let rate = window_rate(
                &state.spend_events,
                now,
                self.config.minute_window_ms,
                estimate.cost_usd,
                60_000.0,
            );
            if rate > limit {
                return CostCheck::denied(
                    LimitKind::UsdPerMinute,
                    format!("burn rate {rate:.4} USD/min exceeds cap {limit:.4}"),
                );
            }
        }
        if let Some(limit) = self.budget.max_usd_per_hour {
            let rate = window_rate(
                &state.spend_events,
                now,
                self.config.hour_window_ms,
                estimate.cost_usd,
                3_600_000.0,
            );
            if rate > limit {
                return CostCheck::denied(
                    LimitKind::UsdPerHour,
                    format!("burn rate {rate:.4} USD/hour exceeds cap {limit:.4}"),
                );
            }
        }
        CostCheck::allowed()
    }

    /// Records actual usage and returns any newly fired threshold alerts.
    pub fn record_usage(&self, usage: &CostUsage, now: Timestamp) -> Vec<CostAlert> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        state.totals.apply(usage);
        if usage.cost_usd > 0.0 {
            state.spend_events.push_back((now, usage.cost_usd));
        }
        prune_window(&mut state.spend_events, now, self.config.hour_window_ms);

        let mut alerts = Vec::new();
        let ratios = [
            (LimitKind::CostUsd, self.budget.max_cost_usd.map(|limit| state.totals.cost_usd / limit)),
            (
                LimitKind::Tokens,
                self.budget.max_tokens.map(|limit| ratio_u64(state.totals.total_tokens, limit)),
            ),
            (
                LimitKind::ApiCalls,
                self.budget.max_api_calls.map(|limit| ratio_u64(state.totals.api_calls, limit)),
            ),
        ];
        for (limit_kind, ratio) in ratios {
            let Some(ratio) = ratio else {
                continue;
            };
            for (index, threshold) in ALERT_THRESHOLDS.iter().enumerate() {
                if ratio >= *threshold && state.alerts_fired.insert((limit_kind, index)) {
                    alerts.push(CostAlert {
                        limit: limit_kind,
                        threshold: *threshold,
                        ratio,
                    });
                }
            }
        }
        alerts
    }

    /// Cooperative streaming checkpoint.
    ///
    /// Returns a deny code when the accumulated stream pushes total tokens
    /// past the safety margin of the token cap; the caller converts it into
    /// a BLOCK verdict and closes the stream.
    pub fn on_token_generated(&self, count: u64) -> Option<ErrorCode> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        state.stream_tokens = state.stream_tokens.saturating_add(count);
        state.tokens_since_check = state.tokens_since_check.saturating_add(count);
        if state.tokens_since_check < self.config.stream_check_interval {
            return None;
        }
        state.tokens_since_check = 0;
        let limit = self.budget.max_tokens?;
        let margin = limit_with_margin(limit, self.config.stream_safety_margin);
        let projected = state.totals.total_tokens.saturating_add(state.stream_tokens);
        (projected >= margin).then_some(ErrorCode::EconomicTokenLimit)
    }
}

// ============================================================================
// SECTION: Window Helpers
// ============================================================================

/// Drops spend events older than the retention window.
fn prune_window(events: &mut VecDeque<(Timestamp, f64)>, now: Timestamp, retention_ms: i64) {
    while let Some((ts, _)) = events.front() {
        if now.millis_since(*ts) > retention_ms {
            events.pop_front();
        } else {
            break;
        }
    }
}

/// Computes the normalised burn rate over one window including new spend.
fn window_rate(
    events: &VecDeque<(Timestamp, f64)>,
    now: Timestamp,
    window_ms: i64,
    pending_usd: f64,
    per_ms: f64,
) -> f64 {
    let in_window: f64 = events
        .iter()
        .filter(|(ts, _)| now.millis_since(*ts) <= window_ms)
        .map(|(_, usd)| usd)
        .sum();
    #[allow(clippy::cast_precision_loss, reason = "Window sizes fit f64 comfortably.")]
    let window = window_ms as f64;
    (in_window + pending_usd) / (window / per_ms)
}

/// Applies the safety margin to a token cap.
fn limit_with_margin(limit: u64, margin: f64) -> u64 {
    #[allow(clippy::cast_precision_loss, reason = "Token caps fit f64 for margin math.")]
    let scaled = limit as f64 * margin;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Margin in (0,1] keeps the product within u64 range."
    )]
    let floored = scaled as u64;
    floored.max(1)
}

/// Ratio of consumed to limit for unsigned counters.
fn ratio_u64(consumed: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "Counter magnitudes fit f64 for ratios.")]
    {
        consumed as f64 / limit as f64
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::CostGuardian;
    use super::GuardianConfig;
    use crate::core::decision::ErrorCode;
    use crate::core::time::Timestamp;
    use crate::cost::Budget;
    use crate::cost::CostEstimate;
    use crate::cost::CostUsage;
    use crate::cost::LimitKind;

    /// Usage record spending the given USD with matching tokens.
    fn usage(cost_usd: f64, tokens: u64) -> CostUsage {
        CostUsage {
            cost_usd,
            input_tokens: tokens / 2,
            output_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            api_calls: 1,
        }
    }

    /// Tests the budget-exhaustion scenario: second call is denied.
    #[test]
    fn test_budget_exhaustion() {
        let guardian = CostGuardian::new(Budget {
            max_cost_usd: Some(0.01),
            ..Budget::default()
        });
        let estimate = CostEstimate {
            cost_usd: 0.006,
            tokens: 100,
            estimated: false,
        };
        let t0 = Timestamp::from_unix_millis(0);

        assert!(guardian.check_operation(&estimate, t0).allowed);
        let _ = guardian.record_usage(&usage(0.006, 100), t0);

        let second = guardian.check_operation(&estimate, Timestamp::from_unix_millis(1_000));
        assert!(!second.allowed);
        assert_eq!(second.error_code, Some(ErrorCode::EconomicBudgetExceeded));
    }

    /// Tests alerts fire once per threshold.
    #[test]
    fn test_alert_thresholds_fire_once() {
        let guardian = CostGuardian::new(Budget {
            max_cost_usd: Some(1.0),
            ..Budget::default()
        });
        let t0 = Timestamp::from_unix_millis(0);

        let alerts = guardian.record_usage(&usage(0.85, 10), t0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].limit, LimitKind::CostUsd);
        assert!((alerts[0].threshold - 0.80).abs() < f64::EPSILON);

        let alerts = guardian.record_usage(&usage(0.10, 10), t0);
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].threshold - 0.90).abs() < f64::EPSILON);

        let alerts = guardian.record_usage(&usage(0.001, 10), t0);
        assert!(alerts.is_empty(), "already-fired thresholds must not repeat");
    }

    /// Tests the burn-rate window denies fast spend and recovers later.
    #[test]
    fn test_burn_rate_window() {
        let guardian = CostGuardian::new(Budget {
            max_usd_per_minute: Some(0.01),
            ..Budget::default()
        });
        let estimate = CostEstimate {
            cost_usd: 0.02,
            tokens: 10,
            estimated: false,
        };
        let _ = guardian.record_usage(&usage(0.05, 10), Timestamp::from_unix_millis(0));

        let denied = guardian.check_operation(&estimate, Timestamp::from_unix_millis(1_000));
        assert!(!denied.allowed);
        assert_eq!(denied.error_code, Some(ErrorCode::EconomicBurnRateExceeded));

        // Well past the window the old spend no longer counts.
        let later = guardian.check_operation(
            &CostEstimate {
                cost_usd: 0.0001,
                tokens: 1,
                estimated: false,
            },
            Timestamp::from_unix_millis(10_000_000),
        );
        assert!(later.allowed);
    }

    /// Tests the streaming watchdog trips at the safety margin.
    #[test]
    fn test_stream_watchdog() {
        let guardian = CostGuardian::with_config(
            Budget {
                max_tokens: Some(1_000),
                ..Budget::default()
            },
            GuardianConfig {
                stream_check_interval: 10,
                ..GuardianConfig::default()
            },
        );
        let mut tripped = None;
        for _ in 0..100 {
            if let Some(code) = guardian.on_token_generated(10) {
                tripped = Some(code);
                break;
            }
        }
        assert_eq!(tripped, Some(ErrorCode::EconomicTokenLimit));
    }

    /// Tests api call caps deny at the boundary.
    #[test]
    fn test_api_call_cap() {
        let guardian = CostGuardian::new(Budget {
            max_api_calls: Some(1),
            ..Budget::default()
        });
        let estimate = CostEstimate::default();
        let t0 = Timestamp::from_unix_millis(0);
        assert!(guardian.check_operation(&estimate, t0).allowed);
        let _ = guardian.record_usage(&usage(0.0, 1), t0);
        let denied = guardian.check_operation(&estimate, t0);
        assert_eq!(denied.error_code, Some(ErrorCode::EconomicApiCallLimit));
    }
}
