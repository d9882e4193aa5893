//! Opportunity detection.
//!
//! Compares the latest oracle tick against a fresh market midpoint and
//! applies the threshold + cooldown policy. The strategy is
//! one-directional: it buys the underpriced token and exits via two
//! sell legs, so only positive divergence (oracle above the book)
//! produces an opportunity. Negative divergence beyond the threshold
//! is logged and skipped.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::RiskConfig;
use crate::engine::book::CooldownState;
use crate::types::{MarketQuote, Opportunity, PriceTick, Side};

/// Outcome of one detector evaluation. Everything except `Triggered` is
/// a quiet skip, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No tick has arrived yet.
    NoTick,
    /// Tick or quote is older than the staleness bound.
    Stale,
    /// A prior entry attempt is still inside the cooldown window.
    CooldownActive,
    /// Divergence below threshold, or on the unsupported sell side.
    NoSignal,
    Triggered(Opportunity),
}

pub struct OpportunityDetector {
    threshold: Decimal,
    staleness: Duration,
    cooldown: Duration,
}

impl OpportunityDetector {
    pub fn new(risk: &RiskConfig, staleness_secs: u64) -> Self {
        Self {
            threshold: risk.price_difference_threshold,
            staleness: Duration::seconds(staleness_secs as i64),
            cooldown: Duration::seconds(risk.cooldown_secs as i64),
        }
    }

    /// Evaluate one decision cycle.
    ///
    /// The caller holds the engine state lock while passing `cooldown`,
    /// so the window it observes cannot move before the orchestrator
    /// stamps it.
    pub fn evaluate(
        &self,
        tick: Option<&PriceTick>,
        quote: &MarketQuote,
        cooldown: &CooldownState,
        now: DateTime<Utc>,
    ) -> Verdict {
        let Some(tick) = tick else {
            return Verdict::NoTick;
        };

        // A stale tick is treated as absent: the feed may be down and the
        // book may have moved since.
        if tick.is_stale(now, self.staleness) || quote.is_stale(now, self.staleness) {
            debug!(tick_at = %tick.received_at, quote_at = %quote.fetched_at, "Inputs stale, skipping cycle");
            return Verdict::Stale;
        }

        if cooldown.is_active(now, self.cooldown) {
            debug!("Cooldown active, suppressing");
            return Verdict::CooldownActive;
        }

        let divergence = tick.price - quote.midpoint;

        // Threshold is inclusive: a divergence sitting exactly on it triggers.
        if divergence.abs() < self.threshold {
            return Verdict::NoSignal;
        }

        if divergence < Decimal::ZERO {
            // Oracle below the book. The strategy never sells to open, so
            // this direction is observed but not traded.
            debug!(
                %divergence,
                "Negative divergence above threshold — sell side not traded"
            );
            return Verdict::NoSignal;
        }

        debug!(
            oracle = %tick.price,
            midpoint = %quote.midpoint,
            %divergence,
            threshold = %self.threshold,
            "Opportunity detected"
        );

        Verdict::Triggered(Opportunity {
            token_id: quote.token_id.clone(),
            side: Side::Buy,
            reference_price: quote.midpoint,
            divergence,
            detected_at: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
