//! Decision engine: divergence detection, risk gating, bracket
//! orchestration, and position reconciliation over one shared state.

pub mod book;
pub mod detector;
pub mod orchestrator;
pub mod reconciler;
pub mod risk;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::engine::book::{CooldownState, PositionBook};
use crate::engine::detector::{OpportunityDetector, Verdict};
use crate::engine::orchestrator::{BracketOrchestrator, OpenOutcome};
use crate::exchange::Exchange;
use crate::feed::LatestTick;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything the decision and reconciliation loops mutate, behind one
/// lock so gate-check, entry submission and cooldown stamping happen as
/// a unit.
#[derive(Debug, Default)]
pub struct EngineState {
    pub book: PositionBook,
    pub cooldown: CooldownState,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub type SharedState = Arc<Mutex<EngineState>>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One decision cycle: read the latest oracle tick, fetch a fresh
/// quote, evaluate, and open a bracket when the detector triggers.
pub struct Engine {
    exchange: Arc<dyn Exchange>,
    detector: OpportunityDetector,
    orchestrator: BracketOrchestrator,
    ticks: LatestTick,
    state: SharedState,
    token_id: String,
}

impl Engine {
    pub fn new(
        config: &AppConfig,
        exchange: Arc<dyn Exchange>,
        ticks: LatestTick,
        state: SharedState,
    ) -> Self {
        Self {
            detector: OpportunityDetector::new(&config.risk, config.feed.staleness_secs),
            orchestrator: BracketOrchestrator::new(Arc::clone(&exchange), config.risk.clone()),
            exchange,
            ticks,
            state,
            token_id: config.engine.token_id.clone(),
        }
    }

    /// Run one decision cycle. Returns the open outcome when the
    /// detector triggered, `None` otherwise (no signal, stale inputs,
    /// cooldown, or a failed quote fetch).
    pub async fn run_decision_cycle(&self) -> Option<OpenOutcome> {
        // Quote first: fetched fresh for every cycle, never cached.
        let quote = match self.exchange.quote(&self.token_id).await {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "Quote fetch failed, skipping decision cycle");
                return None;
            }
        };
        if quote.midpoint <= rust_decimal::Decimal::ZERO {
            warn!(token_id = %self.token_id, "Empty or crossed book, skipping decision cycle");
            return None;
        }

        let tick = self.ticks.latest();

        let mut state = self.state.lock().await;
        let verdict = self
            .detector
            .evaluate(tick.as_ref(), &quote, &state.cooldown, Utc::now());

        match verdict {
            Verdict::Triggered(opp) => Some(self.orchestrator.open(&mut state, &opp).await),
            other => {
                debug!(verdict = ?other, midpoint = %quote.midpoint, "No entry this cycle");
                None
            }
        }
    }
}
