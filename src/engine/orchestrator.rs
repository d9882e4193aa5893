//! Bracket order orchestrator.
//!
//! Turns an opportunity into a three-leg position: gate check, sizing,
//! market entry, and — once the reconciliation loop reports the entry
//! filled — the two contingent exit legs, with rollback when either exit
//! cannot be established.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::engine::risk::{Refusal, RiskGate};
use crate::engine::EngineState;
use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::types::{Opportunity, OrderKind, OrderStatus, Position, PositionState, CloseReason, Side, TradeLeg};

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Entry size and exit limit prices derived from the reference price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPlan {
    /// Shares: `trade_amount_usd / reference_price`.
    pub entry_size: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
}

/// Compute the bracket for a reference price (the market midpoint at
/// decision time). The caller guarantees the price is positive.
pub fn plan_bracket(risk: &RiskConfig, reference_price: Decimal) -> BracketPlan {
    BracketPlan {
        entry_size: risk.trade_amount_usd / reference_price,
        take_profit_price: reference_price + risk.take_profit_offset,
        stop_loss_price: reference_price - risk.stop_loss_offset,
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one `open` attempt. `Refused` and `Aborted` leave no trace;
/// the other variants record a position in the book either way.
#[derive(Debug)]
pub enum OpenOutcome {
    Opened(Uuid),
    Refused(Refusal),
    /// Entry submission failed; the position is recorded as FAILED with
    /// no exit legs (nothing to roll back).
    EntryFailed(Uuid),
    /// A read-path exchange error before any submission; the decision
    /// cycle is abandoned without side effects.
    Aborted(ExchangeError),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct BracketOrchestrator {
    exchange: Arc<dyn Exchange>,
    gate: RiskGate,
    risk: RiskConfig,
}

impl BracketOrchestrator {
    pub fn new(exchange: Arc<dyn Exchange>, risk: RiskConfig) -> Self {
        Self {
            exchange,
            gate: RiskGate::new(risk.clone()),
            risk,
        }
    }

    /// Open a bracket for a detected opportunity.
    ///
    /// The caller holds the engine state lock for the whole call, which
    /// makes gate-check → entry submission → cooldown stamp atomic with
    /// respect to any other decision cycle. The cooldown is stamped
    /// immediately after the submission attempt, fill outcome and even
    /// submission success notwithstanding.
    pub async fn open(&self, state: &mut EngineState, opp: &Opportunity) -> OpenOutcome {
        let balance = match self.exchange.balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Balance check failed, abandoning decision cycle");
                return OpenOutcome::Aborted(e);
            }
        };

        if let Err(refusal) = self.gate.can_open(state.book.open_count(), balance) {
            info!(%refusal, "Entry refused by risk gate");
            return OpenOutcome::Refused(refusal);
        }

        let plan = plan_bracket(&self.risk, opp.reference_price);
        let mut position = Position::new(
            TradeLeg::market(&opp.token_id, Side::Buy, plan.entry_size),
            TradeLeg::limit(&opp.token_id, Side::Sell, plan.entry_size, plan.take_profit_price),
            TradeLeg::limit(&opp.token_id, Side::Sell, plan.entry_size, plan.stop_loss_price),
        );

        info!(
            position_id = %position.id,
            token_id = %opp.token_id,
            size = %plan.entry_size,
            reference = %opp.reference_price,
            tp = %plan.take_profit_price,
            sl = %plan.stop_loss_price,
            "Submitting bracket entry"
        );

        let result = self
            .exchange
            .place_order(
                &opp.token_id,
                Side::Buy,
                OrderKind::Market,
                plan.entry_size,
                None,
            )
            .await;

        // Stamp before inspecting the result so a decision that is still
        // resolving cannot be re-triggered by the next qualifying tick.
        state.cooldown.stamp(Utc::now());

        match result {
            Ok(order_id) => {
                position.entry_leg.exchange_order_id = Some(order_id);
                position.entry_leg.status = OrderStatus::Submitted;
                let id = position.id;
                info!(position_id = %id, "Entry submitted, position OPENING");
                state.book.insert(position);
                OpenOutcome::Opened(id)
            }
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Entry submission failed");
                position.entry_leg.status = OrderStatus::Rejected;
                position.state = PositionState::Failed;
                let id = position.id;
                state.book.insert(position);
                OpenOutcome::EntryFailed(id)
            }
        }
    }

    /// Submit both exit legs once the entry has filled.
    ///
    /// Called by the reconciliation loop from inside its pass over the
    /// position, so these mutations are serialized with every other
    /// post-creation transition. On success the position becomes ACTIVE;
    /// on any exit-submission failure the sibling (if already working)
    /// is cancelled and the position ends FAILED with ROLLBACK.
    pub async fn submit_exits(&self, position: &mut Position) {
        if let Err(e) = self.submit_exit_leg(position, ExitLeg::TakeProfit).await {
            self.rollback(position, ExitLeg::TakeProfit, &e).await;
            return;
        }

        if let Err(e) = self.submit_exit_leg(position, ExitLeg::StopLoss).await {
            self.rollback(position, ExitLeg::StopLoss, &e).await;
            return;
        }

        position.state = PositionState::Active;
        info!(
            position_id = %position.id,
            tp_order = ?position.take_profit_leg.exchange_order_id,
            sl_order = ?position.stop_loss_leg.exchange_order_id,
            "Both exits working, position ACTIVE"
        );
    }

    async fn submit_exit_leg(
        &self,
        position: &mut Position,
        which: ExitLeg,
    ) -> Result<(), ExchangeError> {
        let leg = match which {
            ExitLeg::TakeProfit => &position.take_profit_leg,
            ExitLeg::StopLoss => &position.stop_loss_leg,
        };

        let order_id = self
            .exchange
            .place_order(
                &leg.token_id,
                leg.side,
                leg.kind,
                leg.size,
                leg.limit_price,
            )
            .await?;

        let leg = match which {
            ExitLeg::TakeProfit => &mut position.take_profit_leg,
            ExitLeg::StopLoss => &mut position.stop_loss_leg,
        };
        leg.exchange_order_id = Some(order_id);
        leg.status = OrderStatus::Submitted;
        Ok(())
    }

    /// Cancel whichever exit leg is already working, then mark the
    /// position FAILED/ROLLBACK. The filled entry is never unwound: the
    /// position now holds unhedged inventory and the operator must act.
    async fn rollback(&self, position: &mut Position, failed: ExitLeg, cause: &ExchangeError) {
        warn!(
            position_id = %position.id,
            leg = %failed,
            error = %cause,
            "Exit submission failed, rolling back bracket"
        );

        let sibling = match failed {
            ExitLeg::TakeProfit => &mut position.stop_loss_leg,
            ExitLeg::StopLoss => &mut position.take_profit_leg,
        };

        if sibling.is_open_on_exchange() {
            let order_id = sibling
                .exchange_order_id
                .clone()
                .unwrap_or_default();
            match self.exchange.cancel_order(&order_id).await {
                Ok(()) => {
                    sibling.status = OrderStatus::Cancelled;
                    info!(position_id = %position.id, order_id, "Sibling exit cancelled during rollback");
                }
                Err(e) => {
                    error!(
                        position_id = %position.id,
                        order_id,
                        error = %e,
                        "Sibling cancel failed during rollback — order may still be working"
                    );
                }
            }
        }

        position.state = PositionState::Failed;
        position.close_reason = Some(CloseReason::Rollback);

        error!(
            position_id = %position.id,
            token_id = %position.token_id,
            size = %position.entry_leg.size,
            unhedged_inventory = true,
            "Entry filled but exits could not be established — manual intervention required"
        );
    }
}

/// Which exit leg an operation refers to, for dispatch and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitLeg {
    TakeProfit,
    StopLoss,
}

impl std::fmt::Display for ExitLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitLeg::TakeProfit => write!(f, "take-profit"),
            ExitLeg::StopLoss => write!(f, "stop-loss"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
