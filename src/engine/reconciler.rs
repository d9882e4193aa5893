//! Position reconciliation against exchange order state.
//!
//! Runs on a fixed interval and is the only component that mutates a
//! position after creation. Each pass snapshots the open positions,
//! polls the exchange for leg statuses, and drives the lifecycle:
//! OPENING until the entry fills and both exits are working, ACTIVE
//! until an exit fills, CLOSING until the sibling exit is confirmed
//! off the book.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::engine::orchestrator::BracketOrchestrator;
use crate::engine::SharedState;
use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::types::{CloseReason, OrderStatus, Position, PositionState, TradeLeg};

/// Cancel attempts tolerated per position while CLOSING before the
/// position is abandoned as FAILED.
const MAX_CANCEL_ATTEMPTS: u32 = 3;

pub struct Reconciler {
    exchange: Arc<dyn Exchange>,
    orchestrator: BracketOrchestrator,
    state: SharedState,
    cancel_attempts: HashMap<Uuid, u32>,
}

impl Reconciler {
    pub fn new(exchange: Arc<dyn Exchange>, risk: RiskConfig, state: SharedState) -> Self {
        Self {
            orchestrator: BracketOrchestrator::new(Arc::clone(&exchange), risk),
            exchange,
            state,
            cancel_attempts: HashMap::new(),
        }
    }

    /// Run one reconciliation pass over every open position.
    ///
    /// Positions are snapshotted under the state lock, processed without
    /// it (the decision loop never mutates a position after insertion),
    /// and committed back one by one. A transient exchange error skips
    /// the affected position until the next pass.
    pub async fn tick(&mut self) {
        let open = { self.state.lock().await.book.open_positions() };

        for mut position in open {
            match self.reconcile_position(&mut position).await {
                Ok(true) => {
                    self.state.lock().await.book.commit(position);
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => {
                    warn!(
                        position_id = %position.id,
                        error = %e,
                        "Reconciliation deferred, will retry next pass"
                    );
                }
                Err(e) => {
                    error!(
                        position_id = %position.id,
                        error = %e,
                        "Reconciliation failed, will retry next pass"
                    );
                }
            }
        }
    }

    /// Whether any position in the book is still open. Used by the
    /// shutdown drain.
    pub async fn has_open_positions(&self) -> bool {
        self.state.lock().await.book.open_count() > 0
    }

    async fn reconcile_position(
        &mut self,
        position: &mut Position,
    ) -> Result<bool, ExchangeError> {
        match position.state {
            PositionState::Opening => self.reconcile_opening(position).await,
            PositionState::Active => self.reconcile_active(position).await,
            PositionState::Closing => self.reconcile_closing(position).await,
            // Terminal states never reach here; the snapshot filters them.
            PositionState::Closed | PositionState::Failed => Ok(false),
        }
    }

    // -----------------------------------------------------------------
    // OPENING: waiting for the market entry to fill
    // -----------------------------------------------------------------

    async fn reconcile_opening(
        &mut self,
        position: &mut Position,
    ) -> Result<bool, ExchangeError> {
        let status = self.poll_leg(&position.entry_leg).await?;
        let changed = position.entry_leg.status != status;
        position.entry_leg.status = status;

        match status {
            OrderStatus::Filled => {
                info!(position_id = %position.id, "Entry filled, submitting exit legs");
                self.orchestrator.submit_exits(position).await;
                Ok(true)
            }
            OrderStatus::Cancelled | OrderStatus::Rejected => {
                warn!(
                    position_id = %position.id,
                    entry_status = %status,
                    "Entry no longer working, position FAILED"
                );
                position.state = PositionState::Failed;
                Ok(true)
            }
            OrderStatus::Pending | OrderStatus::Submitted => Ok(changed),
        }
    }

    // -----------------------------------------------------------------
    // ACTIVE: both exits working, waiting for one to fill
    // -----------------------------------------------------------------

    async fn reconcile_active(
        &mut self,
        position: &mut Position,
    ) -> Result<bool, ExchangeError> {
        let tp_status = self.poll_leg(&position.take_profit_leg).await?;
        let sl_status = self.poll_leg(&position.stop_loss_leg).await?;
        let changed = position.take_profit_leg.status != tp_status
            || position.stop_loss_leg.status != sl_status;
        position.take_profit_leg.status = tp_status;
        position.stop_loss_leg.status = sl_status;

        match (tp_status, sl_status) {
            (OrderStatus::Filled, OrderStatus::Filled) => {
                // Both filled between polls. The take-profit is recorded
                // as the close reason; net inventory is flat either way.
                warn!(
                    position_id = %position.id,
                    "Both exit legs filled, recording take-profit close"
                );
                position.close_reason = Some(CloseReason::TakeProfit);
                position.state = PositionState::Closed;
                Ok(true)
            }
            (OrderStatus::Filled, _) => {
                self.begin_close(position, CloseReason::TakeProfit).await;
                Ok(true)
            }
            (_, OrderStatus::Filled) => {
                self.begin_close(position, CloseReason::StopLoss).await;
                Ok(true)
            }
            (tp, sl)
                if matches!(tp, OrderStatus::Cancelled | OrderStatus::Rejected)
                    || matches!(sl, OrderStatus::Cancelled | OrderStatus::Rejected) =>
            {
                // An exit died without filling (operator cancel or
                // exchange purge). The bracket no longer protects the
                // inventory.
                error!(
                    position_id = %position.id,
                    tp_status = %tp,
                    sl_status = %sl,
                    unhedged_inventory = true,
                    "Exit leg terminated without fill, position FAILED"
                );
                position.state = PositionState::Failed;
                Ok(true)
            }
            _ => Ok(changed),
        }
    }

    /// One exit filled: record the reason, move to CLOSING and ask the
    /// exchange to pull the sibling. Confirmation happens on a later
    /// pass when the sibling polls as terminal.
    async fn begin_close(&mut self, position: &mut Position, reason: CloseReason) {
        info!(
            position_id = %position.id,
            reason = %reason,
            "Exit filled, position CLOSING"
        );
        position.close_reason = Some(reason);
        position.state = PositionState::Closing;

        let sibling = sibling_leg(position);
        let order_id = leg_order_id(sibling).to_owned();
        if let Err(e) = self.exchange.cancel_order(&order_id).await {
            warn!(
                position_id = %position.id,
                order_id,
                error = %e,
                "Sibling cancel request failed, will retry"
            );
        }
    }

    // -----------------------------------------------------------------
    // CLOSING: waiting for the sibling exit to leave the book
    // -----------------------------------------------------------------

    async fn reconcile_closing(
        &mut self,
        position: &mut Position,
    ) -> Result<bool, ExchangeError> {
        let status = self.poll_leg(sibling_leg(position)).await?;
        sibling_leg_mut(position).status = status;

        match status {
            OrderStatus::Cancelled | OrderStatus::Rejected => {
                info!(position_id = %position.id, close_reason = ?position.close_reason, "Sibling off the book, position CLOSED");
                position.state = PositionState::Closed;
                self.cancel_attempts.remove(&position.id);
                Ok(true)
            }
            OrderStatus::Filled => {
                // Raced our cancel. The first-observed fill keeps the
                // close reason already recorded on the position.
                warn!(
                    position_id = %position.id,
                    "Sibling filled before cancel landed, position CLOSED"
                );
                position.state = PositionState::Closed;
                self.cancel_attempts.remove(&position.id);
                Ok(true)
            }
            OrderStatus::Pending | OrderStatus::Submitted => {
                let attempts = self.cancel_attempts.entry(position.id).or_insert(0);
                *attempts += 1;
                if *attempts > MAX_CANCEL_ATTEMPTS {
                    error!(
                        position_id = %position.id,
                        attempts = *attempts,
                        unhedged_inventory = true,
                        "Sibling cancel never confirmed, position FAILED"
                    );
                    position.state = PositionState::Failed;
                    self.cancel_attempts.remove(&position.id);
                    return Ok(true);
                }

                let order_id = leg_order_id(sibling_leg(position)).to_owned();
                if let Err(e) = self.exchange.cancel_order(&order_id).await {
                    warn!(
                        position_id = %position.id,
                        order_id,
                        error = %e,
                        "Sibling cancel retry failed"
                    );
                }
                Ok(false)
            }
        }
    }

    async fn poll_leg(&self, leg: &TradeLeg) -> Result<OrderStatus, ExchangeError> {
        self.exchange.order_status(leg_order_id(leg)).await
    }
}

/// The exit leg that did NOT fill, per the recorded close reason. While
/// CLOSING the reason is always set; a missing one conservatively points
/// at the stop-loss.
fn sibling_leg(position: &Position) -> &TradeLeg {
    match position.close_reason {
        Some(CloseReason::TakeProfit) => &position.stop_loss_leg,
        _ => &position.take_profit_leg,
    }
}

fn sibling_leg_mut(position: &mut Position) -> &mut TradeLeg {
    match position.close_reason {
        Some(CloseReason::TakeProfit) => &mut position.stop_loss_leg,
        _ => &mut position.take_profit_leg,
    }
}

fn leg_order_id(leg: &TradeLeg) -> &str {
    leg.exchange_order_id.as_deref().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
