//! Shared types for the ARBITER engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that feed, exchange, and engine
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Latest oracle price for the active instrument.
///
/// Owned by the price feed listener and overwritten on every inbound
/// message. No history is retained here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub instrument: String,
    pub price: Decimal,
    /// Local receive time, used for staleness checks.
    pub received_at: DateTime<Utc>,
}

impl PriceTick {
    /// Whether this tick is older than `max_age` as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.received_at > max_age
    }
}

impl fmt::Display for PriceTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.instrument, self.price, self.received_at)
    }
}

/// Best bid/ask snapshot for a token, produced fresh on every call to the
/// market snapshot provider. Never cached across decision cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    pub token_id: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub midpoint: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl MarketQuote {
    /// Build a quote from a raw bid/ask pair, deriving the midpoint.
    pub fn from_book(token_id: &str, bid: Decimal, ask: Decimal) -> Self {
        Self {
            token_id: token_id.to_string(),
            bid,
            ask,
            midpoint: (bid + ask) / Decimal::TWO,
            fetched_at: Utc::now(),
        }
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.fetched_at > max_age
    }
}

impl fmt::Display for MarketQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bid={} ask={} mid={}",
            self.token_id, self.bid, self.ask, self.midpoint
        )
    }
}

// ---------------------------------------------------------------------------
// Order enums
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind. Market orders execute immediately at the best available
/// price; limit orders rest on the book at `limit_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Exchange-side status of a single order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Not yet submitted to the exchange.
    Pending,
    /// Accepted by the exchange, resting or working.
    Submitted,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Whether the exchange will never change this status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Submitted => write!(f, "SUBMITTED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// TradeLeg
// ---------------------------------------------------------------------------

/// One order of a bracket: the entry or one of the two contingent exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLeg {
    /// Assigned by the exchange on submission; `None` until then.
    pub exchange_order_id: Option<String>,
    pub token_id: String,
    pub side: Side,
    pub kind: OrderKind,
    /// Required for limit orders, absent for market orders.
    pub limit_price: Option<Decimal>,
    /// Size in shares.
    pub size: Decimal,
    pub status: OrderStatus,
}

impl TradeLeg {
    pub fn market(token_id: &str, side: Side, size: Decimal) -> Self {
        Self {
            exchange_order_id: None,
            token_id: token_id.to_string(),
            side,
            kind: OrderKind::Market,
            limit_price: None,
            size,
            status: OrderStatus::Pending,
        }
    }

    pub fn limit(token_id: &str, side: Side, size: Decimal, limit_price: Decimal) -> Self {
        Self {
            exchange_order_id: None,
            token_id: token_id.to_string(),
            side,
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
            size,
            status: OrderStatus::Pending,
        }
    }

    /// Whether this leg has an order resting on the exchange.
    pub fn is_open_on_exchange(&self) -> bool {
        self.exchange_order_id.is_some() && self.status == OrderStatus::Submitted
    }
}

impl fmt::Display for TradeLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit_price {
            Some(px) => write!(
                f,
                "{} {} {} {} @ {} [{}]",
                self.side, self.kind, self.size, self.token_id, px, self.status
            ),
            None => write!(
                f,
                "{} {} {} {} [{}]",
                self.side, self.kind, self.size, self.token_id, self.status
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Lifecycle state of a bracketed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    /// Entry submitted, waiting for the fill.
    Opening,
    /// Entry filled, both exit legs working on the exchange.
    Active,
    /// One exit filled, sibling cancel in flight.
    Closing,
    Closed,
    Failed,
}

impl PositionState {
    /// States the reconciliation loop still needs to advance.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PositionState::Opening | PositionState::Active | PositionState::Closing
        )
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Opening => write!(f, "OPENING"),
            PositionState::Active => write!(f, "ACTIVE"),
            PositionState::Closing => write!(f, "CLOSING"),
            PositionState::Closed => write!(f, "CLOSED"),
            PositionState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why a position left the ACTIVE state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Manual,
    Rollback,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            CloseReason::StopLoss => write!(f, "STOP_LOSS"),
            CloseReason::Manual => write!(f, "MANUAL"),
            CloseReason::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

/// A three-leg bracket: one entry plus two mutually exclusive exits.
///
/// Created by the orchestrator at decision time; mutated only by the
/// reconciliation loop afterwards. At most one exit leg may end FILLED;
/// once either fills, the sibling must be CANCELLED before the position
/// is CLOSED. The entry leg must reach FILLED before either exit is
/// submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub token_id: String,
    pub entry_leg: TradeLeg,
    pub take_profit_leg: TradeLeg,
    pub stop_loss_leg: TradeLeg,
    pub opened_at: DateTime<Utc>,
    pub state: PositionState,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    pub fn new(entry_leg: TradeLeg, take_profit_leg: TradeLeg, stop_loss_leg: TradeLeg) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_id: entry_leg.token_id.clone(),
            entry_leg,
            take_profit_leg,
            stop_loss_leg,
            opened_at: Utc::now(),
            state: PositionState::Opening,
            close_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PositionState::Closed | PositionState::Failed)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} entry={} tp={} sl={}",
            self.state,
            self.id,
            self.token_id,
            self.entry_leg.status,
            self.take_profit_leg.status,
            self.stop_loss_leg.status,
        )?;
        if let Some(reason) = self.close_reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A qualifying divergence emitted by the detector for the orchestrator
/// to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub token_id: String,
    pub side: Side,
    /// Market midpoint at decision time; the basis for sizing and for
    /// both bracket limit prices.
    pub reference_price: Decimal,
    /// Signed oracle−midpoint divergence that triggered the opportunity.
    pub divergence: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ref={} div={}",
            self.side, self.token_id, self.reference_price, self.divergence
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
