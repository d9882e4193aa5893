//! Mock exchange for integration testing.
//!
//! Provides a deterministic `Exchange` implementation that accepts
//! orders, lets tests script fills and cancels, and tracks balance —
//! all in-memory with no external dependencies.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arbiter::error::ExchangeError;
use arbiter::exchange::Exchange;
use arbiter::types::{MarketQuote, OrderKind, OrderStatus, Side};

/// One order as the mock exchange received it.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub token_id: String,
    pub side: Side,
    pub kind: OrderKind,
    pub size: Decimal,
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
}

/// A mock exchange for deterministic testing.
///
/// All state is in-memory. Order statuses, the book snapshot, and the
/// balance are fully controllable from test code.
pub struct MockExchange {
    balance: Arc<Mutex<Decimal>>,
    /// Best bid/ask returned by `quote`, keyed as (token_id, bid, ask).
    book: Arc<Mutex<Option<(String, Decimal, Decimal)>>>,
    orders: Arc<Mutex<HashMap<String, PlacedOrder>>>,
    /// Order ids in placement order.
    order_log: Arc<Mutex<Vec<String>>>,
    seq: Arc<Mutex<u64>>,
    /// If set, all operations return `Unavailable` with this message.
    force_error: Arc<Mutex<Option<String>>>,
    /// If true, placements are rejected instead of accepted.
    reject_orders: Arc<Mutex<bool>>,
    /// If true, cancel requests are rejected.
    reject_cancels: Arc<Mutex<bool>>,
}

impl MockExchange {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance: Arc::new(Mutex::new(balance)),
            book: Arc::new(Mutex::new(None)),
            orders: Arc::new(Mutex::new(HashMap::new())),
            order_log: Arc::new(Mutex::new(Vec::new())),
            seq: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
            reject_orders: Arc::new(Mutex::new(false)),
            reject_cancels: Arc::new(Mutex::new(false)),
        }
    }

    /// Set the book snapshot that `quote` returns.
    pub fn set_book(&self, token_id: &str, bid: Decimal, ask: Decimal) {
        *self.book.lock().unwrap() = Some((token_id.to_string(), bid, ask));
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Reject (or accept again) all subsequent placements.
    pub fn reject_orders(&self, reject: bool) {
        *self.reject_orders.lock().unwrap() = reject;
    }

    /// Reject (or accept again) all subsequent cancel requests.
    pub fn reject_cancels(&self, reject: bool) {
        *self.reject_cancels.lock().unwrap() = reject;
    }

    /// Script a status transition, e.g. mark an order filled.
    pub fn set_status(&self, order_id: &str, status: OrderStatus) {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(order_id)
            .unwrap_or_else(|| panic!("unknown order: {order_id}"));
        order.status = status;
    }

    /// Order ids in the order they were placed.
    pub fn order_ids(&self) -> Vec<String> {
        self.order_log.lock().unwrap().clone()
    }

    pub fn order(&self, order_id: &str) -> PlacedOrder {
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| panic!("unknown order: {order_id}"))
    }

    fn check_error(&self) -> Result<(), ExchangeError> {
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(ExchangeError::Unavailable(msg.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn place_order(
        &self,
        token_id: &str,
        side: Side,
        kind: OrderKind,
        size: Decimal,
        limit_price: Option<Decimal>,
    ) -> Result<String, ExchangeError> {
        self.check_error()?;
        if *self.reject_orders.lock().unwrap() {
            return Err(ExchangeError::OrderRejected("scripted rejection".into()));
        }

        let id = {
            let mut seq = self.seq.lock().unwrap();
            *seq += 1;
            format!("MOCK-{seq:04}", seq = *seq)
        };

        self.orders.lock().unwrap().insert(
            id.clone(),
            PlacedOrder {
                token_id: token_id.to_string(),
                side,
                kind,
                size,
                limit_price,
                status: OrderStatus::Submitted,
            },
        );
        self.order_log.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.check_error()?;
        if *self.reject_cancels.lock().unwrap() {
            return Err(ExchangeError::OrderRejected("scripted cancel rejection".into()));
        }

        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderRejected(format!("unknown order: {order_id}")))?;
        if order.status == OrderStatus::Filled {
            return Err(ExchangeError::OrderRejected("already matched".into()));
        }
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError> {
        self.check_error()?;
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .map(|o| o.status)
            .ok_or_else(|| ExchangeError::Unavailable(format!("unknown order: {order_id}")))
    }

    async fn quote(&self, token_id: &str) -> Result<MarketQuote, ExchangeError> {
        self.check_error()?;
        match self.book.lock().unwrap().as_ref() {
            Some((tok, bid, ask)) if tok == token_id => {
                Ok(MarketQuote::from_book(tok, *bid, *ask))
            }
            _ => Err(ExchangeError::InvalidInstrument(token_id.to_string())),
        }
    }

    async fn balance(&self) -> Result<Decimal, ExchangeError> {
        self.check_error()?;
        Ok(*self.balance.lock().unwrap())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
