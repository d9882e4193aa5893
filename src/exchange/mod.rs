//! Exchange integration.
//!
//! Defines the `Exchange` trait — the engine's view of the trading API —
//! and provides the CLOB REST implementation. The trait owns both the
//! market snapshot surface (`quote`) and the order surface
//! (place/cancel/status/balance); the engine never sees HTTP.

pub mod clob;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ExchangeError;
use crate::types::{MarketQuote, OrderKind, OrderStatus, Side};

/// Abstraction over the exchange trading API.
///
/// All methods are the engine's only suspension points besides the feed;
/// implementations must not cache quotes — every `quote` call reflects
/// the book at call time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Submit an order. Returns the exchange-assigned order id.
    async fn place_order(
        &self,
        token_id: &str,
        side: Side,
        kind: OrderKind,
        size: Decimal,
        limit_price: Option<Decimal>,
    ) -> Result<String, ExchangeError>;

    /// Cancel a working order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError>;

    /// Current exchange-side status of an order.
    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError>;

    /// Fresh best bid/ask snapshot for a token.
    async fn quote(&self, token_id: &str) -> Result<MarketQuote, ExchangeError>;

    /// Available quote-currency balance.
    async fn balance(&self) -> Result<Decimal, ExchangeError>;

    /// Exchange name for logging and identification.
    fn name(&self) -> &str;
}
