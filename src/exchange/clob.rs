//! CLOB REST client.
//!
//! Implements the `Exchange` trait over the exchange's central limit
//! order book API. Market data (book snapshots) is unauthenticated;
//! order placement and balance require an API key sent per request.
//!
//! Endpoint shapes consumed here:
//!   GET    /book?token_id=..   → { "bid": "0.69", "ask": "0.71" }
//!   POST   /order              → { "order_id": "..." }
//!   DELETE /order/{id}         → 2xx on success
//!   GET    /order/{id}         → { "status": "live" | "matched" | ... }
//!   GET    /balance            → { "balance": "123.45" }

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::types::{MarketQuote, OrderKind, OrderStatus, Side};

const API_KEY_HEADER: &str = "X-API-KEY";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BookResponse {
    bid: Decimal,
    ask: Decimal,
}

#[derive(Debug, Serialize)]
struct PlaceOrderRequest<'a> {
    token_id: &'a str,
    side: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    size: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

/// Map the exchange's status strings onto our order lifecycle.
fn parse_order_status(s: &str) -> Result<OrderStatus, ExchangeError> {
    match s {
        "pending" => Ok(OrderStatus::Pending),
        "live" | "open" => Ok(OrderStatus::Submitted),
        "matched" | "filled" => Ok(OrderStatus::Filled),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        "rejected" => Ok(OrderStatus::Rejected),
        other => Err(ExchangeError::Unavailable(format!(
            "unrecognised order status: {other}"
        ))),
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn kind_str(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Market => "market",
        OrderKind::Limit => "limit",
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ClobClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl ClobClient {
    pub fn new(cfg: &ExchangeConfig, api_key: SecretString) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Unavailable(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: cfg.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Collapse a reqwest error into the transport-level variant.
    fn transport(err: reqwest::Error) -> ExchangeError {
        ExchangeError::Unavailable(err.to_string())
    }

    /// Read the response body for an error status, for diagnostics.
    async fn error_body(resp: reqwest::Response) -> String {
        resp.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl Exchange for ClobClient {
    async fn place_order(
        &self,
        token_id: &str,
        side: Side,
        kind: OrderKind,
        size: Decimal,
        limit_price: Option<Decimal>,
    ) -> Result<String, ExchangeError> {
        let body = PlaceOrderRequest {
            token_id,
            side: side_str(side),
            kind: kind_str(kind),
            size,
            price: limit_price,
        };
        debug!(token_id, %side, %kind, %size, "Placing order");

        let resp = self
            .http
            .post(self.url("/order"))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;

        match resp.status() {
            s if s.is_success() => {
                let parsed: PlaceOrderResponse = resp
                    .json()
                    .await
                    .map_err(|e| ExchangeError::Unavailable(format!("bad order response: {e}")))?;
                Ok(parsed.order_id)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::FORBIDDEN => {
                Err(ExchangeError::OrderRejected(Self::error_body(resp).await))
            }
            StatusCode::NOT_FOUND => Err(ExchangeError::InvalidInstrument(token_id.to_string())),
            s => Err(ExchangeError::Unavailable(format!(
                "order endpoint returned {s}: {}",
                Self::error_body(resp).await
            ))),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        debug!(order_id, "Cancelling order");
        let resp = self
            .http
            .delete(self.url(&format!("/order/{order_id}")))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(Self::transport)?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {
                Err(ExchangeError::OrderRejected(Self::error_body(resp).await))
            }
            s => Err(ExchangeError::Unavailable(format!(
                "cancel endpoint returned {s}"
            ))),
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError> {
        let resp = self
            .http
            .get(self.url(&format!("/order/{order_id}")))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(Self::transport)?;

        if !resp.status().is_success() {
            return Err(ExchangeError::Unavailable(format!(
                "status endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: OrderStatusResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Unavailable(format!("bad status response: {e}")))?;
        parse_order_status(&parsed.status)
    }

    async fn quote(&self, token_id: &str) -> Result<MarketQuote, ExchangeError> {
        let resp = self
            .http
            .get(self.url("/book"))
            .query(&[("token_id", token_id)])
            .send()
            .await
            .map_err(Self::transport)?;

        match resp.status() {
            s if s.is_success() => {
                let book: BookResponse = resp
                    .json()
                    .await
                    .map_err(|e| ExchangeError::Unavailable(format!("bad book response: {e}")))?;
                Ok(MarketQuote::from_book(token_id, book.bid, book.ask))
            }
            StatusCode::NOT_FOUND => Err(ExchangeError::InvalidInstrument(token_id.to_string())),
            s => Err(ExchangeError::Unavailable(format!(
                "book endpoint returned {s}"
            ))),
        }
    }

    async fn balance(&self) -> Result<Decimal, ExchangeError> {
        let resp = self
            .http
            .get(self.url("/balance"))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(Self::transport)?;

        if !resp.status().is_success() {
            return Err(ExchangeError::Unavailable(format!(
                "balance endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: BalanceResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Unavailable(format!("bad balance response: {e}")))?;
        Ok(parsed.balance)
    }

    fn name(&self) -> &str {
        "clob"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
