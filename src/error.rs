//! Error taxonomy for the engine.
//!
//! Transient I/O failures are retried inside the component that owns the
//! resource (feed reconnects, exchange calls back off); business failures
//! (rejections, refusals) are recorded on the position and reported
//! upward. Nothing here terminates the process — only missing or invalid
//! configuration is fatal, and that happens at startup in `main`.

use thiserror::Error;

/// Failures surfaced by the exchange trading API.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network or HTTP-level failure. Recoverable: retry with backoff on
    /// read paths, abort the current decision on write paths.
    #[error("exchange unavailable: {0}")]
    Unavailable(String),

    /// The token id is unknown to the exchange.
    #[error("invalid instrument: {0}")]
    InvalidInstrument(String),

    /// The exchange refused the order. Recoverable at position level.
    #[error("order rejected: {0}")]
    OrderRejected(String),
}

impl ExchangeError {
    /// Whether a write-path retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Unavailable(_))
    }
}

/// Failures surfaced by the streaming price feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed disconnected: {0}")]
    Disconnected(String),

    #[error("malformed feed message: {0}")]
    Malformed(String),

    #[error("feed connection failed: {0}")]
    Connect(String),
}
