//! Streaming oracle price feed.
//!
//! Maintains the latest `PriceTick` for the active instrument, fed by a
//! WebSocket source. Only the most recent value matters, so ticks land in
//! a single shared cell rather than a queue. Malformed messages are
//! dropped and logged; connection loss triggers reconnect with
//! exponential backoff (unlimited retries). The decision pipeline reads
//! the cell without ever blocking the writer.

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::types::PriceTick;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Inbound feed message: `{ "instrument": ..., "price": ..., "timestamp": ... }`.
#[derive(Debug, Deserialize)]
struct FeedMessage {
    instrument: String,
    price: Decimal,
    #[allow(dead_code)]
    timestamp: Option<String>,
}

/// Parse one text frame into a tick for our instrument.
///
/// Messages for other instruments are ignored (None); unparseable frames
/// are an error so the caller can log them.
fn parse_tick(raw: &str, instrument: &str) -> Result<Option<PriceTick>, FeedError> {
    let msg: FeedMessage =
        serde_json::from_str(raw).map_err(|e| FeedError::Malformed(e.to_string()))?;

    if msg.instrument != instrument {
        return Ok(None);
    }

    Ok(Some(PriceTick {
        instrument: msg.instrument,
        price: msg.price,
        received_at: Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// Shared latest-tick cell
// ---------------------------------------------------------------------------

/// Handle to the most recent oracle tick.
///
/// Cloneable; the feed task writes, the detector reads. The lock is held
/// only for the copy, never across an await.
#[derive(Clone, Default)]
pub struct LatestTick {
    cell: Arc<Mutex<Option<PriceTick>>>,
}

impl LatestTick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick, if any has arrived. `None` also covers "feed never
    /// connected" — callers apply their own staleness bound on top.
    pub fn latest(&self) -> Option<PriceTick> {
        self.cell
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, tick: PriceTick) {
        *self
            .cell
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tick);
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Reconnect delay schedule: doubles across consecutive failed attempts,
/// capped at the configured max, and reset to the base once a connection
/// is established (even if that connection later dies with an error).
#[derive(Debug)]
struct Backoff {
    base_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            current_ms: base_ms,
        }
    }

    fn reset(&mut self) {
        self.current_ms = self.base_ms;
    }

    /// Delay before the next attempt, advancing the schedule.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = (self.current_ms * 2).min(self.max_ms);
        Duration::from_millis(delay)
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// WebSocket subscriber that keeps `LatestTick` current.
///
/// `run` loops forever: connect, subscribe, consume frames, and on any
/// failure back off and reconnect. It never returns under normal
/// operation; abort the task to stop it.
pub struct FeedListener {
    config: FeedConfig,
    latest: LatestTick,
}

impl FeedListener {
    pub fn new(config: FeedConfig, latest: LatestTick) -> Self {
        Self { config, latest }
    }

    pub async fn run(self) {
        let mut backoff = Backoff::new(self.config.backoff_base_ms, self.config.backoff_max_ms);

        loop {
            match self.connect_and_consume(&mut backoff).await {
                Ok(()) => {
                    warn!("Feed connection closed by server, reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, "Feed error, reconnecting after backoff");
                }
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    /// One connection lifetime: subscribe, then consume until the stream
    /// ends or errors. Resets the backoff once the subscription is up, so
    /// only consecutive failed attempts escalate the delay.
    async fn connect_and_consume(&self, backoff: &mut Backoff) -> Result<(), FeedError> {
        info!(endpoint = %self.config.endpoint, "Connecting to price feed");

        let (ws, _) = connect_async(&self.config.endpoint)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::json!({
            "op": "subscribe",
            "instrument": self.config.instrument,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| FeedError::Disconnected(e.to_string()))?;

        info!(instrument = %self.config.instrument, "Feed subscribed");
        backoff.reset();

        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| FeedError::Disconnected(e.to_string()))?;
            match frame {
                Message::Text(text) => match parse_tick(&text, &self.config.instrument) {
                    Ok(Some(tick)) => {
                        debug!(price = %tick.price, "Tick");
                        self.latest.publish(tick);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Not fatal: drop the frame and keep consuming.
                        warn!(error = %e, "Dropping malformed feed message");
                    }
                },
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| FeedError::Disconnected(e.to_string()))?;
                }
                Message::Close(_) => return Ok(()),
                _ => {}
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
