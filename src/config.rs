//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub feed: FeedConfig,
    pub exchange: ExchangeConfig,
    pub risk: RiskConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub name: String,
    /// Token id of the single tradable instrument for this instance.
    pub token_id: String,
    /// How often the decision pipeline evaluates the latest tick.
    pub decision_interval_secs: u64,
    /// How often the reconciliation loop polls order status.
    pub reconcile_interval_secs: u64,
    /// How long a graceful shutdown waits for open positions to drain.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint of the oracle price stream.
    pub endpoint: String,
    /// Instrument key used in the subscribe handshake.
    pub instrument: String,
    /// Ticks older than this are treated as absent for decisions.
    #[serde(default = "default_staleness")]
    pub staleness_secs: u64,
    /// Initial reconnect delay.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Reconnect delay cap.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_staleness() -> u64 {
    5
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Base URL of the exchange REST API.
    pub endpoint: String,
    /// Env var holding the API key (resolved at runtime, never stored).
    pub api_key_env: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    /// Minimum |oracle − midpoint| divergence that triggers an entry.
    pub price_difference_threshold: Decimal,
    /// Offset above the reference price for the take-profit limit.
    pub take_profit_offset: Decimal,
    /// Offset below the reference price for the stop-loss limit.
    pub stop_loss_offset: Decimal,
    /// USD notional committed per entry.
    pub trade_amount_usd: Decimal,
    /// Minimum seconds between successive entry attempts.
    pub cooldown_secs: u64,
    pub max_concurrent_positions: usize,
    /// Fee/slippage buffer as a fraction of `trade_amount_usd`, added to
    /// the balance requirement by the risk gate.
    #[serde(default = "default_fee_buffer")]
    pub fee_buffer_pct: Decimal,
}

fn default_fee_buffer() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.risk.price_difference_threshold > Decimal::ZERO,
            "price_difference_threshold must be positive"
        );
        anyhow::ensure!(
            self.risk.take_profit_offset > Decimal::ZERO
                && self.risk.stop_loss_offset > Decimal::ZERO,
            "bracket offsets must be positive"
        );
        anyhow::ensure!(
            self.risk.trade_amount_usd > Decimal::ZERO,
            "trade_amount_usd must be positive"
        );
        anyhow::ensure!(
            self.risk.max_concurrent_positions > 0,
            "max_concurrent_positions must be at least 1"
        );
        anyhow::ensure!(
            !self.engine.token_id.is_empty(),
            "engine.token_id must be set"
        );
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
