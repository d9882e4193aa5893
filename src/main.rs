//! ARBITER — Oracle-vs-orderbook arbitrage engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! and runs the decision and reconciliation loops against a live price
//! feed with graceful shutdown.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use arbiter::config::AppConfig;
use arbiter::engine::reconciler::Reconciler;
use arbiter::engine::{Engine, EngineState, SharedState};
use arbiter::exchange::clob::ClobClient;
use arbiter::exchange::Exchange;
use arbiter::feed::{FeedListener, LatestTick};

const BANNER: &str = r#"
    _    ____  ____ ___ _____ _____ ____
   / \  |  _ \| __ )_ _|_   _| ____|  _ \
  / _ \ | |_) |  _ \| |  | | |  _| | |_) |
 / ___ \|  _ <| |_) | |  | | | |___|  _ <
/_/   \_\_| \_\____/___| |_| |_____|_| \_\

  Oracle-vs-orderbook arbitrage engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        engine_name = %cfg.engine.name,
        token_id = %cfg.engine.token_id,
        instrument = %cfg.feed.instrument,
        decision_interval_secs = cfg.engine.decision_interval_secs,
        reconcile_interval_secs = cfg.engine.reconcile_interval_secs,
        "ARBITER starting up"
    );

    // Position state lives in memory only. Orders left on the exchange
    // by a previous run are NOT adopted and must be resolved by hand.
    warn!(
        "Starting with an empty position book; any orders from a previous \
         run are still live on the exchange and need manual resolution"
    );

    // -- Initialise components -------------------------------------------

    let api_key = SecretString::new(
        AppConfig::resolve_env(&cfg.exchange.api_key_env)
            .context("Exchange API key missing")?,
    );
    let exchange: Arc<dyn Exchange> =
        Arc::new(ClobClient::new(&cfg.exchange, api_key).context("Failed to build CLOB client")?);

    let ticks = LatestTick::new();
    let listener = FeedListener::new(cfg.feed.clone(), ticks.clone());
    let feed_task = tokio::spawn(listener.run());

    let state: SharedState = Arc::new(Mutex::new(EngineState::new()));
    let engine = Engine::new(&cfg, Arc::clone(&exchange), ticks, Arc::clone(&state));
    let mut reconciler = Reconciler::new(
        Arc::clone(&exchange),
        cfg.risk.clone(),
        Arc::clone(&state),
    );

    // -- Main loop -------------------------------------------------------

    let mut decision_interval =
        tokio::time::interval(Duration::from_secs(cfg.engine.decision_interval_secs));
    let mut reconcile_interval =
        tokio::time::interval(Duration::from_secs(cfg.engine.reconcile_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering main loop. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = decision_interval.tick() => {
                if let Some(outcome) = engine.run_decision_cycle().await {
                    info!(outcome = ?outcome, "Decision cycle acted");
                }
            }
            _ = reconcile_interval.tick() => {
                reconciler.tick().await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // -- Graceful shutdown: drain open positions -------------------------

    feed_task.abort();
    drain_positions(&mut reconciler, &state, cfg.engine.shutdown_timeout_secs).await;

    let summary = state.lock().await.book.summary();
    info!(
        open = summary.open,
        closed = summary.closed,
        failed = summary.failed,
        "ARBITER shut down cleanly."
    );

    Ok(())
}

/// Keep reconciling until every position reaches a terminal state or
/// the timeout expires. No new entries are opened during the drain.
async fn drain_positions(reconciler: &mut Reconciler, state: &SharedState, timeout_secs: u64) {
    if !reconciler.has_open_positions().await {
        return;
    }

    info!(timeout_secs, "Draining open positions before exit");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    let mut interval = tokio::time::interval(Duration::from_secs(2));

    while tokio::time::Instant::now() < deadline {
        interval.tick().await;
        reconciler.tick().await;
        if !reconciler.has_open_positions().await {
            info!("All positions resolved.");
            return;
        }
    }

    let open = state.lock().await.book.open_positions();
    for position in &open {
        error!(
            position_id = %position.id,
            state = %position.state,
            token_id = %position.token_id,
            "Position still open at shutdown — resolve on the exchange manually"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbiter=info"));

    let json_logging = std::env::var("ARBITER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
