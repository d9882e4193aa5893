//! End-to-end lifecycle tests.
//!
//! Drives the decision engine and the reconciler against the mock
//! exchange, scripting fills and failures to walk positions through
//! every lifecycle path.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use arbiter::config::{AppConfig, EngineConfig, ExchangeConfig, FeedConfig, RiskConfig};
use arbiter::engine::orchestrator::OpenOutcome;
use arbiter::engine::reconciler::Reconciler;
use arbiter::engine::{Engine, EngineState, SharedState};
use arbiter::exchange::Exchange;
use arbiter::feed::LatestTick;
use arbiter::types::{CloseReason, OrderStatus, PositionState, PriceTick, Side};

use crate::mock_exchange::MockExchange;

const TOKEN: &str = "0xtoken";

fn test_config(cooldown_secs: u64) -> AppConfig {
    AppConfig {
        engine: EngineConfig {
            name: "arbiter-test".into(),
            token_id: TOKEN.into(),
            decision_interval_secs: 1,
            reconcile_interval_secs: 1,
            shutdown_timeout_secs: 5,
        },
        feed: FeedConfig {
            endpoint: "wss://example.invalid/ws".into(),
            instrument: "BTC-USD".into(),
            staleness_secs: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 1000,
        },
        exchange: ExchangeConfig {
            endpoint: "https://example.invalid".into(),
            api_key_env: "TEST_API_KEY".into(),
            http_timeout_secs: 30,
        },
        risk: RiskConfig {
            price_difference_threshold: dec!(0.015),
            take_profit_offset: dec!(0.01),
            stop_loss_offset: dec!(0.005),
            trade_amount_usd: dec!(70),
            cooldown_secs,
            max_concurrent_positions: 1,
            fee_buffer_pct: dec!(0.02),
        },
    }
}

struct Harness {
    exchange: Arc<MockExchange>,
    engine: Engine,
    reconciler: Reconciler,
    ticks: LatestTick,
    state: SharedState,
}

impl Harness {
    fn new(cfg: &AppConfig) -> Self {
        let exchange = Arc::new(MockExchange::new(dec!(1000)));
        // Midpoint 0.70
        exchange.set_book(TOKEN, dec!(0.68), dec!(0.72));

        let dyn_exchange: Arc<dyn Exchange> = exchange.clone();
        let ticks = LatestTick::new();
        let state: SharedState = Arc::new(Mutex::new(EngineState::new()));

        Self {
            engine: Engine::new(cfg, Arc::clone(&dyn_exchange), ticks.clone(), Arc::clone(&state)),
            reconciler: Reconciler::new(dyn_exchange, cfg.risk.clone(), Arc::clone(&state)),
            exchange,
            ticks,
            state,
        }
    }

    fn publish_oracle(&self, price: rust_decimal::Decimal) {
        self.ticks.publish(PriceTick {
            instrument: "BTC-USD".into(),
            price,
            received_at: Utc::now(),
        });
    }

    async fn only_position(&self) -> arbiter::types::Position {
        let state = self.state.lock().await;
        assert_eq!(state.book.len(), 1);
        let position = state.book.iter().next().unwrap().clone();
        position
    }
}

#[tokio::test]
async fn test_take_profit_lifecycle() {
    let cfg = test_config(30);
    let mut h = Harness::new(&cfg);

    // Oracle well above the midpoint: divergence 0.05 >= 0.015
    h.publish_oracle(dec!(0.75));
    let outcome = h.engine.run_decision_cycle().await;
    assert!(matches!(outcome, Some(OpenOutcome::Opened(_))));

    // A single market BUY sized amount/reference is on the exchange
    let ids = h.exchange.order_ids();
    assert_eq!(ids.len(), 1);
    let entry = h.exchange.order(&ids[0]);
    assert_eq!(entry.side, Side::Buy);
    assert_eq!(entry.size, dec!(70) / dec!(0.70));
    assert!(entry.limit_price.is_none());

    // Entry fills; the reconciler submits both exits at bracket prices
    h.exchange.set_status(&ids[0], OrderStatus::Filled);
    h.reconciler.tick().await;

    let ids = h.exchange.order_ids();
    assert_eq!(ids.len(), 3);
    let tp = h.exchange.order(&ids[1]);
    let sl = h.exchange.order(&ids[2]);
    assert_eq!(tp.limit_price, Some(dec!(0.71)));
    assert_eq!(sl.limit_price, Some(dec!(0.695)));
    assert_eq!(tp.side, Side::Sell);
    assert_eq!(sl.side, Side::Sell);
    assert_eq!(h.only_position().await.state, PositionState::Active);

    // Take-profit fills; the stop-loss must be cancelled, never filled
    h.exchange.set_status(&ids[1], OrderStatus::Filled);
    h.reconciler.tick().await;
    assert_eq!(h.only_position().await.state, PositionState::Closing);

    h.reconciler.tick().await;
    let pos = h.only_position().await;
    assert_eq!(pos.state, PositionState::Closed);
    assert_eq!(pos.close_reason, Some(CloseReason::TakeProfit));
    assert_eq!(h.exchange.order(&ids[2]).status, OrderStatus::Cancelled);
    assert_eq!(h.state.lock().await.book.open_count(), 0);
}

#[tokio::test]
async fn test_stop_loss_lifecycle() {
    let cfg = test_config(30);
    let mut h = Harness::new(&cfg);

    h.publish_oracle(dec!(0.75));
    h.engine.run_decision_cycle().await;

    let entry_id = h.exchange.order_ids()[0].clone();
    h.exchange.set_status(&entry_id, OrderStatus::Filled);
    h.reconciler.tick().await;

    let ids = h.exchange.order_ids();
    h.exchange.set_status(&ids[2], OrderStatus::Filled); // stop-loss
    h.reconciler.tick().await;
    h.reconciler.tick().await;

    let pos = h.only_position().await;
    assert_eq!(pos.state, PositionState::Closed);
    assert_eq!(pos.close_reason, Some(CloseReason::StopLoss));
    assert_eq!(h.exchange.order(&ids[1]).status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_no_trade_below_threshold() {
    let cfg = test_config(30);
    let h = Harness::new(&cfg);

    // Divergence 0.005, under the 0.015 threshold
    h.publish_oracle(dec!(0.705));
    assert!(h.engine.run_decision_cycle().await.is_none());
    assert!(h.exchange.order_ids().is_empty());
}

#[tokio::test]
async fn test_trade_at_exact_threshold() {
    let cfg = test_config(30);
    let h = Harness::new(&cfg);

    // Divergence exactly 0.015 triggers
    h.publish_oracle(dec!(0.715));
    assert!(matches!(
        h.engine.run_decision_cycle().await,
        Some(OpenOutcome::Opened(_))
    ));
}

#[tokio::test]
async fn test_cooldown_suppresses_after_failed_entry() {
    let cfg = test_config(300);
    let h = Harness::new(&cfg);

    h.exchange.reject_orders(true);
    h.publish_oracle(dec!(0.75));
    let outcome = h.engine.run_decision_cycle().await;
    assert!(matches!(outcome, Some(OpenOutcome::EntryFailed(_))));
    assert_eq!(h.only_position().await.state, PositionState::Failed);

    // The exchange is healthy again and the signal persists, but the
    // cooldown from the failed attempt suppresses re-entry.
    h.exchange.reject_orders(false);
    h.publish_oracle(dec!(0.75));
    assert!(h.engine.run_decision_cycle().await.is_none());
    assert_eq!(h.state.lock().await.book.len(), 1);
}

#[tokio::test]
async fn test_rollback_when_exit_submission_fails() {
    let cfg = test_config(30);
    let mut h = Harness::new(&cfg);

    h.publish_oracle(dec!(0.75));
    h.engine.run_decision_cycle().await;

    let entry_id = h.exchange.order_ids()[0].clone();
    h.exchange.set_status(&entry_id, OrderStatus::Filled);

    // Exit submissions bounce: the position must end FAILED/ROLLBACK
    // with no exit working on the exchange.
    h.exchange.reject_orders(true);
    h.reconciler.tick().await;

    let pos = h.only_position().await;
    assert_eq!(pos.state, PositionState::Failed);
    assert_eq!(pos.close_reason, Some(CloseReason::Rollback));
    assert_eq!(h.exchange.order_ids().len(), 1); // only the entry
}

#[tokio::test]
async fn test_position_limit_refuses_second_entry() {
    // Zero cooldown so the limit, not the cooldown, does the refusing
    let cfg = test_config(0);
    let h = Harness::new(&cfg);

    h.publish_oracle(dec!(0.75));
    assert!(matches!(
        h.engine.run_decision_cycle().await,
        Some(OpenOutcome::Opened(_))
    ));

    h.publish_oracle(dec!(0.75));
    assert!(matches!(
        h.engine.run_decision_cycle().await,
        Some(OpenOutcome::Refused(_))
    ));
    assert_eq!(h.exchange.order_ids().len(), 1);
}

#[tokio::test]
async fn test_outage_defers_reconciliation_and_recovers() {
    let cfg = test_config(30);
    let mut h = Harness::new(&cfg);

    h.publish_oracle(dec!(0.75));
    h.engine.run_decision_cycle().await;
    let entry_id = h.exchange.order_ids()[0].clone();
    h.exchange.set_status(&entry_id, OrderStatus::Filled);

    // Outage: the pass defers, position unchanged
    h.exchange.set_error("simulated exchange outage");
    h.reconciler.tick().await;
    assert_eq!(h.only_position().await.state, PositionState::Opening);

    // Recovery: the next pass picks up where it left off
    h.exchange.clear_error();
    h.reconciler.tick().await;
    assert_eq!(h.only_position().await.state, PositionState::Active);
}

#[tokio::test]
async fn test_stale_oracle_blocks_entry() {
    let cfg = test_config(30);
    let h = Harness::new(&cfg);

    h.ticks.publish(PriceTick {
        instrument: "BTC-USD".into(),
        price: dec!(0.75),
        received_at: Utc::now() - chrono::Duration::seconds(60),
    });
    assert!(h.engine.run_decision_cycle().await.is_none());
    assert!(h.exchange.order_ids().is_empty());
}
