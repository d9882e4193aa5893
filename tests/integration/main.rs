//! Integration test harness.

mod mock_exchange;
mod scenarios;
