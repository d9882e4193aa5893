//! ARBITER — Oracle-vs-orderbook arbitrage engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod types;
