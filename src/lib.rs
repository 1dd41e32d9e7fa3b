//! spikebot: risk and decision engine for prediction-market spike trading
//!
//! This library provides:
//! - Per-market price history and spike/momentum/volume strategies
//! - Fee-aware position management with take-profit and stop-loss exits
//! - Three-layer risk control (pre-trade, active, post-trade)
//! - A synchronous decision engine and an async live engine over one core
//! - A deterministic backtester with synthetic feeds and Parquet replay
//! - Structured logging and Prometheus metrics

pub mod backtest;
pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod execution;
pub mod fees;
pub mod history;
pub mod position;
pub mod risk;
pub mod signal;
pub mod telemetry;
