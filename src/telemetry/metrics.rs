//! Prometheus metrics
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the core and the backtest can report freely.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Sample ingestion through signal evaluation
    Decision,
    /// Order submission round trip
    OrderSubmission,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Unrealized P&L
    UnrealizedPnl,
    /// Realized P&L for the day
    RealizedPnl,
    /// Daily P&L counted against the loss limit
    DailyPnl,
    /// Open position count
    OpenPositions,
    /// Total exposure
    TotalExposure,
    /// 0 normal, 1 warning, 2 suspended
    RiskLevel,
    /// Settlements awaiting confirmation
    PendingSettlements,
    /// Orders submitted and not yet resolved
    InFlightOrders,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Actionable signals produced
    Signals,
    /// Entry and exit intents approved
    IntentsAccepted,
    /// Orders filled
    Fills,
    /// Orders rejected or timed out
    OrderFailures,
    /// Positions closed
    PositionsClosed,
    /// Samples dropped for arriving out of order
    OutOfOrderSamples,
}

impl LatencyMetric {
    fn name(&self) -> &'static str {
        match self {
            LatencyMetric::Decision => "spikebot_decision_latency_ms",
            LatencyMetric::OrderSubmission => "spikebot_order_submission_latency_ms",
        }
    }
}

impl GaugeMetric {
    fn name(&self) -> &'static str {
        match self {
            GaugeMetric::UnrealizedPnl => "spikebot_unrealized_pnl",
            GaugeMetric::RealizedPnl => "spikebot_realized_pnl",
            GaugeMetric::DailyPnl => "spikebot_daily_pnl",
            GaugeMetric::OpenPositions => "spikebot_open_positions",
            GaugeMetric::TotalExposure => "spikebot_total_exposure",
            GaugeMetric::RiskLevel => "spikebot_risk_level",
            GaugeMetric::PendingSettlements => "spikebot_pending_settlements",
            GaugeMetric::InFlightOrders => "spikebot_in_flight_orders",
        }
    }
}

impl CounterMetric {
    fn name(&self) -> &'static str {
        match self {
            CounterMetric::Signals => "spikebot_signals_total",
            CounterMetric::IntentsAccepted => "spikebot_intents_accepted_total",
            CounterMetric::Fills => "spikebot_fills_total",
            CounterMetric::OrderFailures => "spikebot_order_failures_total",
            CounterMetric::PositionsClosed => "spikebot_positions_closed_total",
            CounterMetric::OutOfOrderSamples => "spikebot_out_of_order_samples_total",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Set a gauge from a money amount
pub fn set_gauge_decimal(metric: GaugeMetric, value: Decimal) {
    set_gauge(metric, value.to_f64().unwrap_or_default());
}

pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

/// Count a refused intent, labelled by reason code
pub fn record_rejection(code: &'static str) {
    metrics::counter!("spikebot_intents_rejected_total", "reason" => code).increment(1);
}

/// Count an execution anomaly, labelled by kind
pub fn record_anomaly(kind: &'static str) {
    metrics::counter!("spikebot_execution_anomalies_total", "kind" => kind).increment(1);
}
