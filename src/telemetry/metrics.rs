//! Prometheus metrics
//!
//! Recording is a no-op until an exporter is installed.

use crate::strategy::Outcome;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::time::Duration;

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Last balance reported by the venue
    Balance,
    /// Session profit across all instruments
    CumulativeProfit,
    /// Requests awaiting a response
    PendingRequests,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Balance => "parity_balance",
            GaugeMetric::CumulativeProfit => "parity_cumulative_profit",
            GaugeMetric::PendingRequests => "parity_pending_requests",
        }
    }
}

/// Install the Prometheus exporter with an HTTP listener on `port`
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Set a gauge from a money amount
pub fn set_gauge_decimal(metric: GaugeMetric, value: Decimal) {
    if let Some(v) = value.to_f64() {
        set_gauge(metric, v);
    }
}

pub fn set_pending_requests(count: usize) {
    set_gauge(GaugeMetric::PendingRequests, count as f64);
}

/// Round-trip time of one request
pub fn record_request_latency(request: &'static str, duration: Duration) {
    metrics::histogram!("parity_request_latency_ms", "request" => request)
        .record(duration.as_secs_f64() * 1000.0);
}

pub fn record_reconnect() {
    metrics::counter!("parity_reconnects_total").increment(1);
}

pub fn record_trade(symbol: &str) {
    metrics::counter!("parity_trades_total", "symbol" => symbol.to_string()).increment(1);
}

pub fn record_settlement(symbol: &str, outcome: Outcome) {
    let symbol = symbol.to_string();
    match outcome {
        Outcome::Won => metrics::counter!("parity_trades_won_total", "symbol" => symbol).increment(1),
        Outcome::Lost => {
            metrics::counter!("parity_trades_lost_total", "symbol" => symbol).increment(1)
        }
    }
}

/// Early prediction made from intermediate contract ticks
pub fn record_prediction(outcome: Outcome) {
    let label = match outcome {
        Outcome::Won => "won",
        Outcome::Lost => "lost",
    };
    metrics::counter!("parity_predictions_total", "outcome" => label).increment(1);
}

pub fn record_prediction_divergence() {
    metrics::counter!("parity_prediction_divergence_total").increment(1);
}
