//! Metrics: Prometheus-compatible counters, gauges, and histograms for the
//! HTTP surface and the matching engine's hot path.

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_MATCHED_TOTAL: &str = "orders_matched_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDERS_REJECTED_TOTAL: &str = "orders_rejected_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_TOTAL: &str = "trade_volume_total";

    pub const ORDERBOOK_DEPTH: &str = "orderbook_depth";
    pub const ORDERBOOK_BEST_PRICE: &str = "orderbook_best_price";

    pub const ACCOUNTS_ACTIVE: &str = "accounts_active";

    pub const STORE_OPERATION_DURATION_SECONDS: &str = "store_operation_duration_seconds";
    pub const STORE_ERRORS_TOTAL: &str = "store_errors_total";

    pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
}

pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const MATCH_TYPE: &str = "match_type";
    pub const SYMBOL: &str = "symbol";
    pub const OPERATION: &str = "operation";
    pub const CHANNEL: &str = "channel";
}

/// Install the Prometheus recorder with histogram buckets tuned for
/// sub-millisecond matching latency.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::STORE_OPERATION_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1],
        )
        .unwrap();

    builder
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

pub fn set_http_requests_in_flight(count: i64) {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).set(count as f64);
}

pub fn record_order_submitted(side: &str, order_type: &str) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

pub fn record_order_matched(match_type: &str) {
    counter!(
        names::ORDERS_MATCHED_TOTAL,
        labels::MATCH_TYPE => match_type.to_string()
    )
    .increment(1);
}

pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

pub fn record_order_rejected() {
    counter!(names::ORDERS_REJECTED_TOTAL).increment(1);
}

pub fn record_order_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

pub fn record_trade_executed(symbol: &str, volume: f64) {
    counter!(
        names::TRADES_EXECUTED_TOTAL,
        labels::SYMBOL => symbol.to_string()
    )
    .increment(1);

    counter!(names::TRADE_VOLUME_TOTAL, labels::SYMBOL => symbol.to_string()).increment(volume as u64);
}

pub fn set_orderbook_depth(symbol: &str, side: &str, depth: i64) {
    gauge!(
        names::ORDERBOOK_DEPTH,
        labels::SYMBOL => symbol.to_string(),
        labels::SIDE => side.to_string()
    )
    .set(depth as f64);
}

pub fn set_orderbook_best_price(symbol: &str, side: &str, price: f64) {
    gauge!(
        names::ORDERBOOK_BEST_PRICE,
        labels::SYMBOL => symbol.to_string(),
        labels::SIDE => side.to_string()
    )
    .set(price);
}

pub fn set_accounts_active(count: i64) {
    gauge!(names::ACCOUNTS_ACTIVE).set(count as f64);
}

pub fn record_store_operation(operation: &str, duration_secs: f64) {
    histogram!(
        names::STORE_OPERATION_DURATION_SECONDS,
        labels::OPERATION => operation.to_string()
    )
    .record(duration_secs);
}

pub fn record_store_error(operation: &str) {
    counter!(
        names::STORE_ERRORS_TOTAL,
        labels::OPERATION => operation.to_string()
    )
    .increment(1);
}

pub fn record_event_published(channel: &str) {
    counter!(names::EVENTS_PUBLISHED_TOTAL, labels::CHANNEL => channel.to_string()).increment(1);
}

/// Timer for measuring durations around a block of work.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_measures_elapsed_time() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_secs();
        assert!(elapsed >= 0.01);
        assert!(elapsed < 0.5);
    }

    #[test]
    fn metric_names_are_stable() {
        assert_eq!(names::HTTP_REQUESTS_TOTAL, "http_requests_total");
        assert_eq!(names::ORDERS_SUBMITTED_TOTAL, "orders_submitted_total");
        assert_eq!(names::TRADES_EXECUTED_TOTAL, "trades_executed_total");
    }
}
