//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_decisions_total` (counter): admission outcomes by terminal state
//! - `shield_rate_limited_total` (counter): rejections by rate-limit tier
//! - `shield_threats_total` (counter): intrusion detections by severity
//! - `shield_internal_faults_total` (counter): fail-closed faults by stage
//! - `shield_swept_entries_total` (counter): idle state removed by maintenance
//! - `shield_blocked_addresses` (gauge): denylist size
//! - `shield_active_tunnels` (gauge): open tunnels
//! - `shield_security_score` (gauge): last computed overall score
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition only when enabled in config

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its HTTP listener. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(outcome: &'static str) {
    metrics::counter!("shield_decisions_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    metrics::counter!("shield_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_threat(severity: &'static str) {
    metrics::counter!("shield_threats_total", "severity" => severity).increment(1);
}

pub fn record_internal_fault(stage: &'static str) {
    metrics::counter!("shield_internal_faults_total", "stage" => stage).increment(1);
}

pub fn record_swept(kind: &'static str, count: usize) {
    metrics::counter!("shield_swept_entries_total", "kind" => kind).increment(count as u64);
}

pub fn record_blocked_addresses(count: usize) {
    metrics::gauge!("shield_blocked_addresses").set(count as f64);
}

pub fn record_active_tunnels(count: usize) {
    metrics::gauge!("shield_active_tunnels").set(count as f64);
}

pub fn record_security_score(score: f64) {
    metrics::gauge!("shield_security_score").set(score);
}
