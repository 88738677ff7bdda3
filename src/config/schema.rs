//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::firewall::engine::DEFAULT_WELL_KNOWN_PORTS;
use crate::firewall::RuleSpec;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Static rule filtering.
    pub firewall: FirewallConfig,

    /// Sliding-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Signature and behavioral intrusion detection.
    pub detection: DetectionConfig,

    /// Encrypted tunnel registry.
    pub tunnels: TunnelConfig,

    /// Event log retention and persistence.
    pub events: EventsConfig,

    /// Externally managed TLS context.
    pub secure_channel: SecureChannelConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Firewall configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Run the firewall stage.
    pub enabled: bool,

    /// Install loopback/high-risk-port/private-range rules before `rules`.
    pub seed_default_rules: bool,

    /// Ports allowed by the fallback heuristic when no rule matches.
    pub well_known_ports: Vec<u16>,

    /// Addresses denylisted at startup.
    pub blocked_addresses: Vec<String>,

    /// Additional rules, appended in order after the seed rules.
    pub rules: Vec<RuleSpec>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed_default_rules: true,
            well_known_ports: DEFAULT_WELL_KNOWN_PORTS.to_vec(),
            blocked_addresses: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// A maximum request count over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl WindowLimit {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self { max_requests, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Named rate-limit override.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamedLimit {
    pub name: String,
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Run the rate limiting stage.
    pub enabled: bool,

    /// Shared across all traffic.
    pub global: WindowLimit,

    /// Per source address.
    pub per_ip: WindowLimit,

    /// Per authenticated user.
    pub per_user: WindowLimit,

    /// Per endpoint.
    pub endpoint: WindowLimit,

    /// Per endpoint whose name contains "auth" or "login".
    pub auth_endpoint: WindowLimit,

    /// How often idle buckets are swept.
    pub sweep_interval_secs: u64,

    /// Buckets untouched for this long are removed by the sweep.
    pub idle_ttl_secs: u64,

    /// Tier replacements or endpoint-specific overrides.
    pub rules: Vec<NamedLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: WindowLimit::new(10_000, 60),
            per_ip: WindowLimit::new(100, 60),
            per_user: WindowLimit::new(300, 60),
            endpoint: WindowLimit::new(1_000, 60),
            auth_endpoint: WindowLimit::new(50, 300),
            sweep_interval_secs: 300,
            idle_ttl_secs: 3600,
            rules: Vec::new(),
        }
    }
}

/// Intrusion detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Run the intrusion detection stage.
    pub enabled: bool,

    /// Flood: more than this many requests inside `flood_window_secs`.
    pub flood_requests: usize,
    pub flood_window_secs: u64,

    /// Brute force: more than this many auth/login requests inside the window.
    pub brute_force_attempts: usize,
    pub brute_force_window_secs: u64,

    /// Scan-like: more than this many distinct request kinds inside the window.
    pub scan_distinct_kinds: usize,
    pub scan_window_secs: u64,

    /// How long per-source history is retained.
    pub history_window_secs: u64,

    /// Upper bound on retained samples per source.
    pub history_capacity: usize,

    /// Scores strictly above this emit an event.
    pub event_threshold: f64,

    /// Lowest severity that terminates the pipeline.
    pub block_severity: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flood_requests: 100,
            flood_window_secs: 60,
            brute_force_attempts: 5,
            brute_force_window_secs: 300,
            scan_distinct_kinds: 5,
            scan_window_secs: 60,
            history_window_secs: 3600,
            history_capacity: 4096,
            event_threshold: 0.3,
            block_severity: "high".to_string(),
        }
    }
}

/// Tunnel registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Accept tunnel operations.
    pub enabled: bool,

    /// Tunnels without a heartbeat for this long are closed by maintenance.
    pub heartbeat_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_timeout_secs: 300,
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Number of most recent events kept in memory.
    pub capacity: usize,

    /// Optional append-only JSON-lines file.
    pub jsonl_path: Option<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            jsonl_path: None,
        }
    }
}

/// Externally provided TLS context.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecureChannelConfig {
    /// Whether the embedding application is expected to attach a secure channel.
    pub enabled: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
