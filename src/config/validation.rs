//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and windows > 0, thresholds in [0, 1])
//! - Compile firewall addresses so malformed CIDRs are caught before startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::{ShieldConfig, WindowLimit};
use crate::events::Severity;
use crate::firewall::AddressPattern;

/// A single semantic problem, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn check_limit(errors: &mut Vec<ValidationError>, field: &str, limit: &WindowLimit) {
    if limit.max_requests == 0 {
        errors.push(ValidationError::new(field, "max_requests must be greater than 0"));
    }
    if limit.window_secs == 0 {
        errors.push(ValidationError::new(field, "window_secs must be greater than 0"));
    }
}

pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, rule) in config.firewall.rules.iter().enumerate() {
        if let Err(e) = AddressPattern::parse(&rule.address) {
            errors.push(ValidationError::new(format!("firewall.rules[{}].address", i), e.to_string()));
        }
        if rule.protocol.trim().is_empty() {
            errors.push(ValidationError::new(format!("firewall.rules[{}].protocol", i), "must not be empty"));
        }
    }
    for (i, addr) in config.firewall.blocked_addresses.iter().enumerate() {
        if addr.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("firewall.blocked_addresses[{}]", i),
                format!("'{}' is not an IP address", addr),
            ));
        }
    }

    let rl = &config.rate_limit;
    check_limit(&mut errors, "rate_limit.global", &rl.global);
    check_limit(&mut errors, "rate_limit.per_ip", &rl.per_ip);
    check_limit(&mut errors, "rate_limit.per_user", &rl.per_user);
    check_limit(&mut errors, "rate_limit.endpoint", &rl.endpoint);
    check_limit(&mut errors, "rate_limit.auth_endpoint", &rl.auth_endpoint);
    for (i, rule) in rl.rules.iter().enumerate() {
        let field = format!("rate_limit.rules[{}]", i);
        if rule.name.trim().is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        }
        check_limit(&mut errors, &field, &WindowLimit::new(rule.max_requests, rule.window_secs));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than 0"));
    }
    if rl.idle_ttl_secs == 0 {
        errors.push(ValidationError::new("rate_limit.idle_ttl_secs", "must be greater than 0"));
    }

    let det = &config.detection;
    if !(0.0..=1.0).contains(&det.event_threshold) {
        errors.push(ValidationError::new("detection.event_threshold", "must be within [0, 1]"));
    }
    if Severity::parse(&det.block_severity).is_none() {
        errors.push(ValidationError::new(
            "detection.block_severity",
            format!("unknown severity '{}'", det.block_severity),
        ));
    }
    for (field, secs) in [
        ("detection.flood_window_secs", det.flood_window_secs),
        ("detection.brute_force_window_secs", det.brute_force_window_secs),
        ("detection.scan_window_secs", det.scan_window_secs),
        ("detection.history_window_secs", det.history_window_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if det.history_capacity <= det.flood_requests {
        errors.push(ValidationError::new(
            "detection.history_capacity",
            "must exceed flood_requests or floods can never be observed",
        ));
    }

    if config.tunnels.heartbeat_timeout_secs == 0 {
        errors.push(ValidationError::new("tunnels.heartbeat_timeout_secs", "must be greater than 0"));
    }

    if config.events.capacity == 0 {
        errors.push(ValidationError::new("events.capacity", "must be greater than 0"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }
    if !matches!(obs.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new("observability.log_format", "must be 'pretty' or 'json'"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
