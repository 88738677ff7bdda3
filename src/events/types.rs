//! Security event model.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a threat score in `[0, 1]` onto a severity band.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.6 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a lowercase severity name as used in configuration.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened. Pipeline transitions come first, administrative actions after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FirewallChecked,
    BlockedByFirewall,
    RateChecked,
    BlockedByRateLimit,
    IdsChecked,
    ThreatDetected,
    BlockedByIds,
    Admitted,
    InternalFault,
    RuleAdded,
    AddressBlocked,
    AddressUnblocked,
    RateLimitRuleChanged,
    TunnelCreated,
    TunnelClosed,
    EmergencyLockdown,
}

/// Individual detection that contributed to a threat score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    SqlInjection,
    CrossSiteScripting,
    PathTraversal,
    CommandInjection,
    Flood,
    BruteForce,
    PortScan,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "sql_injection",
            ThreatKind::CrossSiteScripting => "xss",
            ThreatKind::PathTraversal => "path_traversal",
            ThreatKind::CommandInjection => "command_injection",
            ThreatKind::Flood => "ddos",
            ThreatKind::BruteForce => "brute_force",
            ThreatKind::PortScan => "port_scan",
        }
    }
}

/// Immutable log entry. Built once, appended to the [`super::EventLog`], never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub kind: EventKind,
    pub source_address: Option<IpAddr>,
    pub destination_address: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub severity: Severity,
    pub description: String,
    pub threat_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indicators: Vec<ThreatKind>,
}

impl SecurityEvent {
    pub fn new(kind: EventKind, severity: Severity, description: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            timestamp_ms,
            kind,
            source_address: None,
            destination_address: None,
            port: None,
            protocol: None,
            severity,
            description: description.into(),
            threat_score: 0.0,
            indicators: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source_address = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination_address = Some(destination.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.threat_score = score;
        self
    }

    pub fn with_indicators(mut self, indicators: Vec<ThreatKind>) -> Self {
        self.indicators = indicators;
        self
    }

    /// Re-label the event, keeping every other field.
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_score(1.0), Severity::Critical);
        assert_eq!(Severity::from_score(0.8), Severity::Critical);
        assert_eq!(Severity::from_score(0.7), Severity::High);
        assert_eq!(Severity::from_score(0.6), Severity::High);
        assert_eq!(Severity::from_score(0.4), Severity::Medium);
        assert_eq!(Severity::from_score(0.35), Severity::Low);
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse("nope"), None);
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let event = SecurityEvent::new(EventKind::BlockedByRateLimit, Severity::Medium, "limit")
            .with_source("10.0.0.5".parse().unwrap())
            .with_port(443);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "blocked_by_rate_limit");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["source_address"], "10.0.0.5");
        assert!(json.get("indicators").is_none());
    }
}
