//! Firewall rule model.
//!
//! A rule is compiled once from a [`RuleSpec`] at registration time, so a
//! malformed address never reaches the evaluation path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{SecurityError, SecurityResult};
use crate::firewall::cidr::Cidr;

/// What a matching rule does with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Block,
    /// Neither allow nor block outright; defer to intrusion detection.
    Monitor,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Block => "block",
            RuleAction::Monitor => "monitor",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source address matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPattern {
    Any,
    Single(IpAddr),
    Network(Cidr),
}

impl AddressPattern {
    pub fn parse(input: &str) -> SecurityResult<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("any") || trimmed == "*" {
            return Ok(AddressPattern::Any);
        }
        if trimmed.contains('/') {
            return trimmed
                .parse::<Cidr>()
                .map(AddressPattern::Network)
                .map_err(|e| SecurityError::Configuration(e.to_string()));
        }
        trimmed
            .parse::<IpAddr>()
            .map(AddressPattern::Single)
            .map_err(|_| SecurityError::Configuration(format!("invalid address '{}'", input)))
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match self {
            AddressPattern::Any => true,
            AddressPattern::Single(ip) => ip == addr,
            AddressPattern::Network(net) => net.contains(addr),
        }
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPattern::Any => f.write_str("any"),
            AddressPattern::Single(ip) => write!(f, "{}", ip),
            AddressPattern::Network(net) => write!(f, "{}", net),
        }
    }
}

fn any() -> String {
    "any".to_string()
}

/// Uncompiled rule as supplied by configuration or an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleSpec {
    pub action: RuleAction,

    /// Single IP, CIDR network, or "any".
    #[serde(default = "any")]
    pub address: String,

    /// Destination port; absent means any port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Protocol name (case-insensitive) or "any".
    #[serde(default = "any")]
    pub protocol: String,

    #[serde(default)]
    pub description: String,
}

impl RuleSpec {
    pub fn new(action: RuleAction, address: impl Into<String>, port: Option<u16>, protocol: impl Into<String>) -> Self {
        Self {
            action,
            address: address.into(),
            port,
            protocol: protocol.into(),
            description: String::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `block any/any/any`, appended by emergency lockdown.
    pub fn catch_all_block(description: impl Into<String>) -> Self {
        Self::new(RuleAction::Block, "any", None, "any").describe(description)
    }
}

/// A compiled rule in the firewall's ordered list.
#[derive(Debug)]
pub struct Rule {
    pub id: u64,
    pub action: RuleAction,
    pub address: AddressPattern,
    pub port: Option<u16>,
    /// Lowercased; `None` matches any protocol.
    pub protocol: Option<String>,
    pub description: String,
    hit_count: AtomicU64,
}

impl Rule {
    pub fn compile(id: u64, spec: &RuleSpec) -> SecurityResult<Self> {
        let address = AddressPattern::parse(&spec.address)?;
        let protocol = spec.protocol.trim().to_ascii_lowercase();
        if protocol.is_empty() {
            return Err(SecurityError::Configuration("empty protocol".to_string()));
        }

        Ok(Self {
            id,
            action: spec.action,
            address,
            port: spec.port,
            protocol: (protocol != "any").then_some(protocol),
            description: spec.description.clone(),
            hit_count: AtomicU64::new(0),
        })
    }

    /// `protocol` must already be lowercased.
    pub fn matches(&self, source: &IpAddr, port: u16, protocol: &str) -> bool {
        self.address.contains(source)
            && self.port.map_or(true, |p| p == port)
            && self.protocol.as_deref().map_or(true, |p| p == protocol)
    }

    pub fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn view(&self) -> RuleView {
        RuleView {
            id: self.id,
            action: self.action,
            address: self.address.to_string(),
            port: self.port,
            protocol: self.protocol.clone().unwrap_or_else(any),
            description: self.description.clone(),
            hit_count: self.hit_count(),
        }
    }
}

/// Read-only snapshot of a rule for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleView {
    pub id: u64,
    pub action: RuleAction,
    pub address: String,
    pub port: Option<u16>,
    pub protocol: String,
    pub description: String,
    pub hit_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_address_pattern_parse() {
        assert_eq!(AddressPattern::parse("ANY").unwrap(), AddressPattern::Any);
        assert_eq!(AddressPattern::parse("10.0.0.1").unwrap(), AddressPattern::Single(ip("10.0.0.1")));
        assert!(matches!(AddressPattern::parse("10.0.0.0/8").unwrap(), AddressPattern::Network(_)));
        assert!(matches!(
            AddressPattern::parse("10.0.0.0/40"),
            Err(SecurityError::Configuration(_))
        ));
        assert!(AddressPattern::parse("not-an-ip").is_err());
    }

    #[test]
    fn test_rule_matching() {
        let spec = RuleSpec::new(RuleAction::Block, "203.0.113.0/24", Some(22), "TCP");
        let rule = Rule::compile(0, &spec).unwrap();

        assert!(rule.matches(&ip("203.0.113.50"), 22, "tcp"));
        assert!(!rule.matches(&ip("203.0.113.50"), 23, "tcp"));
        assert!(!rule.matches(&ip("203.0.113.50"), 22, "udp"));
        assert!(!rule.matches(&ip("198.51.100.1"), 22, "tcp"));
    }

    #[test]
    fn test_wildcards() {
        let rule = Rule::compile(3, &RuleSpec::catch_all_block("lockdown")).unwrap();
        assert!(rule.matches(&ip("::1"), 1, "icmp"));
        assert_eq!(rule.view().protocol, "any");
        assert_eq!(rule.view().address, "any");
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: RuleSpec = toml::from_str(r#"action = "monitor""#).unwrap();
        assert_eq!(spec.action, RuleAction::Monitor);
        assert_eq!(spec.address, "any");
        assert_eq!(spec.port, None);
        assert_eq!(spec.protocol, "any");
    }
}
