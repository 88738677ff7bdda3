//! Ordered rule evaluation with an explicit denylist.

use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::config::FirewallConfig;
use crate::error::{SecurityError, SecurityResult};
use crate::firewall::cidr::is_private_or_loopback;
use crate::firewall::rules::{Rule, RuleAction, RuleSpec, RuleView};

/// Ports allowed by the fallback heuristic when no rule matches.
pub const DEFAULT_WELL_KNOWN_PORTS: [u16; 9] = [80, 443, 22, 53, 25, 110, 143, 993, 995];

/// Ports blocked from any source by the seed rules.
pub const HIGH_RISK_PORTS: [u16; 7] = [23, 135, 139, 445, 1433, 3389, 5900];

/// Outcome of a firewall evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallVerdict {
    pub action: RuleAction,
    /// Id of the rule that decided, if any.
    pub matched_rule: Option<u64>,
    pub reason: String,
}

/// Aggregate counters for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct FirewallStats {
    pub rules: Vec<RuleView>,
    pub blocked_addresses: Vec<IpAddr>,
    pub evaluations: u64,
    pub blocks: u64,
}

/// Rule list plus BlockedSet, each behind its own reader/writer lock.
pub struct Firewall {
    pub(crate) rules: RwLock<Vec<Rule>>,
    blocked: RwLock<HashSet<IpAddr>>,
    well_known_ports: HashSet<u16>,
    evaluations: AtomicU64,
    blocks: AtomicU64,
}

impl Firewall {
    /// Empty firewall: no rules, nothing denylisted.
    pub fn new(well_known_ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            blocked: RwLock::new(HashSet::new()),
            well_known_ports: well_known_ports.into_iter().collect(),
            evaluations: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
        }
    }

    /// Firewall with the default well-known ports and seed rules.
    pub fn with_default_rules() -> Self {
        let firewall = Self::new(DEFAULT_WELL_KNOWN_PORTS);
        for spec in default_rules() {
            // Seed specs are static and always compile.
            let _ = firewall.add_rule(&spec);
        }
        firewall
    }

    pub fn from_config(config: &FirewallConfig) -> SecurityResult<Self> {
        let firewall = Self::new(config.well_known_ports.iter().copied());

        if config.seed_default_rules {
            for spec in default_rules() {
                firewall.add_rule(&spec)?;
            }
        }
        for spec in &config.rules {
            firewall.add_rule(spec)?;
        }
        for addr in &config.blocked_addresses {
            let ip: IpAddr = addr.parse().map_err(|_| {
                SecurityError::Configuration(format!("invalid blocked address '{}'", addr))
            })?;
            firewall.block_address(ip)?;
        }

        tracing::info!(
            rules = firewall.rule_count(),
            blocked = firewall.blocked_count(),
            "Firewall initialized"
        );
        Ok(firewall)
    }

    /// Compile and append a rule. Returns its id, which is its insertion index.
    pub fn add_rule(&self, spec: &RuleSpec) -> SecurityResult<u64> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| SecurityError::Internal("firewall rule lock poisoned".to_string()))?;

        let id = rules.len() as u64;
        let rule = Rule::compile(id, spec)?;
        tracing::debug!(id, action = %rule.action, address = %rule.address, "Firewall rule added");
        rules.push(rule);
        Ok(id)
    }

    /// Decide what to do with `(source, port, protocol)`.
    ///
    /// Denylist first, then rules in insertion order (first match wins), then
    /// the well-known-port / private-source fallback.
    pub fn evaluate(&self, source: &IpAddr, port: u16, protocol: &str) -> SecurityResult<FirewallVerdict> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let denylisted = self
            .blocked
            .read()
            .map_err(|_| SecurityError::Internal("firewall denylist lock poisoned".to_string()))?
            .contains(source);
        if denylisted {
            self.blocks.fetch_add(1, Ordering::Relaxed);
            return Ok(FirewallVerdict {
                action: RuleAction::Block,
                matched_rule: None,
                reason: "denylisted".to_string(),
            });
        }

        let protocol = protocol.to_ascii_lowercase();
        let rules = self
            .rules
            .read()
            .map_err(|_| SecurityError::Internal("firewall rule lock poisoned".to_string()))?;

        if let Some(rule) = rules.iter().find(|r| r.matches(source, port, &protocol)) {
            rule.record_hit();
            if rule.action == RuleAction::Block {
                self.blocks.fetch_add(1, Ordering::Relaxed);
            }
            let reason = if rule.description.is_empty() {
                format!("matched rule {}", rule.id)
            } else {
                format!("matched rule {}: {}", rule.id, rule.description)
            };
            return Ok(FirewallVerdict {
                action: rule.action,
                matched_rule: Some(rule.id),
                reason,
            });
        }
        drop(rules);

        let verdict = if self.well_known_ports.contains(&port) {
            FirewallVerdict {
                action: RuleAction::Allow,
                matched_rule: None,
                reason: format!("well-known service port {}", port),
            }
        } else if is_private_or_loopback(source) {
            FirewallVerdict {
                action: RuleAction::Allow,
                matched_rule: None,
                reason: "private or loopback source".to_string(),
            }
        } else {
            FirewallVerdict {
                action: RuleAction::Monitor,
                matched_rule: None,
                reason: "no matching rule".to_string(),
            }
        };
        Ok(verdict)
    }

    /// Add `addr` to the denylist. Returns false if it was already there.
    pub fn block_address(&self, addr: IpAddr) -> SecurityResult<bool> {
        let inserted = self
            .blocked
            .write()
            .map_err(|_| SecurityError::Internal("firewall denylist lock poisoned".to_string()))?
            .insert(addr);
        if inserted {
            tracing::warn!(address = %addr, "Address denylisted");
        }
        Ok(inserted)
    }

    /// Remove `addr` from the denylist. Returns false if it was not there.
    pub fn unblock_address(&self, addr: &IpAddr) -> SecurityResult<bool> {
        let removed = self
            .blocked
            .write()
            .map_err(|_| SecurityError::Internal("firewall denylist lock poisoned".to_string()))?
            .remove(addr);
        if removed {
            tracing::info!(address = %addr, "Address removed from denylist");
        }
        Ok(removed)
    }

    pub fn is_blocked(&self, addr: &IpAddr) -> bool {
        self.blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(addr)
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Denylisted addresses in ascending order.
    pub fn blocked_addresses(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = self
            .blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        addrs.sort();
        addrs
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn rules(&self) -> Vec<RuleView> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Rule::view)
            .collect()
    }

    pub fn stats(&self) -> FirewallStats {
        FirewallStats {
            rules: self.rules(),
            blocked_addresses: self.blocked_addresses(),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
        }
    }
}

/// Seed rules: allow loopback, block high-risk ports, monitor private ranges.
pub fn default_rules() -> Vec<RuleSpec> {
    let mut specs = vec![
        RuleSpec::new(RuleAction::Allow, "127.0.0.0/8", None, "any").describe("allow IPv4 loopback"),
        RuleSpec::new(RuleAction::Allow, "::1", None, "any").describe("allow IPv6 loopback"),
    ];
    specs.extend(HIGH_RISK_PORTS.iter().map(|&port| {
        RuleSpec::new(RuleAction::Block, "any", Some(port), "any")
            .describe(format!("block high-risk port {}", port))
    }));
    specs.extend(["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"].iter().map(|net| {
        RuleSpec::new(RuleAction::Monitor, *net, None, "any").describe(format!("monitor private range {}", net))
    }));
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_rules_order() {
        let fw = Firewall::with_default_rules();
        let rules = fw.rules();
        assert_eq!(rules.len(), 2 + HIGH_RISK_PORTS.len() + 3);
        for (i, rule) in rules.iter().enumerate() {
            assert_eq!(rule.id, i as u64);
        }
    }

    #[test]
    fn test_loopback_allowed() {
        let fw = Firewall::with_default_rules();
        let v4 = fw.evaluate(&ip("127.0.0.1"), 3389, "tcp").unwrap();
        assert_eq!(v4.action, RuleAction::Allow);
        assert_eq!(v4.matched_rule, Some(0));

        let v6 = fw.evaluate(&ip("::1"), 9999, "udp").unwrap();
        assert_eq!(v6.action, RuleAction::Allow);
        assert_eq!(v6.matched_rule, Some(1));
    }

    #[test]
    fn test_high_risk_port_blocked() {
        let fw = Firewall::with_default_rules();
        let verdict = fw.evaluate(&ip("198.51.100.7"), 3389, "tcp").unwrap();
        assert_eq!(verdict.action, RuleAction::Block);
        // Private sources hit the port rule first too.
        let verdict = fw.evaluate(&ip("10.1.1.1"), 445, "tcp").unwrap();
        assert_eq!(verdict.action, RuleAction::Block);
    }

    #[test]
    fn test_private_range_monitored() {
        let fw = Firewall::with_default_rules();
        let verdict = fw.evaluate(&ip("192.168.1.100"), 8080, "tcp").unwrap();
        assert_eq!(verdict.action, RuleAction::Monitor);
        assert!(verdict.matched_rule.is_some());
    }

    #[test]
    fn test_fallback_heuristic() {
        let fw = Firewall::with_default_rules();
        assert_eq!(fw.evaluate(&ip("8.8.8.8"), 443, "tcp").unwrap().action, RuleAction::Allow);
        let unknown = fw.evaluate(&ip("8.8.8.8"), 31337, "tcp").unwrap();
        assert_eq!(unknown.action, RuleAction::Monitor);
        assert_eq!(unknown.matched_rule, None);

        // Empty rule list: private source falls back to allow.
        let bare = Firewall::new(DEFAULT_WELL_KNOWN_PORTS);
        assert_eq!(bare.evaluate(&ip("10.0.0.1"), 31337, "tcp").unwrap().action, RuleAction::Allow);
    }

    #[test]
    fn test_first_match_wins_and_counts_hits() {
        let fw = Firewall::new(DEFAULT_WELL_KNOWN_PORTS);
        let allow = fw.add_rule(&RuleSpec::new(RuleAction::Allow, "203.0.113.0/24", None, "tcp")).unwrap();
        let block = fw.add_rule(&RuleSpec::new(RuleAction::Block, "203.0.113.9", None, "any")).unwrap();

        let verdict = fw.evaluate(&ip("203.0.113.9"), 8000, "TCP").unwrap();
        assert_eq!(verdict.matched_rule, Some(allow));
        let verdict = fw.evaluate(&ip("203.0.113.9"), 8000, "udp").unwrap();
        assert_eq!(verdict.matched_rule, Some(block));

        let rules = fw.rules();
        assert_eq!(rules[0].hit_count, 1);
        assert_eq!(rules[1].hit_count, 1);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let fw = Firewall::with_default_rules();
        let first = fw.evaluate(&ip("172.20.0.4"), 5000, "udp").unwrap();
        for _ in 0..10 {
            assert_eq!(fw.evaluate(&ip("172.20.0.4"), 5000, "udp").unwrap(), first);
        }
    }

    #[test]
    fn test_denylist_checked_before_rules() {
        let fw = Firewall::with_default_rules();
        let addr = ip("127.0.0.1");
        assert!(fw.block_address(addr).unwrap());
        let verdict = fw.evaluate(&addr, 80, "tcp").unwrap();
        assert_eq!(verdict.action, RuleAction::Block);
        assert_eq!(verdict.reason, "denylisted");
        assert_eq!(verdict.matched_rule, None);
    }

    #[test]
    fn test_blocking_is_idempotent() {
        let fw = Firewall::with_default_rules();
        let addr = ip("203.0.113.77");
        assert!(fw.block_address(addr).unwrap());
        let once = fw.evaluate(&addr, 443, "tcp").unwrap();
        assert!(!fw.block_address(addr).unwrap());
        let twice = fw.evaluate(&addr, 443, "tcp").unwrap();
        assert_eq!(once, twice);
        assert_eq!(fw.blocked_count(), 1);

        assert!(fw.unblock_address(&addr).unwrap());
        assert!(!fw.unblock_address(&addr).unwrap());
        assert_eq!(fw.evaluate(&addr, 443, "tcp").unwrap().action, RuleAction::Allow);
    }

    #[test]
    fn test_malformed_rule_rejected() {
        let fw = Firewall::new(DEFAULT_WELL_KNOWN_PORTS);
        let err = fw.add_rule(&RuleSpec::new(RuleAction::Block, "10.0.0.0/99", None, "any"));
        assert!(matches!(err, Err(SecurityError::Configuration(_))));
        assert_eq!(fw.rule_count(), 0);
    }

    #[test]
    fn test_catch_all_appended_last() {
        let fw = Firewall::with_default_rules();
        let id = fw.add_rule(&RuleSpec::catch_all_block("lockdown")).unwrap();
        assert_eq!(id as usize, fw.rule_count() - 1);

        // Earlier monitor rule still wins for private sources.
        assert_eq!(fw.evaluate(&ip("10.0.0.9"), 8080, "tcp").unwrap().action, RuleAction::Monitor);
        // Everything else now falls through to the catch-all.
        let verdict = fw.evaluate(&ip("8.8.4.4"), 443, "tcp").unwrap();
        assert_eq!(verdict.action, RuleAction::Block);
        assert_eq!(verdict.matched_rule, Some(id));
    }
}
