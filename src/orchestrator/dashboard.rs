//! Read-only dashboard snapshot.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::detection::DetectorStats;
use crate::events::{SecurityEvent, Severity};
use crate::firewall::FirewallStats;
use crate::rate_limit::RateLimitStats;
use crate::tunnel::{TunnelStats, TunnelStatus};

/// Number of events shown in `recent_events`.
pub const RECENT_EVENTS: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    pub firewall_active: bool,
    pub ids_active: bool,
    pub rate_limiter_active: bool,
    pub secure_channel_active: bool,
    pub tunnels_active: bool,
    pub locked_down: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreatSummary {
    /// Retained log entries by severity.
    pub events_by_severity: BTreeMap<Severity, usize>,
    pub total_events: u64,
    pub detector: DetectorStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct TunnelOverview {
    pub stats: TunnelStats,
    pub tunnels: Vec<TunnelStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub security_status: SecurityStatus,
    pub recent_events: Vec<SecurityEvent>,
    pub threat_summary: ThreatSummary,
    pub firewall_stats: FirewallStats,
    pub rate_limit_stats: RateLimitStats,
    pub tunnel_status: TunnelOverview,
    pub overall_security_score: f64,
}
