//! Per-source request history and behavioral heuristics.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::config::DetectionConfig;
use crate::events::ThreatKind;
use crate::rate_limit::is_auth_endpoint;

pub const BEHAVIOR_WEIGHT: f64 = 0.7;

/// What a request targeted, as far as behavioral detection cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKind {
    pub endpoint: String,
    pub port: u16,
    pub protocol: String,
}

impl RequestKind {
    pub fn new(endpoint: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            port,
            protocol: protocol.into().to_ascii_lowercase(),
        }
    }

    pub fn is_auth(&self) -> bool {
        is_auth_endpoint(&self.endpoint)
    }
}

/// Window sizes and trip counts for the three heuristics.
#[derive(Debug, Clone)]
pub struct BehaviorThresholds {
    pub flood_requests: usize,
    pub flood_window: Duration,
    pub brute_force_attempts: usize,
    pub brute_force_window: Duration,
    pub scan_distinct_kinds: usize,
    pub scan_window: Duration,
    pub history_window: Duration,
    pub history_capacity: usize,
}

impl From<&DetectionConfig> for BehaviorThresholds {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            flood_requests: config.flood_requests,
            flood_window: Duration::from_secs(config.flood_window_secs),
            brute_force_attempts: config.brute_force_attempts,
            brute_force_window: Duration::from_secs(config.brute_force_window_secs),
            scan_distinct_kinds: config.scan_distinct_kinds,
            scan_window: Duration::from_secs(config.scan_window_secs),
            history_window: Duration::from_secs(config.history_window_secs),
            history_capacity: config.history_capacity.max(1),
        }
    }
}

impl Default for BehaviorThresholds {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

#[derive(Debug, Clone)]
struct Sample {
    at: Instant,
    kind: RequestKind,
}

/// Recent requests from one source plus its accumulated threat score.
#[derive(Debug)]
pub struct ThreatRecord {
    samples: VecDeque<Sample>,
    cumulative_score: f64,
    detections: u64,
    last_seen: Instant,
}

impl ThreatRecord {
    pub fn new(now: Instant) -> Self {
        Self {
            samples: VecDeque::new(),
            cumulative_score: 0.0,
            detections: 0,
            last_seen: now,
        }
    }

    fn evict(&mut self, now: Instant, history_window: Duration) {
        while let Some(oldest) = self.samples.front() {
            if now.duration_since(oldest.at) >= history_window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Append a request, evicting aged-out and surplus samples.
    pub fn observe(&mut self, now: Instant, kind: RequestKind, thresholds: &BehaviorThresholds) {
        self.evict(now, thresholds.history_window);
        self.samples.push_back(Sample { at: now, kind });
        while self.samples.len() > thresholds.history_capacity {
            self.samples.pop_front();
        }
        self.last_seen = now;
    }

    fn within(&self, now: Instant, window: Duration) -> impl Iterator<Item = &Sample> {
        self.samples
            .iter()
            .rev()
            .take_while(move |s| now.duration_since(s.at) < window)
    }

    pub fn requests_within(&self, now: Instant, window: Duration) -> usize {
        self.within(now, window).count()
    }

    pub fn auth_attempts_within(&self, now: Instant, window: Duration) -> usize {
        self.within(now, window).filter(|s| s.kind.is_auth()).count()
    }

    /// Distinct (protocol, port) targets inside the window.
    pub fn distinct_targets_within(&self, now: Instant, window: Duration) -> usize {
        self.within(now, window)
            .map(|s| (s.kind.protocol.as_str(), s.kind.port))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Which heuristics currently fire for this source.
    pub fn evaluate(&self, now: Instant, thresholds: &BehaviorThresholds) -> Vec<ThreatKind> {
        let mut found = Vec::new();
        if self.requests_within(now, thresholds.flood_window) > thresholds.flood_requests {
            found.push(ThreatKind::Flood);
        }
        if self.auth_attempts_within(now, thresholds.brute_force_window) > thresholds.brute_force_attempts {
            found.push(ThreatKind::BruteForce);
        }
        if self.distinct_targets_within(now, thresholds.scan_window) > thresholds.scan_distinct_kinds {
            found.push(ThreatKind::PortScan);
        }
        found
    }

    pub fn add_score(&mut self, score: f64) {
        self.cumulative_score += score;
        self.detections += 1;
    }

    pub fn cumulative_score(&self) -> f64 {
        self.cumulative_score
    }

    pub fn detections(&self) -> u64 {
        self.detections
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True once every sample has aged out of the history window.
    pub fn is_expired(&mut self, now: Instant, history_window: Duration) -> bool {
        self.evict(now, history_window);
        self.samples.is_empty() && now.duration_since(self.last_seen) >= history_window
    }
}
