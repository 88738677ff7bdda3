//! Intrusion detector: signature scanners plus per-source behavior windows.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::DetectionConfig;
use crate::detection::behavior::{BehaviorThresholds, RequestKind, ThreatRecord, BEHAVIOR_WEIGHT};
use crate::detection::signatures;
use crate::events::{EventKind, SecurityEvent, Severity, ThreatKind};
use crate::observability::metrics;

/// Threat standing of one tracked source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceThreat {
    pub address: IpAddr,
    pub cumulative_score: f64,
    pub detections: u64,
    pub recent_requests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectorStats {
    pub scans: u64,
    pub tracked_sources: usize,
    pub detections: BTreeMap<ThreatKind, u64>,
    pub top_sources: Vec<SourceThreat>,
}

/// Scans payloads and tracks request history per source address.
///
/// Never touches firewall state; acting on a detection is the caller's job.
pub struct IntrusionDetector {
    records: DashMap<IpAddr, ThreatRecord>,
    thresholds: BehaviorThresholds,
    event_threshold: f64,
    scans: AtomicU64,
    detections: DashMap<ThreatKind, u64>,
}

impl IntrusionDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            records: DashMap::new(),
            thresholds: BehaviorThresholds::from(config),
            event_threshold: config.event_threshold,
            scans: AtomicU64::new(0),
            detections: DashMap::new(),
        }
    }

    pub fn scan(&self, source: &IpAddr, payload: &str, kind: &RequestKind) -> Option<SecurityEvent> {
        self.scan_at(Instant::now(), source, payload, kind)
    }

    /// Record the request and score it. Returns an event only when the
    /// combined score exceeds the event threshold.
    pub fn scan_at(
        &self,
        now: Instant,
        source: &IpAddr,
        payload: &str,
        kind: &RequestKind,
    ) -> Option<SecurityEvent> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let signature = signatures::scan_payload(payload);

        let (score, indicators) = {
            let mut record = self
                .records
                .entry(*source)
                .or_insert_with(|| ThreatRecord::new(now));
            record.observe(now, kind.clone(), &self.thresholds);

            let behavioral = record.evaluate(now, &self.thresholds);
            let mut score = signature.score;
            if !behavioral.is_empty() {
                score += BEHAVIOR_WEIGHT;
            }
            let score = score.min(1.0);

            if score <= self.event_threshold {
                return None;
            }
            record.add_score(score);

            let mut indicators = signature.indicators;
            indicators.extend(behavioral);
            (score, indicators)
        };

        for indicator in &indicators {
            *self.detections.entry(*indicator).or_insert(0) += 1;
        }

        let severity = Severity::from_score(score);
        metrics::record_threat(severity.as_str());

        let names: Vec<&str> = indicators.iter().map(ThreatKind::as_str).collect();
        let event = SecurityEvent::new(
            EventKind::ThreatDetected,
            severity,
            format!("{} detected from {}", names.join(", "), source),
        )
        .with_source(*source)
        .with_destination(kind.endpoint.clone())
        .with_port(kind.port)
        .with_protocol(kind.protocol.clone())
        .with_score(score)
        .with_indicators(indicators);

        Some(event)
    }

    /// Drop sources whose whole history has aged out.
    pub fn prune_at(&self, now: Instant) -> usize {
        let window = self.thresholds.history_window;
        let candidates: Vec<IpAddr> = self.records.iter().map(|e| *e.key()).collect();

        let removed = candidates
            .into_iter()
            .filter(|ip| {
                self.records
                    .remove_if_mut(ip, |_, record| record.is_expired(now, window))
                    .is_some()
            })
            .count();

        if removed > 0 {
            metrics::record_swept("threat_record", removed);
            tracing::debug!(removed, remaining = self.records.len(), "Pruned idle threat records");
        }
        removed
    }

    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn cumulative_score(&self, source: &IpAddr) -> f64 {
        self.records
            .get(source)
            .map(|r| r.cumulative_score())
            .unwrap_or(0.0)
    }

    pub fn tracked_sources(&self) -> usize {
        self.records.len()
    }

    /// Counters plus the `top_n` sources by cumulative score.
    pub fn stats(&self, top_n: usize) -> DetectorStats {
        let mut sources: Vec<SourceThreat> = self
            .records
            .iter()
            .filter(|e| e.value().detections() > 0)
            .map(|e| SourceThreat {
                address: *e.key(),
                cumulative_score: e.value().cumulative_score(),
                detections: e.value().detections(),
                recent_requests: e.value().len(),
            })
            .collect();
        sources.sort_by(|a, b| b.cumulative_score.total_cmp(&a.cumulative_score));
        sources.truncate(top_n);

        DetectorStats {
            scans: self.scans.load(Ordering::Relaxed),
            tracked_sources: self.records.len(),
            detections: self.detections.iter().map(|e| (*e.key(), *e.value())).collect(),
            top_sources: sources,
        }
    }
}
