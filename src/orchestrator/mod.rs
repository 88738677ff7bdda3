//! Admission pipeline coordinator.
//!
//! # Data Flow
//! ```text
//! AdmissionRequest
//!     → START
//!     → firewall.evaluate        block → BLOCKED_BY_FIREWALL
//!     → FIREWALL_CHECKED
//!     → rate_limiter.check       over limit → BLOCKED_BY_RATE_LIMIT
//!     → RATE_CHECKED
//!     → detector.scan            severity >= block_severity → BLOCKED_BY_IDS
//!                                (critical also denylists the source)
//!     → IDS_CHECKED
//!     → ADMITTED
//!
//! Every transition appends exactly one SecurityEvent to the event log.
//! ```
//!
//! # Design Decisions
//! - Components own their synchronization; there is no pipeline-wide lock
//! - Internal faults fail closed as an intrusion-detection block at medium severity
//! - Emergency lockdown is one-way: the lockdown flag is raised before any
//!   other step, so no admission that starts after it returns can pass the
//!   firewall stage

pub mod channel;
pub mod dashboard;
pub mod pipeline;
pub mod score;

pub use channel::{SecureChannel, StaticChannel};
pub use dashboard::{Dashboard, SecurityStatus, ThreatSummary, TunnelOverview};
pub use pipeline::{AdmissionRequest, Decision, PipelineState};
pub use score::{security_score, ScoreInputs};

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ShieldConfig;
use crate::detection::{IntrusionDetector, RequestKind};
use crate::error::{SecurityError, SecurityResult};
use crate::events::{EventKind, EventLog, EventSink, JsonLinesSink, SecurityEvent, Severity, TracingSink};
use crate::firewall::{Firewall, FirewallVerdict, RuleAction, RuleSpec};
use crate::lifecycle::PeriodicTask;
use crate::observability::metrics;
use crate::rate_limit::RateLimiter;
use crate::tunnel::TunnelManager;

/// What [`SecurityOrchestrator::emergency_lockdown`] did.
#[derive(Debug, Clone, Serialize)]
pub struct LockdownReport {
    pub already_locked: bool,
    pub catch_all_rule: Option<u64>,
    pub tunnels_closed: usize,
    pub sweep_stopped: bool,
}

/// Result of one maintenance pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub pruned_sources: usize,
    pub swept_buckets: usize,
    pub stale_tunnels: usize,
}

/// Stages a request runs through. Fixed at construction; lockdown never
/// switches a stage off mid-request.
#[derive(Debug, Clone, Copy)]
struct Stages {
    firewall: bool,
    rate_limiter: bool,
    ids: bool,
}

/// Subsystem state reported through the score and status.
struct ActiveFlags {
    firewall: AtomicBool,
    ids: AtomicBool,
    rate_limiter: AtomicBool,
    secure_channel: AtomicBool,
    tunnels: AtomicBool,
}

impl ActiveFlags {
    fn all_off(&self) {
        for flag in [&self.firewall, &self.ids, &self.rate_limiter, &self.secure_channel, &self.tunnels] {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

/// Runs requests through firewall, rate limiter and intrusion detector, and
/// exposes the administrative surface over all of them.
pub struct SecurityOrchestrator {
    firewall: Firewall,
    rate_limiter: Arc<RateLimiter>,
    detector: IntrusionDetector,
    tunnels: TunnelManager,
    events: EventLog,
    secure_channel: RwLock<Option<Arc<dyn SecureChannel>>>,
    stages: Stages,
    active: ActiveFlags,
    locked_down: AtomicBool,
    block_severity: Severity,
    heartbeat_timeout: Duration,
    maintenance_interval: Duration,
    maintenance: Mutex<Option<PeriodicTask>>,
}

fn request_event(
    request: &AdmissionRequest,
    kind: EventKind,
    severity: Severity,
    description: impl Into<String>,
) -> SecurityEvent {
    SecurityEvent::new(kind, severity, description)
        .with_source(request.source)
        .with_destination(request.endpoint.clone())
        .with_port(request.port)
        .with_protocol(request.protocol.clone())
}

impl SecurityOrchestrator {
    /// Orchestrator with every section at its default.
    pub fn new() -> SecurityResult<Self> {
        Self::from_config(&ShieldConfig::default())
    }

    pub fn from_config(config: &ShieldConfig) -> SecurityResult<Self> {
        let block_severity = Severity::parse(&config.detection.block_severity).ok_or_else(|| {
            SecurityError::Configuration(format!(
                "unknown severity '{}'",
                config.detection.block_severity
            ))
        })?;

        let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
        if let Some(path) = &config.events.jsonl_path {
            let sink = JsonLinesSink::open(Path::new(path)).map_err(|e| {
                SecurityError::Configuration(format!("cannot open event file '{}': {}", path, e))
            })?;
            sinks.push(Arc::new(sink));
        }

        if config.secure_channel.enabled {
            tracing::info!("Secure channel expected; awaiting attachment");
        }

        let orchestrator = Self {
            firewall: Firewall::from_config(&config.firewall)?,
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)?),
            detector: IntrusionDetector::new(&config.detection),
            tunnels: TunnelManager::new(),
            events: EventLog::with_sinks(config.events.capacity, sinks),
            secure_channel: RwLock::new(None),
            stages: Stages {
                firewall: config.firewall.enabled,
                rate_limiter: config.rate_limit.enabled,
                ids: config.detection.enabled,
            },
            active: ActiveFlags {
                firewall: AtomicBool::new(config.firewall.enabled),
                ids: AtomicBool::new(config.detection.enabled),
                rate_limiter: AtomicBool::new(config.rate_limit.enabled),
                secure_channel: AtomicBool::new(false),
                tunnels: AtomicBool::new(config.tunnels.enabled),
            },
            locked_down: AtomicBool::new(false),
            block_severity,
            heartbeat_timeout: Duration::from_secs(config.tunnels.heartbeat_timeout_secs),
            maintenance_interval: Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
            maintenance: Mutex::new(None),
        };

        metrics::record_blocked_addresses(orchestrator.firewall.blocked_count());
        tracing::info!(
            firewall = config.firewall.enabled,
            rate_limit = config.rate_limit.enabled,
            detection = config.detection.enabled,
            tunnels = config.tunnels.enabled,
            block_severity = %block_severity,
            "Security orchestrator initialized"
        );
        Ok(orchestrator)
    }

    pub fn firewall(&self) -> &Firewall {
        &self.firewall
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn detector(&self) -> &IntrusionDetector {
        &self.detector
    }

    pub fn tunnels(&self) -> &TunnelManager {
        &self.tunnels
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn is_locked_down(&self) -> bool {
        self.locked_down.load(Ordering::SeqCst)
    }

    // ---- admission ----

    pub fn admit_request(&self, request: &AdmissionRequest) -> Decision {
        self.admit_request_at(Instant::now(), request)
    }

    /// Run one request through the pipeline at time `now`.
    pub fn admit_request_at(&self, now: Instant, request: &AdmissionRequest) -> Decision {
        let mut decision = Decision::new();

        // Firewall stage.
        let verdict = if self.is_locked_down() {
            Some(FirewallVerdict {
                action: RuleAction::Block,
                matched_rule: None,
                reason: "emergency lockdown".to_string(),
            })
        } else if self.stages.firewall {
            match self.firewall.evaluate(&request.source, request.port, &request.protocol) {
                Ok(verdict) => Some(verdict),
                Err(e) => return self.fail_closed(decision, request, "firewall", e),
            }
        } else {
            None
        };

        match verdict {
            Some(verdict) if verdict.action == RuleAction::Block => {
                let event = request_event(
                    request,
                    EventKind::BlockedByFirewall,
                    Severity::Medium,
                    format!("firewall blocked {}: {}", request.source, verdict.reason),
                );
                self.record(&mut decision, PipelineState::BlockedByFirewall, event);
                decision.recommendations.push(match (verdict.reason.as_str(), verdict.matched_rule) {
                    ("denylisted", _) => format!("Source {} is denylisted", request.source),
                    ("emergency lockdown", _) => "Emergency lockdown in effect; all traffic is denied".to_string(),
                    (_, Some(id)) => format!("Blocked by firewall rule {}; review it if this traffic is expected", id),
                    (reason, None) => format!("Blocked by firewall: {}", reason),
                });
                return self.finish(decision, PipelineState::BlockedByFirewall);
            }
            Some(verdict) => {
                let severity = match verdict.action {
                    RuleAction::Monitor => Severity::Low,
                    _ => Severity::Info,
                };
                let event = request_event(
                    request,
                    EventKind::FirewallChecked,
                    severity,
                    format!("firewall {}: {}", verdict.action, verdict.reason),
                );
                self.record(&mut decision, PipelineState::FirewallChecked, event);
            }
            None => {
                let event = request_event(
                    request,
                    EventKind::FirewallChecked,
                    Severity::Info,
                    "firewall inactive, stage skipped",
                );
                self.record(&mut decision, PipelineState::FirewallChecked, event);
            }
        }

        // Rate limiting stage.
        if self.stages.rate_limiter {
            let outcome = match self.rate_limiter.check_at(
                now,
                &request.source,
                request.user_id.as_deref(),
                &request.endpoint,
                &request.method,
            ) {
                Ok(outcome) => outcome,
                Err(e) => return self.fail_closed(decision, request, "rate_limiter", e),
            };
            decision.rate_limit_status = outcome.status;

            if !outcome.allowed {
                let event = request_event(
                    request,
                    EventKind::BlockedByRateLimit,
                    Severity::Medium,
                    outcome.reason,
                );
                self.record(&mut decision, PipelineState::BlockedByRateLimit, event);
                if let Some(secs) = outcome.retry_after_secs {
                    decision.recommendations.push(format!("Retry after {} seconds", secs));
                }
                return self.finish(decision, PipelineState::BlockedByRateLimit);
            }
            let event = request_event(request, EventKind::RateChecked, Severity::Info, outcome.reason);
            self.record(&mut decision, PipelineState::RateChecked, event);
        } else {
            let event = request_event(
                request,
                EventKind::RateChecked,
                Severity::Info,
                "rate limiter inactive, stage skipped",
            );
            self.record(&mut decision, PipelineState::RateChecked, event);
        }

        // Intrusion detection stage.
        if self.stages.ids {
            let kind = RequestKind::new(request.endpoint.clone(), request.port, request.protocol.clone());
            match self.detector.scan_at(now, &request.source, &request.payload, &kind) {
                Some(threat) => {
                    decision.threat_score = Some(threat.threat_score);
                    let names = threat
                        .indicators
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");

                    if threat.severity >= self.block_severity {
                        let critical = threat.severity == Severity::Critical;
                        self.record(
                            &mut decision,
                            PipelineState::BlockedByIds,
                            threat.with_kind(EventKind::BlockedByIds),
                        );
                        decision
                            .recommendations
                            .push(format!("Investigate {} attempt from {}", names, request.source));
                        if critical {
                            self.auto_block(&mut decision, request.source);
                        }
                        return self.finish(decision, PipelineState::BlockedByIds);
                    }

                    self.record(
                        &mut decision,
                        PipelineState::IdsChecked,
                        threat.with_kind(EventKind::IdsChecked),
                    );
                    decision.recommendations.push(format!(
                        "Monitor {}: {} indicators below blocking threshold",
                        request.source, names
                    ));
                }
                None => {
                    let event = request_event(
                        request,
                        EventKind::IdsChecked,
                        Severity::Info,
                        "no threat indicators",
                    );
                    self.record(&mut decision, PipelineState::IdsChecked, event);
                }
            }
        } else {
            let event = request_event(
                request,
                EventKind::IdsChecked,
                Severity::Info,
                "intrusion detection inactive, stage skipped",
            );
            self.record(&mut decision, PipelineState::IdsChecked, event);
        }

        let event = request_event(request, EventKind::Admitted, Severity::Info, "request admitted");
        self.record(&mut decision, PipelineState::Admitted, event);
        self.finish(decision, PipelineState::Admitted)
    }

    fn record(&self, decision: &mut Decision, state: PipelineState, event: SecurityEvent) {
        decision.outcome = state;
        self.events.append(event.clone());
        decision.events.push(event);
    }

    fn finish(&self, decision: Decision, state: PipelineState) -> Decision {
        metrics::record_decision(state.as_str());
        decision.finish(state)
    }

    fn fail_closed(
        &self,
        mut decision: Decision,
        request: &AdmissionRequest,
        stage: &'static str,
        error: SecurityError,
    ) -> Decision {
        metrics::record_internal_fault(stage);
        tracing::error!(stage, source = %request.source, error = %error, "Internal fault, failing closed");

        let event = request_event(
            request,
            EventKind::InternalFault,
            Severity::Medium,
            format!("internal fault in {}: {}", stage, error),
        );
        self.record(&mut decision, PipelineState::BlockedByIds, event);
        decision
            .recommendations
            .push(format!("Internal fault in {}; request denied, check logs", stage));
        self.finish(decision, PipelineState::BlockedByIds)
    }

    /// Denylist a source after a critical detection. Idempotent.
    fn auto_block(&self, decision: &mut Decision, source: IpAddr) {
        match self.firewall.block_address(source) {
            Ok(true) => {
                let event = SecurityEvent::new(
                    EventKind::AddressBlocked,
                    Severity::High,
                    format!("auto-blocked {} after critical threat", source),
                )
                .with_source(source);
                self.events.append(event.clone());
                decision.events.push(event);
                decision
                    .recommendations
                    .push(format!("Source {} was added to the denylist", source));
                metrics::record_blocked_addresses(self.firewall.blocked_count());
            }
            Ok(false) => {}
            Err(e) => {
                metrics::record_internal_fault("auto_block");
                tracing::error!(source = %source, error = %e, "Failed to denylist source");
            }
        }
    }

    fn admin_event(&self, event: SecurityEvent) {
        self.events.append(event);
    }

    // ---- administration ----

    pub fn add_firewall_rule(&self, spec: &RuleSpec) -> SecurityResult<u64> {
        let id = self.firewall.add_rule(spec)?;
        self.admin_event(SecurityEvent::new(
            EventKind::RuleAdded,
            Severity::Info,
            format!(
                "firewall rule {} added: {} {} port {} protocol {}",
                id,
                spec.action,
                spec.address,
                spec.port.map_or_else(|| "any".to_string(), |p| p.to_string()),
                spec.protocol
            ),
        ));
        Ok(id)
    }

    /// Returns false if the address was already denylisted.
    pub fn block_address(&self, address: IpAddr) -> SecurityResult<bool> {
        let inserted = self.firewall.block_address(address)?;
        if inserted {
            self.admin_event(
                SecurityEvent::new(EventKind::AddressBlocked, Severity::Medium, format!("{} denylisted", address))
                    .with_source(address),
            );
            metrics::record_blocked_addresses(self.firewall.blocked_count());
        }
        Ok(inserted)
    }

    /// Returns false if the address was not denylisted.
    pub fn unblock_address(&self, address: &IpAddr) -> SecurityResult<bool> {
        let removed = self.firewall.unblock_address(address)?;
        if removed {
            self.admin_event(
                SecurityEvent::new(
                    EventKind::AddressUnblocked,
                    Severity::Info,
                    format!("{} removed from denylist", address),
                )
                .with_source(*address),
            );
            metrics::record_blocked_addresses(self.firewall.blocked_count());
        }
        Ok(removed)
    }

    pub fn add_rate_limit_rule(&self, name: &str, max_requests: u32, window_secs: u64) -> SecurityResult<()> {
        self.rate_limiter.add_rule(name, max_requests, window_secs)?;
        self.admin_event(SecurityEvent::new(
            EventKind::RateLimitRuleChanged,
            Severity::Info,
            format!("rate limit '{}' set to {} per {}s", name, max_requests, window_secs),
        ));
        Ok(())
    }

    pub fn create_tunnel(&self, remote: &str, local: &str) -> SecurityResult<Uuid> {
        if self.is_locked_down() {
            return Err(SecurityError::LockdownActive);
        }
        if !self.active.tunnels.load(Ordering::Acquire) {
            return Err(SecurityError::Configuration("tunnel manager is disabled".to_string()));
        }

        let id = self.tunnels.create_tunnel(remote, local)?;
        self.admin_event(
            SecurityEvent::new(EventKind::TunnelCreated, Severity::Info, format!("tunnel {} established", id))
                .with_destination(remote),
        );
        Ok(id)
    }

    pub fn encrypt_for_tunnel(&self, id: Uuid, plaintext: &[u8]) -> SecurityResult<Vec<u8>> {
        self.tunnels.encrypt(id, plaintext)
    }

    pub fn decrypt_from_tunnel(&self, id: Uuid, ciphertext: &[u8]) -> SecurityResult<Vec<u8>> {
        self.tunnels.decrypt(id, ciphertext)
    }

    pub fn tunnel_heartbeat(&self, id: Uuid) -> SecurityResult<()> {
        self.tunnels.heartbeat(id)
    }

    pub fn update_tunnel_stats(&self, id: Uuid, bytes_in: u64, bytes_out: u64) -> SecurityResult<()> {
        self.tunnels.update_stats(id, bytes_in, bytes_out)
    }

    pub fn close_tunnel(&self, id: Uuid) -> SecurityResult<()> {
        self.tunnels.close_tunnel(id)?;
        self.admin_event(SecurityEvent::new(
            EventKind::TunnelClosed,
            Severity::Info,
            format!("tunnel {} closed", id),
        ));
        Ok(())
    }

    /// Close every active tunnel whose last heartbeat is older than `timeout`.
    pub fn close_stale_tunnels(&self, timeout: Duration) -> SecurityResult<Vec<Uuid>> {
        self.close_stale_tunnels_at(Instant::now(), timeout)
    }

    pub fn close_stale_tunnels_at(&self, now: Instant, timeout: Duration) -> SecurityResult<Vec<Uuid>> {
        let stale = self.tunnels.close_stale_at(now, timeout)?;
        for id in &stale {
            self.admin_event(SecurityEvent::new(
                EventKind::TunnelClosed,
                Severity::Low,
                format!("tunnel {} closed after missed heartbeats", id),
            ));
        }
        Ok(stale)
    }

    /// Attach the embedding application's TLS context.
    pub fn attach_secure_channel(&self, channel: Arc<dyn SecureChannel>) {
        tracing::info!(channel = %channel.describe(), "Secure channel attached");
        *self.secure_channel.write().unwrap_or_else(PoisonError::into_inner) = Some(channel);
        if !self.is_locked_down() {
            self.active.secure_channel.store(true, Ordering::SeqCst);
        }
    }

    fn secure_channel_active(&self) -> bool {
        self.active.secure_channel.load(Ordering::Acquire)
            && self
                .secure_channel
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|c| c.is_established())
    }

    /// Deny all new traffic, stop background sweeps, close every tunnel and
    /// mark every subsystem inactive. Cannot be undone.
    pub fn emergency_lockdown(&self) -> LockdownReport {
        if self.locked_down.swap(true, Ordering::SeqCst) {
            return LockdownReport {
                already_locked: true,
                catch_all_rule: None,
                tunnels_closed: 0,
                sweep_stopped: false,
            };
        }
        tracing::error!("Emergency lockdown initiated");

        let catch_all_rule = match self
            .firewall
            .add_rule(&RuleSpec::catch_all_block("emergency lockdown"))
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(error = %e, "Failed to append lockdown rule");
                None
            }
        };

        let sweep_stopped = self.rate_limiter.stop_sweep();
        if let Some(task) = self.maintenance_slot().take() {
            task.stop();
        }

        let tunnels_closed = match self.tunnels.close_all() {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "Failed to close tunnels during lockdown");
                0
            }
        };

        self.active.all_off();

        self.admin_event(SecurityEvent::new(
            EventKind::EmergencyLockdown,
            Severity::Critical,
            format!("emergency lockdown: {} tunnels closed, all traffic denied", tunnels_closed),
        ));
        metrics::record_security_score(self.security_score());

        LockdownReport {
            already_locked: false,
            catch_all_rule,
            tunnels_closed,
            sweep_stopped,
        }
    }

    // ---- maintenance ----

    fn maintenance_slot(&self) -> MutexGuard<'_, Option<PeriodicTask>> {
        self.maintenance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the rate-limit sweep and the maintenance task on the current
    /// Tokio runtime. Returns false if nothing was started.
    pub fn start_background_tasks(self: &Arc<Self>) -> bool {
        if self.is_locked_down() {
            return false;
        }

        let sweeping = self.stages.rate_limiter && self.rate_limiter.start_sweep();

        let mut slot = self.maintenance_slot();
        if slot.is_some() {
            return sweeping;
        }
        let weak = Arc::downgrade(self);
        match PeriodicTask::spawn("security-maintenance", self.maintenance_interval, move || {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.run_maintenance();
            }
        }) {
            Ok(task) => {
                *slot = Some(task);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "No runtime available, maintenance not started");
                sweeping
            }
        }
    }

    pub fn stop_background_tasks(&self) {
        self.rate_limiter.stop_sweep();
        if let Some(task) = self.maintenance_slot().take() {
            task.stop();
        }
    }

    pub fn background_tasks_running(&self) -> bool {
        self.maintenance_slot().is_some()
    }

    pub fn run_maintenance(&self) -> MaintenanceReport {
        self.run_maintenance_at(Instant::now())
    }

    /// Prune aged-out threat records and close tunnels past the heartbeat timeout.
    pub fn run_maintenance_at(&self, now: Instant) -> MaintenanceReport {
        let pruned_sources = self.detector.prune_at(now);
        let swept_buckets = if self.rate_limiter.is_sweeping() {
            0
        } else {
            self.rate_limiter.sweep_idle_at(now)
        };

        let stale = match self.close_stale_tunnels_at(now, self.heartbeat_timeout) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Stale tunnel check failed");
                Vec::new()
            }
        };

        metrics::record_security_score(self.security_score());
        MaintenanceReport {
            pruned_sources,
            swept_buckets,
            stale_tunnels: stale.len(),
        }
    }

    // ---- observability ----

    fn score_inputs(&self) -> ScoreInputs {
        ScoreInputs {
            firewall_active: self.active.firewall.load(Ordering::Acquire),
            ids_active: self.active.ids.load(Ordering::Acquire),
            rate_limiter_active: self.active.rate_limiter.load(Ordering::Acquire),
            secure_channel_active: self.secure_channel_active(),
            tunnels_active: self.active.tunnels.load(Ordering::Acquire),
            recent_critical_events: self
                .events
                .count_recent_with_severity(score::CRITICAL_WINDOW, Severity::Critical),
            blocked_addresses: self.firewall.blocked_count(),
        }
    }

    pub fn security_score(&self) -> f64 {
        security_score(&self.score_inputs())
    }

    pub fn status(&self) -> SecurityStatus {
        let inputs = self.score_inputs();
        SecurityStatus {
            firewall_active: inputs.firewall_active,
            ids_active: inputs.ids_active,
            rate_limiter_active: inputs.rate_limiter_active,
            secure_channel_active: inputs.secure_channel_active,
            tunnels_active: inputs.tunnels_active,
            locked_down: self.is_locked_down(),
        }
    }

    pub fn threat_summary(&self) -> ThreatSummary {
        let mut events_by_severity = BTreeMap::new();
        self.events.for_each(|e| *events_by_severity.entry(e.severity).or_insert(0) += 1);
        ThreatSummary {
            events_by_severity,
            total_events: self.events.total_appended(),
            detector: self.detector.stats(10),
        }
    }

    /// Point-in-time snapshot of every subsystem.
    pub fn dashboard(&self) -> Dashboard {
        let score = self.security_score();
        metrics::record_security_score(score);
        Dashboard {
            security_status: self.status(),
            recent_events: self.events.recent(dashboard::RECENT_EVENTS),
            threat_summary: self.threat_summary(),
            firewall_stats: self.firewall.stats(),
            rate_limit_stats: self.rate_limiter.stats(),
            tunnel_status: TunnelOverview {
                stats: self.tunnels.stats(),
                tunnels: self.tunnels.statuses(),
            },
            overall_security_score: score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn orchestrator() -> SecurityOrchestrator {
        SecurityOrchestrator::new().unwrap()
    }

    #[test]
    fn test_one_event_per_transition() {
        let orch = orchestrator();
        let decision = orch.admit_request(&AdmissionRequest::new(ip("192.168.1.100"), 8080));

        assert!(decision.allowed);
        let kinds: Vec<EventKind> = decision.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::FirewallChecked,
                EventKind::RateChecked,
                EventKind::IdsChecked,
                EventKind::Admitted
            ]
        );
        assert_eq!(orch.events().len(), 4);
    }

    #[test]
    fn test_poisoned_firewall_fails_closed() {
        let orch = Arc::new(orchestrator());
        let clone = Arc::clone(&orch);
        let _ = std::thread::spawn(move || {
            let _guard = clone.firewall.rules.write().unwrap();
            panic!("poison the rule lock");
        })
        .join();

        let decision = orch.admit_request(&AdmissionRequest::new(ip("192.168.1.100"), 443));
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, PipelineState::BlockedByIds);
        assert_eq!(decision.blocked_by, vec!["intrusion_detection"]);

        let last = decision.events.last().unwrap();
        assert_eq!(last.kind, EventKind::InternalFault);
        assert_eq!(last.severity, Severity::Medium);
    }

    #[test]
    fn test_medium_detection_is_admitted_with_recommendation() {
        let orch = orchestrator();
        let request = AdmissionRequest::new(ip("198.51.100.20"), 443).payload("GET /../../etc/passwd");
        let decision = orch.admit_request(&request);

        assert!(decision.allowed);
        assert_eq!(decision.threat_score, Some(0.4));
        assert!(decision.recommendations.iter().any(|r| r.contains("path_traversal")));
        assert!(!orch.firewall().is_blocked(&request.source));
    }

    #[test]
    fn test_high_detection_blocks_without_denylisting() {
        let orch = orchestrator();
        let request = AdmissionRequest::new(ip("198.51.100.21"), 443).payload("<script>alert(1)</script>");
        let decision = orch.admit_request(&request);

        assert!(!decision.allowed);
        assert_eq!(decision.blocked_by, vec!["intrusion_detection"]);
        assert!(!orch.firewall().is_blocked(&request.source));
    }

    #[test]
    fn test_disabled_stages_are_skipped() {
        let mut config = ShieldConfig::default();
        config.detection.enabled = false;
        config.rate_limit.enabled = false;
        let orch = SecurityOrchestrator::from_config(&config).unwrap();

        let request = AdmissionRequest::new(ip("198.51.100.22"), 443).payload("' or 1=1");
        let decision = orch.admit_request(&request);
        assert!(decision.allowed);
        assert!(decision.rate_limit_status.is_empty());
        assert!((orch.security_score() - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_cleared_subsystem_flags_do_not_skip_stages() {
        let orch = orchestrator();
        // State between a request's lockdown check and lockdown returning.
        orch.active.all_off();

        let request = AdmissionRequest::new(ip("198.51.100.23"), 443).payload("'; DROP TABLE users; --");
        let decision = orch.admit_request(&request);
        assert!(!decision.allowed);
        assert_eq!(decision.blocked_by, vec!["intrusion_detection"]);
        assert!(!decision.rate_limit_status.is_empty());
        assert_eq!(orch.security_score(), 0.0);
    }

    #[test]
    fn test_unknown_block_severity_rejected() {
        let mut config = ShieldConfig::default();
        config.detection.block_severity = "severe".to_string();
        assert!(matches!(
            SecurityOrchestrator::from_config(&config),
            Err(SecurityError::Configuration(_))
        ));
    }

    #[test]
    fn test_secure_channel_contributes_to_score() {
        let orch = orchestrator();
        assert!((orch.security_score() - 0.8).abs() < 1e-9);

        orch.attach_secure_channel(Arc::new(StaticChannel(true)));
        assert!((orch.security_score() - 1.0).abs() < 1e-9);

        orch.attach_secure_channel(Arc::new(StaticChannel(false)));
        assert!((orch.security_score() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_lockdown_is_one_way() {
        let orch = orchestrator();
        let tunnel = orch.create_tunnel("203.0.113.1:500", "10.0.0.1:500").unwrap();

        let report = orch.emergency_lockdown();
        assert!(!report.already_locked);
        assert_eq!(report.tunnels_closed, 1);
        assert!(report.catch_all_rule.is_some());
        assert_eq!(orch.security_score(), 0.0);

        assert!(orch.emergency_lockdown().already_locked);
        assert!(matches!(orch.create_tunnel("a", "b"), Err(SecurityError::LockdownActive)));
        assert!(matches!(
            orch.encrypt_for_tunnel(tunnel, b"x"),
            Err(SecurityError::UnknownTunnel(_))
        ));

        orch.attach_secure_channel(Arc::new(StaticChannel(true)));
        assert_eq!(orch.security_score(), 0.0);
    }

    #[test]
    fn test_maintenance_closes_stale_tunnels() {
        let orch = orchestrator();
        let id = orch.create_tunnel("203.0.113.2:500", "10.0.0.1:500").unwrap();

        let report = orch.run_maintenance_at(Instant::now() + Duration::from_secs(301));
        assert_eq!(report.stale_tunnels, 1);
        assert!(!orch.tunnels().status(id).unwrap().active);
    }
}
