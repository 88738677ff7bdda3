//! Tiered sliding-window rate limiter.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{RateLimitConfig, WindowLimit};
use crate::error::{SecurityError, SecurityResult};
use crate::lifecycle::PeriodicTask;
use crate::observability::metrics;
use crate::rate_limit::bucket::RateBucket;

/// Rate-limit tier. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    SourceIp,
    User,
    Endpoint,
    AuthEndpoint,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::Global,
        Scope::SourceIp,
        Scope::User,
        Scope::Endpoint,
        Scope::AuthEndpoint,
    ];

    /// Name used for this tier in config and in `add_rule`.
    pub fn rule_name(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::SourceIp => "per_ip",
            Scope::User => "per_user",
            Scope::Endpoint => "endpoint",
            Scope::AuthEndpoint => "auth_endpoint",
        }
    }

    pub fn from_rule_name(name: &str) -> Option<Self> {
        Scope::ALL.into_iter().find(|s| s.rule_name() == name)
    }
}

/// Endpoints whose name mentions auth or login get the stricter tier.
pub fn is_auth_endpoint(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    lower.contains("auth") || lower.contains("login")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    scope: Scope,
    key: String,
}

/// Window usage for one tier after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub used: usize,
    pub limit: u32,
    pub window_secs: u64,
}

/// Result of [`RateLimiter::check`].
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub reason: String,
    pub rejected_by: Option<Scope>,
    pub retry_after_secs: Option<u64>,
    /// Tier name → usage, for every tier consulted.
    pub status: BTreeMap<String, TierStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub tiers: BTreeMap<String, WindowLimit>,
    pub endpoint_overrides: BTreeMap<String, WindowLimit>,
    pub active_buckets: BTreeMap<Scope, usize>,
    pub rejections: BTreeMap<Scope, u64>,
    pub sweeping: bool,
}

/// Per-scope sliding-window limiter.
///
/// Buckets live in a sharded concurrent map; a check holds one shard lock
/// at a time, for one bucket.
pub struct RateLimiter {
    tiers: DashMap<Scope, WindowLimit>,
    overrides: DashMap<String, WindowLimit>,
    buckets: DashMap<BucketKey, RateBucket>,
    rejections: DashMap<Scope, u64>,
    sweep_interval: Duration,
    idle_ttl: Duration,
    sweeper: Mutex<Option<PeriodicTask>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> SecurityResult<Self> {
        let limiter = Self {
            tiers: DashMap::new(),
            overrides: DashMap::new(),
            buckets: DashMap::new(),
            rejections: DashMap::new(),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            sweeper: Mutex::new(None),
        };

        for (scope, limit) in [
            (Scope::Global, config.global),
            (Scope::SourceIp, config.per_ip),
            (Scope::User, config.per_user),
            (Scope::Endpoint, config.endpoint),
            (Scope::AuthEndpoint, config.auth_endpoint),
        ] {
            limiter.add_rule(scope.rule_name(), limit.max_requests, limit.window_secs)?;
        }
        for rule in &config.rules {
            limiter.add_rule(&rule.name, rule.max_requests, rule.window_secs)?;
        }
        Ok(limiter)
    }

    /// Set a tier limit (`name` is a tier name) or an endpoint-specific override.
    pub fn add_rule(&self, name: &str, max_requests: u32, window_secs: u64) -> SecurityResult<()> {
        if name.trim().is_empty() {
            return Err(SecurityError::Configuration("rate limit rule name is empty".to_string()));
        }
        if max_requests == 0 || window_secs == 0 {
            return Err(SecurityError::Configuration(format!(
                "rate limit '{}' needs max_requests > 0 and window_secs > 0",
                name
            )));
        }

        let limit = WindowLimit::new(max_requests, window_secs);
        match Scope::from_rule_name(name) {
            Some(scope) => {
                self.tiers.insert(scope, limit);
            }
            None => {
                self.overrides.insert(name.to_string(), limit);
            }
        }
        tracing::debug!(rule = name, max_requests, window_secs, "Rate limit rule set");
        Ok(())
    }

    pub fn check(
        &self,
        source: &IpAddr,
        user_id: Option<&str>,
        endpoint: &str,
        method: &str,
    ) -> SecurityResult<RateLimitOutcome> {
        self.check_at(Instant::now(), source, user_id, endpoint, method)
    }

    /// Run every tier in order. A tier that passes keeps its consumed slot
    /// even if a later tier rejects.
    pub fn check_at(
        &self,
        now: Instant,
        source: &IpAddr,
        user_id: Option<&str>,
        endpoint: &str,
        method: &str,
    ) -> SecurityResult<RateLimitOutcome> {
        let endpoint_scope = if is_auth_endpoint(endpoint) {
            Scope::AuthEndpoint
        } else {
            Scope::Endpoint
        };

        let mut plan = vec![
            (Scope::Global, String::from("*")),
            (Scope::SourceIp, source.to_string()),
        ];
        if let Some(user) = user_id {
            plan.push((Scope::User, user.to_string()));
        }
        plan.push((endpoint_scope, format!("{} {}", method.to_ascii_uppercase(), endpoint)));

        let mut status = BTreeMap::new();
        for (scope, key) in plan {
            let limit = self.limit_for(scope, endpoint)?;

            let (allowed, used) = {
                let mut bucket = self
                    .buckets
                    .entry(BucketKey { scope, key })
                    .or_insert_with(|| RateBucket::new(limit, now));
                bucket.set_limit(limit);
                let allowed = bucket.try_acquire(now);
                (allowed, bucket.used())
            };

            status.insert(
                scope.rule_name().to_string(),
                TierStatus {
                    used,
                    limit: limit.max_requests,
                    window_secs: limit.window_secs,
                },
            );

            if !allowed {
                *self.rejections.entry(scope).or_insert(0) += 1;
                metrics::record_rate_limited(scope.rule_name());
                tracing::warn!(
                    source = %source,
                    tier = scope.rule_name(),
                    endpoint,
                    "Rate limit exceeded"
                );
                return Ok(RateLimitOutcome {
                    allowed: false,
                    reason: format!(
                        "{} rate limit exceeded ({} requests per {}s)",
                        scope.rule_name(),
                        limit.max_requests,
                        limit.window_secs
                    ),
                    rejected_by: Some(scope),
                    retry_after_secs: Some(limit.window_secs),
                    status,
                });
            }
        }

        Ok(RateLimitOutcome {
            allowed: true,
            reason: "within limits".to_string(),
            rejected_by: None,
            retry_after_secs: None,
            status,
        })
    }

    fn limit_for(&self, scope: Scope, endpoint: &str) -> SecurityResult<WindowLimit> {
        if matches!(scope, Scope::Endpoint | Scope::AuthEndpoint) {
            if let Some(limit) = self.overrides.get(endpoint) {
                return Ok(*limit);
            }
        }
        self.tiers
            .get(&scope)
            .map(|l| *l)
            .ok_or_else(|| SecurityError::Internal(format!("no rate limit for tier {}", scope.rule_name())))
    }

    /// Remove non-global buckets that are empty and idle past the TTL.
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let candidates: Vec<BucketKey> = self
            .buckets
            .iter()
            .filter(|entry| entry.key().scope != Scope::Global)
            .map(|entry| entry.key().clone())
            .collect();

        let ttl = self.idle_ttl;
        let removed = candidates
            .into_iter()
            .filter(|key| {
                self.buckets
                    .remove_if_mut(key, |_, bucket| bucket.is_idle(now, ttl))
                    .is_some()
            })
            .count();

        if removed > 0 {
            metrics::record_swept("rate_bucket", removed);
            tracing::debug!(removed, remaining = self.buckets.len(), "Swept idle rate buckets");
        }
        removed
    }

    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<PeriodicTask>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the background sweep on the current Tokio runtime.
    /// Returns false if already running or no runtime is available.
    pub fn start_sweep(self: &Arc<Self>) -> bool {
        let mut sweeper = self.sweeper();
        if sweeper.is_some() {
            return false;
        }

        let limiter = Arc::downgrade(self);
        let task = PeriodicTask::spawn("rate-limit-sweep", self.sweep_interval, move || {
            if let Some(limiter) = limiter.upgrade() {
                limiter.sweep_idle();
            }
        });

        match task {
            Ok(task) => {
                *sweeper = Some(task);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "No runtime available, rate-limit sweep not started");
                false
            }
        }
    }

    /// Stop the background sweep. Returns false if it was not running.
    pub fn stop_sweep(&self) -> bool {
        match self.sweeper().take() {
            Some(task) => {
                task.stop();
                tracing::info!("Rate-limit sweep stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper().is_some()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn stats(&self) -> RateLimitStats {
        let mut active_buckets = BTreeMap::new();
        for entry in self.buckets.iter() {
            *active_buckets.entry(entry.key().scope).or_insert(0) += 1;
        }

        RateLimitStats {
            tiers: self
                .tiers
                .iter()
                .map(|e| (e.key().rule_name().to_string(), *e.value()))
                .collect(),
            endpoint_overrides: self
                .overrides
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            active_buckets,
            rejections: self.rejections.iter().map(|e| (*e.key(), *e.value())).collect(),
            sweeping: self.is_sweeping(),
        }
    }
}
