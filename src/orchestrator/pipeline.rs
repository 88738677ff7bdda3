//! Admission request, pipeline states and the resulting decision.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::events::SecurityEvent;
use crate::rate_limit::TierStatus;

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_endpoint() -> String {
    "/".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

/// One inbound request as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub source: IpAddr,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
}

impl AdmissionRequest {
    pub fn new(source: IpAddr, port: u16) -> Self {
        Self {
            source,
            port,
            protocol: default_protocol(),
            payload: String::new(),
            user_id: None,
            endpoint: default_endpoint(),
            method: default_method(),
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// Position in the admission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    FirewallChecked,
    RateChecked,
    IdsChecked,
    Admitted,
    BlockedByFirewall,
    BlockedByRateLimit,
    BlockedByIds,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::FirewallChecked => "firewall_checked",
            PipelineState::RateChecked => "rate_checked",
            PipelineState::IdsChecked => "ids_checked",
            PipelineState::Admitted => "admitted",
            PipelineState::BlockedByFirewall => "blocked_by_firewall",
            PipelineState::BlockedByRateLimit => "blocked_by_rate_limit",
            PipelineState::BlockedByIds => "blocked_by_ids",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Admitted
                | PipelineState::BlockedByFirewall
                | PipelineState::BlockedByRateLimit
                | PipelineState::BlockedByIds
        )
    }

    /// Component name reported in `Decision::blocked_by`.
    pub fn blocking_component(&self) -> Option<&'static str> {
        match self {
            PipelineState::BlockedByFirewall => Some("firewall"),
            PipelineState::BlockedByRateLimit => Some("rate_limiter"),
            PipelineState::BlockedByIds => Some("intrusion_detection"),
            _ => None,
        }
    }
}

/// Outcome of one admission.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub outcome: PipelineState,
    pub blocked_by: Vec<String>,
    /// Events appended to the log for this request, in transition order.
    pub events: Vec<SecurityEvent>,
    pub rate_limit_status: BTreeMap<String, TierStatus>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_score: Option<f64>,
}

impl Decision {
    pub(crate) fn new() -> Self {
        Self {
            allowed: false,
            outcome: PipelineState::Start,
            blocked_by: Vec::new(),
            events: Vec::new(),
            rate_limit_status: BTreeMap::new(),
            recommendations: Vec::new(),
            threat_score: None,
        }
    }

    /// Enter a terminal state.
    pub(crate) fn finish(mut self, state: PipelineState) -> Self {
        self.outcome = state;
        self.allowed = state == PipelineState::Admitted;
        if let Some(component) = state.blocking_component() {
            self.blocked_by.push(component.to_string());
        }
        self
    }
}
