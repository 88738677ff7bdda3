//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::IpAddr;

use ingress_shield::{AdmissionRequest, SecurityOrchestrator, ShieldConfig};

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid test address")
}

/// Orchestrator with every section at its default.
pub fn orchestrator() -> SecurityOrchestrator {
    SecurityOrchestrator::new().expect("default config builds")
}

/// Orchestrator built from a default config adjusted by `f`.
pub fn orchestrator_with(f: impl FnOnce(&mut ShieldConfig)) -> SecurityOrchestrator {
    let mut config = ShieldConfig::default();
    f(&mut config);
    SecurityOrchestrator::from_config(&config).expect("test config builds")
}

pub fn request(source: &str, port: u16) -> AdmissionRequest {
    AdmissionRequest::new(ip(source), port)
}

/// Unique file path under the system temp directory.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("ingress-shield-{}-{}", std::process::id(), name))
}
