//! Request admission pipeline library.
//!
//! Firewall rules, tiered sliding-window rate limiting, signature and
//! behavioral intrusion detection, and encrypted tunnel bookkeeping, composed
//! by [`SecurityOrchestrator`].

pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod observability;

// Pipeline stages
pub mod detection;
pub mod firewall;
pub mod rate_limit;
pub mod tunnel;

pub mod orchestrator;

pub use config::schema::ShieldConfig;
pub use error::{SecurityError, SecurityResult};
pub use events::{EventKind, SecurityEvent, Severity};
pub use lifecycle::Shutdown;
pub use orchestrator::{AdmissionRequest, Decision, PipelineState, SecurityOrchestrator};
