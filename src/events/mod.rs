//! Security event subsystem.
//!
//! # Data Flow
//! ```text
//! firewall / rate_limit / detection / tunnel outcomes
//!     → orchestrator builds SecurityEvent
//!     → log.rs (bounded ring buffer, most recent N)
//!     → sink.rs (tracing, optional JSON-lines file)
//!     → dashboard reads recent events
//! ```
//!
//! # Design Decisions
//! - Events are immutable once appended
//! - The ring buffer drops the oldest entry when full
//! - Sinks never fail the caller; write errors are logged and dropped

pub mod log;
pub mod sink;
pub mod types;

pub use log::EventLog;
pub use sink::{EventSink, JsonLinesSink, TracingSink};
pub use types::{EventKind, SecurityEvent, Severity, ThreatKind};
