//! Lightweight intrusion detection.
//!
//! # Data Flow
//! ```text
//! (source, payload, request kind)
//!     → signatures.rs: SQL injection 0.8, XSS 0.6, traversal/command 0.4
//!     → behavior.rs: append to source history, then flood / brute force /
//!       scan heuristics over trailing windows (+0.7 if any fires)
//!     → score clamped to 1.0; above threshold → SecurityEvent
//! ```
//!
//! # Design Decisions
//! - Signature scanners are stateless and case-insensitive
//! - History is bounded per source and pruned once fully aged out
//! - The detector reports; it never blocks addresses itself

pub mod behavior;
pub mod detector;
pub mod signatures;

pub use behavior::{BehaviorThresholds, RequestKind, ThreatRecord};
pub use detector::{DetectorStats, IntrusionDetector, SourceThreat};
pub use signatures::{scan_payload, SignatureMatch};
