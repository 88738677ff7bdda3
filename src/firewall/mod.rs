//! Static rule filtering.
//!
//! # Data Flow
//! ```text
//! (source, port, protocol)
//!     → BlockedSet (denylisted → block)
//!     → rules.rs, in insertion order (first match wins, hit counted)
//!     → fallback: well-known port or private source → allow, else monitor
//! ```
//!
//! # Design Decisions
//! - Rules are compiled at registration; a bad CIDR never reaches evaluation
//! - Rules are never deleted, so ids stay equal to insertion indices
//! - Reads share a lock, writes (add rule, block address) take it exclusively

pub mod cidr;
pub mod engine;
pub mod rules;

pub use cidr::Cidr;
pub use engine::{Firewall, FirewallStats, FirewallVerdict};
pub use rules::{AddressPattern, Rule, RuleAction, RuleSpec, RuleView};
