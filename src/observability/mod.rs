//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline stages, maintenance, admin operations
//!     → logging.rs (tracing subscriber: EnvFilter + fmt layer on stderr)
//!     → metrics.rs (decision / rejection / threat counters, state gauges)
//!
//! Security events reach tracing separately, through events::TracingSink.
//!
//! Consumers:
//!     → stderr (pretty or JSON lines)
//!     → Prometheus scrape endpoint, when enabled
//! ```
//!
//! # Design Decisions
//! - stdout is reserved for CLI output (decisions, dashboards)
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
