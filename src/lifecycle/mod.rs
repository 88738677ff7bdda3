//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build orchestrator → Start maintenance tasks
//!
//! Maintenance (periodic.rs):
//!     interval tick → sweep idle rate buckets / threat records / stale tunnels
//!     stop signal   → exit loop
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C or lockdown → trigger → tasks observe signal → exit
//! ```
//!
//! # Design Decisions
//! - Background work is owned by a handle; dropping the handle stops it
//! - Shutdown is level-triggered, so late subscribers still observe it

pub mod periodic;
pub mod shutdown;

pub use periodic::PeriodicTask;
pub use shutdown::{Shutdown, ShutdownSignal};
