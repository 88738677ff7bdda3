//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → SecurityOrchestrator::from_config builds every component
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; runtime changes go through the
//!   orchestrator's administrative operations
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ShieldConfig;
pub use schema::{
    DetectionConfig, EventsConfig, FirewallConfig, NamedLimit, ObservabilityConfig,
    RateLimitConfig, SecureChannelConfig, TunnelConfig, WindowLimit,
};
