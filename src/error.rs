//! Error taxonomy for the admission pipeline and its administrative surface.
//!
//! Normal rejections (firewall block, rate limit, intrusion flag) are not
//! errors; they travel as [`crate::orchestrator::Decision`] values.

use thiserror::Error;
use uuid::Uuid;

/// Errors reported to callers of the administrative and tunnel operations.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A rule or limit was malformed and rejected at registration time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Encrypt/decrypt referenced a tunnel that is unknown or already closed.
    #[error("unknown or closed tunnel: {0}")]
    UnknownTunnel(Uuid),

    /// Ciphertext too short to carry an IV, misaligned, or with corrupt padding.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The operation is refused because an emergency lockdown is in effect.
    #[error("emergency lockdown is active")]
    LockdownActive,

    /// Unexpected internal fault (poisoned lock, missing tier rule).
    #[error("internal fault: {0}")]
    Internal(String),
}

pub type SecurityResult<T> = Result<T, SecurityError>;
