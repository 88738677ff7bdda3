//! Encrypted tunnel bookkeeping.
//!
//! # Data Flow
//! ```text
//! create_tunnel(remote, local) → fresh 256-bit key, id
//! encrypt(id, plaintext)       → IV(16) || AES-256-CBC ciphertext, bytes_out += len
//! decrypt(id, sealed)          → plaintext, bytes_in += len
//! close_tunnel / close_stale   → active = false (record kept)
//! ```
//!
//! # Design Decisions
//! - Tunnels are created and closed rarely, so one coarse lock guards the map
//! - Keys never leave the registry; status views omit them
//! - Closed tunnels reject encrypt/decrypt exactly like unknown ids

pub mod cipher;
pub mod manager;

pub use cipher::TunnelCipher;
pub use manager::{TunnelManager, TunnelStats, TunnelStatus};
