//! Tunnel registry.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{SecurityError, SecurityResult};
use crate::observability::metrics;
use crate::tunnel::cipher::TunnelCipher;

struct Tunnel {
    remote_address: String,
    local_address: String,
    /// Present while the tunnel is active. Dropped on close, which wipes the key.
    cipher: Option<TunnelCipher>,
    established_at_ms: u64,
    last_heartbeat: Instant,
    bytes_in: u64,
    bytes_out: u64,
}

impl Tunnel {
    fn is_active(&self) -> bool {
        self.cipher.is_some()
    }

    fn cipher(&self, id: Uuid) -> SecurityResult<&TunnelCipher> {
        self.cipher.as_ref().ok_or(SecurityError::UnknownTunnel(id))
    }

    fn close(&mut self) {
        self.cipher = None;
    }
}

/// Snapshot of one tunnel. Never includes key material.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelStatus {
    pub id: Uuid,
    pub remote_address: String,
    pub local_address: String,
    pub established_at_ms: u64,
    pub secs_since_heartbeat: u64,
    pub active: bool,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TunnelStats {
    pub total: usize,
    pub active: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Registry of encrypted tunnels, one coarse lock over the whole map.
///
/// Closing a tunnel drops its key; the record stays for audit.
#[derive(Default)]
pub struct TunnelManager {
    tunnels: Mutex<HashMap<Uuid, Tunnel>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl TunnelManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SecurityResult<MutexGuard<'_, HashMap<Uuid, Tunnel>>> {
        self.tunnels
            .lock()
            .map_err(|_| SecurityError::Internal("tunnel registry lock poisoned".to_string()))
    }

    /// Run `f` against an active tunnel.
    fn with_active<T>(&self, id: Uuid, f: impl FnOnce(&mut Tunnel) -> T) -> SecurityResult<T> {
        let mut tunnels = self.lock()?;
        match tunnels.get_mut(&id) {
            Some(tunnel) if tunnel.is_active() => Ok(f(tunnel)),
            _ => Err(SecurityError::UnknownTunnel(id)),
        }
    }

    pub fn create_tunnel(&self, remote: impl Into<String>, local: impl Into<String>) -> SecurityResult<Uuid> {
        self.create_tunnel_at(Instant::now(), remote, local)
    }

    pub fn create_tunnel_at(
        &self,
        now: Instant,
        remote: impl Into<String>,
        local: impl Into<String>,
    ) -> SecurityResult<Uuid> {
        let id = Uuid::new_v4();
        let tunnel = Tunnel {
            remote_address: remote.into(),
            local_address: local.into(),
            cipher: Some(TunnelCipher::generate()),
            established_at_ms: now_ms(),
            last_heartbeat: now,
            bytes_in: 0,
            bytes_out: 0,
        };

        let active = {
            let mut tunnels = self.lock()?;
            tracing::info!(
                tunnel = %id,
                remote = %tunnel.remote_address,
                local = %tunnel.local_address,
                "Tunnel established"
            );
            tunnels.insert(id, tunnel);
            tunnels.values().filter(|t| t.is_active()).count()
        };
        metrics::record_active_tunnels(active);
        Ok(id)
    }

    /// Encrypt for the tunnel; the sealed length is added to `bytes_out`.
    pub fn encrypt(&self, id: Uuid, plaintext: &[u8]) -> SecurityResult<Vec<u8>> {
        self.with_active(id, |tunnel| -> SecurityResult<Vec<u8>> {
            let sealed = tunnel.cipher(id)?.encrypt(plaintext);
            tunnel.bytes_out += sealed.len() as u64;
            Ok(sealed)
        })?
    }

    /// Decrypt from the tunnel; the sealed length is added to `bytes_in`.
    pub fn decrypt(&self, id: Uuid, data: &[u8]) -> SecurityResult<Vec<u8>> {
        self.with_active(id, |tunnel| -> SecurityResult<Vec<u8>> {
            let plain = tunnel.cipher(id)?.decrypt(data)?;
            tunnel.bytes_in += data.len() as u64;
            Ok(plain)
        })?
    }

    pub fn update_stats(&self, id: Uuid, bytes_in: u64, bytes_out: u64) -> SecurityResult<()> {
        self.with_active(id, |tunnel| {
            tunnel.bytes_in += bytes_in;
            tunnel.bytes_out += bytes_out;
        })
    }

    pub fn heartbeat(&self, id: Uuid) -> SecurityResult<()> {
        self.heartbeat_at(id, Instant::now())
    }

    pub fn heartbeat_at(&self, id: Uuid, now: Instant) -> SecurityResult<()> {
        self.with_active(id, |tunnel| tunnel.last_heartbeat = now)
    }

    /// Mark a tunnel closed. Closing twice reports the tunnel as unknown.
    pub fn close_tunnel(&self, id: Uuid) -> SecurityResult<()> {
        let active = {
            let mut tunnels = self.lock()?;
            match tunnels.get_mut(&id) {
                Some(tunnel) if tunnel.is_active() => tunnel.close(),
                _ => return Err(SecurityError::UnknownTunnel(id)),
            }
            tunnels.values().filter(|t| t.is_active()).count()
        };
        tracing::info!(tunnel = %id, "Tunnel closed");
        metrics::record_active_tunnels(active);
        Ok(())
    }

    /// Close every active tunnel. Returns how many were closed.
    pub fn close_all(&self) -> SecurityResult<usize> {
        let closed = {
            let mut tunnels = self.lock()?;
            let mut closed = 0;
            for tunnel in tunnels.values_mut().filter(|t| t.is_active()) {
                tunnel.close();
                closed += 1;
            }
            closed
        };
        if closed > 0 {
            tracing::warn!(closed, "Closed all tunnels");
        }
        metrics::record_active_tunnels(0);
        Ok(closed)
    }

    /// Close tunnels whose last heartbeat is at least `timeout` old.
    pub fn close_stale_at(&self, now: Instant, timeout: Duration) -> SecurityResult<Vec<Uuid>> {
        let (closed, active) = {
            let mut tunnels = self.lock()?;
            let mut closed = Vec::new();
            for (id, tunnel) in tunnels.iter_mut() {
                if tunnel.is_active() && now.saturating_duration_since(tunnel.last_heartbeat) >= timeout {
                    tunnel.close();
                    closed.push(*id);
                }
            }
            (closed, tunnels.values().filter(|t| t.is_active()).count())
        };

        if !closed.is_empty() {
            tracing::info!(closed = closed.len(), remaining = active, "Closed stale tunnels");
            metrics::record_active_tunnels(active);
        }
        Ok(closed)
    }

    pub fn close_stale(&self, timeout: Duration) -> SecurityResult<Vec<Uuid>> {
        self.close_stale_at(Instant::now(), timeout)
    }

    pub fn status(&self, id: Uuid) -> SecurityResult<TunnelStatus> {
        let tunnels = self.lock()?;
        tunnels
            .get(&id)
            .map(|t| status_of(id, t, Instant::now()))
            .ok_or(SecurityError::UnknownTunnel(id))
    }

    /// All tunnels, open and closed, ordered by establishment time.
    pub fn statuses(&self) -> Vec<TunnelStatus> {
        let now = Instant::now();
        let tunnels = self.tunnels.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<TunnelStatus> = tunnels.iter().map(|(id, t)| status_of(*id, t, now)).collect();
        out.sort_by_key(|s| (s.established_at_ms, s.id));
        out
    }

    pub fn active_count(&self) -> usize {
        let tunnels = self.tunnels.lock().unwrap_or_else(PoisonError::into_inner);
        tunnels.values().filter(|t| t.is_active()).count()
    }

    pub fn stats(&self) -> TunnelStats {
        let tunnels = self.tunnels.lock().unwrap_or_else(PoisonError::into_inner);
        tunnels.values().fold(
            TunnelStats {
                total: tunnels.len(),
                ..TunnelStats::default()
            },
            |mut acc, t| {
                if t.is_active() {
                    acc.active += 1;
                }
                acc.bytes_in += t.bytes_in;
                acc.bytes_out += t.bytes_out;
                acc
            },
        )
    }
}

fn status_of(id: Uuid, t: &Tunnel, now: Instant) -> TunnelStatus {
    TunnelStatus {
        id,
        remote_address: t.remote_address.clone(),
        local_address: t.local_address.clone(),
        established_at_ms: t.established_at_ms,
        secs_since_heartbeat: now.saturating_duration_since(t.last_heartbeat).as_secs(),
        active: t.is_active(),
        bytes_in: t.bytes_in,
        bytes_out: t.bytes_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_byte_counters() {
        let manager = TunnelManager::new();
        let id = manager.create_tunnel("203.0.113.10:4500", "10.0.0.1:4500").unwrap();

        let sealed = manager.encrypt(id, b"hello tunnel").unwrap();
        let plain = manager.decrypt(id, &sealed).unwrap();
        assert_eq!(plain, b"hello tunnel");

        let status = manager.status(id).unwrap();
        assert!(status.active);
        assert_eq!(status.bytes_out, sealed.len() as u64);
        assert_eq!(status.bytes_in, sealed.len() as u64);
    }

    #[test]
    fn test_keys_are_per_tunnel() {
        let manager = TunnelManager::new();
        let a = manager.create_tunnel("a", "l").unwrap();
        let b = manager.create_tunnel("b", "l").unwrap();
        let sealed = manager.encrypt(a, b"for a only").unwrap();
        match manager.decrypt(b, &sealed) {
            Ok(plain) => assert_ne!(plain, b"for a only"),
            Err(e) => assert!(matches!(e, SecurityError::Decryption(_))),
        }
    }

    #[test]
    fn test_unknown_and_closed_tunnels() {
        let manager = TunnelManager::new();
        let missing = Uuid::new_v4();
        assert!(matches!(manager.encrypt(missing, b"x"), Err(SecurityError::UnknownTunnel(id)) if id == missing));

        let id = manager.create_tunnel("r", "l").unwrap();
        manager.close_tunnel(id).unwrap();
        assert!(matches!(manager.encrypt(id, b"x"), Err(SecurityError::UnknownTunnel(_))));
        assert!(matches!(manager.decrypt(id, &[0u8; 32]), Err(SecurityError::UnknownTunnel(_))));
        assert!(matches!(manager.close_tunnel(id), Err(SecurityError::UnknownTunnel(_))));

        // Record retained for audit.
        assert!(!manager.status(id).unwrap().active);
        assert_eq!(manager.statuses().len(), 1);
    }

    #[test]
    fn test_short_ciphertext_leaves_counters_untouched() {
        let manager = TunnelManager::new();
        let id = manager.create_tunnel("r", "l").unwrap();
        assert!(matches!(manager.decrypt(id, b"short"), Err(SecurityError::Decryption(_))));
        assert_eq!(manager.status(id).unwrap().bytes_in, 0);
    }

    #[test]
    fn test_stale_tunnels_closed_after_timeout() {
        let manager = TunnelManager::new();
        let start = Instant::now();
        let quiet = manager.create_tunnel_at(start, "quiet", "l").unwrap();
        let chatty = manager.create_tunnel_at(start, "chatty", "l").unwrap();

        manager.heartbeat_at(chatty, start + Duration::from_secs(200)).unwrap();
        let closed = manager
            .close_stale_at(start + Duration::from_secs(300), Duration::from_secs(300))
            .unwrap();

        assert_eq!(closed, vec![quiet]);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_every_close_path_drops_the_key() {
        let manager = TunnelManager::new();
        let start = Instant::now();
        let single = manager.create_tunnel_at(start, "single", "l").unwrap();
        let stale = manager.create_tunnel_at(start, "stale", "l").unwrap();
        let rest = manager.create_tunnel_at(start + Duration::from_secs(600), "rest", "l").unwrap();

        manager.close_tunnel(single).unwrap();
        manager
            .close_stale_at(start + Duration::from_secs(600), Duration::from_secs(300))
            .unwrap();
        manager.close_all().unwrap();

        let tunnels = manager.tunnels.lock().unwrap();
        for id in [single, stale, rest] {
            let tunnel = &tunnels[&id];
            assert!(tunnel.cipher.is_none());
            assert!(!tunnel.remote_address.is_empty());
        }
    }

    #[test]
    fn test_close_all_and_stats() {
        let manager = TunnelManager::new();
        let a = manager.create_tunnel("a", "l").unwrap();
        manager.create_tunnel("b", "l").unwrap();
        manager.update_stats(a, 10, 20).unwrap();

        let stats = manager.stats();
        assert_eq!((stats.total, stats.active, stats.bytes_in, stats.bytes_out), (2, 2, 10, 20));

        assert_eq!(manager.close_all().unwrap(), 2);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.close_all().unwrap(), 0);
        assert_eq!(manager.stats().total, 2);
    }
}
