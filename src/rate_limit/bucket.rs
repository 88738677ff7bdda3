//! Sliding-window request bucket.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::WindowLimit;

/// Request timestamps for one (scope, key) pair.
///
/// Holds at most `max_requests` timestamps younger than `window`. Expired
/// entries are evicted lazily whenever the bucket is touched.
#[derive(Debug)]
pub struct RateBucket {
    timestamps: VecDeque<Instant>,
    max_requests: u32,
    window: Duration,
    last_touched: Instant,
}

impl RateBucket {
    pub fn new(limit: WindowLimit, now: Instant) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(limit.max_requests.min(1024) as usize),
            max_requests: limit.max_requests,
            window: limit.window(),
            last_touched: now,
        }
    }

    /// Adopt a (possibly changed) limit, dropping the oldest surplus entries.
    pub fn set_limit(&mut self, limit: WindowLimit) {
        self.max_requests = limit.max_requests;
        self.window = limit.window();
        while self.timestamps.len() > self.max_requests as usize {
            self.timestamps.pop_front();
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Consume one slot if the window has room.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.last_touched = now;
        self.evict_expired(now);

        if self.timestamps.len() < self.max_requests as usize {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Slots in use as of the last touch.
    pub fn used(&self) -> usize {
        self.timestamps.len()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Evict, then report whether the bucket is empty and untouched for longer than `ttl`.
    pub fn is_idle(&mut self, now: Instant, ttl: Duration) -> bool {
        self.evict_expired(now);
        self.timestamps.is_empty() && now.duration_since(self.last_touched) > ttl
    }
}
