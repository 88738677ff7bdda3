//! Bounded, append-only event log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::sink::EventSink;
use crate::events::types::{SecurityEvent, Severity};

/// Ring buffer holding the most recent `capacity` events.
///
/// Every appended event is also handed to each registered sink, outside the
/// buffer lock.
pub struct EventLog {
    buffer: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
    sinks: Vec<Arc<dyn EventSink>>,
    total: AtomicU64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self::with_sinks(capacity, Vec::new())
    }

    pub fn with_sinks(capacity: usize, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            sinks,
            total: AtomicU64::new(0),
        }
    }

    // The buffer only ever holds fully built events, so a panic elsewhere
    // cannot leave it half-written.
    fn buffer(&self) -> MutexGuard<'_, VecDeque<SecurityEvent>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, event: SecurityEvent) {
        for sink in &self.sinks {
            sink.record(&event);
        }

        let mut buffer = self.buffer();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<SecurityEvent> {
        let buffer = self.buffer();
        let skip = buffer.len().saturating_sub(n);
        buffer.iter().skip(skip).cloned().collect()
    }

    /// Count events at `severity` among the last `window` entries.
    pub fn count_recent_with_severity(&self, window: usize, severity: Severity) -> usize {
        let buffer = self.buffer();
        buffer
            .iter()
            .rev()
            .take(window)
            .filter(|e| e.severity == severity)
            .count()
    }

    /// Events currently retained.
    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events ever appended, including those rotated out.
    pub fn total_appended(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Apply `f` to every retained event, oldest first.
    pub fn for_each(&self, mut f: impl FnMut(&SecurityEvent)) {
        let buffer = self.buffer();
        buffer.iter().for_each(|e| f(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventKind;

    fn event(severity: Severity, description: &str) -> SecurityEvent {
        SecurityEvent::new(EventKind::Admitted, severity, description)
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.append(event(Severity::Info, &format!("e{}", i)));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.total_appended(), 5);
        let recent: Vec<_> = log.recent(10).into_iter().map(|e| e.description).collect();
        assert_eq!(recent, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_recent_returns_tail() {
        let log = EventLog::new(10);
        for i in 0..4 {
            log.append(event(Severity::Info, &format!("e{}", i)));
        }
        let recent: Vec<_> = log.recent(2).into_iter().map(|e| e.description).collect();
        assert_eq!(recent, vec!["e2", "e3"]);
    }

    #[test]
    fn test_count_recent_with_severity_respects_window() {
        let log = EventLog::new(100);
        log.append(event(Severity::Critical, "old"));
        for _ in 0..3 {
            log.append(event(Severity::Info, "filler"));
        }
        log.append(event(Severity::Critical, "new"));

        assert_eq!(log.count_recent_with_severity(2, Severity::Critical), 1);
        assert_eq!(log.count_recent_with_severity(100, Severity::Critical), 2);
    }
}
