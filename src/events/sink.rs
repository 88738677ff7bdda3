//! Event sinks: where appended events go besides the in-memory ring buffer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::events::types::{SecurityEvent, Severity};

/// Append-only consumer of security events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &SecurityEvent);
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &SecurityEvent) {
        let source = event
            .source_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string());

        match event.severity {
            Severity::Info => tracing::debug!(
                kind = ?event.kind,
                source = %source,
                "{}", event.description
            ),
            Severity::Low => tracing::info!(
                kind = ?event.kind,
                source = %source,
                score = event.threat_score,
                "{}", event.description
            ),
            Severity::Medium => tracing::warn!(
                kind = ?event.kind,
                source = %source,
                score = event.threat_score,
                "{}", event.description
            ),
            Severity::High | Severity::Critical => tracing::error!(
                kind = ?event.kind,
                source = %source,
                severity = %event.severity,
                score = event.threat_score,
                "{}", event.description
            ),
        }
    }
}

/// Writes one JSON object per line to an append-only file.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::info!(path = ?path, "Event sink opened");
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl EventSink for JsonLinesSink {
    fn record(&self, event: &SecurityEvent) {
        let Ok(mut writer) = self.writer.lock() else {
            tracing::warn!("Event sink writer poisoned, dropping event");
            return;
        };

        let result = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist security event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventKind;
    use std::io::{BufRead, BufReader};

    #[test]
    fn test_json_lines_sink_appends() {
        let path = std::env::temp_dir().join(format!("shield-events-{}.jsonl", uuid::Uuid::new_v4()));

        let sink = JsonLinesSink::open(&path).unwrap();
        sink.record(&SecurityEvent::new(EventKind::Admitted, Severity::Info, "first"));
        sink.record(&SecurityEvent::new(EventKind::BlockedByIds, Severity::Critical, "second"));
        drop(sink);

        let file = File::open(&path).unwrap();
        let lines: Vec<SecurityEvent> = BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].description, "first");
        assert_eq!(lines[1].severity, Severity::Critical);

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
