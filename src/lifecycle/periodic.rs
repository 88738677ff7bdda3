//! Periodic background tasks with explicit cancellation.

use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio::time;

use crate::lifecycle::Shutdown;

/// A closure run on a fixed interval until stopped.
///
/// The first tick fires one full `period` after spawning. Dropping the task
/// stops it.
pub struct PeriodicTask {
    name: &'static str,
    shutdown: Shutdown,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn onto the current Tokio runtime.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Result<Self, TryCurrentError>
    where
        F: FnMut() + Send + 'static,
    {
        let runtime = Handle::try_current()?;
        let shutdown = Shutdown::new();
        let mut stop = shutdown.subscribe();

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(),
                    _ = stop.recv() => {
                        tracing::debug!(task = name, "Periodic task received stop signal, exiting loop");
                        break;
                    }
                }
            }
        });

        tracing::info!(task = name, period_secs = period.as_secs_f64(), "Periodic task started");
        Ok(Self {
            name,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to exit after its current tick.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(task = self.name, error = %e, "Periodic task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("test", Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.shutdown().await;

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several ticks, got {}", after_stop);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_stop_before_first_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("idle", Duration::from_secs(3600), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        task.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(task.is_finished());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_requires_runtime() {
        assert!(PeriodicTask::spawn("orphan", Duration::from_secs(1), || {}).is_err());
    }
}
