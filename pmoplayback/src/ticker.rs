//! Periodic task that stops as soon as it is cancelled or dropped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A callback run every `period` on the tokio runtime.
///
/// The callback receives the period so that it can accumulate elapsed time
/// without reading a clock. Ticks that could not run on time are delayed,
/// never bursted.
#[derive(Debug)]
pub struct Ticker {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawns the periodic task. The first call happens one `period` after
    /// spawning. Must be called from within a tokio runtime.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut(Duration) + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        let stop = token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => tick(period),
                }
            }
            debug!(ticker = task_name.as_str(), "Ticker stopped");
        });

        debug!(ticker = name.as_str(), period_ms = period.as_millis() as u64, "Ticker started");
        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the task; no tick runs after this returns to the runtime.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let ticker = Ticker::spawn("test", Duration::from_millis(100), move |period| {
            assert_eq!(period, Duration::from_millis(100));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(1050)).await;
        let ticks = count.load(Ordering::SeqCst);
        assert!((9..=10).contains(&ticks), "unexpected tick count {ticks}");
        assert!(ticker.is_running());

        ticker.cancel();
        assert!(!ticker.is_running());
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_ticker() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let ticker = Ticker::spawn("dropped", Duration::from_millis(50), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ticker.name(), "dropped");
        drop(ticker);

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
