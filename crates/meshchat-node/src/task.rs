//! Repeating background tasks with start/stop control.
//!
//! A `RepeatingTask` runs a closure once per period on the tokio runtime.
//! `start` is a no-op while the task is already running. `stop` cancels the
//! task's token; the loop is parked in `select!` on that token between
//! ticks, so it exits without waiting out the current period. A tick that
//! is already executing runs to completion first.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct RepeatingTask {
    name: &'static str,
    period: Duration,
    parent: CancellationToken,
    running: Mutex<Option<Running>>,
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// A stopped task. It is also stopped whenever `parent` is cancelled.
    pub fn new(name: &'static str, period: Duration, parent: &CancellationToken) -> Self {
        Self {
            name,
            period,
            parent: parent.clone(),
            running: Mutex::new(None),
        }
    }

    /// Start ticking. The first tick fires one period from now.
    ///
    /// Returns false if the task was already running.
    pub fn start<F, Fut>(&self, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let token = self.parent.child_token();
        let cancelled = token.clone();
        let name = self.name;
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(task = name, ?period, "task started");
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            tracing::debug!(task = name, "task stopped");
        });

        *running = Some(Running { token, handle });
        true
    }

    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            running.token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|r| !r.token.is_cancelled() && !r.handle.is_finished())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.stop();
    }
}
