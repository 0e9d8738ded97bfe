//! Worker pool for poll and maintenance tasks
//!
//! A [`Scheduler`] either owns a multi-threaded tokio runtime or borrows the
//! handle of one that already exists (tests, embedding applications). It is
//! owned by the engine and shut down explicitly.

use crate::error::{Result, StatusServerError};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle on one repeating task
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Stop the task.
    ///
    /// Without `may_interrupt` a run already in progress completes and no
    /// further run starts. With it the task is aborted at its next await point.
    pub fn cancel(&self, may_interrupt: bool) {
        self.token.cancel();
        if may_interrupt {
            self.handle.abort();
        }
        debug!("Cancelled task {} (interrupt: {})", self.name, may_interrupt);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub struct Scheduler {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl Scheduler {
    /// Scheduler with its own pool of `worker_threads` threads
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self> {
        if worker_threads == 0 {
            return Err(StatusServerError::invalid_input("worker_threads must be at least 1"));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("status-server-worker")
            .enable_all()
            .build()?;
        info!("Scheduler started with {} worker thread(s)", worker_threads);
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Scheduler running on an existing runtime
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: Mutex::new(None),
        }
    }

    /// Scheduler running on the runtime of the calling task
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| StatusServerError::invalid_state(format!("No tokio runtime: {e}")))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `task` now, then again `delay` after each run finishes
    pub fn schedule_with_fixed_delay<F, Fut>(&self, name: &str, delay: Duration, task: F) -> ScheduledTask
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        // a zero delay would spin on the task
        let delay = delay.max(Duration::from_millis(1));

        let handle = self.handle.spawn(async move {
            while !cancelled.is_cancelled() {
                task().await;
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        debug!("Scheduled {} with fixed delay {:?}", name, delay);
        ScheduledTask {
            name: name.to_string(),
            token,
            handle,
        }
    }

    /// Run `task` every `period`, first after `initial_delay`.
    ///
    /// A run that overruns the period delays the following ones instead of
    /// triggering a burst.
    pub fn schedule_at_fixed_rate<F, Fut>(
        &self,
        name: &str,
        initial_delay: Duration,
        period: Duration,
        task: F,
    ) -> ScheduledTask
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        // tokio panics on a zero period
        let period = period.max(Duration::from_millis(1));

        let handle = self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + initial_delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                task().await;
            }
        });

        debug!("Scheduled {} at fixed rate {:?}", name, period);
        ScheduledTask {
            name: name.to_string(),
            token,
            handle,
        }
    }

    /// Stop the owned pool. Tasks still running are dropped at their next
    /// await point. No-op for a scheduler built on a borrowed handle.
    pub fn shutdown(&self) {
        let runtime = match self.runtime.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            info!("Scheduler shut down");
        }
    }

    pub fn is_owned(&self) -> bool {
        self.runtime.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // dropping a runtime from async context panics, shutdown_background does not
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("owned", &self.is_owned()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fixed_delay_runs_until_cancelled() {
        let scheduler = Scheduler::current().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let task = scheduler.schedule_with_fixed_delay("count", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.cancel(false);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 3, "only {seen} runs");
        assert!(task.is_finished());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_zero_delay_is_clamped() {
        let scheduler = Scheduler::current().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let task = scheduler.schedule_with_fixed_delay("eager", Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        task.cancel(true);
        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 1);
        assert!(seen <= 80, "{seen} runs in 50ms");
    }

    #[tokio::test]
    async fn test_soft_cancel_lets_run_finish() {
        let scheduler = Scheduler::current().unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();

        let task = scheduler.schedule_with_fixed_delay("slow", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        task.cancel(false);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hard_cancel_interrupts_run() {
        let scheduler = Scheduler::current().unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();

        let task = scheduler.schedule_at_fixed_rate("slow", Duration::ZERO, Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        task.cancel(true);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_owned_pool_shutdown() {
        let scheduler = Scheduler::with_worker_threads(2).unwrap();
        assert!(scheduler.is_owned());
        let value = scheduler.handle().block_on(scheduler.handle().spawn(async { 21 * 2 })).unwrap();
        assert_eq!(value, 42);
        scheduler.shutdown();
        assert!(!scheduler.is_owned());
        assert!(Scheduler::with_worker_threads(0).is_err());
    }
}
