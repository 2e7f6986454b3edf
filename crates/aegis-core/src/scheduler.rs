//! Periodic task scheduler
//!
//! Owns every background loop of the engine. Each loop is a single task that
//! selects between its ticker and a shared shutdown broadcast, so the whole
//! set stops together on [`TaskScheduler::stop`]. Loops use tokio time, which
//! lets tests drive them with a paused clock.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest period a loop will tick at
const MIN_PERIOD: Duration = Duration::from_millis(1);

struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct TaskScheduler {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Receiver that fires when the scheduler stops
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Run `task` every `period` until the scheduler stops.
    ///
    /// The first run happens immediately. A slow run delays the next tick
    /// instead of bursting to catch up. Periods below one millisecond are
    /// raised to it.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period < MIN_PERIOD {
            warn!(task = name, period_secs = period.as_secs_f64(), "Period too short, using 1ms");
        }
        let period = period.max(MIN_PERIOD);
        let mut shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            info!(task = name, period_secs = period.as_secs_f64(), "Starting periodic task");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        task().await;
                    }
                    _ = shutdown.recv() => {
                        info!(task = name, "Shutting down periodic task");
                        break;
                    }
                }
            }
        });

        self.lock_tasks().push(ScheduledTask { name, handle });
    }

    /// Names of the tasks currently registered
    pub fn task_names(&self) -> Vec<&'static str> {
        self.lock_tasks().iter().map(|t| t.name).collect()
    }

    pub fn task_count(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Signal every loop to stop and wait for them to finish
    pub async fn stop(&self) {
        // No receivers just means nothing is running
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<ScheduledTask> = std::mem::take(&mut *self.lock_tasks());
        for task in tasks {
            match task.handle.await {
                Ok(()) => debug!(task = task.name, "Periodic task stopped"),
                Err(e) => warn!(task = task.name, error = %e, "Periodic task ended abnormally"),
            }
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
