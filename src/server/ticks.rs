//! Activity-driven tick counter and periodic task scheduling.
//!
//! The tick counter is a liveness heartbeat, not a wall-clock proxy: `tick()`
//! is called on every iteration of every processing loop (accept loop, session
//! line loop, and once per scrubbed byte of each raw read via
//! [`TickScheduler::advance`]), so its rate depends entirely on connection and
//! activity volume. The counter is 16 bits and wraps from 65535 back to 0.
//!
//! A registered task fires whenever its interval evenly divides the new
//! counter value. The invocation is synchronous on the calling task, so
//! actions must be non-blocking; the checkpoint task's action is only a
//! channel send into a dedicated worker, which keeps a slow or failing
//! checkpoint from stalling or killing the loop whose tick crossed the
//! boundary. Because ticks fire at irregular real-time rates, a task may run
//! far more or less often in wall-clock terms than its interval suggests;
//! that is accepted behavior.

use std::sync::{Arc, Mutex, MutexGuard};

type TaskAction = Box<dyn Fn() + Send + Sync>;

struct PeriodicTask {
    name: &'static str,
    interval: u16,
    last_run: Option<u16>,
    action: TaskAction,
}

/// Snapshot of one task's schedule, for the `TASKS` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub name: &'static str,
    pub interval: u16,
    /// Counter value at the most recent firing; `None` if the task has never
    /// run (rendered as `-1` on the wire).
    pub last_run: Option<u16>,
}

struct Inner {
    counter: u16,
    tasks: Vec<PeriodicTask>,
}

/// Cloneable handle to the shared tick counter.
#[derive(Clone)]
pub struct TickScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler {
    pub fn new() -> Self {
        TickScheduler {
            inner: Arc::new(Mutex::new(Inner {
                counter: 0,
                tasks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("tick scheduler lock poisoned")
    }

    /// Register a periodic task. Call once at startup, before the first tick.
    /// The action runs on whichever task's tick crosses the interval boundary
    /// and must not block.
    pub fn register(&self, name: &'static str, interval: u16, action: impl Fn() + Send + Sync + 'static) {
        assert!(interval > 0, "periodic task interval must be nonzero");
        self.lock().tasks.push(PeriodicTask {
            name,
            interval,
            last_run: None,
            action: Box::new(action),
        });
    }

    /// Advance the counter by one (wrapping at 65536) and fire every task
    /// whose interval evenly divides the new value. Returns the new value.
    pub fn tick(&self) -> u16 {
        let mut inner = self.lock();
        inner.counter = inner.counter.wrapping_add(1);
        let counter = inner.counter;
        for task in inner.tasks.iter_mut() {
            if counter % task.interval == 0 {
                task.last_run = Some(counter);
                (task.action)();
            }
        }
        counter
    }

    /// `n` ticks in a row; the session read loop uses this to account for the
    /// per-byte scan of each raw chunk.
    pub fn advance(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Current counter value, for the `TICKS` command.
    pub fn value(&self) -> u16 {
        self.lock().counter
    }

    /// Per-task schedule snapshot, for the `TASKS` command.
    pub fn status(&self) -> Vec<TaskStatus> {
        self.lock()
            .tasks
            .iter()
            .map(|t| TaskStatus {
                name: t.name,
                interval: t.interval,
                last_run: t.last_run,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fires_on_exact_multiples_only() {
        let ticks = TickScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        ticks.register("test", 10, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..25 {
            ticks.tick();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2); // at 10 and 20
        assert_eq!(ticks.value(), 25);

        let status = ticks.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].name, "test");
        assert_eq!(status[0].interval, 10);
        assert_eq!(status[0].last_run, Some(20));
    }

    #[test]
    fn never_run_sentinel() {
        let ticks = TickScheduler::new();
        ticks.register("idle", 600, || {});
        ticks.tick();
        assert_eq!(ticks.status()[0].last_run, None);
    }

    #[test]
    fn wraps_at_65536_and_fires_on_wrap() {
        let ticks = TickScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        // 16 divides 65536, so the wrap tick (counter == 0) must fire too.
        ticks.register("wrap", 16, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..65536 {
            ticks.tick();
        }
        assert_eq!(ticks.value(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 65536 / 16);
        assert_eq!(ticks.status()[0].last_run, Some(0));
    }

    #[test]
    fn advance_counts_every_step() {
        let ticks = TickScheduler::new();
        ticks.advance(1024);
        assert_eq!(ticks.value(), 1024);
    }
}
