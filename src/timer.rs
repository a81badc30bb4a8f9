//! Time sources and delayed-task scheduling.
//!
//! The coordinator never spawns threads of its own. It needs two asynchronous
//! primitives, the retry delay and the self-rescheduling expiry sweep, and gets
//! both through an injected [`Scheduler`]. Age checks go through an injected
//! [`Clock`].
//!
//! Production hosts use [`SystemClock`] with [`TokioScheduler`]. Tests (and
//! hosts with their own event loop) use [`ManualClock`] with
//! [`ManualScheduler`] and drive time explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Host-driven [`Clock`]. Clones share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }
}

/// Cancellation handle for one scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<tokio::task::AbortHandle>,
}

impl TimerHandle {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<tokio::task::AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a task once after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// [`Scheduler`] backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                task();
            }
        });
        TimerHandle::new(cancelled, Some(join.abort_handle()))
    }
}

struct ScheduledTask {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

#[derive(Default)]
struct ManualQueue {
    now: Duration,
    next_seq: u64,
    tasks: Vec<ScheduledTask>,
}

impl ManualQueue {
    /// Remove and return the earliest live task due at or before `limit`.
    fn pop_due(&mut self, limit: Duration) -> Option<ScheduledTask> {
        self.tasks.retain(|t| !t.cancelled.load(Ordering::SeqCst));
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= limit)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(self.tasks.swap_remove(index))
    }
}

/// Host-driven [`Scheduler`].
///
/// Tasks run only inside [`advance`](Self::advance) or
/// [`run_due`](Self::run_due), in due-time order with ties broken by
/// scheduling order. Tasks may schedule further tasks; those run in the same
/// call if they fall due within it. When linked to a [`ManualClock`], the
/// clock is moved forward in step with the scheduler.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<ManualQueue>>,
    clock: Option<ManualClock>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that advances `clock` as it advances.
    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            queue: Arc::default(),
            clock: Some(clock),
        }
    }

    /// Move time forward by `by`, running every task that falls due.
    pub fn advance(&self, by: Duration) {
        let target = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.now + by
        };
        loop {
            let next = {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                match queue.pop_due(target) {
                    Some(task) => {
                        let step = task.due.saturating_sub(queue.now);
                        queue.now = queue.now.max(task.due);
                        self.advance_clock(step);
                        Some(task)
                    }
                    None => {
                        let step = target.saturating_sub(queue.now);
                        queue.now = target;
                        self.advance_clock(step);
                        None
                    }
                }
            };
            match next {
                Some(task) => (task.task)(),
                None => break,
            }
        }
    }

    /// Run tasks already due without moving time.
    pub fn run_due(&self) {
        self.advance(Duration::ZERO);
    }

    /// Number of scheduled tasks that have not run or been cancelled.
    pub fn pending_tasks(&self) -> usize {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue
            .tasks
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Time elapsed on this scheduler.
    pub fn elapsed(&self) -> Duration {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).now
    }

    fn advance_clock(&self, step: Duration) {
        if let Some(clock) = &self.clock {
            clock.advance(step);
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let seq = queue.next_seq;
        queue.next_seq += 1;
        let due = queue.now + delay;
        queue.tasks.push(ScheduledTask {
            due,
            seq,
            cancelled: Arc::clone(&cancelled),
            task,
        });
        TimerHandle::new(cancelled, None)
    }
}
