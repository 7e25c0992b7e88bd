//! Bounded pool of OS worker threads.
//!
//! The [`WorkerPool`] runs blocking work away from the dispatcher's
//! cooperative loop. It owns a fixed number of long-lived threads that drain
//! one shared FIFO queue:
//!
//! ```text
//!   add_task ──▶ [ task | task | task | Stop | Stop ] ──▶ worker 0
//!                                                   ├──▶ worker 1
//!                                                   └──▶ worker N-1
//! ```
//!
//! # Shutdown
//!
//! [`WorkerPool::stop`] clears the `alive` flag, enqueues exactly one poison
//! pill per worker, and joins every thread. Pills are queued behind any real
//! task already waiting, so those tasks still run before the pool winds down.
//! Once stopped, [`WorkerPool::add_task`] fails with [`PoolError::Stopped`]
//! until the pool is started again.
//! Long-running loop tasks (see [`WorkerPool::add_periodic_task`]) observe the
//! cleared flag and return so their worker can pick up its pill.
//!
//! # Failure isolation
//!
//! Each task runs under a local recovery guard: an `Err` result or a panic is
//! logged and the worker keeps serving the queue, so errors never shrink the
//! pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BoxError, PoolError, PoolResult, panic_message};

/// A unit of work for the pool.
pub type TaskFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Conversion of a task's return value into the pool's result type.
///
/// Lets both `()`-returning closures and fallible closures be submitted.
pub trait IntoTaskResult {
    /// Converts into the pool's task result.
    fn into_task_result(self) -> Result<(), BoxError>;
}

impl IntoTaskResult for () {
    fn into_task_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E: Into<BoxError>> IntoTaskResult for Result<(), E> {
    fn into_task_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

enum Task {
    Run(TaskFn),
    /// Poison pill: the worker that receives it exits.
    Stop,
}

struct Shared {
    receiver: Mutex<mpsc::UnboundedReceiver<Task>>,
    busy: AtomicUsize,
    alive: AtomicBool,
}

/// A fixed-size pool of worker threads.
///
/// `WorkerPool` is `Send + Sync`; share it behind an `Arc`.
pub struct WorkerPool {
    num_workers: usize,
    sender: mpsc::UnboundedSender<Task>,
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool that runs `num_workers` threads once started.
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            num_workers,
            sender,
            shared: Arc::new(Shared {
                receiver: Mutex::new(receiver),
                busy: AtomicUsize::new(0),
                alive: AtomicBool::new(false),
            }),
            threads: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Number of worker threads this pool runs.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Whether the pool has been started and not yet stopped.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Point-in-time count of workers currently running a task.
    ///
    /// Always within `[0, num_workers]`. Not coordinated with the queue, so
    /// use it for observability only.
    pub fn busy_count(&self) -> usize {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Spawns the worker threads.
    pub fn start(&self) -> PoolResult<()> {
        let mut threads = self.threads.lock();
        if !threads.is_empty() {
            return Err(PoolError::AlreadyRunning);
        }

        self.shared.alive.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);

        for worker_id in 0..self.num_workers {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("parley-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &shared))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            threads.push(handle);
        }

        info!(workers = self.num_workers, "Worker pool started");
        Ok(())
    }

    /// Enqueues a task.
    ///
    /// Tasks are dequeued in FIFO order by whichever worker is idle, so their
    /// completion order is not guaranteed. Tasks added before
    /// [`start`](Self::start) wait in the queue; tasks added after
    /// [`stop`](Self::stop) are rejected with [`PoolError::Stopped`].
    pub fn add_task<F, R>(&self, task: F) -> PoolResult<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoTaskResult,
    {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PoolError::Stopped);
        }
        self.sender
            .send(Task::Run(Box::new(move || task().into_task_result())))
            .map_err(|_| PoolError::QueueClosed)
    }

    /// Enqueues a task that calls `tick` every `period` while the pool is alive.
    ///
    /// The task occupies one worker for the pool's lifetime. It returns once
    /// [`stop`](Self::stop) clears the alive flag, at most one `period` later.
    pub fn add_periodic_task<F>(&self, name: &'static str, period: Duration, mut tick: F) -> PoolResult<()>
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.add_task(move || {
            info!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");
            while shared.alive.load(Ordering::SeqCst) {
                std::thread::sleep(period);
                if !shared.alive.load(Ordering::SeqCst) {
                    break;
                }
                tick();
            }
            debug!(task = name, "Periodic task finished");
        })
    }

    /// Signals every worker to exit and waits for them.
    ///
    /// Must not be called from a worker thread of this pool.
    pub fn stop(&self) {
        let handles = std::mem::take(&mut *self.threads.lock());
        if handles.is_empty() {
            warn!("Worker pool is not running");
            return;
        }

        self.shared.alive.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);

        for _ in 0..handles.len() {
            if self.sender.send(Task::Stop).is_err() {
                break;
            }
        }

        info!("Stopping worker pool, waiting for threads");
        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "Worker thread terminated abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_workers", &self.num_workers)
            .field("busy", &self.busy_count())
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn worker_loop(worker_id: usize, shared: &Shared) {
    debug!(worker_id, "Worker started");
    loop {
        // The lock is held while waiting; only one idle worker waits on the
        // channel at a time, the rest wait on the lock.
        let task = shared.receiver.lock().blocking_recv();

        match task {
            Some(Task::Run(task)) => {
                shared.busy.fetch_add(1, Ordering::SeqCst);
                run_guarded(worker_id, task);
                shared.busy.fetch_sub(1, Ordering::SeqCst);
            }
            Some(Task::Stop) | None => break,
        }
    }
    debug!(worker_id, "Worker exited");
}

fn run_guarded(worker_id: usize, task: TaskFn) {
    trace!(worker_id, "Running task");
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(worker_id, error = %e, "Task returned an error"),
        Err(payload) => error!(
            worker_id,
            panic = %panic_message(payload.as_ref()),
            "Task panicked"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::Instant;

    #[test]
    fn test_tasks_queued_before_stop_complete() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let c = Arc::clone(&counter);
            pool.add_task(move || {
                std::thread::sleep(Duration::from_millis(2));
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.start().unwrap();
        pool.stop();

        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert!(!pool.is_alive());
    }

    #[test]
    fn test_no_tasks_run_after_stop() {
        let pool = WorkerPool::new(3);
        pool.start().unwrap();
        pool.stop();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let submitted = pool.add_task(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(matches!(submitted, Err(PoolError::Stopped)));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_restarted_pool_accepts_tasks() {
        let pool = WorkerPool::new(1);
        pool.start().unwrap();
        pool.stop();
        assert!(matches!(pool.add_task(|| ()), Err(PoolError::Stopped)));

        pool.start().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        pool.add_task(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.stop();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_busy_count_tracks_running_tasks() {
        let pool = WorkerPool::new(2);
        pool.start().unwrap();
        assert_eq!(pool.busy_count(), 0);

        let started = Arc::new(Barrier::new(3));
        let release = Arc::new(Barrier::new(3));
        for _ in 0..2 {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            pool.add_task(move || {
                started.wait();
                release.wait();
            })
            .unwrap();
        }

        started.wait();
        assert_eq!(pool.busy_count(), 2);
        assert!(pool.busy_count() <= pool.num_workers());
        release.wait();

        pool.stop();
        assert_eq!(pool.busy_count(), 0);
    }

    #[test]
    fn test_worker_survives_failing_tasks() {
        let pool = WorkerPool::new(1);
        pool.start().unwrap();

        pool.add_task(|| -> Result<(), BoxError> { Err("boom".into()) })
            .unwrap();
        pool.add_task(|| -> Result<(), BoxError> { panic!("task blew up") })
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        pool.add_task(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_periodic_task_exits_on_stop() {
        let pool = WorkerPool::new(2);
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&ticks);
        pool.add_periodic_task("counter", Duration::from_millis(10), move || {
            t.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let begin = Instant::now();
        pool.stop();
        assert!(begin.elapsed() < Duration::from_secs(1));

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected several ticks, got {seen}");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let pool = WorkerPool::new(1);
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyRunning)));
        pool.stop();
    }
}
