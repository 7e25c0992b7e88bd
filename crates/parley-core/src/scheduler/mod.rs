//! Deferred and recurring jobs.
//!
//! The [`Scheduler`] keeps an in-memory job table and fires due jobs each
//! time it is ticked. The bot drives it from a periodic worker-pool task, but
//! any thread can call [`Scheduler::tick`].
//!
//! # Isolation
//!
//! One-time jobs never run on the ticking thread. Firing one spawns an
//! executor and a watcher:
//!
//! ```text
//!  tick ──spawn──▶ executor (thread + catch_unwind, or child process)
//!    │                 │ result
//!    │                 ▼
//!    └──spawn──▶ watcher ── removes job, logs failure
//! ```
//!
//! The tick returns immediately, so a hung or crashing one-time job cannot
//! stall other jobs. Recurring jobs are expected to be short and run inline
//! on the ticking thread.
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new();
//!
//! scheduler.schedule_after(Duration::from_secs(30), move || {
//!     ctx.block_on(ctx.client().create_post(&channel, "Reminder!"))
//! });
//!
//! let mut left = 3;
//! scheduler.schedule_every(Duration::from_secs(1), move || {
//!     left -= 1;
//!     if left == 0 { JobOutcome::Cancel } else { JobOutcome::Continue }
//! });
//! ```

mod job;

pub use job::{IntoJobOutcome, JobHandle, JobOutcome, JobState, OnceAction};

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::error::{JobError, panic_message};
use crate::pool::IntoTaskResult;
use job::{Job, JobKind, RecurringFn, advance};

/// Result reported by a one-time job's executor to its watcher.
pub type JobResult = Result<(), JobError>;

/// How often a process executor checks its child for exit or cancellation.
const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct SchedulerInner {
    jobs: Mutex<Vec<Job>>,
    next_id: AtomicU64,
}

impl SchedulerInner {
    fn remove(&self, id: u64) -> bool {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|job| job.handle.id() != id);
        jobs.len() != before
    }
}

/// In-memory job scheduler.
///
/// Cloning is cheap and every clone shares the same job table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn insert(&self, kind: JobKind) -> JobHandle {
        let handle = JobHandle::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.jobs.lock().push(Job {
            handle: handle.clone(),
            kind,
        });
        handle
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Schedules `action` to run once, isolated, at or after `fire_at`.
    ///
    /// The closure runs on its own thread inside this process. A panic is
    /// caught and reported, but cancelling the job does not interrupt a
    /// running closure, and an abort or stack overflow takes the whole bot
    /// down. Use [`schedule_command`](Self::schedule_command) for work that
    /// needs process isolation.
    pub fn schedule_once<F, R>(&self, fire_at: SystemTime, action: F) -> JobHandle
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoTaskResult,
    {
        self.schedule_once_action(fire_at, OnceAction::closure(action))
    }

    /// Schedules `action` to run once after `delay`.
    ///
    /// Runs on an in-process thread like [`schedule_once`](Self::schedule_once).
    pub fn schedule_after<F, R>(&self, delay: Duration, action: F) -> JobHandle
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoTaskResult,
    {
        self.schedule_once(SystemTime::now() + delay, action)
    }

    /// Schedules a child process to be spawned at or after `fire_at`.
    ///
    /// A non-zero exit status is reported as a job failure. Cancelling the
    /// job while the child runs kills it.
    pub fn schedule_command(&self, fire_at: SystemTime, command: Command) -> JobHandle {
        self.schedule_once_action(fire_at, OnceAction::from(command))
    }

    /// Schedules any [`OnceAction`] at or after `fire_at`.
    pub fn schedule_once_action(&self, fire_at: SystemTime, action: OnceAction) -> JobHandle {
        let handle = self.insert(JobKind::OneTime {
            fire_at,
            action: Some(action),
        });
        debug!(job_id = handle.id(), "Scheduled one-time job");
        handle
    }

    /// Schedules `action` to run every `interval`, first at `now + interval`.
    ///
    /// The action runs on the ticking thread and may return
    /// [`JobOutcome::Cancel`] to stop itself. Errors and panics are logged and
    /// the job stays scheduled.
    pub fn schedule_every<F, R>(&self, interval: Duration, mut action: F) -> JobHandle
    where
        F: FnMut() -> R + Send + 'static,
        R: IntoJobOutcome,
    {
        let action: RecurringFn = Box::new(move || action().into_job_outcome());
        let handle = self.insert(JobKind::Recurring {
            interval,
            next_run: SystemTime::now() + interval,
            action: Arc::new(Mutex::new(action)),
        });
        debug!(
            job_id = handle.id(),
            interval_ms = interval.as_millis() as u64,
            "Scheduled recurring job"
        );
        handle
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Marks a job cancelled. It is removed on the next tick.
    pub fn cancel(&self, handle: &JobHandle) {
        handle.cancel();
        debug!(job_id = handle.id(), "Cancelled job");
    }

    /// Cancels and removes every job.
    pub fn clear(&self) {
        let jobs = std::mem::take(&mut *self.inner.jobs.lock());
        for job in &jobs {
            job.handle.cancel();
        }
        info!(count = jobs.len(), "Cleared all scheduled jobs");
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of jobs in the table, including running one-time jobs.
    pub fn job_count(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    /// When the job will next fire, or `None` if it is running or gone.
    pub fn next_run(&self, handle: &JobHandle) -> Option<SystemTime> {
        self.inner
            .jobs
            .lock()
            .iter()
            .find(|job| job.handle.id() == handle.id())
            .and_then(Job::next_run)
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Fires every job that is due now.
    pub fn tick(&self) {
        self.tick_at(SystemTime::now());
    }

    /// Fires every job whose next run is at or before `now`.
    pub fn tick_at(&self, now: SystemTime) {
        let mut due_once = Vec::new();
        let mut due_recurring = Vec::new();

        {
            let mut jobs = self.inner.jobs.lock();
            jobs.retain_mut(|job| {
                if job.handle.is_cancelled() {
                    trace!(job_id = job.handle.id(), "Dropping cancelled job");
                    return false;
                }

                match &mut job.kind {
                    JobKind::OneTime { fire_at, action } => {
                        if *fire_at <= now
                            && let Some(action) = action.take()
                        {
                            job.handle.transition(JobState::Running);
                            due_once.push((job.handle.clone(), action));
                        }
                    }
                    JobKind::Recurring {
                        next_run, action, ..
                    } => {
                        if *next_run <= now && job.handle.state() == JobState::Pending {
                            job.handle.transition(JobState::Running);
                            due_recurring.push((job.handle.clone(), Arc::clone(action)));
                        }
                    }
                }
                true
            });
        }

        for (handle, action) in due_once {
            self.launch_isolated(handle, action);
        }

        // Recurring actions run without the table lock so they may schedule
        // or cancel other jobs.
        for (handle, action) in due_recurring {
            let outcome = run_recurring(&handle, &action);
            self.finish_recurring(&handle, outcome, now);
        }
    }

    fn finish_recurring(&self, handle: &JobHandle, outcome: JobOutcome, now: SystemTime) {
        let mut jobs = self.inner.jobs.lock();
        let Some(index) = jobs.iter().position(|job| job.handle.id() == handle.id()) else {
            // Cleared while running.
            return;
        };

        if outcome == JobOutcome::Cancel || handle.is_cancelled() {
            jobs.remove(index);
            handle.cancel();
            debug!(job_id = handle.id(), "Recurring job cancelled");
            return;
        }

        if let JobKind::Recurring {
            interval, next_run, ..
        } = &mut jobs[index].kind
        {
            *next_run = advance(*next_run, *interval, now);
        }
        handle.transition(JobState::Pending);
    }

    fn launch_isolated(&self, handle: JobHandle, action: OnceAction) {
        let (tx, rx) = oneshot::channel::<JobResult>();
        let job_id = handle.id();

        let executor = match action {
            OnceAction::Closure(action) => std::thread::Builder::new()
                .name(format!("parley-job-{job_id}"))
                .spawn(move || {
                    let result = match catch_unwind(AssertUnwindSafe(action)) {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(JobError::Failed(e.to_string())),
                        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
                    };
                    let _ = tx.send(result);
                }),
            OnceAction::Process(command) => {
                let handle = handle.clone();
                std::thread::Builder::new()
                    .name(format!("parley-job-{job_id}-process"))
                    .spawn(move || {
                        let _ = tx.send(supervise_process(command, &handle));
                    })
            }
        };

        if let Err(e) = executor {
            error!(job_id, error = %e, "Failed to spawn job executor");
            self.inner.remove(job_id);
            handle.transition(JobState::Completed);
            return;
        }

        let inner = Arc::clone(&self.inner);
        let watcher = std::thread::Builder::new()
            .name(format!("parley-job-{job_id}-watcher"))
            .spawn(move || {
                let result = rx.blocking_recv().unwrap_or(Err(JobError::Disconnected));
                inner.remove(job_id);
                handle.transition(JobState::Completed);
                match result {
                    Ok(()) => debug!(job_id, "One-time job completed"),
                    Err(e) => error!(job_id, error = %e, "One-time job failed"),
                }
            });

        if let Err(e) = watcher {
            // Without a watcher the job would stay in the table forever.
            error!(job_id, error = %e, "Failed to spawn job watcher");
            self.inner.remove(job_id);
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.job_count())
            .finish()
    }
}

fn run_recurring(handle: &JobHandle, action: &Mutex<RecurringFn>) -> JobOutcome {
    let mut action = action.lock();
    match catch_unwind(AssertUnwindSafe(|| (*action)())) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(job_id = handle.id(), error = %e, "Recurring job returned an error");
            JobOutcome::Continue
        }
        Err(payload) => {
            error!(
                job_id = handle.id(),
                panic = %panic_message(payload.as_ref()),
                "Recurring job panicked"
            );
            JobOutcome::Continue
        }
    }
}

fn supervise_process(mut command: Command, handle: &JobHandle) -> JobResult {
    let mut child = command
        .spawn()
        .map_err(|e| JobError::Process(format!("failed to spawn {:?}: {e}", command.get_program())))?;

    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => return Err(JobError::Process(format!("exited with {status}"))),
            Ok(None) if handle.is_cancelled() => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(job_id = handle.id(), "Killed cancelled job process");
                return Ok(());
            }
            Ok(None) => std::thread::sleep(PROCESS_POLL_INTERVAL),
            Err(e) => return Err(JobError::Process(e.to_string())),
        }
    }
}
