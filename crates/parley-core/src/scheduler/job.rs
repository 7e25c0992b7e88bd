//! Job handles, states and actions.

use std::fmt;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::error::BoxError;
use crate::pool::IntoTaskResult;

/// Lifecycle of a scheduled job.
///
/// ```text
/// Pending ──▶ Running ──▶ Completed        (one-time)
///    ▲           │
///    └───────────┤                         (recurring)
///                └──────▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for its next run.
    Pending,
    /// The action is executing.
    Running,
    /// A one-time job finished (successfully or not).
    Completed,
    /// Cancelled explicitly, cleared, or self-cancelled.
    Cancelled,
}

impl JobState {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// What a recurring action wants to happen next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobOutcome {
    /// Keep the job scheduled.
    #[default]
    Continue,
    /// Remove the job.
    Cancel,
}

/// Conversion of a recurring action's return value.
pub trait IntoJobOutcome {
    /// Converts into the scheduler's outcome type.
    fn into_job_outcome(self) -> Result<JobOutcome, BoxError>;
}

impl IntoJobOutcome for () {
    fn into_job_outcome(self) -> Result<JobOutcome, BoxError> {
        Ok(JobOutcome::Continue)
    }
}

impl IntoJobOutcome for JobOutcome {
    fn into_job_outcome(self) -> Result<JobOutcome, BoxError> {
        Ok(self)
    }
}

impl<E: Into<BoxError>> IntoJobOutcome for Result<JobOutcome, E> {
    fn into_job_outcome(self) -> Result<JobOutcome, BoxError> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// JobHandle
// ============================================================================

#[derive(Debug)]
struct JobShared {
    cancelled: AtomicBool,
    state: Mutex<JobState>,
}

/// Handle to a scheduled job.
///
/// Handles are cheap to clone. Every clone observes the same state, and any
/// of them can cancel the job.
#[derive(Clone)]
pub struct JobHandle {
    id: u64,
    shared: Arc<JobShared>,
}

impl JobHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            shared: Arc::new(JobShared {
                cancelled: AtomicBool::new(false),
                state: Mutex::new(JobState::Pending),
            }),
        }
    }

    /// Scheduler-unique job id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state of the job.
    pub fn state(&self) -> JobState {
        *self.shared.state.lock()
    }

    /// Whether the job has been marked cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the job cancelled.
    ///
    /// The scheduler skips and removes it on its next scan. A running
    /// process job is killed; a running closure finishes but is not rerun.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.transition(JobState::Cancelled);
    }

    /// Moves to `to` unless the job already reached a terminal state.
    pub(crate) fn transition(&self, to: JobState) {
        let mut state = self.shared.state.lock();
        if !state.is_terminal() {
            *state = to;
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for JobHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for JobHandle {}

// ============================================================================
// Actions
// ============================================================================

pub(crate) type OnceFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;
pub(crate) type RecurringFn = Box<dyn FnMut() -> Result<JobOutcome, BoxError> + Send + 'static>;

/// The isolated work of a one-time job.
pub enum OnceAction {
    /// Runs on a dedicated thread of this process under a panic guard.
    ///
    /// Cancelling does not stop a running closure, and an abort inside it
    /// ends the process.
    Closure(OnceFn),
    /// Runs as a child OS process.
    Process(Command),
}

impl OnceAction {
    /// Wraps a closure to run on an in-process thread.
    pub fn closure<F, R>(action: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoTaskResult,
    {
        Self::Closure(Box::new(move || action().into_task_result()))
    }
}

impl From<Command> for OnceAction {
    fn from(command: Command) -> Self {
        Self::Process(command)
    }
}

impl fmt::Debug for OnceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closure(_) => f.write_str("Closure(..)"),
            Self::Process(command) => f.debug_tuple("Process").field(command).finish(),
        }
    }
}

// ============================================================================
// Job table entries
// ============================================================================

pub(crate) enum JobKind {
    OneTime {
        fire_at: SystemTime,
        /// Taken when the job fires.
        action: Option<OnceAction>,
    },
    Recurring {
        interval: Duration,
        next_run: SystemTime,
        action: Arc<Mutex<RecurringFn>>,
    },
}

pub(crate) struct Job {
    pub(crate) handle: JobHandle,
    pub(crate) kind: JobKind,
}

impl Job {
    pub(crate) fn next_run(&self) -> Option<SystemTime> {
        match &self.kind {
            JobKind::OneTime { fire_at, action } => action.as_ref().map(|_| *fire_at),
            JobKind::Recurring { next_run, .. } => Some(*next_run),
        }
    }
}

/// Next run of a recurring job that fired at `now`.
///
/// Keeps a fixed period from the previous schedule. A job that fell more
/// than one interval behind restarts from `now`.
pub(crate) fn advance(next_run: SystemTime, interval: Duration, now: SystemTime) -> SystemTime {
    let candidate = next_run + interval;
    if candidate <= now { now + interval } else { candidate }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_does_not_override_terminal_state() {
        let handle = JobHandle::new(1);
        handle.transition(JobState::Running);
        handle.transition(JobState::Completed);
        handle.cancel();
        assert_eq!(handle.state(), JobState::Completed);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let handle = JobHandle::new(7);
        let other = handle.clone();
        other.cancel();
        assert_eq!(handle.state(), JobState::Cancelled);
        assert_eq!(handle, other);
        assert_ne!(handle, JobHandle::new(7));
    }

    #[test]
    fn test_advance_keeps_fixed_period() {
        let t0 = SystemTime::UNIX_EPOCH;
        let second = Duration::from_secs(1);

        let next = advance(t0 + second, second, t0 + Duration::from_millis(1050));
        assert_eq!(next, t0 + 2 * second);

        let late = advance(t0 + second, second, t0 + Duration::from_millis(3500));
        assert_eq!(late, t0 + Duration::from_millis(4500));
    }
}
