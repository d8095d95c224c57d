//! Caller-held handle for one solve request
//!
//! A [`Job`] moves through `Created → Polling → {Ready, TimedOut, Errored}`.
//! The client drives the transitions; the job only records them. Solve time
//! lives inside the `Ready` state, so it exists exactly when the job is ready.

use std::time::Duration;
use twocap_core::{ElapsedMode, PollingConfig, RawResponse, Solution};

use crate::classifier::Classification;

/// Lifecycle state of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Submitted, not yet polled
    Created,
    /// Polled at least once, not ready yet
    Polling,
    /// Solved
    Ready { solution: Solution, elapsed: Duration },
    /// Gave up waiting
    TimedOut,
    /// The server rejected the task while polling
    Errored { code: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Ready { .. } | JobState::TimedOut | JobState::Errored { .. }
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "created"),
            JobState::Polling => write!(f, "polling"),
            JobState::Ready { .. } => write!(f, "ready"),
            JobState::TimedOut => write!(f, "timed_out"),
            JobState::Errored { code } => write!(f, "errored ({})", code),
        }
    }
}

/// A solve request tracked by the caller
#[derive(Debug, Clone)]
pub struct Job {
    task_id: String,
    state: JobState,
    last_result: Option<RawResponse>,
    waited: Duration,
}

impl Job {
    pub(crate) fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: JobState::Created,
            last_result: None,
            waited: Duration::ZERO,
        }
    }

    /// The server-assigned task id
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, JobState::Ready { .. })
    }

    /// Most recent raw response from the result endpoint, kept even on failure
    pub fn last_result(&self) -> Option<&RawResponse> {
        self.last_result.as_ref()
    }

    /// The solved token, once ready
    pub fn solution(&self) -> Option<&str> {
        match &self.state {
            JobState::Ready { solution, .. } => Some(&solution.token),
            _ => None,
        }
    }

    /// Price charged for the solve, once ready
    pub fn cost(&self) -> Option<f64> {
        match &self.state {
            JobState::Ready { solution, .. } => Some(solution.cost),
            _ => None,
        }
    }

    /// Time spent waiting for the solve, once ready
    pub fn solve_time(&self) -> Option<Duration> {
        match &self.state {
            JobState::Ready { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }

    pub(crate) fn waited(&self) -> Duration {
        self.waited
    }

    pub(crate) fn set_waited(&mut self, waited: Duration) {
        self.waited = waited;
    }

    /// Store a poll response and move to the state it implies
    pub(crate) fn record(&mut self, raw: RawResponse, classification: &Classification) {
        self.last_result = Some(raw);
        self.state = match classification {
            Classification::Pending => JobState::Polling,
            Classification::Ready(solution) => JobState::Ready {
                solution: solution.clone(),
                elapsed: self.waited,
            },
            Classification::Error { code } => JobState::Errored { code: code.clone() },
        };
    }

    pub(crate) fn mark_timed_out(&mut self) {
        self.state = JobState::TimedOut;
    }
}

/// Settings for [`crate::TwoCaptchaClient::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Give up once this much time has elapsed
    pub max_wait: Duration,
    /// Sleep between polls that come back pending; must be non-zero
    pub interval: Duration,
    /// How elapsed time is measured
    pub mode: ElapsedMode,
}

impl PollOptions {
    pub fn new(max_wait: Duration, interval: Duration) -> Self {
        Self {
            max_wait,
            interval,
            mode: ElapsedMode::Stepped,
        }
    }

    pub fn with_mode(mut self, mode: ElapsedMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_wait: Duration::from_secs(config.max_wait_secs),
            interval: Duration::from_secs(config.interval_secs),
            mode: config.mode,
        }
    }
}
