//! 2captcha API client
//!
//! Two independent retry layers stack here: the transport retries delivery
//! failures, and [`TwoCaptchaClient::wait`] re-polls while the server says
//! the task is not ready. Rejections are never retried.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use twocap_core::{
    CaptchaError, ClientConfig, ElapsedMode, RawResponse, Result, Solution, TaskDescriptor,
    REPORT_RECORDED,
};

use crate::classifier::{classify, Classification};
use crate::job::{Job, JobState, PollOptions};
use crate::transport::{Endpoint, HttpTransport, RetryPolicy, Transport};

/// Client for the 2captcha task lifecycle
///
/// Holds no per-task state; share it by reference across any number of jobs.
pub struct TwoCaptchaClient<T = HttpTransport> {
    api_key: String,
    transport: T,
    poll_defaults: PollOptions,
}

impl TwoCaptchaClient<HttpTransport> {
    /// Create a client with default retry and polling settings
    pub fn new(api_key: impl Into<String>, use_ssl: bool) -> Result<Self> {
        let config = ClientConfig {
            use_ssl,
            ..ClientConfig::new(api_key)
        };
        Self::from_config(&config)
    }

    /// Create a client from configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.resolve_api_key()?;
        let transport = HttpTransport::new(config.base_url(), RetryPolicy::from(&config.retry))?;
        Ok(Self::with_transport(api_key, transport)
            .with_poll_defaults(PollOptions::from(&config.polling)))
    }
}

impl<T: Transport> TwoCaptchaClient<T> {
    /// Create a client over an arbitrary transport
    pub fn with_transport(api_key: impl Into<String>, transport: T) -> Self {
        Self {
            api_key: api_key.into(),
            transport,
            poll_defaults: PollOptions::default(),
        }
    }

    /// Set the options [`Self::solve_default`] uses
    pub fn with_poll_defaults(mut self, options: PollOptions) -> Self {
        self.poll_defaults = options;
        self
    }

    pub fn poll_defaults(&self) -> &PollOptions {
        &self.poll_defaults
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn base_params(&self) -> Vec<(String, String)> {
        vec![
            ("key".to_string(), self.api_key.clone()),
            ("json".to_string(), "1".to_string()),
        ]
    }

    fn action_params(&self, action: &str, task_id: Option<&str>) -> Vec<(String, String)> {
        let mut params = self.base_params();
        params.push(("action".to_string(), action.to_string()));
        if let Some(id) = task_id {
            params.push(("id".to_string(), id.to_string()));
        }
        params
    }

    /// Submit a task and get a job handle for it
    pub async fn create_task(&self, task: &TaskDescriptor) -> Result<Job> {
        let mut params = self.base_params();
        params.extend(task.to_params());

        let raw = self.transport.post(Endpoint::CreateTask, &params).await?;

        match classify(&raw) {
            Classification::Error { code } => Err(CaptchaError::RemoteRejection {
                operation: "create_task",
                code,
            }),
            Classification::Pending => Err(CaptchaError::InvalidResponse(format!(
                "creation endpoint answered with the pending marker instead of a task id: {}",
                raw.request
            ))),
            Classification::Ready(_) => {
                info!("Created {} task {}", task.kind(), raw.request);
                Ok(Job::new(raw.request))
            }
        }
    }

    async fn fetch_result(&self, task_id: &str) -> Result<RawResponse> {
        let params = self.action_params("get2", Some(task_id));
        self.transport.post(Endpoint::TaskResult, &params).await
    }

    /// Fetch the raw result for a task id without job bookkeeping
    ///
    /// Fails with `RemoteRejection` if the server rejected the request.
    pub async fn get_task_result(&self, task_id: &str) -> Result<RawResponse> {
        let raw = self.fetch_result(task_id).await?;
        match classify(&raw) {
            Classification::Error { code } => Err(CaptchaError::RemoteRejection {
                operation: "get_task_result",
                code,
            }),
            _ => Ok(raw),
        }
    }

    /// Poll a job once
    ///
    /// The response is stored on the job whatever it says. Delivery failures
    /// leave the job untouched.
    pub async fn poll(&self, job: &mut Job) -> Result<Classification> {
        let raw = self.fetch_result(job.task_id()).await?;
        let classification = classify(&raw);
        debug!("Task {} polled: {:?}", job.task_id(), classification);
        job.record(raw, &classification);
        Ok(classification)
    }

    /// Poll until the job is solved, rejected or out of time
    ///
    /// In [`ElapsedMode::Stepped`] elapsed time is the sum of the sleeps
    /// taken, so time spent inside requests is not counted. A zero
    /// `interval` is rejected before the first poll.
    pub async fn wait(&self, job: &mut Job, options: &PollOptions) -> Result<Solution> {
        match job.state() {
            JobState::Ready { solution, .. } => return Ok(solution.clone()),
            JobState::TimedOut | JobState::Errored { .. } => {
                return Err(CaptchaError::JobFinished {
                    task_id: job.task_id().to_string(),
                    state: job.state().to_string(),
                })
            }
            JobState::Created | JobState::Polling => {}
        }

        if options.interval.is_zero() {
            return Err(CaptchaError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let started = Instant::now();
        let already_waited = job.waited();

        loop {
            match self.poll(job).await? {
                Classification::Ready(solution) => {
                    info!(
                        "Task {} solved after {:?} (cost {})",
                        job.task_id(),
                        job.waited(),
                        solution.cost
                    );
                    return Ok(solution);
                }
                Classification::Error { code } => {
                    return Err(CaptchaError::RemoteRejection {
                        operation: "get_task_result",
                        code,
                    });
                }
                Classification::Pending => {
                    tokio::time::sleep(options.interval).await;

                    let waited = match options.mode {
                        ElapsedMode::Stepped => job.waited() + options.interval,
                        ElapsedMode::WallClock => already_waited + started.elapsed(),
                    };
                    job.set_waited(waited);

                    if waited > options.max_wait {
                        job.mark_timed_out();
                        return Err(CaptchaError::Timeout {
                            max_wait: options.max_wait,
                        });
                    }
                }
            }
        }
    }

    /// Submit a task and wait for its solution
    pub async fn solve(&self, task: &TaskDescriptor, options: &PollOptions) -> Result<Job> {
        let mut job = self.create_task(task).await?;
        self.wait(&mut job, options).await?;
        Ok(job)
    }

    /// [`Self::solve`] with the client's default poll options
    pub async fn solve_default(&self, task: &TaskDescriptor) -> Result<Job> {
        let options = self.poll_defaults;
        self.solve(task, &options).await
    }

    /// Report a wrong solution for a job
    ///
    /// Returns whether the server acknowledged the report. The job's state is
    /// not changed.
    pub async fn report_bad(&self, job: &Job) -> Result<bool> {
        self.report_bad_captcha(job.task_id()).await
    }

    /// Report a wrong solution by task id
    pub async fn report_bad_captcha(&self, task_id: &str) -> Result<bool> {
        let params = self.action_params("reportbad", Some(task_id));
        let raw = self.transport.post(Endpoint::TaskResult, &params).await?;

        if let Classification::Error { code } = classify(&raw) {
            return Err(CaptchaError::RemoteRejection {
                operation: "report_bad",
                code,
            });
        }

        let recorded = raw.request == REPORT_RECORDED;
        info!("Reported bad solve for task {} (recorded: {})", task_id, recorded);
        Ok(recorded)
    }

    /// Get the account balance
    pub async fn get_balance(&self) -> Result<f64> {
        let params = self.action_params("getbalance", None);
        let raw = self.transport.post(Endpoint::TaskResult, &params).await?;

        if let Classification::Error { code } = classify(&raw) {
            return Err(CaptchaError::RemoteRejection {
                operation: "get_balance",
                code,
            });
        }

        raw.request.trim().parse::<f64>().map_err(|_| {
            CaptchaError::InvalidResponse(format!("balance is not a number: {}", raw.request))
        })
    }
}

/// Poll options from plain second counts
pub fn poll_options(max_wait_secs: u64, interval_secs: u64) -> PollOptions {
    PollOptions::new(
        Duration::from_secs(max_wait_secs),
        Duration::from_secs(interval_secs),
    )
}
