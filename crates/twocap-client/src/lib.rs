//! # twocap-client
//!
//! Client for the 2captcha solving service.
//!
//! A solve goes through three steps:
//! - [`TwoCaptchaClient::create_task`] submits a [`TaskDescriptor`] and returns a [`Job`]
//! - [`TwoCaptchaClient::wait`] polls until the job is ready, rejected or out of time
//! - the caller reads [`Job::solution`], [`Job::cost`] and [`Job::solve_time`],
//!   or calls [`TwoCaptchaClient::report_bad`]
//!
//! ```no_run
//! use twocap_client::{poll_options, TaskDescriptor, TwoCaptchaClient};
//!
//! # async fn run() -> twocap_client::Result<()> {
//! let client = TwoCaptchaClient::new("api-key", true)?;
//! let task = TaskDescriptor::recaptcha_v2("6Le-site-key", "https://example.com/login");
//!
//! let mut job = client.create_task(&task).await?;
//! let solution = client.wait(&mut job, &poll_options(300, 5)).await?;
//! println!("{} cost {}", solution.token, solution.cost);
//! # Ok(())
//! # }
//! ```
//!
//! Each call runs to completion before returning; to solve several CAPTCHAs
//! at once, run one `wait` per job on separate tasks.

mod classifier;
mod client;
mod job;
mod queue_stats;
mod transport;

pub use classifier::{classify, parse_solution, Classification};
pub use client::{poll_options, TwoCaptchaClient};
pub use job::{Job, JobState, PollOptions};
pub use queue_stats::{extract, QueueStatsSource};
pub use transport::{Call, Endpoint, HttpTransport, MockTransport, Page, RetryPolicy, Transport};
pub use twocap_core::*;
