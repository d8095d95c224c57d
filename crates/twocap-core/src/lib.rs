//! # twocap-core
//!
//! Core types for the twocap client: the error taxonomy, task descriptors,
//! raw protocol responses, solutions, service load snapshots and client
//! configuration.
//!
//! Nothing in this crate performs I/O beyond reading and writing config files.

mod config;
mod error;
mod types;

pub use config::{ClientConfig, ElapsedMode, PollingConfig, RetryConfig, API_KEY_ENV};
pub use error::{CaptchaError, Result};
pub use types::*;
