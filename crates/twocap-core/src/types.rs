//! Type definitions shared across the twocap crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{CaptchaError, Result};

/// Literal the result endpoint returns while a task is still being solved
pub const PENDING_MARKER: &str = "CAPCHA_NOT_READY";

/// Literal the result endpoint returns when a bad-solve report was accepted
pub const REPORT_RECORDED: &str = "OK_REPORT_RECORDED";

/// Cost assumed when the server omits the `token|cost` suffix
pub const FALLBACK_COST: f64 = 0.00299;

/// Keys the client always sets itself; tasks may not override them
const RESERVED_PARAMS: &[&str] = &["key", "json", "method", "action", "id"];

/// Supported CAPTCHA task types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Google reCAPTCHA v2
    RecaptchaV2,
}

impl TaskKind {
    /// Get the `method` value the creation endpoint expects
    pub fn method(&self) -> &'static str {
        match self {
            TaskKind::RecaptchaV2 => "userrecaptcha",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::RecaptchaV2 => write!(f, "Google reCAPTCHA v2"),
        }
    }
}

/// Description of a solve request: task type plus flat parameters
///
/// Parameters can only be attached while building; once handed to the
/// client the descriptor is read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    kind: TaskKind,
    parameters: BTreeMap<String, String>,
}

impl TaskDescriptor {
    /// Create a descriptor with no parameters
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            parameters: BTreeMap::new(),
        }
    }

    /// Create a reCAPTCHA v2 task for the given site key and page URL
    pub fn recaptcha_v2(googlekey: impl Into<String>, pageurl: impl Into<String>) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("googlekey".to_string(), googlekey.into());
        parameters.insert("pageurl".to_string(), pageurl.into());
        Self {
            kind: TaskKind::RecaptchaV2,
            parameters,
        }
    }

    /// Attach an extra task parameter
    ///
    /// Fails if `key` collides with a parameter the client manages itself.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if RESERVED_PARAMS.contains(&key.as_str()) {
            return Err(CaptchaError::InvalidTask(format!(
                "parameter '{}' is reserved by the protocol",
                key
            )));
        }
        self.parameters.insert(key, value.into());
        Ok(self)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Serialize into key/value pairs, `method` first
    pub fn to_params(&self) -> Vec<(String, String)> {
        std::iter::once(("method".to_string(), self.kind.method().to_string()))
            .chain(
                self.parameters
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            )
            .collect()
    }
}

/// Decoded reply from the creation and result endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    /// Success flag; absent means failure
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: bool,
    /// Task id, pending marker, token, balance, error code or acknowledgement
    #[serde(deserialize_with = "deserialize_request")]
    pub request: String,
}

impl RawResponse {
    pub fn new(status: bool, request: impl Into<String>) -> Self {
        Self {
            status,
            request: request.into(),
        }
    }

    /// Check whether this is the not-ready-yet marker
    pub fn is_pending(&self) -> bool {
        self.request == PENDING_MARKER
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !matches!(s.trim(), "" | "0" | "false" | "False"),
        _ => false,
    })
}

fn deserialize_request<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for 'request', got {}",
            other
        ))),
    }
}

/// A solved CAPTCHA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// The solved token to submit to the target site
    pub token: String,
    /// Price charged for the solve, in account currency
    pub cost: f64,
}

/// Snapshot of the service's worker pool, scraped from the public status page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLoad {
    /// Idle workers
    pub free_workers: i64,
    /// Total workers online
    pub workers_total: i64,
    /// Daily load factor, 0-100
    pub load_percent: i64,
    /// Current price per CAPTCHA
    pub bid: f64,
    /// Average solve duration in seconds
    pub speed_seconds: i64,
    /// When the page was scraped
    pub scraped_at: DateTime<Utc>,
}

impl ServiceLoad {
    /// Derive the worker split from the raw page values
    ///
    /// `busy = floor(workers_total * load_percent / 100)`; returns `None` if
    /// the product overflows.
    pub fn derive(
        workers_total: i64,
        load_percent: i64,
        bid: f64,
        speed_seconds: i64,
    ) -> Option<Self> {
        let busy = workers_total.checked_mul(load_percent)? / 100;
        Some(Self {
            free_workers: workers_total - busy,
            workers_total,
            load_percent,
            bid,
            speed_seconds,
            scraped_at: Utc::now(),
        })
    }

    pub fn busy_workers(&self) -> i64 {
        self.workers_total - self.free_workers
    }
}
