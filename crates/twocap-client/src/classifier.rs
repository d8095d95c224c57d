//! Response classification
//!
//! Pending is an expected, frequent outcome of polling, so classification
//! returns a tagged value instead of an error.

use twocap_core::{RawResponse, Solution, FALLBACK_COST};

/// Separator between token and cost in a solved response
const COST_SEPARATOR: char = '|';

/// Outcome of a creation or result response
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The request succeeded; for result polls, the CAPTCHA is solved
    Ready(Solution),
    /// The task is still being worked on
    Pending,
    /// The server rejected the request
    Error { code: String },
}

impl Classification {
    pub fn is_pending(&self) -> bool {
        matches!(self, Classification::Pending)
    }
}

/// Classify a raw response
///
/// The pending marker wins over the status flag; any other falsy status is an
/// error carrying `request` as its code.
pub fn classify(raw: &RawResponse) -> Classification {
    if raw.is_pending() {
        return Classification::Pending;
    }

    if !raw.status {
        return Classification::Error {
            code: raw.request.clone(),
        };
    }

    Classification::Ready(parse_solution(&raw.request))
}

/// Split `token|cost_millis` into a solution
///
/// A missing or non-integer cost falls back to [`FALLBACK_COST`].
pub fn parse_solution(request: &str) -> Solution {
    let mut parts = request.split(COST_SEPARATOR);
    let token = parts.next().unwrap_or_default().to_string();

    let cost = parts
        .next()
        .and_then(|millis| millis.trim().parse::<i64>().ok())
        .map(|millis| millis as f64 / 1000.0)
        .unwrap_or(FALLBACK_COST);

    Solution { token, cost }
}
