//! The two independent rate limits the public API enforces: a hard daily
//! cap and a rolling hourly window.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitOutcome {
    Proceed,
    SleepThenRetry(Duration),
    DailyExhausted(String),
    TooLongResume(u64),
}

const HOURLY_CAP_SECS: f64 = 3600.0;

/// Inspect `X-Ratelimit-Perday-Remaining` and `X-Ratelimit-Perhour-Reset`.
pub fn check(headers: &HashMap<String, String>) -> RateLimitOutcome {
    if let Some(remaining) = headers
        .get("x-ratelimit-perday-remaining")
        .and_then(|v| v.parse::<i64>().ok())
    {
        if remaining == 0 {
            let reset = headers
                .get("x-ratelimit-perday-reset")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            return RateLimitOutcome::DailyExhausted(reset);
        }
    }

    if let Some(reset) = headers
        .get("x-ratelimit-perhour-reset")
        .and_then(|v| v.parse::<f64>().ok())
    {
        if reset <= 0.0 {
            return RateLimitOutcome::Proceed;
        }
        if reset <= HOURLY_CAP_SECS {
            return RateLimitOutcome::SleepThenRetry(Duration::from_secs_f64(reset + 1.0));
        }
        return RateLimitOutcome::TooLongResume(reset as u64);
    }

    RateLimitOutcome::Proceed
}
