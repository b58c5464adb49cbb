//! Retry and backoff policy for a single URL retrieval.
//!
//! Mirrors wget's retry loop: a bounded attempt counter, a short sleep that
//! grows with the attempt count up to a ceiling, and a handful of special
//! cases (explicit `Retry-After`, rate limiting) that override the default
//! backoff.

mod classify;
mod policy;

pub use classify::{classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
