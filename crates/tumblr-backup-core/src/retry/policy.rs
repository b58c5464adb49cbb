use std::time::Duration;

/// Classification of a single-attempt failure, used to decide whether the
/// outer retrieval loop should retry and with what sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 5xx, 413, 420, 429, or a mid-stream read error with partial progress.
    /// Retried with the standard counter/backoff.
    Transient,
    /// 420: retry, but always after a fixed 60s regardless of attempt count.
    RateLimited420,
    /// Connect timeout, or a Cloudflare origin-down status (521/522/523/525/526).
    /// Not retried at this layer: the host is condemned and the caller fails immediately.
    HostCondemned,
    /// Anything else retryable is not: 4xx other than the ones above, protocol
    /// violations, max-retry exhaustion.
    Permanent,
    /// DNS resolution failed outright: not a per-host problem but a local
    /// connectivity outage. Callers intercept this before it reaches
    /// `decide` and route it to the no-internet gate instead of the normal
    /// counter/backoff; it never consumes retry budget.
    NoInternet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Retry budget for one URL retrieval: counter limit 20, sleep = min(count, 10)s,
/// except 420 which always sleeps a fixed 60s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 20 }
    }
}

impl RetryPolicy {
    /// `attempt` is 1-based (the attempt that just failed).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        match kind {
            ErrorKind::HostCondemned | ErrorKind::Permanent | ErrorKind::NoInternet => {
                RetryDecision::NoRetry
            }
            ErrorKind::RateLimited420 => {
                if attempt >= self.max_attempts {
                    RetryDecision::NoRetry
                } else {
                    RetryDecision::RetryAfter(Duration::from_secs(60))
                }
            }
            ErrorKind::Transient => {
                if attempt >= self.max_attempts {
                    RetryDecision::NoRetry
                } else {
                    let secs = attempt.min(10) as u64;
                    RetryDecision::RetryAfter(Duration::from_secs(secs))
                }
            }
        }
    }
}
