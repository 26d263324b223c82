//! Pure reconnection policy: capped exponential backoff with escalation.
//!
//! No jitter: there is exactly one connecting client, so spreading retries
//! buys nothing. The cap bounds worst-case recovery latency.

use std::time::Duration;

/// Upper bound on any computed backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Growth factor between successive retries.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule one retry after this delay.
    Backoff(Duration),
    /// The attempt budget is spent; escalate to a process restart.
    GiveUp,
}

/// Delay before retry number `attempt` (1-based):
/// `min(base * 1.5^(attempt-1), MAX_BACKOFF)`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    debug_assert!(attempt >= 1);
    let exp = BACKOFF_MULTIPLIER.powi(attempt.saturating_sub(1) as i32);
    let millis = (base.as_millis() as f64 * exp).min(MAX_BACKOFF.as_millis() as f64);
    Duration::from_millis(millis as u64)
}

/// Decide between another backoff retry and escalation.
///
/// `attempt` is the just-failed attempt count; once it exceeds
/// `max_attempts` the cycle is over and the process restarts.
pub fn decide(attempt: u32, base: Duration, max_attempts: u32) -> RetryDecision {
    if attempt > max_attempts {
        RetryDecision::GiveUp
    } else {
        RetryDecision::Backoff(backoff_delay(attempt, base))
    }
}
