//! Fibonacci retry schedules.
//!
//! Both sides of a subscription retry on a fibonacci curve: the server when
//! resuming persisted subscriptions after a restart, the client when
//! re-establishing a lost subscription.

use std::time::Duration;

use rand::Rng;

/// Resumption attempts past this step wait a full day.
pub const MAX_RESUMPTION_STEP: u32 = 10;
const RESUMPTION_MIN_RETRY_SECS: u64 = 300;
const RESUMPTION_RETRY_MULTIPLIER_SECS: u64 = 300;
const RESUMPTION_MAX_RETRY_SECS: u64 = 86_400;

/// Resubscribe waits stop growing after this step.
pub const MAX_RESUBSCRIBE_STEP: u32 = 14;
const RESUBSCRIBE_WAIT_UNIT_MS: u64 = 10_000;
/// Minimum wait as a percentage of the maximum.
const RESUBSCRIBE_MIN_WAIT_PERCENT: u64 = 30;

/// `fibonacci(0) == 0`, `fibonacci(1) == 1`.
pub fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a.saturating_add(b));
    }
    a
}

/// Delay before the given server-side resumption attempt.
pub fn resumption_retry_delay(attempt: u32) -> Duration {
    if attempt > MAX_RESUMPTION_STEP {
        return Duration::from_secs(RESUMPTION_MAX_RETRY_SECS);
    }
    Duration::from_secs(
        RESUMPTION_MIN_RETRY_SECS + fibonacci(attempt) * RESUMPTION_RETRY_MULTIPLIER_SECS,
    )
}

/// Bounds of the randomized client resubscribe wait for an attempt.
pub fn resubscribe_wait_bounds(attempt: u32) -> (Duration, Duration) {
    let step = attempt.min(MAX_RESUBSCRIBE_STEP);
    let max_ms = fibonacci(step) * RESUBSCRIBE_WAIT_UNIT_MS;
    let min_ms = max_ms * RESUBSCRIBE_MIN_WAIT_PERCENT / 100;
    (Duration::from_millis(min_ms), Duration::from_millis(max_ms))
}

/// Randomized client resubscribe wait: uniform in `[min, max)`.
pub fn resubscribe_wait(attempt: u32) -> Duration {
    let (min, max) = resubscribe_wait_bounds(attempt);
    let (min_ms, max_ms) = (min.as_millis() as u64, max.as_millis() as u64);
    if min_ms >= max_ms {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
}
