// Copyright 2026 The pathkit authors.

//! Retry layer (spec.md C17 / §4.15).
//!
//! Wraps a backend request closure the way the teacher's transport layer
//! wraps the AWS/SSH clients with a blocking `Runtime::block_on` bridge: the
//! wrapping happens once, in the backend constructor, rather than by
//! monkey-patching the injected client (spec.md §9).

use std::thread::sleep;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{ErrorKind, PathError, Result};

/// Per-backend retry tuning. Each backend picks its own default (spec.md
/// §4.15 "per-backend default").
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Reasonable default for object-storage / network backends: 5
    /// attempts, capped exponential backoff between 100ms and 5s.
    pub const DEFAULT: RetryPolicy = RetryPolicy::new(
        5,
        Duration::from_millis(100),
        Duration::from_secs(5),
    );

    /// Exponential delay for `attempt` (0-based), with ±20% jitter, capped
    /// at `max_delay`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as u64 * (1u64 << attempt.min(20));
        let capped = exp.min(self.max_delay.as_millis() as u64).max(1);
        let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis(((capped as f64) * jitter_frac) as u64)
    }
}

/// Hook run before each attempt (including the first), e.g. to refresh a
/// stale WebDAV bearer token (spec.md §4.15 "before callback").
pub trait PreFlight {
    fn before_attempt(&mut self) -> Result<()> {
        Ok(())
    }

    /// Rewind a retriable request body before a retry. Returns `false` (and
    /// the retry layer gives up immediately) for non-rewindable streams,
    /// per spec.md §4.15.
    fn rewind(&mut self) -> bool {
        true
    }
}

/// No-op pre-flight hook for requests with no body to rewind and nothing to
/// refresh.
pub struct NoPreFlight;
impl PreFlight for NoPreFlight {}

/// Run `op`, retrying on [`ErrorKind::Transport`] failures per `policy`,
/// calling `preflight` before every attempt and honoring its rewind
/// decision on retries.
pub fn with_retry<T>(
    policy: RetryPolicy,
    preflight: &mut dyn PreFlight,
    should_retry: impl Fn(&PathError) -> bool,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        preflight.before_attempt()?;
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && should_retry(&e) => {
                if attempt > 0 && !preflight.rewind() {
                    warn!(error = %e, "retry body not rewindable, failing fast");
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, error = %e, "retrying after transient error");
                sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Default retry predicate: transport errors only.
pub fn default_should_retry(err: &PathError) -> bool {
    err.kind == ErrorKind::Transport
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_until_success() {
        let attempts = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));
        let result = with_retry(policy, &mut NoPreFlight, default_should_retry, || {
            let n = attempts.get();
            attempts.set(n + 1);
            if n < 2 {
                Err(PathError::new(ErrorKind::Transport, "x"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let attempts = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<()> = with_retry(policy, &mut NoPreFlight, default_should_retry, || {
            attempts.set(attempts.get() + 1);
            Err(PathError::new(ErrorKind::NotFound, "x"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let attempts = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<()> = with_retry(policy, &mut NoPreFlight, default_should_retry, || {
            attempts.set(attempts.get() + 1);
            Err(PathError::new(ErrorKind::Transport, "x"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 3); // initial + 2 retries
    }

    struct RefusesRewind;
    impl PreFlight for RefusesRewind {
        fn rewind(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn non_rewindable_body_fails_fast() {
        let attempts = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<()> = with_retry(policy, &mut RefusesRewind, default_should_retry, || {
            attempts.set(attempts.get() + 1);
            Err(PathError::new(ErrorKind::Transport, "x"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}
