//! Retry-with-recovery policy shared by every backend call that can hit a dead server.

use crate::config::RetryConfig;
use crate::error::SynthResult;
use rand::Rng;
use std::time::Duration;
use tracing::{error, warn};

/// Bounded retry: transient failures trigger a recovery step and another attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.backoff_ms),
            jitter: Duration::from_millis(cfg.jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests, scripted backends).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn pause(&self) {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        let wait = self.backoff + Duration::from_millis(extra);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    /// Run `op` against `ctx` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// Between attempts `recover` runs (e.g. restart the server and reload the voice).
    /// A failing `recover` ends the loop with its error. The last error is returned
    /// when attempts are exhausted.
    pub fn run<C, T, Op, Rec>(&self, label: &str, ctx: &mut C, mut op: Op, mut recover: Rec) -> SynthResult<T>
    where
        Op: FnMut(&mut C) -> SynthResult<T>,
        Rec: FnMut(&mut C, u32) -> SynthResult<()>,
    {
        let mut attempt = 1;
        loop {
            match op(ctx) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Connection error during {}; restarting backend",
                        label
                    );
                    recover(ctx, attempt)?;
                    self.pause();
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(attempts = attempt, "{} failed after {} attempts", label, attempt);
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthError;

    #[derive(Default)]
    struct Counter {
        calls: u32,
        recoveries: u32,
    }

    #[test]
    fn succeeds_after_two_transient_failures() {
        let policy = RetryPolicy::immediate(3);
        let mut c = Counter::default();
        let out = policy.run(
            "synthesis",
            &mut c,
            |c| {
                c.calls += 1;
                if c.calls < 3 {
                    Err(SynthError::ConnectionRefused("down".into()))
                } else {
                    Ok(c.calls)
                }
            },
            |c, _| {
                c.recoveries += 1;
                Ok(())
            },
        );
        assert_eq!(out.unwrap(), 3);
        assert_eq!(c.recoveries, 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::immediate(3);
        let mut c = Counter::default();
        let out: SynthResult<()> = policy.run(
            "synthesis",
            &mut c,
            |c| {
                c.calls += 1;
                Err(SynthError::ConnectionRefused("down".into()))
            },
            |c, _| {
                c.recoveries += 1;
                Ok(())
            },
        );
        assert!(matches!(out, Err(SynthError::ConnectionRefused(_))));
        assert_eq!(c.calls, 3);
        assert_eq!(c.recoveries, 2);
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(3);
        let mut c = Counter::default();
        let out: SynthResult<()> = policy.run(
            "synthesis",
            &mut c,
            |c| {
                c.calls += 1;
                Err(SynthError::Http("bad request".into()))
            },
            |c, _| {
                c.recoveries += 1;
                Ok(())
            },
        );
        assert!(out.is_err());
        assert_eq!(c.calls, 1);
        assert_eq!(c.recoveries, 0);
    }

    #[test]
    fn failed_recovery_stops_the_loop() {
        let policy = RetryPolicy::immediate(3);
        let mut c = Counter::default();
        let out: SynthResult<()> = policy.run(
            "synthesis",
            &mut c,
            |c| {
                c.calls += 1;
                Err(SynthError::ConnectionRefused("down".into()))
            },
            |_, _| Err(SynthError::BackendUnreachable("gone".into())),
        );
        assert!(matches!(out, Err(SynthError::BackendUnreachable(_))));
        assert_eq!(c.calls, 1);
    }
}
