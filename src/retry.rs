use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Bounded exponential backoff around one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        let max = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Returns the value and the
    /// number of attempts used.
    pub fn run<T>(&self, op: impl FnMut(u32) -> Result<T>) -> Result<(T, u32)> {
        self.run_with_sleep(op, std::thread::sleep)
    }

    pub fn run_with_sleep<T>(
        &self,
        mut op: impl FnMut(u32) -> Result<T>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<(T, u32)> {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok((v, attempt)),
                Err(e) if e.is_transient() && attempt < max => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = max,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "transient failure, retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(35),
        }
    }

    #[test]
    fn delays_double_then_cap() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(10));
        assert_eq!(p.delay_for(2), Duration::from_secs(20));
        assert_eq!(p.delay_for(3), Duration::from_secs(35));
        assert_eq!(p.delay_for(60), Duration::from_secs(35));
    }

    #[test]
    fn retries_transient_until_success() {
        let mut slept = Vec::new();
        let (v, attempts) = policy()
            .run_with_sleep(
                |n| {
                    if n < 3 {
                        Err(Error::SizeMismatch { expected: 1, actual: 0 })
                    } else {
                        Ok("done")
                    }
                },
                |d| slept.push(d),
            )
            .unwrap();
        assert_eq!(v, "done");
        assert_eq!(attempts, 3);
        assert_eq!(slept, vec![Duration::from_secs(10), Duration::from_secs(20)]);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let err = policy()
            .run_with_sleep(
                |_| -> Result<()> {
                    calls += 1;
                    Err(Error::Service("unknown parameter".into()))
                },
                |_| panic!("must not sleep"),
            )
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, Error::Service(_)));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let res = policy().run_with_sleep(
            |_| -> Result<()> {
                calls += 1;
                Err(Error::SizeMismatch { expected: 2, actual: 1 })
            },
            |_| {},
        );
        assert!(res.is_err());
        assert_eq!(calls, 4);
    }
}
