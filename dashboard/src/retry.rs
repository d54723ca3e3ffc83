use std::time::Duration;

use anyhow::Result;

/// Retries flaky storage operations a bounded number of times, doubling the wait each time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Never waits, for tests.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// How long to wait after the given failed attempt, counting from 0.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn run<T, F: FnMut() -> Result<T>>(&self, label: &str, mut op: F) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(x) => return Ok(x),
                Err(err) if attempt + 1 < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{label} failed (attempt {} of {attempts}), retrying in {:?}: {err}",
                        attempt + 1,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!("{label} failed after {attempts} attempts")));
                }
            }
        }
    }
}
