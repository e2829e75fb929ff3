//! # Retry
//!
//! Policies decide how long to wait after the n-th consecutive failure, or
//! whether to give up. [`retry`] drives an async operation under a policy.
//!
//! - Database bootstrap: [`FixedInterval`], 5 seconds, never gives up
//! - Simulator requests: [`ExponentialBackoff`], 2s then 4s, 3 attempts
use std::{fmt::Display, time::Duration};

use tokio::time::sleep;
use tracing::warn;

pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt after `failures` consecutive failures
    /// (starting at 1). `None` means stop retrying.
    fn delay(&self, failures: u32) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl FixedInterval {
    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }
}

impl RetryPolicy for FixedInterval {
    fn delay(&self, failures: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if failures >= max => None,
            _ => Some(self.interval),
        }
    }
}

/// `base * factor^failures`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, failures: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if failures >= max {
                return None;
            }
        }

        let multiplier = self.factor.saturating_pow(failures);
        Some(self.base.saturating_mul(multiplier).min(self.max_delay))
    }
}

pub async fn retry<T, E, F, Fut>(
    policy: &dyn RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failures += 1;

                let Some(wait) = policy.delay(failures) else {
                    warn!("{label}: giving up after {failures} attempts: {e}");
                    return Err(e);
                };

                warn!("{label}: attempt {failures} failed: {e}, retrying in {wait:?}");
                sleep(wait).await;
            }
        }
    }
}
