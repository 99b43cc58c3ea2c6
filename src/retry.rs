use std::future::Future;
use std::time::Duration;

/// Bounded retry policy. `max_retries` counts retries after the first
/// attempt, so a policy with `max_retries = 3` performs at most 4 attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Fixed delay between attempts. Used for upstream SISU calls.
    pub fn fixed(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: 1,
        }
    }

    /// Delay doubling on every attempt. Used for storage calls.
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: 2,
        }
    }

    fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = (self.multiplier as u64).pow(retry_index);
        self.base_delay.saturating_mul(factor.min(u64::from(u32::MAX)) as u32)
    }
}

/// Run `op` until it succeeds or the policy is exhausted; the final error is
/// returned to the caller unchanged.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    remaining = policy.max_retries - attempt,
                    error = %err,
                    "attempt failed, retrying after {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick_policy(multiplier: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            multiplier,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retrying() {
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = retry(&quick_policy(1), || {
            calls.set(calls.get() + 1);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = retry(&quick_policy(2), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = retry(&quick_policy(1), || {
            calls.set(calls.get() + 1);
            async { Err("down".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "down");
        // one initial attempt plus three retries
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn exponential_delays_double() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn fixed_delays_stay_flat() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
    }
}
