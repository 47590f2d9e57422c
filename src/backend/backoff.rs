//! Retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] bounds how often a failing external call is repeated and
//! how long to wait in between. The generation and speech services share the
//! same loop: [`retry_with_backoff`] re-submits the identical request until it
//! succeeds or `max_retries + 1` attempts have been made.

use crate::error::Result;
use crate::PipelineError;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use podcast_pipeline::backend::BackoffConfig;
///
/// let standard = BackoffConfig::standard();
/// assert_eq!(standard.max_retries, 3);
///
/// let immediate = BackoffConfig::immediate(3);
/// assert_eq!(immediate.max_attempts(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of retries after the first attempt. Default: 3.
    pub max_retries: u32,

    /// Initial delay before first retry. Default: 1 second.
    pub initial_delay: Duration,

    /// Multiplier applied to delay after each retry. Default: 2.0.
    pub multiplier: f64,

    /// Maximum delay between retries. Default: 30 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: Full.
    pub jitter: JitterStrategy,

    /// Whether to wait for a provider's `Retry-After` hint instead of the
    /// computed delay. Default: `true`.
    pub respect_retry_after: bool,
}

/// Jitter strategy applied to the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    None,

    /// Full jitter: random value in `[0, calculated_delay]`.
    Full,

    /// Equal jitter: `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// 3 retries (4 attempts), 1s initial, 2x multiplier, 30s max, full jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::Full,
            respect_retry_after: true,
        }
    }

    /// Retry `max_retries` times without waiting in between.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: JitterStrategy::None,
            respect_retry_after: false,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Total number of attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calculate the delay before retry N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`. Jitter is then applied according to the configured strategy.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }

    fn delay_after(&self, attempt: u32, last_error: &PipelineError) -> Duration {
        match last_error {
            PipelineError::HttpError {
                retry_after: Some(ra),
                ..
            } if self.respect_retry_after => (*ra).min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Run `call` until it succeeds or the attempt budget is exhausted.
///
/// Every error is retried; the request is re-submitted identically. After the
/// last attempt the error is wrapped in [`PipelineError::GenerationFailed`].
///
/// `on_retry` is invoked before each retry with `(attempt, delay, reason)`,
/// where `attempt` is the 1-based number of the retry about to start.
pub async fn retry_with_backoff<T, F, Fut>(
    service: &'static str,
    config: &BackoffConfig,
    mut on_retry: impl FnMut(u32, Duration, &str),
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries => {
                let delay = config.delay_after(attempt, &e);
                attempt += 1;
                let reason = e.to_string();
                tracing::warn!(service, attempt, delay_ms = delay.as_millis() as u64, error = %reason, "retrying failed call");
                on_retry(attempt, delay, &reason);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                return Err(PipelineError::GenerationFailed {
                    service,
                    attempts: attempt + 1,
                    message: e.to_string(),
                })
            }
        }
    }
}
