// SPDX-License-Identifier: Apache-2.0
//! Retry-with-backoff as a higher-order async function, so any model-call
//! boundary can be wrapped the same way.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// What an attempt's error tells the retry loop about the underlying
/// request, independent of any particular HTTP client's error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 5xx or 429 — worth retrying.
    Transient,
    /// 429 specifically — counted toward the consecutive-429 fallback rule.
    RateLimited,
    /// 400/401/403 or anything else the caller knows is not worth retrying.
    Permanent,
}

/// Per-attempt outcome a `should_retry` predicate reports back.
pub struct Classified {
    pub kind: FailureKind,
    /// `Retry-After`, if the response carried one.
    pub retry_after: Option<Duration>,
}

/// Retry `op` under the given policy.
///
/// - `should_retry` classifies each error; `FailureKind::Permanent` aborts
///   immediately.
/// - On a `Retry-After`-bearing error, sleeps exactly that long and resets
///   backoff instead of doubling it.
/// - Otherwise sleeps `current_delay` ± 30% jitter, then doubles
///   `current_delay` up to `max_delay`.
/// - On two consecutive `FailureKind::RateLimited` errors, calls
///   `fallback` with the current auth/model context; if it returns
///   `Some(model_id)`, the attempt counter and backoff both reset and the
///   new id is threaded back out in the `Ok` tuple's second slot so the
///   caller can retarget subsequent requests. This function has no
///   reference to the model provider itself and never retargets anything
///   on its own — retargeting is entirely the caller's responsibility.
pub async fn retry_with_backoff<T, E, Op, Fut, ShouldRetry, Fallback, FallbackFut>(
    policy: &RetryPolicy,
    mut op: Op,
    should_retry: ShouldRetry,
    mut fallback: Fallback,
) -> Result<(T, Option<String>), E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldRetry: Fn(&E) -> Classified,
    Fallback: FnMut() -> FallbackFut,
    FallbackFut: Future<Output = Option<String>>,
{
    let mut delay = policy.initial_delay;
    let mut consecutive_rate_limited = 0u32;
    let mut last_err = None;
    let mut fallback_model = None;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(v) => return Ok((v, fallback_model)),
            Err(e) => {
                let classified = should_retry(&e);
                match classified.kind {
                    FailureKind::Permanent => return Err(e),
                    FailureKind::RateLimited => consecutive_rate_limited += 1,
                    FailureKind::Transient => consecutive_rate_limited = 0,
                }

                if consecutive_rate_limited >= 2 {
                    if let Some(new_model) = fallback().await {
                        consecutive_rate_limited = 0;
                        delay = policy.initial_delay;
                        last_err = Some(e);
                        fallback_model = Some(new_model);
                        continue;
                    }
                }

                if attempt == policy.max_attempts {
                    return Err(e);
                }

                let wait = match classified.retry_after {
                    Some(d) => d,
                    None => jittered(delay),
                };
                tokio::time::sleep(wait).await;
                if classified.retry_after.is_none() {
                    delay = (delay * 2).min(policy.max_delay);
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("loop runs at least once"))
}

fn jittered(base: Duration) -> Duration {
    let jitter_frac = rand::thread_rng().gen_range(-0.3..=0.3);
    let millis = base.as_millis() as f64 * (1.0 + jitter_frac);
    Duration::from_millis(millis.max(0.0) as u64)
}
