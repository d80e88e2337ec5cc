use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::{BoxFuture, Either};
use parking_lot::Mutex;

use crate::{Cancellation, ThrottleError, TokenBucket, TokenBucketFactory, runtime};

struct BucketState {
    tokens: u64,
    next_refill: Instant,
}

/// Token bucket refilled by a fixed amount at fixed intervals.
///
/// # Algorithm
///
/// 1. A new bucket starts full (`capacity` tokens).
/// 2. Every whole `refill_period` that has elapsed since the last refill adds
///    `refill_tokens`; missed periods accumulate, the total is capped at `capacity`.
/// 3. `wait_consume` takes the tokens if present, otherwise sleeps until the next
///    refill instant and tries again.
///
/// Refill is lazy: it happens when the bucket is consulted, no background task
/// is involved.
///
/// # Ordering
///
/// Waiters are not queued. Whoever observes enough tokens first after a refill
/// gets them.
pub struct FixedIntervalTokenBucket {
    capacity: u64,
    refill_tokens: u64,
    refill_period: Duration,
    state: Mutex<BucketState>,
}

impl FixedIntervalTokenBucket {
    /// Create a full bucket.
    ///
    /// Fails with [`ThrottleError::InvalidArgument`] if `capacity`, `refill_tokens`
    /// or `refill_period` is zero.
    pub fn new(
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
    ) -> Result<Self, ThrottleError> {
        if capacity == 0 {
            return Err(ThrottleError::InvalidArgument(
                "bucket capacity must be greater than 0".to_string(),
            ));
        }

        if refill_tokens == 0 {
            return Err(ThrottleError::InvalidArgument(
                "bucket refill amount must be greater than 0".to_string(),
            ));
        }

        if refill_period.is_zero() {
            return Err(ThrottleError::InvalidArgument(
                "bucket refill period must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            refill_tokens,
            refill_period,
            state: Mutex::new(BucketState {
                tokens: capacity,
                next_refill: Instant::now() + refill_period,
            }),
        })
    } // end constructor

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if now < state.next_refill {
            return;
        }

        let periods = 1 + now.duration_since(state.next_refill).as_nanos()
            / self.refill_period.as_nanos();
        let periods = u32::try_from(periods).unwrap_or(u32::MAX);

        let added = self.refill_tokens.saturating_mul(u64::from(periods));
        state.tokens = state.tokens.saturating_add(added).min(self.capacity);
        state.next_refill += self.refill_period.saturating_mul(periods);
    }

    /// Consume if possible, otherwise report how long until the next refill.
    fn consume_or_wait_time(&self, tokens: u64) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();

        self.refill(&mut state, now);

        if state.tokens >= tokens {
            state.tokens -= tokens;
            return None;
        }

        Some(state.next_refill.saturating_duration_since(now))
    }
} // end impl FixedIntervalTokenBucket

impl TokenBucket for FixedIntervalTokenBucket {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn available_tokens(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    fn try_consume(&self, tokens: u64) -> bool {
        tokens <= self.capacity && self.consume_or_wait_time(tokens).is_none()
    }

    fn wait_consume<'a>(
        &'a self,
        tokens: u64,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, Result<(), ThrottleError>> {
        Box::pin(async move {
            if tokens > self.capacity {
                return Err(ThrottleError::InvalidArgument(format!(
                    "cannot consume {tokens} tokens from a bucket of capacity {}",
                    self.capacity
                )));
            }

            loop {
                let Some(wait) = self.consume_or_wait_time(tokens) else {
                    return Ok(());
                };

                let cancelled_fut = cancellation.cancelled();
                let sleep_fut = runtime::sleep(wait);

                futures::pin_mut!(cancelled_fut);
                futures::pin_mut!(sleep_fut);

                // Cancellation is polled first so a fired handle wins over a
                // refill that lands at the same instant.
                if let Either::Left(_) = futures::future::select(cancelled_fut, sleep_fut).await {
                    return Err(ThrottleError::Cancelled);
                }
            }
        })
    } // end method wait_consume
}

/// Builds [`FixedIntervalTokenBucket`]s. Default factory of the executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedIntervalTokenBucketFactory;

impl TokenBucketFactory for FixedIntervalTokenBucketFactory {
    fn create(
        &self,
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
    ) -> Result<Arc<dyn TokenBucket>, ThrottleError> {
        Ok(Arc::new(FixedIntervalTokenBucket::new(
            capacity,
            refill_tokens,
            refill_period,
        )?))
    }
}
