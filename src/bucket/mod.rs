//! Token bucket collaborator.
//!
//! The executor only depends on the [`TokenBucket`] and [`TokenBucketFactory`]
//! traits: one bucket per tenant, created through the factory, and asked to
//! `wait_consume` a token before every throttled call.
//!
//! # Provided implementation
//!
//! - [`FixedIntervalTokenBucket`]: starts full, refilled by a fixed amount once per
//!   period, capped at capacity. Built by [`FixedIntervalTokenBucketFactory`],
//!   which is the executor default.
//!
//! # Custom buckets
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//!
//! use futures::future::BoxFuture;
//! use tenant_throttle::{Cancellation, ThrottleError, TokenBucket, TokenBucketFactory};
//!
//! /// Admits everything.
//! struct OpenBucket(u64);
//!
//! impl TokenBucket for OpenBucket {
//!     fn capacity(&self) -> u64 {
//!         self.0
//!     }
//!
//!     fn available_tokens(&self) -> u64 {
//!         self.0
//!     }
//!
//!     fn try_consume(&self, _tokens: u64) -> bool {
//!         true
//!     }
//!
//!     fn wait_consume<'a>(
//!         &'a self,
//!         _tokens: u64,
//!         _cancellation: &'a Cancellation,
//!     ) -> BoxFuture<'a, Result<(), ThrottleError>> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct OpenBucketFactory;
//!
//! impl TokenBucketFactory for OpenBucketFactory {
//!     fn create(
//!         &self,
//!         capacity: u64,
//!         _refill_tokens: u64,
//!         _refill_period: Duration,
//!     ) -> Result<Arc<dyn TokenBucket>, ThrottleError> {
//!         Ok(Arc::new(OpenBucket(capacity)))
//!     }
//! }
//! ```

use std::{fmt::Debug, sync::Arc, time::Duration};

use futures::future::BoxFuture;

use crate::{Cancellation, ThrottleError};

mod fixed_interval_token_bucket;
pub use fixed_interval_token_bucket::*;

/// A per-tenant token bucket.
pub trait TokenBucket: Send + Sync {
    /// Maximum number of tokens the bucket can hold.
    fn capacity(&self) -> u64;

    /// Tokens available right now, after applying any pending refill.
    fn available_tokens(&self) -> u64;

    /// Take `tokens` if they are available right now; never waits.
    fn try_consume(&self, tokens: u64) -> bool;

    /// Take `tokens`, waiting for refills if needed.
    ///
    /// Must resolve to [`ThrottleError::Cancelled`] promptly once `cancellation`
    /// fires, not only at the next refill.
    fn wait_consume<'a>(
        &'a self,
        tokens: u64,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, Result<(), ThrottleError>>;
}

/// Builds tenant buckets.
pub trait TokenBucketFactory: Send + Sync + Debug {
    /// Create a bucket holding at most `capacity` tokens, refilled with
    /// `refill_tokens` every `refill_period`.
    fn create(
        &self,
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
    ) -> Result<Arc<dyn TokenBucket>, ThrottleError>;
}
