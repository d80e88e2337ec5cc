use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{RefillPeriodMs, TenantThrottle, ThrottleError, TokenBucket, TokenBucketFactory};

/// A tenant descriptor paired with the bucket that was built for it.
///
/// Never mutated: a rate change replaces the whole context.
#[derive(Clone)]
pub(crate) struct TenantContext {
    pub throttle: TenantThrottle,
    pub bucket: Arc<dyn TokenBucket>,
}

/// Concurrent map from tenant identity to its current [`TenantContext`].
///
/// # Thread Safety
///
/// - Backed by [`DashMap`], so tenants hashing to different shards never contend
/// - Create-or-replace for one key runs under that key's shard lock only
///
/// # Semantics
///
/// - Unknown key: a context is created and stored
/// - Known key with an equal descriptor: the stored bucket is returned untouched,
///   keeping its token state
/// - Known key with a different descriptor: a fresh bucket at the new rate replaces
///   the old context. Concurrent replacements for one key are last-writer-wins;
///   the losing bucket is simply dropped
/// - After [`close`](Self::close), every resolve fails with
///   [`ThrottleError::Disposed`] and the map stays empty
pub(crate) struct ThrottleRegistry {
    factory: Arc<dyn TokenBucketFactory>,
    refill_period: RefillPeriodMs,
    contexts: DashMap<Arc<str>, TenantContext>,
    closed: AtomicBool,
}

impl ThrottleRegistry {
    pub(crate) fn new(
        factory: Arc<dyn TokenBucketFactory>,
        refill_period: RefillPeriodMs,
    ) -> Self {
        Self {
            factory,
            refill_period,
            contexts: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    } // end constructor

    /// Bucket for `throttle`, creating or replacing the tenant's context as needed.
    pub(crate) fn resolve(
        &self,
        throttle: &TenantThrottle,
    ) -> Result<Arc<dyn TokenBucket>, ThrottleError> {
        self.check_open()?;

        if let Some(context) = self.contexts.get(throttle.identity_key())
            && context.throttle == *throttle
        {
            return Ok(context.bucket.clone());
        }

        let key: Arc<str> = Arc::from(throttle.identity_key());

        // Re-check under the shard lock: another caller may have stored an equal
        // descriptor since the read above, or closed the registry. `close` sets the
        // flag before clearing, and clearing takes this shard's lock, so anything
        // inserted here while the flag still reads open is removed by that clear.
        let entry = self.contexts.entry(key);
        self.check_open()?;

        match entry {
            Entry::Occupied(entry) if entry.get().throttle == *throttle => {
                Ok(entry.get().bucket.clone())
            }
            Entry::Occupied(mut entry) => {
                let previous = entry.get().throttle.max_requests_per_second();
                let context = self.new_context(throttle)?;
                let bucket = context.bucket.clone();

                tracing::debug!(
                    tenant = %throttle.identity_key(),
                    previous_rps = previous,
                    rps = throttle.max_requests_per_second(),
                    "throttle.context.replaced"
                );

                entry.insert(context);
                Ok(bucket)
            }
            Entry::Vacant(entry) => {
                let context = self.new_context(throttle)?;
                let bucket = context.bucket.clone();

                tracing::debug!(
                    tenant = %throttle.identity_key(),
                    rps = throttle.max_requests_per_second(),
                    "throttle.context.created"
                );

                entry.insert(context);
                Ok(bucket)
            }
        }
    } // end method resolve

    fn new_context(&self, throttle: &TenantThrottle) -> Result<TenantContext, ThrottleError> {
        let tokens = self
            .refill_period
            .tokens_per_period(throttle.max_requests_per_second())?;

        let bucket = self
            .factory
            .create(tokens, tokens, self.refill_period.as_duration())?;

        Ok(TenantContext {
            throttle: throttle.clone(),
            bucket,
        })
    }

    /// Descriptor currently stored for `identity_key`.
    pub(crate) fn get(&self, identity_key: &str) -> Option<TenantThrottle> {
        self.contexts
            .get(identity_key)
            .map(|context| context.throttle.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Refuse further resolves and drop every context.
    ///
    /// Returns the number of contexts dropped, or `None` if already closed.
    pub(crate) fn close(&self) -> Option<usize> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return None;
        }

        let tenants = self.contexts.len();
        self.contexts.clear();

        Some(tenants)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), ThrottleError> {
        if self.is_closed() {
            return Err(ThrottleError::Disposed);
        }

        Ok(())
    }
} // end impl ThrottleRegistry
