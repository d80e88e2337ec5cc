//! Throttled front-end for a single async operation.
//!
//! Every call names a tenant through a [`TenantThrottle`]; the executor takes one
//! token from that tenant's bucket before invoking the wrapped operation, so each
//! tenant's throughput stays under its own requests-per-second ceiling.
//!
//! # Cancellation
//!
//! Two handles are involved in every call:
//!
//! - the **governing** handle aborts the wait for admission (and is re-checked
//!   right before the operation is invoked);
//! - the **delegate-facing** handle is passed to the operation.
//!
//! | instance token | call | governing | delegate-facing |
//! |---|---|---|---|
//! | none | [`execute`](ThrottledExecutor::execute) | none | none |
//! | set | [`execute`](ThrottledExecutor::execute) | instance | instance |
//! | none | [`execute_with_cancellation`](ThrottledExecutor::execute_with_cancellation) | call | call |
//! | set | [`execute_with_cancellation`](ThrottledExecutor::execute_with_cancellation) | instance | call |
//!
//! An instance-wide shutdown therefore always aborts admission, while a single
//! in-flight call can still be cancelled through its own token.

use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{
    Cancellation, FixedIntervalTokenBucketFactory, RefillPeriodMs, TenantThrottle,
    ThrottleError, TokenBucketFactory, registry::ThrottleRegistry,
};

type Operation<Req, Resp, E> =
    Arc<dyn Fn(Req, Cancellation) -> BoxFuture<'static, Result<Resp, E>> + Send + Sync>;

/// Configuration for [`ThrottledExecutor`].
#[derive(Clone, Debug)]
pub struct ThrottledExecutorOptions {
    /// Instance-wide cancellation. When set it governs every admission wait.
    pub cancellation: Option<CancellationToken>,
    /// Builds one bucket per tenant (and per rate change).
    pub bucket_factory: Arc<dyn TokenBucketFactory>,
    /// Bucket refill period. See [`RefillPeriodMs`] for which rates it accepts.
    pub refill_period: RefillPeriodMs,
}

impl Default for ThrottledExecutorOptions {
    fn default() -> Self {
        Self {
            cancellation: None,
            bucket_factory: Arc::new(FixedIntervalTokenBucketFactory),
            refill_period: RefillPeriodMs::default(),
        }
    }
}

/// Gates calls to one async operation behind per-tenant token buckets.
///
/// The operation's error type must be constructible from [`ThrottleError`]: invalid
/// descriptors, cancellation and calls after disposal are reported through it,
/// while the operation's own failures are returned unchanged.
///
/// # Thread Safety
///
/// Share it behind an [`Arc`]. No background task is spawned; every call runs on
/// the caller's task and only suspends while waiting for a token (and inside the
/// operation itself).
///
/// # Examples
///
/// ```
/// use tenant_throttle::{Cancellation, TenantThrottle, ThrottleError, ThrottledExecutor};
///
/// # #[cfg(feature = "tokio")]
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let executor = ThrottledExecutor::new(|request: u32, _cancellation: Cancellation| async move {
///     Ok::<_, ThrottleError>(request * 2)
/// });
///
/// let throttle = TenantThrottle::new("customer-1", 5).unwrap();
/// assert_eq!(executor.execute(&throttle, 21).await.unwrap(), 42);
///
/// executor.dispose();
/// assert_eq!(
///     executor.execute(&throttle, 1).await.unwrap_err(),
///     ThrottleError::Disposed
/// );
/// # });
/// ```
pub struct ThrottledExecutor<Req, Resp, E> {
    operation: Operation<Req, Resp, E>,
    cancellation: Cancellation,
    registry: ThrottleRegistry,
}

impl<Req, Resp, E> ThrottledExecutor<Req, Resp, E>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    E: From<ThrottleError> + Send + 'static,
{
    /// Wrap `operation` with no instance-wide cancellation.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(Req, Cancellation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    {
        Self::with_options(operation, ThrottledExecutorOptions::default())
    }

    /// Wrap `operation`; `cancellation` governs every admission wait.
    pub fn with_cancellation<F, Fut>(operation: F, cancellation: CancellationToken) -> Self
    where
        F: Fn(Req, Cancellation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    {
        Self::with_options(
            operation,
            ThrottledExecutorOptions {
                cancellation: Some(cancellation),
                ..Default::default()
            },
        )
    }

    /// Wrap an operation that takes no cancellation handle.
    ///
    /// Cancellation can still abort admission, but never reaches the operation.
    pub fn from_fn<F, Fut>(operation: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    {
        Self::new(move |request, _cancellation| operation(request))
    }

    /// Wrap `operation` with explicit options.
    pub fn with_options<F, Fut>(operation: F, options: ThrottledExecutorOptions) -> Self
    where
        F: Fn(Req, Cancellation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    {
        let operation: Operation<Req, Resp, E> =
            Arc::new(move |request: Req, cancellation: Cancellation| {
                Box::pin(operation(request, cancellation)) as BoxFuture<'static, Result<Resp, E>>
            });

        Self {
            operation,
            cancellation: Cancellation::from(options.cancellation),
            registry: ThrottleRegistry::new(options.bucket_factory, options.refill_period),
        }
    } // end constructor

    /// Run the operation for `request` once `throttle`'s tenant is admitted.
    ///
    /// The instance cancellation token, if any, both governs admission and is
    /// handed to the operation. Without one, nothing is cancellable.
    ///
    /// # Errors
    ///
    /// - [`ThrottleError::Disposed`] after [`dispose`](Self::dispose)
    /// - [`ThrottleError::InvalidArgument`] for an invalid descriptor, or a rate
    ///   that does not give a whole number of tokens per refill period
    /// - [`ThrottleError::Cancelled`] if the governing handle fires before invocation
    /// - the operation's own error, unchanged
    pub async fn execute(&self, throttle: &TenantThrottle, request: Req) -> Result<Resp, E> {
        self.check_disposed()?;
        throttle.validate()?;

        let cancellation = self.cancellation.clone();

        self.execute_inner(throttle, request, cancellation.clone(), cancellation)
            .await
    } // end method execute

    /// Like [`execute`](Self::execute), with a call-site cancellation handle.
    ///
    /// If the executor holds an instance token, that token governs admission and
    /// `cancellation` is only forwarded to the operation. Otherwise `cancellation`
    /// governs both.
    pub async fn execute_with_cancellation(
        &self,
        throttle: &TenantThrottle,
        request: Req,
        cancellation: impl Into<Cancellation>,
    ) -> Result<Resp, E> {
        self.check_disposed()?;
        throttle.validate()?;

        let call_cancellation = cancellation.into();

        if self.cancellation.is_active() {
            self.execute_inner(
                throttle,
                request,
                self.cancellation.clone(),
                call_cancellation,
            )
            .await
        } else {
            self.execute_inner(
                throttle,
                request,
                call_cancellation.clone(),
                call_cancellation,
            )
            .await
        }
    } // end method execute_with_cancellation

    async fn execute_inner(
        &self,
        throttle: &TenantThrottle,
        request: Req,
        governing: Cancellation,
        delegate: Cancellation,
    ) -> Result<Resp, E> {
        if !throttle.is_unthrottled() {
            let bucket = self.registry.resolve(throttle)?;

            governing.check()?;

            if let Err(err) = bucket.wait_consume(1, &governing).await {
                if err.is_cancelled() {
                    tracing::debug!(
                        tenant = %throttle.identity_key(),
                        "throttle.admission.cancelled"
                    );
                }

                return Err(err.into());
            }

            tracing::trace!(
                tenant = %throttle.identity_key(),
                rps = throttle.max_requests_per_second(),
                "throttle.admission.granted"
            );
        }

        governing.check()?;

        (self.operation)(request, delegate).await
    } // end method execute_inner

    /// Tear the executor down.
    ///
    /// All tenant contexts are dropped and every later call fails with
    /// [`ThrottleError::Disposed`]. A throttled call that passed its disposal check
    /// but had not yet reached its tenant's bucket fails the same way, and leaves
    /// no context behind. Calls already waiting or running are left alone.
    /// Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(tenants) = self.registry.close() {
            tracing::debug!(tenants, "throttle.executor.disposed");
        }
    } // end method dispose

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Number of tenants with a stored context.
    pub fn tenant_count(&self) -> Result<usize, ThrottleError> {
        self.check_disposed()?;

        Ok(self.registry.len())
    }

    /// Descriptor currently in force for `identity_key`, if the tenant has been seen.
    pub fn tenant_throttle(
        &self,
        identity_key: &str,
    ) -> Result<Option<TenantThrottle>, ThrottleError> {
        self.check_disposed()?;

        Ok(self.registry.get(identity_key))
    }

    fn check_disposed(&self) -> Result<(), ThrottleError> {
        if self.is_disposed() {
            return Err(ThrottleError::Disposed);
        }

        Ok(())
    }
} // end impl ThrottledExecutor
