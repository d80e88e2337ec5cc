use std::{ops::Deref, sync::Arc, time::Duration};

use crate::ThrottleError;

/// Throttle descriptor for a single tenant.
///
/// Identifies the tenant by `identity_key` and carries the requests-per-second
/// ceiling that applies to it. Two descriptors with the same key and rate are
/// interchangeable.
///
/// A rate of `0` means the tenant is not throttled at all: calls skip the token
/// bucket entirely.
///
/// To change a tenant's rate, build a new descriptor with the same key (or use
/// [`TenantThrottle::with_max_requests_per_second`]) and pass it on the next call.
///
/// # Examples
///
/// ```
/// use tenant_throttle::TenantThrottle;
///
/// let throttle = TenantThrottle::new("customer-42", 10).unwrap();
/// assert_eq!(throttle.identity_key(), "customer-42");
/// assert_eq!(throttle.max_requests_per_second(), 10);
///
/// let faster = throttle.with_max_requests_per_second(60).unwrap();
/// assert_ne!(throttle, faster);
///
/// assert!(TenantThrottle::new("  ", 1).is_err());
/// assert!(TenantThrottle::new("customer-42", -1).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantThrottle {
    identity_key: Arc<str>,
    max_requests_per_second: u64,
}

impl TenantThrottle {
    /// Create a validated descriptor.
    ///
    /// Fails with [`ThrottleError::InvalidArgument`] when `identity_key` is empty or
    /// whitespace-only, or when `max_requests_per_second` is negative.
    pub fn new(
        identity_key: impl Into<String>,
        max_requests_per_second: i64,
    ) -> Result<Self, ThrottleError> {
        let identity_key: String = identity_key.into();

        if identity_key.trim().is_empty() {
            return Err(ThrottleError::InvalidArgument(
                "identity key must not be blank".to_string(),
            ));
        }

        let max_requests_per_second = u64::try_from(max_requests_per_second).map_err(|_| {
            ThrottleError::InvalidArgument(format!(
                "max requests per second must be >= 0, got {max_requests_per_second}"
            ))
        })?;

        Ok(Self {
            identity_key: Arc::from(identity_key),
            max_requests_per_second,
        })
    }

    /// Copy of this descriptor with a different rate.
    pub fn with_max_requests_per_second(
        &self,
        max_requests_per_second: i64,
    ) -> Result<Self, ThrottleError> {
        let max_requests_per_second = u64::try_from(max_requests_per_second).map_err(|_| {
            ThrottleError::InvalidArgument(format!(
                "max requests per second must be >= 0, got {max_requests_per_second}"
            ))
        })?;

        Ok(Self {
            identity_key: self.identity_key.clone(),
            max_requests_per_second,
        })
    }

    /// Tenant identity.
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Requests-per-second ceiling; `0` disables throttling.
    pub fn max_requests_per_second(&self) -> u64 {
        self.max_requests_per_second
    }

    /// `true` when the rate is `0` and calls bypass the bucket.
    pub fn is_unthrottled(&self) -> bool {
        self.max_requests_per_second == 0
    }

    /// Re-check the field invariants.
    ///
    /// Construction already enforces them; the executor calls this again before
    /// touching the registry so that no descriptor reaches a bucket unchecked.
    pub fn validate(&self) -> Result<(), ThrottleError> {
        if self.identity_key.trim().is_empty() {
            return Err(ThrottleError::InvalidArgument(
                "identity key must not be blank".to_string(),
            ));
        }

        Ok(())
    }
}

/// Length of one bucket refill period, in milliseconds.
///
/// Must be greater than 0. Defaults to 1000 ms, in which case every tenant bucket
/// holds (and is refilled with) exactly `max_requests_per_second` tokens per period.
///
/// With a shorter period, a tenant's rate must fill it with a whole number of
/// tokens: at 250 ms, 4 or 120 rps work, 2 or 5 rps are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefillPeriodMs(u64);

impl Deref for RefillPeriodMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for RefillPeriodMs {
    fn default() -> Self {
        Self(1000)
    }
}

impl TryFrom<u64> for RefillPeriodMs {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Refill period must be greater than 0".to_string())
        } else {
            Ok(Self(value))
        }
    }
}

impl RefillPeriodMs {
    /// The period as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Tokens a bucket receives per period for a requests-per-second ceiling.
    ///
    /// The period must hold a whole, non-zero number of tokens at that rate;
    /// anything else would either exceed or undercut the ceiling, so it fails
    /// with [`ThrottleError::InvalidArgument`].
    pub(crate) fn tokens_per_period(
        &self,
        max_requests_per_second: u64,
    ) -> Result<u64, ThrottleError> {
        let scaled = max_requests_per_second as u128 * self.0 as u128;

        if scaled < 1000 || scaled % 1000 != 0 {
            return Err(ThrottleError::InvalidArgument(format!(
                "{max_requests_per_second} rps is not a whole number of tokens per {} ms refill period",
                self.0
            )));
        }

        Ok(u64::try_from(scaled / 1000).unwrap_or(u64::MAX))
    }
}
