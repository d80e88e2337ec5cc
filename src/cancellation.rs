//! Cancellation handles used by the executor.
//!
//! A [`Cancellation`] is either the no-op placeholder ([`Cancellation::none`]) or an
//! active wrapper around a [`CancellationToken`]. Only active handles are ever
//! checked; the placeholder never reports cancellation and its
//! [`cancelled`](Cancellation::cancelled) future never resolves.

use tokio_util::sync::CancellationToken;

use crate::ThrottleError;

/// Optional cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Option<CancellationToken>);

impl Cancellation {
    /// The placeholder handle. Never fires.
    pub fn none() -> Self {
        Self(None)
    }

    /// Whether this is a real signal rather than the placeholder.
    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    /// Whether cancellation has been requested. Always `false` for the placeholder.
    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Fail with [`ThrottleError::Cancelled`] if an active handle has fired.
    pub fn check(&self) -> Result<(), ThrottleError> {
        if self.is_active() && self.is_cancelled() {
            return Err(ThrottleError::Cancelled);
        }

        Ok(())
    }

    /// Resolves once cancellation is requested. Pending forever for the placeholder.
    pub async fn cancelled(&self) {
        match &self.0 {
            Some(token) => token.cancelled().await,
            None => futures::future::pending::<()>().await,
        }
    }

    /// The underlying token, if any.
    pub fn token(&self) -> Option<&CancellationToken> {
        self.0.as_ref()
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self(Some(token))
    }
}

impl From<Option<CancellationToken>> for Cancellation {
    fn from(token: Option<CancellationToken>) -> Self {
        Self(token)
    }
}
