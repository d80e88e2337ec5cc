/// Error type for this crate.
///
/// Failures raised by the wrapped operation are never converted into this type;
/// they reach the caller as the operation's own error. The executor only needs
/// the operation's error type to be constructible from a [`ThrottleError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleError {
    /// An argument failed validation (blank identity key, negative rate, bad bucket sizing).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The governing cancellation handle fired before the operation was invoked.
    #[error("operation cancelled while waiting for admission")]
    Cancelled,

    /// The executor was disposed before the call was made.
    #[error("throttled executor has been disposed")]
    Disposed,
}

impl ThrottleError {
    /// Returns `true` for [`ThrottleError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
