use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::runtime;
use crate::{Cancellation, ThrottleError};

#[test]
fn placeholder_is_inactive_and_never_cancelled() {
    let cancellation = Cancellation::none();

    assert!(!cancellation.is_active());
    assert!(!cancellation.is_cancelled());
    assert!(cancellation.check().is_ok());
    assert!(cancellation.token().is_none());

    let default = Cancellation::default();
    assert!(!default.is_active());
}

#[test]
fn token_handle_is_active() {
    let token = CancellationToken::new();
    let cancellation = Cancellation::from(token.clone());

    assert!(cancellation.is_active());
    assert!(!cancellation.is_cancelled());
    assert!(cancellation.check().is_ok());

    token.cancel();

    assert!(cancellation.is_cancelled());
    assert_eq!(cancellation.check(), Err(ThrottleError::Cancelled));
}

#[test]
fn from_option_maps_none_to_placeholder() {
    assert!(!Cancellation::from(None).is_active());
    assert!(Cancellation::from(Some(CancellationToken::new())).is_active());
}

#[test]
fn cancelled_future_resolves_after_cancel() {
    runtime::block_on(async {
        let token = CancellationToken::new();
        let cancellation = Cancellation::from(token.clone());

        let canceller = runtime::spawn(async move {
            runtime::async_sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        cancellation.cancelled().await;
        canceller.await;

        assert!(cancellation.is_cancelled());
    });
}

#[test]
fn placeholder_cancelled_future_stays_pending() {
    runtime::block_on(async {
        let cancellation = Cancellation::none();
        let cancelled = cancellation.cancelled();
        let timeout = runtime::async_sleep(Duration::from_millis(30));

        futures::pin_mut!(cancelled);
        futures::pin_mut!(timeout);

        assert!(matches!(
            futures::future::select(cancelled, timeout).await,
            futures::future::Either::Right(_)
        ));
    });
}
