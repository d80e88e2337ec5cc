use std::time::Duration;

#[cfg(not(any(feature = "tokio", feature = "smol")))]
compile_error!("tenant-throttle requires either the `tokio` or the `smol` feature");

#[cfg(feature = "tokio")]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) async fn sleep(duration: Duration) {
    smol::Timer::after(duration).await;
}
