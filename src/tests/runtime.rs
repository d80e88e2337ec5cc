use std::{future::Future, time::Duration};

#[cfg(feature = "tokio")]
pub(super) fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Runtime::new().unwrap().block_on(f)
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(super) fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    smol::block_on(f)
}

#[cfg(feature = "tokio")]
pub(super) async fn async_sleep(d: Duration) {
    tokio::time::sleep(d).await;
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(super) async fn async_sleep(d: Duration) {
    smol::Timer::after(d).await;
}

#[cfg(feature = "tokio")]
pub(super) fn spawn<F, T>(f: F) -> impl Future<Output = T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(f);
    async move { handle.await.unwrap() }
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(super) fn spawn<F, T>(f: F) -> impl Future<Output = T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    smol::spawn(f)
}
