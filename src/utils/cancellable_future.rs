use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Future, which resolves to `Err(())` if token is cancelled before inner future completes.
///
/// Without token behaves exactly like inner future.
#[pin_project]
pub(crate) struct CancellableFuture<'a, F>
where
    F: Future,
{
    #[pin]
    first_future: F,
    #[pin]
    cancel_future: Option<WaitForCancellationFuture<'a>>,
}

impl<'a, F> CancellableFuture<'a, F>
where
    F: Future,
{
    pub(crate) fn new(first_future: F, cancel_token: Option<&'a CancellationToken>) -> Self {
        CancellableFuture {
            first_future,
            cancel_future: cancel_token.map(CancellationToken::cancelled),
        }
    }
}

impl<'a, F> Future for CancellableFuture<'a, F>
where
    F: Future,
{
    type Output = Result<F::Output, ()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(x) = this.first_future.poll(cx) {
            return Poll::Ready(Ok(x));
        }
        match this.cancel_future.as_pin_mut() {
            Some(cancel) => match cancel.poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(())),
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Pending,
        }
    }
}
