//! Suspend/resume bridge between the IO task and a waiting caller.
//!
//! A [`Continuation`] captures "whoever is waiting for this result". The IO
//! task resolves it exactly once, either with a value or with an error. Two
//! implementations ship here: [`oneshot`] for async Rust callers, and
//! [`from_fn`] for hosts that resume their own suspended contexts from a
//! callback.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot as tokio_oneshot;

use crate::error::{Error, Result};

/// A suspended caller that can be resumed once.
///
/// Both methods consume the box, so a continuation can never be completed
/// twice or completed after being failed.
pub trait Continuation<T>: Send + 'static {
    /// Resume the caller with a value.
    fn complete_with(self: Box<Self>, value: T);

    /// Resume the caller by raising `error`.
    fn fail_with(self: Box<Self>, error: Error);

    /// Resume with whichever side of `result` is present.
    fn resolve(self: Box<Self>, result: Result<T>) {
        match result {
            Ok(value) => self.complete_with(value),
            Err(error) => self.fail_with(error),
        }
    }
}

/// The boxed form stored in queues and requests.
pub type BoxContinuation<T> = Box<dyn Continuation<T>>;

// ---------------------------------------------------------------------------
// Oneshot-backed continuation
// ---------------------------------------------------------------------------

/// Continuation that forwards its result into a [`Resumption`] future.
pub struct OneshotContinuation<T> {
    tx: tokio_oneshot::Sender<Result<T>>,
}

impl<T: Send + 'static> Continuation<T> for OneshotContinuation<T> {
    fn complete_with(self: Box<Self>, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    fn fail_with(self: Box<Self>, error: Error) {
        let _ = self.tx.send(Err(error));
    }
}

/// Future side of [`oneshot`].
///
/// Resolves to [`Error::ConnectionLost`] if the continuation is dropped
/// without being resolved, which happens when the IO task is torn down.
pub struct Resumption<T> {
    rx: tokio_oneshot::Receiver<Result<T>>,
}

impl<T> Future for Resumption<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionLost)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a continuation paired with the future that it resumes.
pub fn oneshot<T: Send + 'static>() -> (BoxContinuation<T>, Resumption<T>) {
    let (tx, rx) = tokio_oneshot::channel();
    (Box::new(OneshotContinuation { tx }), Resumption { rx })
}

// ---------------------------------------------------------------------------
// Callback-backed continuation
// ---------------------------------------------------------------------------

/// Continuation that calls a closure with the result.
pub struct FnContinuation<F> {
    f: F,
}

impl<T, F> Continuation<T> for FnContinuation<F>
where
    F: FnOnce(Result<T>) + Send + 'static,
{
    fn complete_with(self: Box<Self>, value: T) {
        (self.f)(Ok(value));
    }

    fn fail_with(self: Box<Self>, error: Error) {
        (self.f)(Err(error));
    }
}

/// Wrap a closure as a continuation.
///
/// The closure runs on the IO task, so it must not block.
pub fn from_fn<T, F>(f: F) -> BoxContinuation<T>
where
    F: FnOnce(Result<T>) + Send + 'static,
{
    Box::new(FnContinuation { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn oneshot_complete_resumes_with_value() {
        let (cont, resumption) = oneshot::<u32>();
        cont.complete_with(7);
        assert_eq!(resumption.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn oneshot_fail_carries_device_message() {
        let (cont, resumption) = oneshot::<()>();
        cont.fail_with(Error::CommandFailed {
            code: 504,
            message: "clip in use".into(),
        });
        let err = resumption.await.unwrap_err();
        assert_eq!(err.device_message(), Some("clip in use"));
    }

    #[tokio::test]
    async fn dropped_continuation_reports_connection_lost() {
        let (cont, resumption) = oneshot::<()>();
        drop(cont);
        assert!(matches!(resumption.await, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn resolve_routes_ok_and_err() {
        let (cont, resumption) = oneshot::<&'static str>();
        cont.resolve(Ok("done"));
        assert_eq!(resumption.await.unwrap(), "done");

        let (cont, resumption) = oneshot::<&'static str>();
        cont.resolve(Err(Error::Closed));
        assert!(matches!(resumption.await, Err(Error::Closed)));
    }

    #[test]
    fn from_fn_invokes_closure_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let cont = from_fn(move |result: Result<u16>| {
            assert_eq!(result.unwrap(), 200);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        cont.complete_with(200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
