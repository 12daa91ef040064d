//! Single-shot completable futures.
//!
//! An [`ActorFuture`] starts pending and resolves exactly once when its
//! [`FutureCompleter`] is invoked. Awaiting the future inside an actor
//! hook runs the continuation in the owning task's execution context,
//! which is the completion-callback mechanism the dispatcher's async
//! operations are built on. Dropping the future cancels it: the
//! completer observes the cancellation and can abort the pending
//! side-effect before it takes place.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;

/// Why an [`ActorFuture`] did not resolve to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FutureError {
    /// The completer was dropped without resolving the future.
    #[error("future abandoned: completer dropped without resolving")]
    Abandoned,
}

/// The resolving end of an [`ActorFuture`].
#[derive(Debug)]
pub struct FutureCompleter<T> {
    tx: oneshot::Sender<T>,
}

impl<T> FutureCompleter<T> {
    /// Resolves the paired future with `value`.
    ///
    /// Returns false if the future was already dropped, in which case
    /// the value is discarded.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Returns true if the paired future was dropped before resolving.
    ///
    /// A completer that observes cancellation before performing its
    /// side-effect must skip it, so a cancelled operation leaves no
    /// residue.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A single-shot future with states pending, resolved, and abandoned.
#[derive(Debug)]
pub struct ActorFuture<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> ActorFuture<T> {
    /// Creates a pending future and its completer.
    #[must_use]
    pub fn pair() -> (FutureCompleter<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (FutureCompleter { tx }, Self { rx })
    }

    /// Blocks the calling thread until the future resolves.
    ///
    /// For synchronous callers (tests, shutdown paths) only; must not
    /// be called from a scheduler worker.
    ///
    /// # Errors
    /// Returns [`FutureError::Abandoned`] if the completer was dropped.
    pub fn join(self) -> Result<T, FutureError> {
        self.rx.blocking_recv().map_err(|_| FutureError::Abandoned)
    }
}

impl<T> Future for ActorFuture<T> {
    type Output = Result<T, FutureError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| FutureError::Abandoned))
    }
}
