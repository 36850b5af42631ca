//! Runs caller-supplied actions behind an admission gate.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug_span, trace, Instrument};
use uuid::Uuid;

use super::backend::Admission;
use super::limiter::RateLimiter;
use crate::error::{Cancelled, Error};

/// Failure of a gated invocation.
#[derive(Error, Debug)]
pub enum InvokeError<E> {
    /// No grant was issued before the invoker's token was cancelled;
    /// the action never ran.
    #[error("cancelled while waiting for a rate limit grant")]
    Cancelled,

    /// The action ran and failed. The error is returned untouched.
    #[error("gated action failed: {0}")]
    ActionFailed(#[source] E),
}

impl<E> From<Cancelled> for InvokeError<E> {
    fn from(_: Cancelled) -> Self {
        InvokeError::Cancelled
    }
}

impl From<InvokeError<Error>> for Error {
    fn from(err: InvokeError<Error>) -> Self {
        match err {
            InvokeError::Cancelled => Error::Cancelled(Cancelled),
            InvokeError::ActionFailed(e) => e,
        }
    }
}

/// Composes an admission gate with caller-supplied actions.
///
/// Every call to [`GatedInvoker::invoke`] takes exactly one grant before the
/// action runs. A failing action keeps its grant; nothing is retried.
pub struct GatedInvoker<A: Admission = RateLimiter> {
    admission: Arc<A>,
    cancel: CancellationToken,
}

impl<A: Admission> GatedInvoker<A> {
    /// Create an invoker over a shared admission gate.
    pub fn new(admission: Arc<A>) -> Self {
        Self {
            admission,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon pending waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Get the admission gate.
    pub fn admission(&self) -> &Arc<A> {
        &self.admission
    }

    /// Get the token that cancels pending waits.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for a grant, then run `action` once and hand back its outcome.
    pub async fn invoke<F, Fut, T, E>(&self, action: F) -> Result<T, InvokeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let span = debug_span!("gated_invoke", invocation_id = %Uuid::new_v4());

        async move {
            self.admission.admit(&self.cancel).await?;
            trace!("Grant issued, running gated action");
            action().await.map_err(InvokeError::ActionFailed)
        }
        .instrument(span)
        .await
    }
}

impl<A: Admission> Clone for GatedInvoker<A> {
    fn clone(&self) -> Self {
        Self {
            admission: self.admission.clone(),
            cancel: self.cancel.clone(),
        }
    }
}
