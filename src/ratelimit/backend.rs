//! Admission trait for abstracting over rate limiting policies.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::limiter::RateLimiter;
use crate::error::Cancelled;

/// Trait for admission gates.
///
/// This trait abstracts over the fixed-window `RateLimiter` so that the
/// `GatedInvoker` can work with any policy that hands out one grant per call.
#[async_trait]
pub trait Admission: Send + Sync {
    /// Wait for and consume one grant, or fail once `cancel` fires.
    async fn admit(&self, cancel: &CancellationToken) -> Result<(), Cancelled>;
}

#[async_trait]
impl Admission for RateLimiter {
    async fn admit(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        self.acquire_with_cancel(cancel).await
    }
}
