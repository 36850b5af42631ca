//! Core rate limiter implementation.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::window::{Attempt, TimeUnit, WindowConfig, WindowState};
use crate::error::{Cancelled, Result};

/// Admission gate allowing at most `limit` grants per fixed window of `period`.
///
/// This struct is thread-safe and can be shared across tasks and threads
/// behind an `Arc`. The window counter is only ever touched under a single
/// mutex, and that mutex is never held across an `.await` or while a caller
/// performs its gated work.
///
/// Waiters are not queued. Every waiter sleeps until the end of the window it
/// observed and then re-checks, so whichever waiter re-checks first after a
/// reset gets the grant.
pub struct RateLimiter {
    /// Window limit and period
    config: WindowConfig,
    /// Grants issued in the current window and when it started
    state: Mutex<WindowState>,
    /// Timed wait for callers blocking an OS thread
    window_turnover: Condvar,
}

impl RateLimiter {
    /// Create a new rate limiter; the first window starts now.
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState::new(Instant::now())),
            window_turnover: Condvar::new(),
        }
    }

    /// Create a rate limiter allowing `limit` requests per one `unit`.
    pub fn per(unit: TimeUnit, limit: u32) -> Result<Self> {
        Ok(Self::new(WindowConfig::per(unit, limit)?))
    }

    /// Wait until a grant is available and consume it.
    ///
    /// Dropping the returned future cancels the wait without consuming a grant.
    pub async fn acquire(&self) {
        loop {
            match self.attempt() {
                Attempt::Granted => return,
                Attempt::Exhausted(remaining) => sleep(remaining).await,
            }
        }
    }

    /// Wait until a grant is available and consume it, giving up when `token`
    /// is cancelled.
    ///
    /// A token that is already cancelled fails immediately, even if the
    /// current window still has capacity.
    pub async fn acquire_with_cancel(
        &self,
        token: &CancellationToken,
    ) -> std::result::Result<(), Cancelled> {
        loop {
            if token.is_cancelled() {
                debug!("Rate limit wait cancelled");
                return Err(Cancelled);
            }

            match self.attempt() {
                Attempt::Granted => return Ok(()),
                Attempt::Exhausted(remaining) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            debug!("Rate limit wait cancelled");
                            return Err(Cancelled);
                        }
                        _ = sleep(remaining) => {}
                    }
                }
            }
        }
    }

    /// Block the current thread until a grant is available and consume it.
    ///
    /// Meant for callers outside an async runtime. When `deadline` passes
    /// before a grant is issued the wait is abandoned with `Cancelled`.
    pub fn acquire_blocking(
        &self,
        deadline: Option<std::time::Instant>,
    ) -> std::result::Result<(), Cancelled> {
        let mut state = self.state.lock();
        loop {
            let remaining = match self.take_locked(&mut state) {
                Attempt::Granted => return Ok(()),
                Attempt::Exhausted(remaining) => remaining,
            };

            let now = std::time::Instant::now();
            let window_end = now + remaining;
            let wake_at = match deadline {
                Some(deadline) if deadline <= now => {
                    debug!("Rate limit wait reached its deadline");
                    return Err(Cancelled);
                }
                Some(deadline) => deadline.min(window_end),
                None => window_end,
            };

            // Releases the lock while parked; the loop re-checks on any wakeup.
            self.window_turnover.wait_until(&mut state, wake_at);
        }
    }

    /// Consume a grant if the current window has capacity, without waiting.
    pub fn try_acquire(&self) -> bool {
        self.attempt() == Attempt::Granted
    }

    /// Get the window configuration.
    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Grants issued in the current window.
    pub fn current_count(&self) -> u32 {
        let mut state = self.state.lock();
        state.roll(Instant::now(), self.config.period());
        state.count()
    }

    /// Grants still available in the current window.
    pub fn remaining(&self) -> u32 {
        self.config.limit().saturating_sub(self.current_count())
    }

    /// Time until the current window ends.
    pub fn duration_until_reset(&self) -> Duration {
        let mut state = self.state.lock();
        let elapsed = state.roll(Instant::now(), self.config.period());
        self.config.period() - elapsed
    }

    fn attempt(&self) -> Attempt {
        let mut state = self.state.lock();
        self.take_locked(&mut state)
    }

    fn take_locked(&self, state: &mut WindowState) -> Attempt {
        let attempt = state.try_take(Instant::now(), &self.config);
        match attempt {
            Attempt::Granted => {
                trace!(
                    count = state.count(),
                    limit = self.config.limit(),
                    "Rate limit grant issued"
                );
            }
            Attempt::Exhausted(remaining) => {
                debug!(
                    limit = self.config.limit(),
                    wait_ms = remaining.as_millis() as u64,
                    "Rate limit window exhausted, waiting for reset"
                );
            }
        }
        attempt
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok, assert_pending};

    fn limiter(limit: u32, period: Duration) -> RateLimiter {
        RateLimiter::new(WindowConfig::new(limit, period).unwrap())
    }

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let limiter = RateLimiter::per(TimeUnit::Second, 3).unwrap();
        assert_eq!(limiter.config().limit(), 3);
        assert_eq!(limiter.current_count(), 0);
        assert_eq!(limiter.remaining(), 3);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert!(RateLimiter::per(TimeUnit::Second, 0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquires_within_limit_do_not_wait() {
        let limiter = limiter(3, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.current_count(), 3);
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_past_limit_waits_for_window_boundary() {
        let limiter = limiter(3, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        limiter.acquire().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "returned early: {:?}", elapsed);
        assert!(
            elapsed < Duration::from_millis(1100),
            "waited past the boundary: {:?}",
            elapsed
        );
        assert_eq!(limiter.current_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_acquire_is_pending() {
        let limiter = limiter(1, Duration::from_secs(1));
        limiter.acquire().await;

        let mut waiter = tokio_test::task::spawn(limiter.acquire());
        assert_pending!(waiter.poll());
        drop(waiter);

        // The abandoned wait did not take anything from the next window.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire() {
        let limiter = limiter(2, Duration::from_secs(1));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.current_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_until_reset() {
        let limiter = limiter(1, Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(300)).await;

        assert_eq!(limiter.duration_until_reset(), Duration::from_millis(700));

        tokio::time::advance(Duration::from_millis(700)).await;
        assert_eq!(limiter.duration_until_reset(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_burst_at_window_boundary() {
        let limiter = limiter(2, Duration::from_secs(1));
        let start = Instant::now();

        tokio::time::advance(Duration::from_millis(950)).await;
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(50)).await;
        limiter.acquire().await;
        limiter.acquire().await;

        // Four grants within 50ms of each other, straddling the boundary.
        assert!(start.elapsed() < Duration::from_millis(1010));
        assert_eq!(limiter.current_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_returns_cancelled() {
        let limiter = Arc::new(limiter(1, Duration::from_secs(1)));
        limiter.acquire().await;

        let token = CancellationToken::new();
        let start = Instant::now();
        let handle = tokio::spawn({
            let limiter = limiter.clone();
            let token = token.clone();
            async move { limiter.acquire_with_cancel(&token).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));

        // State is intact: the window is still full and the next one serves
        // new callers as usual.
        assert_eq!(limiter.current_count(), 1);
        assert!(!limiter.try_acquire());
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_cancelled_token_does_not_consume() {
        let limiter = limiter(1, Duration::from_secs(1));
        let token = CancellationToken::new();
        token.cancel();

        assert_err!(limiter.acquire_with_cancel(&token).await);
        assert_eq!(limiter.current_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncancelled_token_grants() {
        let limiter = limiter(1, Duration::from_secs(1));
        let token = CancellationToken::new();

        assert_ok!(limiter.acquire_with_cancel(&token).await);
        assert_ok!(limiter.acquire_with_cancel(&token).await);
        assert_eq!(limiter.current_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_are_served_per_window() {
        let limit = 3;
        let callers = 10;
        let period = Duration::from_secs(1);
        let limiter = Arc::new(limiter(limit, period));
        let start = Instant::now();

        let waiters = (0..callers).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                start.elapsed()
            })
        });
        let grants: Vec<Duration> = join_all(waiters)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let mut per_window = [0u32; 4];
        for at in &grants {
            let window = (at.as_millis() / period.as_millis()) as usize;
            per_window[window] += 1;
        }
        assert_eq!(per_window, [3, 3, 3, 1]);

        let total = start.elapsed();
        assert!(total >= Duration::from_secs(3));
        assert!(total < Duration::from_millis(3100));
    }

    #[test]
    fn test_blocking_acquire_waits_for_next_window() {
        let limiter = limiter(1, Duration::from_millis(100));
        let start = std::time::Instant::now();

        assert_ok!(limiter.acquire_blocking(None));
        assert_ok!(limiter.acquire_blocking(None));

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_blocking_acquire_deadline_cancels() {
        let limiter = limiter(1, Duration::from_secs(5));
        assert_ok!(limiter.acquire_blocking(None));

        let start = std::time::Instant::now();
        let deadline = start + Duration::from_millis(50);
        assert_eq!(limiter.acquire_blocking(Some(deadline)), Err(Cancelled));

        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_secs(5));
        assert_eq!(limiter.current_count(), 1);
    }

    #[test]
    fn test_blocking_threads_never_exceed_limit() {
        let limit = 2;
        let period = Duration::from_millis(200);
        let start = std::time::Instant::now();
        let limiter = Arc::new(limiter(limit, period));

        let threads: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    limiter.acquire_blocking(None).unwrap();
                    start.elapsed()
                })
            })
            .collect();
        let mut grants: Vec<Duration> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        grants.sort();

        // Each window holds at most `limit` grants and starts at least one
        // period after the previous one.
        for (i, at) in grants.iter().enumerate() {
            let window = (i / limit as usize) as u32;
            assert!(*at >= period * window, "grants: {:?}", grants);
        }
    }
}
