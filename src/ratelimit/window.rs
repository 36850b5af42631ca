//! Fixed-window configuration and counter state.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Time unit for expressing "N requests per unit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Per-millisecond rate limiting
    Millisecond,
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// An immutable `(limit, period)` pair: at most `limit` grants per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    limit: u32,
    period: Duration,
}

impl WindowConfig {
    /// Create a window configuration, rejecting a zero limit or a zero period.
    pub fn new(limit: u32, period: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidConfiguration(
                "limit must be at least 1".to_string(),
            ));
        }
        if period.is_zero() {
            return Err(Error::InvalidConfiguration(
                "period must be greater than zero".to_string(),
            ));
        }
        Ok(Self { limit, period })
    }

    /// `limit` requests per one `unit`.
    pub fn per(unit: TimeUnit, limit: u32) -> Result<Self> {
        Self::new(limit, unit.duration())
    }

    /// Maximum grants per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of a window.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Outcome of a single attempt to take a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// A grant was consumed.
    Granted,
    /// The window is exhausted; it ends after this much time.
    Exhausted(Duration),
}

/// Mutable counter state of a fixed window.
///
/// The window does not slide: it restarts in discrete jumps whenever an
/// access notices that `period` has elapsed since `window_start`.
#[derive(Debug)]
pub(crate) struct WindowState {
    count: u32,
    window_start: Instant,
}

impl WindowState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Restart the window if it has expired and return the time elapsed in
    /// the current window.
    pub(crate) fn roll(&mut self, now: Instant, period: Duration) -> Duration {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= period {
            self.count = 0;
            self.window_start = now;
            Duration::ZERO
        } else {
            elapsed
        }
    }

    /// Roll the window, then consume one grant if capacity remains.
    pub(crate) fn try_take(&mut self, now: Instant, config: &WindowConfig) -> Attempt {
        let elapsed = self.roll(now, config.period);
        if self.count < config.limit {
            self.count += 1;
            Attempt::Granted
        } else {
            Attempt::Exhausted(config.period - elapsed)
        }
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    #[cfg(test)]
    pub(crate) fn window_start(&self) -> Instant {
        self.window_start
    }
}
