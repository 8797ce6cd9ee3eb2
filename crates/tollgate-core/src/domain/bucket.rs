//! Token and leaky bucket state with lazy, time-driven transitions.
//!
//! Neither bucket runs a background timer. State is advanced to "now" on every
//! access by the pure `advance` functions below, so the math is independent of
//! the store and of the clock source.

/// Token bucket state: `tokens` in `[0, capacity]` and the instant up to which
/// refill has been credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketState {
    pub tokens: u64,
    pub last_refill_ms: i64,
}

impl TokenBucketState {
    /// A freshly initialised bucket starts full.
    pub fn full(capacity: u64, now_ms: i64) -> Self {
        Self {
            tokens: capacity,
            last_refill_ms: now_ms,
        }
    }

    /// Credit one token per whole refill period elapsed since `last_refill_ms`.
    ///
    /// Elapsed time below one period is carried forward: the timestamp only
    /// moves by the periods actually credited. A full bucket cannot bank time,
    /// so reaching capacity pins the timestamp to `now_ms`. A clock that moved
    /// backwards credits nothing.
    pub fn advance(self, now_ms: i64, capacity: u64, refill_period_ms: i64) -> Self {
        let period = refill_period_ms.max(1);
        let elapsed = now_ms.saturating_sub(self.last_refill_ms);
        if elapsed < period {
            return Self {
                tokens: self.tokens.min(capacity),
                ..self
            };
        }

        let periods = elapsed / period;
        let tokens = self.tokens.saturating_add(periods as u64).min(capacity);
        let last_refill_ms = if tokens == capacity {
            now_ms
        } else {
            self.last_refill_ms + periods * period
        };

        Self {
            tokens,
            last_refill_ms,
        }
    }

    /// Take one token, or `None` when the bucket is empty.
    pub fn try_consume(self) -> Option<Self> {
        (self.tokens > 0).then(|| Self {
            tokens: self.tokens - 1,
            ..self
        })
    }
}

/// Leaky bucket state: current fill level in droplets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyBucketState {
    pub level: f64,
    pub last_leak_ms: i64,
}

impl LeakyBucketState {
    pub fn empty(now_ms: i64) -> Self {
        Self {
            level: 0.0,
            last_leak_ms: now_ms,
        }
    }

    /// Drain `elapsed / leak_period` droplets, flooring the level at zero.
    pub fn advance(self, now_ms: i64, leak_period_ms: i64) -> Self {
        let elapsed = now_ms.saturating_sub(self.last_leak_ms);
        if elapsed <= 0 {
            return self;
        }

        let leaked = elapsed as f64 / leak_period_ms.max(1) as f64;
        Self {
            level: (self.level - leaked).max(0.0),
            last_leak_ms: now_ms,
        }
    }

    /// Add one droplet if it fits under `capacity`.
    pub fn try_fill(self, capacity: u64) -> Option<Self> {
        let level = self.level + 1.0;
        (level <= capacity as f64).then_some(Self { level, ..self })
    }
}
