//! Colon-delimited wire format for bucket state.
//!
//! - token bucket: `<tokens>:<lastRefillTimestampMillis>`
//! - leaky bucket: `<level>:<lastLeakTimestampMillis>`
//!
//! Levels are written with Rust's shortest round-trip float formatting, so
//! `s.to_string().parse() == Ok(s)` holds for every valid state. Levels written
//! by other producers in `1.0` or `1.0E-4` notation parse as well.

use std::fmt;
use std::str::FromStr;

use super::bucket::{LeakyBucketState, TokenBucketState};

/// Stored state that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Missing ':' delimiter in {0:?}")]
    MissingDelimiter(String),

    #[error("Invalid token count {0:?}")]
    InvalidTokens(String),

    #[error("Invalid bucket level {0:?}")]
    InvalidLevel(String),

    #[error("Invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}

fn split(raw: &str) -> Result<(&str, i64), CodecError> {
    let (head, ts) = raw
        .split_once(':')
        .ok_or_else(|| CodecError::MissingDelimiter(raw.to_string()))?;
    let ts = ts
        .parse::<i64>()
        .map_err(|_| CodecError::InvalidTimestamp(ts.to_string()))?;
    Ok((head, ts))
}

impl fmt::Display for TokenBucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tokens, self.last_refill_ms)
    }
}

impl FromStr for TokenBucketState {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (tokens, last_refill_ms) = split(raw)?;
        let tokens = tokens
            .parse::<u64>()
            .map_err(|_| CodecError::InvalidTokens(tokens.to_string()))?;
        Ok(Self {
            tokens,
            last_refill_ms,
        })
    }
}

impl fmt::Display for LeakyBucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.last_leak_ms)
    }
}

impl FromStr for LeakyBucketState {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (level, last_leak_ms) = split(raw)?;
        let parsed = level
            .parse::<f64>()
            .map_err(|_| CodecError::InvalidLevel(level.to_string()))?;
        if !parsed.is_finite() || parsed < 0.0 {
            return Err(CodecError::InvalidLevel(level.to_string()));
        }
        Ok(Self {
            level: parsed,
            last_leak_ms,
        })
    }
}
