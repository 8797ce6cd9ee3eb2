//! Limiter-level error types.

use std::fmt;

use thiserror::Error;

use crate::domain::{RateLimitKey, Scope, StrategyKind};
use crate::ports::StoreError;

/// Infrastructure fault behind a fail-closed rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    Timeout,
    Unavailable,
    /// Optimistic updates kept losing to concurrent writers.
    Contended,
    Failed,
}

impl From<&StoreError> for StoreFault {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Timeout(_) => StoreFault::Timeout,
            StoreError::Unavailable(_) => StoreFault::Unavailable,
            StoreError::Conflict { .. } => StoreFault::Contended,
            StoreError::Operation(_) => StoreFault::Failed,
        }
    }
}

impl fmt::Display for StoreFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreFault::Timeout => "timed out",
            StoreFault::Unavailable => "unavailable",
            StoreFault::Contended => "contended",
            StoreFault::Failed => "failed",
        })
    }
}

/// Errors surfaced by the rate limiter facade.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The key is over its configured limit. Expected control flow, not a fault.
    #[error("Rate limit exceeded for {key} ({})", .key.strategy)]
    Exceeded { key: RateLimitKey },

    /// The store failed and the scope is configured fail-closed.
    #[error("Call rejected for {key} ({}): rate limit store {fault}", .key.strategy)]
    StoreRejected { key: RateLimitKey, fault: StoreFault },

    /// The store failed and the scope is configured to surface store errors.
    #[error("Rate limit store failure for {key} ({})", .key.strategy)]
    Store {
        key: RateLimitKey,
        #[source]
        source: StoreError,
    },

    #[error("No rate limit policy configured for scope {0}")]
    UnknownScope(Scope),
}

impl RateLimitError {
    /// Whether the call was turned away (over limit or fail-closed), as opposed
    /// to failing with an error.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RateLimitError::Exceeded { .. } | RateLimitError::StoreRejected { .. }
        )
    }

    pub fn key(&self) -> Option<&RateLimitKey> {
        match self {
            RateLimitError::Exceeded { key }
            | RateLimitError::StoreRejected { key, .. }
            | RateLimitError::Store { key, .. } => Some(key),
            RateLimitError::UnknownScope(_) => None,
        }
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        self.key().map(|key| key.strategy)
    }
}

/// Errors from the stats reporter.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("No rate limit policy configured for scope {0}")]
    UnknownScope(Scope),

    #[error("Failed to read limiter state: {0}")]
    Store(#[from] StoreError),
}
