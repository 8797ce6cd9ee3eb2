//! Limiter configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{RateLimitKey, Scope, StrategyKind};

/// Sliding-window parameters: at most `max_requests` in any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowParams {
    pub max_requests: u64,
    pub window: Duration,
}

/// Token-bucket parameters: bursts up to `capacity`, one token per `refill_period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketParams {
    pub capacity: u64,
    pub refill_period: Duration,
}

/// Leaky-bucket parameters: at most `capacity` droplets queued, one drains per `leak_period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakyBucketParams {
    pub capacity: u64,
    pub leak_period: Duration,
}

/// Strategy and parameters for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyConfig {
    SlidingWindow(SlidingWindowParams),
    TokenBucket(TokenBucketParams),
    LeakyBucket(LeakyBucketParams),
}

impl StrategyConfig {
    pub fn sliding_window(max_requests: u64, window: Duration) -> Self {
        StrategyConfig::SlidingWindow(SlidingWindowParams {
            max_requests,
            window,
        })
    }

    pub fn token_bucket(capacity: u64, refill_period: Duration) -> Self {
        StrategyConfig::TokenBucket(TokenBucketParams {
            capacity,
            refill_period,
        })
    }

    pub fn leaky_bucket(capacity: u64, leak_period: Duration) -> Self {
        StrategyConfig::LeakyBucket(LeakyBucketParams {
            capacity,
            leak_period,
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::SlidingWindow(_) => StrategyKind::SlidingWindow,
            StrategyConfig::TokenBucket(_) => StrategyKind::TokenBucket,
            StrategyConfig::LeakyBucket(_) => StrategyKind::LeakyBucket,
        }
    }

    pub fn capacity(&self) -> u64 {
        match self {
            StrategyConfig::SlidingWindow(p) => p.max_requests,
            StrategyConfig::TokenBucket(p) => p.capacity,
            StrategyConfig::LeakyBucket(p) => p.capacity,
        }
    }

    /// Sustained calls per second the configuration allows.
    pub fn allowed_rate_per_sec(&self) -> f64 {
        let (calls, period) = match self {
            StrategyConfig::SlidingWindow(p) => (p.max_requests as f64, p.window),
            StrategyConfig::TokenBucket(p) => (1.0, p.refill_period),
            StrategyConfig::LeakyBucket(p) => (1.0, p.leak_period),
        };
        let secs = period.as_secs_f64();
        if secs > 0.0 { calls / secs } else { f64::INFINITY }
    }
}

/// What to do when the store cannot produce a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit the call and log a warning.
    FailOpen,
    /// Reject the call with a store-derived rejection.
    FailClosed,
    /// Surface the store error to the caller.
    FailClosedWithError,
}

impl FailurePolicy {
    /// Compliance-paced (leaky bucket) scopes fail closed; best-effort scopes fail open.
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::LeakyBucket => FailurePolicy::FailClosed,
            StrategyKind::SlidingWindow | StrategyKind::TokenBucket => FailurePolicy::FailOpen,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "open" | "fail-open" => Ok(FailurePolicy::FailOpen),
            "closed" | "fail-closed" => Ok(FailurePolicy::FailClosed),
            "error" | "fail-closed-with-error" => Ok(FailurePolicy::FailClosedWithError),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::FailOpen => "fail-open",
            FailurePolicy::FailClosed => "fail-closed",
            FailurePolicy::FailClosedWithError => "fail-closed-with-error",
        })
    }
}

/// Everything the limiter needs to decide for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopePolicy {
    pub strategy: StrategyConfig,
    pub on_store_failure: FailurePolicy,
}

impl ScopePolicy {
    pub fn new(strategy: StrategyConfig) -> Self {
        Self {
            strategy,
            on_store_failure: FailurePolicy::default_for(strategy.kind()),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_store_failure = policy;
        self
    }
}

/// Limiter configuration.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Prefix of every store key.
    pub key_prefix: String,
    /// Expiry of bucket state and request counters after their last write.
    pub state_ttl: Duration,
    /// Deadline for a single store call.
    pub store_timeout: Duration,
    /// Retries of idempotent store calls after transient failures.
    pub max_retries: u32,
    /// First retry delay; doubles per retry.
    pub retry_backoff: Duration,
    /// Compare-and-set attempts for one bucket update.
    pub max_cas_attempts: u32,
    /// Maintain a per-key counter and last-admission time (extra writes per
    /// admitted call). Stats need it for `request_count` and for the token
    /// bucket's `last_request_at`.
    pub track_request_counts: bool,
    pub scopes: HashMap<Scope, ScopePolicy>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        let scopes = HashMap::from([
            (
                Scope::CORPORATE,
                ScopePolicy::new(StrategyConfig::sliding_window(100, Duration::from_secs(60))),
            ),
            (
                Scope::HIGH_FREQUENCY,
                ScopePolicy::new(StrategyConfig::token_bucket(1000, Duration::from_millis(10))),
            ),
            (
                Scope::COMPLIANCE,
                ScopePolicy::new(StrategyConfig::leaky_bucket(10, Duration::from_secs(1))),
            ),
        ]);

        Self {
            key_prefix: "ratelimit".to_string(),
            state_ttl: Duration::from_secs(15 * 60),
            store_timeout: Duration::from_millis(250),
            max_retries: 2,
            retry_backoff: Duration::from_millis(10),
            max_cas_attempts: 8,
            track_request_counts: true,
            scopes,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(|ms| Duration::from_millis(ms.max(1)))
}

impl LimiterConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let corporate = StrategyConfig::sliding_window(
            env_parse("RATE_LIMIT_CORPORATE_MAX_REQUESTS").unwrap_or(100),
            env_millis("RATE_LIMIT_CORPORATE_WINDOW_MS").unwrap_or(Duration::from_secs(60)),
        );
        let high_frequency = StrategyConfig::token_bucket(
            env_parse("RATE_LIMIT_HF_CAPACITY").unwrap_or(1000),
            env_millis("RATE_LIMIT_HF_REFILL_MS").unwrap_or(Duration::from_millis(10)),
        );
        let compliance = StrategyConfig::leaky_bucket(
            env_parse("RATE_LIMIT_COMPLIANCE_CAPACITY").unwrap_or(10),
            env_millis("RATE_LIMIT_COMPLIANCE_LEAK_MS").unwrap_or(Duration::from_secs(1)),
        );

        let mut config = Self {
            key_prefix: env::var("RATE_LIMIT_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            state_ttl: env_parse::<u64>("RATE_LIMIT_STATE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.state_ttl),
            store_timeout: env_millis("RATE_LIMIT_STORE_TIMEOUT_MS")
                .unwrap_or(defaults.store_timeout),
            max_retries: env_parse("RATE_LIMIT_STORE_RETRIES").unwrap_or(defaults.max_retries),
            retry_backoff: env_millis("RATE_LIMIT_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.retry_backoff),
            max_cas_attempts: env_parse::<u32>("RATE_LIMIT_CAS_ATTEMPTS")
                .unwrap_or(defaults.max_cas_attempts)
                .max(1),
            track_request_counts: env::var("RATE_LIMIT_TRACK_REQUEST_COUNTS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.track_request_counts),
            scopes: HashMap::new(),
        };

        for (scope, strategy) in [
            (Scope::CORPORATE, corporate),
            (Scope::HIGH_FREQUENCY, high_frequency),
            (Scope::COMPLIANCE, compliance),
        ] {
            let var = format!("RATE_LIMIT_{}_ON_STORE_FAILURE", scope.env_name());
            let mut policy = ScopePolicy::new(strategy);
            if let Ok(raw) = env::var(&var) {
                match raw.parse() {
                    Ok(parsed) => policy = policy.with_failure_policy(parsed),
                    Err(e) => tracing::warn!(var = %var, error = %e, "Ignoring invalid failure policy"),
                }
            }
            config.scopes.insert(scope, policy);
        }

        config
    }

    /// Register or replace the policy for a scope.
    pub fn with_scope(mut self, scope: Scope, policy: ScopePolicy) -> Self {
        self.scopes.insert(scope, policy);
        self
    }

    pub fn policy(&self, scope: &Scope) -> Option<&ScopePolicy> {
        self.scopes.get(scope)
    }

    /// Build the key for a call, using the strategy class configured for `scope`.
    pub fn key_for(&self, scope: &Scope, principal: &str, api: &str) -> Option<RateLimitKey> {
        self.policy(scope)
            .map(|policy| RateLimitKey::new(scope.clone(), principal, api, policy.strategy.kind()))
    }
}
