//! Rate limit keys, scopes and strategy classes.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A named traffic class, mapped to one strategy and parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    /// Bursty corporate API calls.
    pub const CORPORATE: Scope = Scope(Cow::Borrowed("corporate"));
    /// High-frequency machine-to-machine calls.
    pub const HIGH_FREQUENCY: Scope = Scope(Cow::Borrowed("hf"));
    /// Strictly paced, compliance-critical calls.
    pub const COMPLIANCE: Scope = Scope(Cow::Borrowed("compliance"));

    pub fn new(name: impl Into<String>) -> Self {
        Scope(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased form used in environment variable names (`hf` -> `HF`).
    pub fn env_name(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        match name {
            "corporate" => Scope::CORPORATE,
            "hf" => Scope::HIGH_FREQUENCY,
            "compliance" => Scope::COMPLIANCE,
            other => Scope::new(other),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The limiting algorithm backing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    SlidingWindow,
    TokenBucket,
    LeakyBucket,
}

impl StrategyKind {
    /// Short tag embedded in store keys.
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyKind::SlidingWindow => "sw",
            StrategyKind::TokenBucket => "tb",
            StrategyKind::LeakyBucket => "lb",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SlidingWindow => "sliding_window",
            StrategyKind::TokenBucket => "token_bucket",
            StrategyKind::LeakyBucket => "leaky_bucket",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one limiter state in the shared store.
///
/// Composed of scope, principal and API name, plus the strategy class of the
/// scope so that reconfiguring a scope never reinterprets state written by a
/// different algorithm. Components are escaped, so distinct tuples always
/// render to distinct store keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
    pub scope: Scope,
    pub principal: String,
    pub api: String,
    pub strategy: StrategyKind,
}

impl RateLimitKey {
    pub fn new(
        scope: Scope,
        principal: impl Into<String>,
        api: impl Into<String>,
        strategy: StrategyKind,
    ) -> Self {
        Self {
            scope,
            principal: principal.into(),
            api: api.into(),
            strategy,
        }
    }

    /// Full store key: `<prefix>:<strategy>:<scope>:<principal>:<api>`.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}:{}", escape(prefix), self)
    }

    /// Key of the request counter that accompanies the limiter state.
    pub fn counter_key(&self, prefix: &str) -> String {
        format!("{}:count", self.storage_key(prefix))
    }

    /// Key holding the time of the last admitted call, in epoch milliseconds.
    pub fn last_request_key(&self, prefix: &str) -> String {
        format!("{}:last", self.storage_key(prefix))
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.strategy.tag(),
            escape(self.scope.as_str()),
            escape(&self.principal),
            escape(&self.api)
        )
    }
}

fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains(['%', ':']) {
        return Cow::Borrowed(component);
    }

    let mut escaped = String::with_capacity(component.len() + 4);
    for ch in component.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
