//! Domain types - keys, bucket state and its wire codec, stats snapshots.

mod bucket;
mod codec;
mod key;
mod stats;

pub use bucket::{LeakyBucketState, TokenBucketState};
pub use codec::CodecError;
pub use key::{RateLimitKey, Scope, StrategyKind};
pub use stats::RateLimitStats;
