use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tollgate_core::ports::{ManualClock, StateStore, StoreError, WindowAdmission, WindowOutcome};
use tollgate_core::{LimiterConfig, ScopePolicy, ScopedRateLimiter, Scope};

use crate::{InMemoryStateStore, InMemoryTelemetry};

/// Failure mode injected by [`FlakyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Healthy,
    /// Every call hangs until the caller's deadline fires.
    Hang,
    /// Every call fails as if the connection were refused.
    Down,
    /// Every compare-and-set loses to a concurrent writer.
    LoseRaces,
}

/// In-memory store with switchable fault injection.
pub struct FlakyStore {
    inner: InMemoryStateStore,
    fault: Mutex<Fault>,
    fail_next: AtomicU32,
    calls: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStateStore::new(),
            fault: Mutex::new(Fault::Healthy),
            fail_next: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap() = fault;
    }

    /// Fail the next `n` calls as unavailable, then recover.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryStateStore {
        &self.inner
    }

    async fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = *self.fault.lock().unwrap();
        match fault {
            Fault::Hang => std::future::pending().await,
            Fault::Down => Err(StoreError::Unavailable("connection refused".to_string())),
            Fault::Healthy | Fault::LoseRaces => {
                let pending = self.fail_next.load(Ordering::SeqCst);
                if pending > 0 {
                    self.fail_next.store(pending - 1, Ordering::SeqCst);
                    return Err(StoreError::Unavailable("connection reset".to_string()));
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check().await?;
        if *self.fault.lock().unwrap() == Fault::LoseRaces {
            return Ok(false);
        }
        self.inner.compare_and_set(key, expected, value, ttl).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.check().await?;
        self.inner.increment(key, ttl).await
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        self.check().await?;
        self.inner.zadd(key, score, member).await
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        self.check().await?;
        self.inner.zrem_range_by_score(key, min, max).await
    }

    async fn zcount(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        self.check().await?;
        self.inner.zcount(key, min, max).await
    }

    async fn zmax_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.check().await?;
        self.inner.zmax_score(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check().await?;
        self.inner.expire(key, ttl).await
    }

    async fn sliding_window_admit(
        &self,
        admission: &WindowAdmission<'_>,
    ) -> Result<WindowOutcome, StoreError> {
        self.check().await?;
        self.inner.sliding_window_admit(admission).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check().await
    }
}

/// In-memory store that yields to the scheduler around every read and
/// admission, so callers joined on one task genuinely interleave.
pub struct InterleavedStore {
    inner: InMemoryStateStore,
    lost_races: AtomicU32,
}

impl InterleavedStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStateStore::new(),
            lost_races: AtomicU32::new(0),
        }
    }

    /// Compare-and-set calls that found the value changed under them.
    pub fn lost_races(&self) -> u32 {
        self.lost_races.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for InterleavedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.inner.get(key).await;
        // everyone reads before anyone writes
        tokio::task::yield_now().await;
        value
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let written = self.inner.compare_and_set(key, expected, value, ttl).await?;
        if !written {
            self.lost_races.fetch_add(1, Ordering::SeqCst);
        }
        Ok(written)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.inner.increment(key, ttl).await
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        self.inner.zadd(key, score, member).await
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        self.inner.zrem_range_by_score(key, min, max).await
    }

    async fn zcount(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        self.inner.zcount(key, min, max).await
    }

    async fn zmax_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.inner.zmax_score(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }

    async fn sliding_window_admit(
        &self,
        admission: &WindowAdmission<'_>,
    ) -> Result<WindowOutcome, StoreError> {
        tokio::task::yield_now().await;
        self.inner.sliding_window_admit(admission).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Limiter wired to a manual clock at `t=0` and in-memory telemetry.
pub struct Harness<S> {
    pub limiter: ScopedRateLimiter,
    pub store: Arc<S>,
    pub clock: Arc<ManualClock>,
    pub telemetry: Arc<InMemoryTelemetry>,
}

impl<S: StateStore + 'static> Harness<S> {
    pub fn with_store(config: LimiterConfig, store: S) -> Self {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(0));
        let telemetry = Arc::new(InMemoryTelemetry::new());

        let limiter = ScopedRateLimiter::builder(config, store.clone())
            .clock(clock.clone())
            .telemetry(telemetry.clone())
            .build();

        Self {
            limiter,
            store,
            clock,
            telemetry,
        }
    }

    /// Admission decision for `principal` on `api` at time `at_ms`.
    pub async fn admit_at(&self, scope: &Scope, principal: &str, api: &str, at_ms: i64) -> bool {
        self.clock.set(at_ms);
        self.limiter.acquire(scope, principal, api).await.is_ok()
    }
}

pub fn harness(config: LimiterConfig) -> Harness<InMemoryStateStore> {
    Harness::with_store(config, InMemoryStateStore::new())
}

pub fn flaky_harness(config: LimiterConfig) -> Harness<FlakyStore> {
    Harness::with_store(config, FlakyStore::new())
}

pub fn interleaved_harness(config: LimiterConfig) -> Harness<InterleavedStore> {
    Harness::with_store(config, InterleavedStore::new())
}

/// Default configuration with `scope` replaced by `policy`.
pub fn config_with(scope: Scope, policy: ScopePolicy) -> LimiterConfig {
    LimiterConfig::default().with_scope(scope, policy)
}
