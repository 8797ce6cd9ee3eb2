//! In-memory state store - single-process stand-in for Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockWriteGuard};

use tollgate_core::ports::{StateStore, StoreError, WindowAdmission, WindowOutcome};

enum Value {
    Str(String),
    /// Members ordered by score, then insertion.
    ZSet(Vec<(i64, String)>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Operation(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

/// Writes between two full sweeps of expired entries.
const SWEEP_EVERY: u64 = 1024;

/// In-memory store with the same semantics as the Redis adapter.
///
/// Every mutation runs under one async write lock, which makes the compound
/// operations atomic. Expired entries are dropped when touched, and a full
/// sweep runs every [`SWEEP_EVERY`] writes so keys that are never read again
/// do not pile up. Suitable for tests and single-instance deployments;
/// state is not shared across processes and is lost on restart.
pub struct InMemoryStateStore {
    store: RwLock<HashMap<String, Entry>>,
    writes: AtomicU64,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.write().await;
        Self::sweep(&mut store)
    }

    fn sweep(store: &mut HashMap<String, Entry>) -> usize {
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired());
        before - store.len()
    }

    /// Write lock with `key` cleared if it has expired, sweeping the whole
    /// map when one is due.
    async fn write_for(&self, key: &str) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        let mut store = self.store.write().await;
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let removed = Self::sweep(&mut store);
            if removed > 0 {
                tracing::debug!(removed, remaining = store.len(), "Swept expired state");
            }
        } else if store.get(key).is_some_and(Entry::is_expired) {
            store.remove(key);
        }
        store
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.values().filter(|entry| !entry.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn live_string<'a>(
        store: &'a HashMap<String, Entry>,
        key: &str,
    ) -> Result<Option<&'a str>, StoreError> {
        match store.get(key) {
            Some(entry) if entry.is_expired() => Ok(None),
            Some(Entry {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.as_str())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    /// Remove the set at `key` for modification. Callers put it back with
    /// [`Self::put_zset`].
    fn take_zset(
        store: &mut HashMap<String, Entry>,
        key: &str,
    ) -> Result<(Vec<(i64, String)>, Option<Instant>), StoreError> {
        match store.remove(key) {
            None => Ok((Vec::new(), None)),
            Some(entry) if entry.is_expired() => Ok((Vec::new(), None)),
            Some(Entry {
                value: Value::ZSet(members),
                expires_at,
            }) => Ok((members, expires_at)),
            Some(other) => {
                store.insert(key.to_string(), other);
                Err(wrong_type(key))
            }
        }
    }

    /// Empty sets are dropped, as Redis does.
    fn put_zset(
        store: &mut HashMap<String, Entry>,
        key: &str,
        members: Vec<(i64, String)>,
        expires_at: Option<Instant>,
    ) {
        if !members.is_empty() {
            store.insert(
                key.to_string(),
                Entry {
                    value: Value::ZSet(members),
                    expires_at,
                },
            );
        }
    }

    fn insert_member(members: &mut Vec<(i64, String)>, score: i64, member: &str) {
        members.retain(|(_, m)| m != member);
        let at = members.partition_point(|(s, _)| *s <= score);
        members.insert(at, (score, member.to_string()));
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let store = self.store.read().await;
        if store.get(key).is_some_and(Entry::is_expired) {
            drop(store);
            // Clean up expired entry with write lock
            let mut store = self.store.write().await;
            if store.get(key).is_some_and(Entry::is_expired) {
                store.remove(key);
            }
            return Ok(None);
        }
        Ok(Self::live_string(&store, key)?.map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut store = self.write_for(key).await;
        store.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut store = self.write_for(key).await;
        if Self::live_string(&store, key)? != expected {
            return Ok(false);
        }

        store.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut store = self.write_for(key).await;
        let current = match Self::live_string(&store, key)? {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                StoreError::Operation(format!("value at {key} is not an integer"))
            })?,
            None => 0,
        };

        let next = current + 1;
        store.insert(
            key.to_string(),
            Entry {
                value: Value::Str(next.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(next)
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let mut store = self.write_for(key).await;
        let (mut members, expires_at) = Self::take_zset(&mut store, key)?;
        Self::insert_member(&mut members, score, member);
        Self::put_zset(&mut store, key, members, expires_at);
        Ok(())
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        let mut store = self.write_for(key).await;
        let (mut members, expires_at) = Self::take_zset(&mut store, key)?;
        let before = members.len();
        members.retain(|(score, _)| *score < min || *score > max);
        let removed = (before - members.len()) as u64;
        Self::put_zset(&mut store, key, members, expires_at);
        Ok(removed)
    }

    async fn zcount(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) if entry.is_expired() => Ok(0),
            Some(Entry {
                value: Value::ZSet(members),
                ..
            }) => Ok(members
                .iter()
                .filter(|(score, _)| (min..=max).contains(score))
                .count() as u64),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn zmax_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) if entry.is_expired() => Ok(None),
            Some(Entry {
                value: Value::ZSet(members),
                ..
            }) => Ok(members.last().map(|(score, _)| *score)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut store = self.write_for(key).await;
        match store.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sliding_window_admit(
        &self,
        admission: &WindowAdmission<'_>,
    ) -> Result<WindowOutcome, StoreError> {
        let mut store = self.write_for(admission.key).await;
        let (mut members, expires_at) = Self::take_zset(&mut store, admission.key)?;

        members.retain(|(score, _)| *score >= admission.window_start_ms);

        if members.iter().any(|(_, m)| m == admission.member) {
            let count = members.len() as u64;
            Self::put_zset(&mut store, admission.key, members, expires_at);
            return Ok(WindowOutcome {
                admitted: true,
                count,
            });
        }

        let count = members
            .iter()
            .filter(|(score, _)| *score <= admission.now_ms)
            .count() as u64;
        if count >= admission.max_requests {
            Self::put_zset(&mut store, admission.key, members, expires_at);
            return Ok(WindowOutcome {
                admitted: false,
                count,
            });
        }

        Self::insert_member(&mut members, admission.now_ms, admission.member);
        Self::put_zset(
            &mut store,
            admission.key,
            members,
            Some(Instant::now() + admission.ttl),
        );
        Ok(WindowOutcome {
            admitted: true,
            count: count + 1,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStateStore::new();
        store.set("key1", "value1", TTL).await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_expired_values_disappear() {
        let store = InMemoryStateStore::new();
        store.set("short", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(!store.expire("short", TTL).await.unwrap());
        assert!(store.is_empty().await);
    }

    async fn stored_entries(store: &InMemoryStateStore) -> usize {
        store.store.read().await.len()
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_when_read() {
        let store = InMemoryStateStore::new();
        store.set("short", "v", Duration::from_millis(20)).await.unwrap();
        store.increment("short:count", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(stored_entries(&store).await, 1);

        // a write to an expired counter starts over
        assert_eq!(store.increment("short:count", TTL).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keys_never_touched_again_are_swept() {
        let store = InMemoryStateStore::new();
        for principal in 0..100 {
            store
                .set(&format!("bucket:{principal}"), "0:0", Duration::from_millis(20))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(stored_entries(&store).await, 100);

        for _ in 0..SWEEP_EVERY {
            store.increment("live:count", TTL).await.unwrap();
        }

        assert_eq!(stored_entries(&store).await, 1);
        assert_eq!(store.get("live:count").await.unwrap(), Some(SWEEP_EVERY.to_string()));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStateStore::new();
        store.set("old", "1", Duration::from_millis(20)).await.unwrap();
        store.zadd("window", 1, "m").await.unwrap();
        store.expire("window", Duration::from_millis(20)).await.unwrap();
        store.set("fresh", "2", TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.purge_expired().await, 2);
        assert_eq!(stored_entries(&store).await, 1);
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = InMemoryStateStore::new();

        assert!(store.compare_and_set("k", None, "1:0", TTL).await.unwrap());
        assert!(!store.compare_and_set("k", None, "2:0", TTL).await.unwrap());
        assert!(!store.compare_and_set("k", Some("9:9"), "2:0", TTL).await.unwrap());
        assert!(store.compare_and_set("k", Some("1:0"), "2:0", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("2:0".to_string()));
    }

    #[tokio::test]
    async fn test_increment() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.increment("c", TTL).await.unwrap(), 1);
        assert_eq!(store.increment("c", TTL).await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap(), Some("2".to_string()));

        store.set("s", "abc", TTL).await.unwrap();
        assert!(store.increment("s", TTL).await.is_err());
    }

    #[tokio::test]
    async fn test_sorted_set_commands() {
        let store = InMemoryStateStore::new();
        store.zadd("z", 300, "c").await.unwrap();
        store.zadd("z", 100, "a").await.unwrap();
        store.zadd("z", 200, "b").await.unwrap();

        assert_eq!(store.zcount("z", 100, 200).await.unwrap(), 2);
        assert_eq!(store.zmax_score("z").await.unwrap(), Some(300));
        assert_eq!(store.zrem_range_by_score("z", i64::MIN, 199).await.unwrap(), 1);
        assert_eq!(store.zcount("z", i64::MIN, i64::MAX).await.unwrap(), 2);

        // re-adding a member moves it
        store.zadd("z", 50, "c").await.unwrap();
        assert_eq!(store.zmax_score("z").await.unwrap(), Some(200));

        assert!(store.expire("z", TTL).await.unwrap());
        assert_eq!(store.zrem_range_by_score("z", i64::MIN, i64::MAX).await.unwrap(), 2);
        assert_eq!(store.zmax_score("z").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let store = InMemoryStateStore::new();
        store.set("k", "v", TTL).await.unwrap();
        assert!(store.zadd("k", 1, "m").await.is_err());
        assert!(store.zcount("k", 0, 1).await.is_err());
        // the string survives the failed sorted-set command
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_sliding_window_admit_is_idempotent_per_member() {
        let store = InMemoryStateStore::new();
        let admission = WindowAdmission {
            key: "w",
            window_start_ms: 0,
            now_ms: 1_000,
            member: "call-1",
            max_requests: 1,
            ttl: TTL,
        };

        let first = store.sliding_window_admit(&admission).await.unwrap();
        let retried = store.sliding_window_admit(&admission).await.unwrap();
        assert_eq!(first, WindowOutcome { admitted: true, count: 1 });
        assert_eq!(retried, WindowOutcome { admitted: true, count: 1 });

        let other = WindowAdmission {
            member: "call-2",
            ..admission
        };
        let rejected = store.sliding_window_admit(&other).await.unwrap();
        assert_eq!(rejected, WindowOutcome { admitted: false, count: 1 });
    }
}
