//! Idempotency-key deduplication.
//!
//! A client-supplied key is bound to a hash of the request that first used it.
//! Replaying the same request returns the first response verbatim; reusing the
//! key for a different request is a conflict. Records expire after a TTL and
//! expired records behave as if they were never written.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::constants::IDEMPOTENCY_TTL_SECS;
use crate::error::RelayError;

/// A response stored under an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub content_hash: String,
    pub status: u16,
    pub body: Vec<u8>,
    /// Unix seconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Result of checking a key against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyLookup {
    /// Same key and same request: replay this response.
    Hit(CachedResponse),
    /// Key unknown or expired: execute the request.
    Miss,
    /// Key already bound to a different request.
    Conflict,
}

/// SHA-256 (hex) over the method, path and body, each length-prefixed so
/// that no two distinct requests share an encoding.
pub fn content_hash(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for field in [method.as_bytes(), path.as_bytes(), body] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    alloy_primitives::hex::encode(hasher.finalize())
}

/// Storage backend for idempotency records.
///
/// Implementations must be thread-safe (`Send + Sync`). Expiry policy lives in
/// [`IdempotencyCache`]; stores only keep rows.
pub trait IdempotencyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<IdempotencyRecord>;

    /// Insert unless a record for the key exists. Returns `true` if inserted.
    fn insert(&self, record: IdempotencyRecord) -> bool;

    fn remove(&self, key: &str);

    /// Delete records created before `cutoff` (unix seconds). Returns number purged.
    fn purge_before(&self, cutoff: i64) -> usize;
}

/// In-memory store backed by DashMap. Lost on restart.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn get(&self, key: &str) -> Option<IdempotencyRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    fn insert(&self, record: IdempotencyRecord) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(record);
                true
            }
        }
    }

    fn remove(&self, key: &str) {
        self.records.remove(key);
    }

    fn purge_before(&self, cutoff: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.created_at >= cutoff);
        before - self.records.len()
    }
}

/// Persistent store backed by SQLite. Survives restarts.
#[cfg(feature = "full")]
pub struct SqliteIdempotencyStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

#[cfg(feature = "full")]
impl SqliteIdempotencyStore {
    /// Open (or create) the database at `path`. On Unix the file is restricted
    /// to 0600 since cached bodies can contain payment details.
    pub fn open(path: &str) -> Result<Self, RelayError> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| RelayError::StorageError(format!("open {path}: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS idempotency_records (
                key TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                status INTEGER NOT NULL,
                body BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_idempotency_created_at
                ON idempotency_records(created_at);
            PRAGMA journal_mode=WAL;",
        )
        .map_err(|e| RelayError::StorageError(format!("schema: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set idempotency database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("idempotency store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(feature = "full")]
impl IdempotencyStore for SqliteIdempotencyStore {
    fn get(&self, key: &str) -> Option<IdempotencyRecord> {
        let conn = self.conn();
        let result = conn.query_row(
            "SELECT key, content_hash, status, body, created_at
             FROM idempotency_records WHERE key = ?1",
            [key],
            |row| {
                Ok(IdempotencyRecord {
                    key: row.get(0)?,
                    content_hash: row.get(1)?,
                    status: row.get(2)?,
                    body: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        );
        match result {
            Ok(record) => Some(record),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                tracing::warn!(error = %e, "idempotency lookup failed");
                None
            }
        }
    }

    fn insert(&self, record: IdempotencyRecord) -> bool {
        let conn = self.conn();
        // PRIMARY KEY makes the insert atomic across processes sharing the file
        conn.execute(
            "INSERT INTO idempotency_records (key, content_hash, status, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.key,
                record.content_hash,
                record.status,
                record.body,
                record.created_at
            ],
        )
        .is_ok()
    }

    fn remove(&self, key: &str) {
        let conn = self.conn();
        if let Err(e) = conn.execute("DELETE FROM idempotency_records WHERE key = ?1", [key]) {
            tracing::error!(error = %e, "failed to remove idempotency record");
        }
    }

    fn purge_before(&self, cutoff: i64) -> usize {
        let conn = self.conn();
        match conn.execute(
            "DELETE FROM idempotency_records WHERE created_at < ?1",
            [cutoff],
        ) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "failed to purge idempotency records");
                0
            }
        }
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Idempotency policy over a store, plus per-key execution locks.
///
/// Holding the guard from [`IdempotencyCache::lock`] across lookup, handler
/// and store gives at-most-once execution for concurrent requests that share
/// a key.
#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<dyn IdempotencyStore>,
    ttl_secs: u64,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl IdempotencyCache {
    /// Maximum number of live key locks.
    const MAX_KEY_LOCKS: usize = 100_000;

    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            store,
            ttl_secs: IDEMPOTENCY_TTL_SECS,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryIdempotencyStore::new()))
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    fn is_expired(&self, record: &IdempotencyRecord, now: i64) -> bool {
        now.saturating_sub(record.created_at) >= self.ttl_secs as i64
    }

    pub fn lookup(&self, key: &str, hash: &str) -> IdempotencyLookup {
        self.lookup_at(key, hash, unix_now())
    }

    pub fn lookup_at(&self, key: &str, hash: &str, now: i64) -> IdempotencyLookup {
        match self.store.get(key) {
            Some(record) if self.is_expired(&record, now) => IdempotencyLookup::Miss,
            Some(record) if record.content_hash == hash => {
                IdempotencyLookup::Hit(CachedResponse {
                    status: record.status,
                    body: record.body,
                })
            }
            Some(_) => IdempotencyLookup::Conflict,
            None => IdempotencyLookup::Miss,
        }
    }

    /// Bind `key` to this response. A live record is never overwritten;
    /// returns `false` in that case.
    pub fn store(&self, key: &str, hash: &str, status: u16, body: Vec<u8>) -> bool {
        self.store_at(key, hash, status, body, unix_now())
    }

    pub fn store_at(&self, key: &str, hash: &str, status: u16, body: Vec<u8>, now: i64) -> bool {
        if let Some(existing) = self.store.get(key) {
            if !self.is_expired(&existing, now) {
                return false;
            }
            self.store.remove(key);
        }
        self.store.insert(IdempotencyRecord {
            key: key.to_string(),
            content_hash: hash.to_string(),
            status,
            body,
            created_at: now,
        })
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(unix_now())
    }

    pub fn purge_expired_at(&self, now: i64) -> usize {
        self.store
            .purge_before(now.saturating_sub(self.ttl_secs as i64))
    }

    /// Acquire the execution lock for `key`.
    pub async fn lock(&self, key: &str) -> Result<OwnedMutexGuard<()>, RelayError> {
        if self.locks.len() >= Self::MAX_KEY_LOCKS && !self.locks.contains_key(key) {
            return Err(RelayError::StorageError(
                "too many in-flight idempotency keys".to_string(),
            ));
        }
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Ok(lock.lock_owned().await)
    }

    /// Drop locks nobody holds or waits on. Returns number removed.
    pub fn cleanup_idle_locks(&self) -> usize {
        let before = self.locks.len();
        // strong_count alone races with a concurrent lock() cloning the Arc
        self.locks
            .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
        before - self.locks.len()
    }

    /// Spawn a task that purges expired records and idle locks every 60 seconds.
    pub fn start_cleanup(&self) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::info!(purged, "purged expired idempotency records");
                }
                let removed = cache.cleanup_idle_locks();
                if removed > 0 {
                    tracing::debug!(removed, "cleaned up idle idempotency locks");
                }
            }
        });
    }
}

impl std::fmt::Debug for IdempotencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("ttl_secs", &self.ttl_secs)
            .field("locks", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn content_hash_distinguishes_field_boundaries() {
        assert_ne!(content_hash("POST", "/ab", b"c"), content_hash("POST", "/a", b"bc"));
        assert_eq!(content_hash("POST", "/a", b"{}"), content_hash("POST", "/a", b"{}"));
        assert_eq!(content_hash("POST", "/a", b"{}").len(), 64);
    }

    #[test]
    fn replay_returns_first_response() {
        let cache = IdempotencyCache::in_memory();
        let hash = content_hash("POST", "/escrow/deposit", b"{\"a\":1}");
        assert_eq!(cache.lookup_at("k1", &hash, NOW), IdempotencyLookup::Miss);
        assert!(cache.store_at("k1", &hash, 200, b"first".to_vec(), NOW));

        assert_eq!(
            cache.lookup_at("k1", &hash, NOW + 10),
            IdempotencyLookup::Hit(CachedResponse {
                status: 200,
                body: b"first".to_vec()
            })
        );
    }

    #[test]
    fn different_body_same_key_conflicts() {
        let cache = IdempotencyCache::in_memory();
        let a = content_hash("POST", "/x", b"{\"amount\":\"1\"}");
        let b = content_hash("POST", "/x", b"{\"amount\":\"2\"}");
        cache.store_at("k", &a, 201, b"ok".to_vec(), NOW);
        assert_eq!(cache.lookup_at("k", &b, NOW), IdempotencyLookup::Conflict);
    }

    #[test]
    fn live_records_are_never_overwritten() {
        let cache = IdempotencyCache::in_memory();
        let hash = content_hash("POST", "/x", b"{}");
        assert!(cache.store_at("k", &hash, 200, b"one".to_vec(), NOW));
        assert!(!cache.store_at("k", &hash, 200, b"two".to_vec(), NOW + 1));
        assert!(matches!(
            cache.lookup_at("k", &hash, NOW + 2),
            IdempotencyLookup::Hit(r) if r.body == b"one"
        ));
    }

    #[test]
    fn expired_records_behave_as_absent() {
        let cache = IdempotencyCache::in_memory().with_ttl(60);
        let a = content_hash("POST", "/x", b"a");
        let b = content_hash("POST", "/x", b"b");
        cache.store_at("k", &a, 200, b"one".to_vec(), NOW);

        assert_eq!(cache.lookup_at("k", &b, NOW + 60), IdempotencyLookup::Miss);
        assert!(cache.store_at("k", &b, 200, b"two".to_vec(), NOW + 60));
        assert!(matches!(
            cache.lookup_at("k", &b, NOW + 61),
            IdempotencyLookup::Hit(r) if r.body == b"two"
        ));
    }

    #[test]
    fn purge_removes_only_expired() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let cache = IdempotencyCache::new(store.clone()).with_ttl(100);
        cache.store_at("old", "h", 200, Vec::new(), NOW - 500);
        cache.store_at("new", "h", 200, Vec::new(), NOW - 10);
        assert_eq!(cache.purge_expired_at(NOW), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("new").is_some());
    }

    #[tokio::test]
    async fn key_lock_serializes_same_key() {
        let cache = IdempotencyCache::in_memory();
        let guard = cache.lock("k").await.unwrap();

        let other = cache.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("k").await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // a different key is not blocked
        let _g2 = cache.lock("other").await.unwrap();

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn idle_locks_are_cleaned_up() {
        let cache = IdempotencyCache::in_memory();
        let held = cache.lock("held").await.unwrap();
        drop(cache.lock("idle").await.unwrap());
        assert_eq!(cache.cleanup_idle_locks(), 1);
        drop(held);
        assert_eq!(cache.cleanup_idle_locks(), 1);
    }

    #[cfg(feature = "full")]
    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idem.db");
        let path = path.to_str().unwrap();
        let hash = content_hash("POST", "/x", b"{}");
        {
            let cache = IdempotencyCache::new(Arc::new(SqliteIdempotencyStore::open(path).unwrap()));
            assert!(cache.store_at("k", &hash, 201, b"body".to_vec(), NOW));
            assert!(!cache.store_at("k", &hash, 201, b"again".to_vec(), NOW));
        }
        let cache = IdempotencyCache::new(Arc::new(SqliteIdempotencyStore::open(path).unwrap()));
        assert_eq!(
            cache.lookup_at("k", &hash, NOW + 1),
            IdempotencyLookup::Hit(CachedResponse {
                status: 201,
                body: b"body".to_vec()
            })
        );
        assert_eq!(cache.purge_expired_at(NOW + 100_000), 1);
        assert_eq!(cache.lookup_at("k", &hash, NOW + 1), IdempotencyLookup::Miss);
    }
}
