//! SQLite-backed cache engine
//!
//! File-backed caches hold two connections: a writer guarded by the single
//! writer lock and a read-only reader, so lookups never queue behind a
//! mutation. In-memory caches share one connection for both roles.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::codec::{self, EMPTY_SENTINEL};
use super::schema::{initialize_schema, WRITER_PRAGMAS};
use super::{CacheError, CacheResult, CachedValue};
use crate::config::CacheConfig;

const SWEEP_SQL: &str = "DELETE FROM cache_items WHERE rowid IN (
    SELECT rowid FROM cache_items WHERE expires_at > 0 AND expires_at < ?1 LIMIT ?2
)";

const UPSERT_SQL: &str = "INSERT INTO cache_items
    (namespace, key, value_blob, value_format, compression, size_bytes, expires_at, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(namespace, key) DO UPDATE SET
        value_blob = excluded.value_blob,
        value_format = excluded.value_format,
        compression = excluded.compression,
        size_bytes = excluded.size_bytes,
        expires_at = excluded.expires_at,
        created_at = excluded.created_at";

/// Like [`UPSERT_SQL`] but only replaces rows that are already expired
const INSERT_ABSENT_SQL: &str = "INSERT INTO cache_items
    (namespace, key, value_blob, value_format, compression, size_bytes, expires_at, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(namespace, key) DO UPDATE SET
        value_blob = excluded.value_blob,
        value_format = excluded.value_format,
        compression = excluded.compression,
        size_bytes = excluded.size_bytes,
        expires_at = excluded.expires_at,
        created_at = excluded.created_at
    WHERE cache_items.expires_at != 0 AND cache_items.expires_at < excluded.created_at";

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
struct Limits {
    gzip_threshold: usize,
    max_item_bytes: usize,
    busy_timeout: Duration,
    cleanup_interval: Duration,
    cleanup_batch_size: u32,
}

impl From<&CacheConfig> for Limits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            gzip_threshold: config.gzip_threshold_bytes,
            max_item_bytes: config.max_item_bytes,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds.max(1)),
            cleanup_batch_size: config.cleanup_batch_size.max(1),
        }
    }
}

struct Handles {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

struct OpenCache {
    handles: Arc<Handles>,
    sweeper: JoinHandle<()>,
}

/// Outcome of a single-row lookup
enum Lookup {
    Missing,
    Expired,
    Found(CacheResult<CachedValue>, i64),
}

/// Aggregate numbers about the cache contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub expired_entries: u64,
    pub compressed_entries: u64,
    pub total_bytes: u64,
}

/// Namespaced TTL key/value store
///
/// The engine opens lazily: the first operation connects, creates the
/// schema, sweeps expired rows and starts the background sweeper. `open`
/// and `close` may both be called any number of times.
///
/// # Examples
///
/// ```no_run
/// use focusmine::cache::CacheEngine;
/// use focusmine::config::CacheConfig;
///
/// # async fn demo() -> focusmine::cache::CacheResult<()> {
/// let cache = CacheEngine::new(&CacheConfig::default());
/// cache.set("greeting", &"hello", 5, "demo").await?;
/// assert_eq!(cache.ttl("greeting", "demo").await?, 5);
/// cache.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheEngine {
    location: Location,
    limits: Limits,
    clock: Arc<dyn Clock>,
    state: RwLock<Option<OpenCache>>,
}

impl CacheEngine {
    /// Creates an engine backed by the file at `config.database_path`
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_location(Location::File(PathBuf::from(&config.database_path)), config)
    }

    /// Creates an engine backed by a private in-memory database
    ///
    /// Contents are lost on `close`.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::with_location(Location::Memory, config)
    }

    fn with_location(location: Location, config: &CacheConfig) -> Self {
        Self {
            location,
            limits: Limits::from(config),
            clock: Arc::new(SystemClock),
            state: RwLock::new(None),
        }
    }

    /// Replaces the time source used for expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns true while connections are held
    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Connects and sweeps; a no-op when already open
    pub async fn open(&self) -> CacheResult<()> {
        self.handles().await.map(|_| ())
    }

    /// Stops the background sweeper, runs a final sweep and releases the
    /// connections. A no-op when already closed.
    pub async fn close(&self) -> CacheResult<()> {
        let open = self.state.write().await.take();
        let Some(open) = open else {
            return Ok(());
        };

        open.sweeper.abort();
        let removed =
            sweep_all(&open.handles, self.clock.now(), self.limits.cleanup_batch_size).await?;
        info!("Cache closed ({} expired entries removed)", removed);
        Ok(())
    }

    /// Fetches a live value, deleting it if it turns out to be expired
    pub async fn get(&self, key: &str, namespace: &str) -> CacheResult<Option<CachedValue>> {
        Ok(self
            .get_with_expiry(key, namespace)
            .await?
            .map(|(value, _)| value))
    }

    /// Like [`get`](Self::get) but also returns the absolute expiry
    /// (Unix seconds, `0` for entries that never expire)
    ///
    /// Entries that fail to decode are reported as absent.
    pub async fn get_with_expiry(
        &self,
        key: &str,
        namespace: &str,
    ) -> CacheResult<Option<(CachedValue, i64)>> {
        let handles = self.handles().await?;
        let now = self.clock.now();
        let (ns, k) = (namespace.to_string(), key.to_string());

        let lookup = run_on(&handles.reader, move |conn| {
            let row = conn
                .query_row(
                    "SELECT value_blob, value_format, compression, expires_at
                     FROM cache_items WHERE namespace = ?1 AND key = ?2",
                    params![ns, k],
                    |row| {
                        Ok((
                            row.get::<_, Vec<u8>>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            Ok(match row {
                None => Lookup::Missing,
                Some((_, _, _, expires_at)) if is_expired(expires_at, now) => Lookup::Expired,
                Some((blob, format, compression, expires_at)) => {
                    Lookup::Found(codec::decode(&blob, &format, &compression), expires_at)
                }
            })
        })
        .await?;

        match lookup {
            Lookup::Missing => Ok(None),
            Lookup::Expired => {
                self.delete_expired(&handles, key, namespace, now).await?;
                Ok(None)
            }
            Lookup::Found(Ok(value), expires_at) => Ok(Some((value, expires_at))),
            Lookup::Found(Err(e), _) => {
                warn!("Unreadable cache entry {}:{}: {}", namespace, key, e);
                Ok(None)
            }
        }
    }

    /// Fetches a JSON value and deserializes it into `T`
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        namespace: &str,
    ) -> CacheResult<Option<T>> {
        Ok(self
            .get(key, namespace)
            .await?
            .and_then(CachedValue::into_typed))
    }

    /// Stores any serializable value as JSON
    ///
    /// See [`set_value`](Self::set_value) for the return value.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_minutes: u64,
        namespace: &str,
    ) -> CacheResult<bool> {
        self.set_value(key, CachedValue::json(value)?, ttl_minutes, namespace)
            .await
    }

    /// Stores opaque bytes
    pub async fn set_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl_minutes: u64,
        namespace: &str,
    ) -> CacheResult<bool> {
        self.set_value(key, CachedValue::Bytes(bytes), ttl_minutes, namespace)
            .await
    }

    /// Inserts or replaces an entry
    ///
    /// # Arguments
    ///
    /// * `key` - Entry key, unique within the namespace
    /// * `value` - Falsy values are replaced by [`EMPTY_SENTINEL`]
    /// * `ttl_minutes` - Lifetime; `0` means the entry never expires
    /// * `namespace` - Independent keyspace
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The entry was written
    /// * `Ok(false)` - The encoded payload exceeded the size limit and was dropped
    pub async fn set_value(
        &self,
        key: &str,
        value: CachedValue,
        ttl_minutes: u64,
        namespace: &str,
    ) -> CacheResult<bool> {
        self.write(key, value, ttl_minutes, namespace, UPSERT_SQL).await
    }

    /// Stores a value only when no live entry exists for the key
    ///
    /// The check and the write are one statement, so of several concurrent
    /// callers exactly one sees `Ok(true)`. Expired entries count as absent.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The entry was written
    /// * `Ok(false)` - A live entry already exists (or the payload was too large)
    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_minutes: u64,
        namespace: &str,
    ) -> CacheResult<bool> {
        self.write(key, CachedValue::json(value)?, ttl_minutes, namespace, INSERT_ABSENT_SQL)
            .await
    }

    async fn write(
        &self,
        key: &str,
        value: CachedValue,
        ttl_minutes: u64,
        namespace: &str,
        sql: &'static str,
    ) -> CacheResult<bool> {
        let handles = self.handles().await?;

        let value = if value.is_falsy() {
            CachedValue::Json(serde_json::Value::String(EMPTY_SENTINEL.to_string()))
        } else {
            value
        };

        let threshold = self.limits.gzip_threshold;
        let encoded = blocking(move || codec::encode(&value, threshold)).await?;

        if encoded.payload.len() > self.limits.max_item_bytes {
            warn!(
                "Not caching {}:{}: {} bytes exceeds the {} byte limit",
                namespace,
                key,
                encoded.payload.len(),
                self.limits.max_item_bytes
            );
            return Ok(false);
        }

        let now = self.clock.now();
        let expires_at = expiry_from(now, ttl_minutes);
        let (ns, k) = (namespace.to_string(), key.to_string());

        run_on(&handles.writer, move |conn| {
            let size = encoded.payload.len() as i64;
            let changed = conn.execute(
                sql,
                params![
                    ns,
                    k,
                    encoded.payload,
                    encoded.format,
                    encoded.compression,
                    size,
                    expires_at,
                    now
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Removes an entry, returning whether one existed
    pub async fn delete(&self, key: &str, namespace: &str) -> CacheResult<bool> {
        let handles = self.handles().await?;
        let (ns, k) = (namespace.to_string(), key.to_string());

        run_on(&handles.writer, move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache_items WHERE namespace = ?1 AND key = ?2",
                params![ns, k],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    /// Lists live keys in a namespace matching a glob (`*`, `?`, `[...]`)
    pub async fn keys(&self, pattern: &str, namespace: &str) -> CacheResult<Vec<String>> {
        let handles = self.handles().await?;
        let now = self.clock.now();
        let (ns, glob) = (namespace.to_string(), pattern.to_string());

        run_on(&handles.reader, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM cache_items
                 WHERE namespace = ?1 AND key GLOB ?2 AND (expires_at = 0 OR expires_at >= ?3)
                 ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![ns, glob, now], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
    }

    /// Remaining lifetime in whole minutes, rounded up
    ///
    /// # Returns
    ///
    /// * `-1` - No such entry (expired entries are deleted and count as absent)
    /// * `0` - The entry never expires
    /// * `n > 0` - Minutes left
    pub async fn ttl(&self, key: &str, namespace: &str) -> CacheResult<i64> {
        let handles = self.handles().await?;
        let now = self.clock.now();
        let (ns, k) = (namespace.to_string(), key.to_string());

        let expires_at = run_on(&handles.reader, move |conn| {
            let expires_at = conn
                .query_row(
                    "SELECT expires_at FROM cache_items WHERE namespace = ?1 AND key = ?2",
                    params![ns, k],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(expires_at)
        })
        .await?;

        match expires_at {
            None => Ok(-1),
            Some(0) => Ok(0),
            Some(at) if is_expired(at, now) => {
                self.delete_expired(&handles, key, namespace, now).await?;
                Ok(-1)
            }
            Some(at) => Ok(((at - now + 59) / 60).max(1)),
        }
    }

    /// Resets the lifetime of a live entry; `0` makes it permanent
    ///
    /// Returns false when the entry is absent or already expired.
    pub async fn update_ttl(
        &self,
        key: &str,
        ttl_minutes: u64,
        namespace: &str,
    ) -> CacheResult<bool> {
        let handles = self.handles().await?;
        let now = self.clock.now();
        let expires_at = expiry_from(now, ttl_minutes);
        let (ns, k) = (namespace.to_string(), key.to_string());

        run_on(&handles.writer, move |conn| {
            let changed = conn.execute(
                "UPDATE cache_items SET expires_at = ?1
                 WHERE namespace = ?2 AND key = ?3 AND (expires_at = 0 OR expires_at >= ?4)",
                params![expires_at, ns, k, now],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Deletes every expired entry now, returning how many were removed
    pub async fn sweep(&self) -> CacheResult<usize> {
        let handles = self.handles().await?;
        sweep_all(&handles, self.clock.now(), self.limits.cleanup_batch_size).await
    }

    /// Counts entries and stored bytes
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let handles = self.handles().await?;
        let now = self.clock.now();

        run_on(&handles.reader, move |conn| {
            let stats = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN expires_at > 0 AND expires_at < ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN compression = 'gzip' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(size_bytes), 0)
                 FROM cache_items",
                params![now],
                |row| {
                    Ok(CacheStats {
                        entries: row.get::<_, i64>(0)? as u64,
                        expired_entries: row.get::<_, i64>(1)? as u64,
                        compressed_entries: row.get::<_, i64>(2)? as u64,
                        total_bytes: row.get::<_, i64>(3)? as u64,
                    })
                },
            )?;
            Ok(stats)
        })
        .await
    }

    async fn delete_expired(
        &self,
        handles: &Handles,
        key: &str,
        namespace: &str,
        now: i64,
    ) -> CacheResult<()> {
        let (ns, k) = (namespace.to_string(), key.to_string());
        debug!("Lazily deleting expired cache entry {}:{}", ns, k);

        // A concurrent set may have refreshed the row since it was read.
        run_on(&handles.writer, move |conn| {
            conn.execute(
                "DELETE FROM cache_items
                 WHERE namespace = ?1 AND key = ?2 AND expires_at > 0 AND expires_at < ?3",
                params![ns, k, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn handles(&self) -> CacheResult<Arc<Handles>> {
        {
            let state = self.state.read().await;
            if let Some(open) = state.as_ref() {
                return Ok(Arc::clone(&open.handles));
            }
        }

        let mut state = self.state.write().await;
        if let Some(open) = state.as_ref() {
            return Ok(Arc::clone(&open.handles));
        }

        let handles = Arc::new(self.connect().await?);
        let batch = self.limits.cleanup_batch_size;
        let removed = sweep_all(&handles, self.clock.now(), batch).await?;
        if removed > 0 {
            info!("Removed {} expired cache entries on open", removed);
        }

        let sweeper = tokio::spawn(sweep_loop(
            Arc::downgrade(&handles),
            Arc::clone(&self.clock),
            self.limits.cleanup_interval,
            batch,
        ));

        *state = Some(OpenCache {
            handles: Arc::clone(&handles),
            sweeper,
        });
        Ok(handles)
    }

    async fn connect(&self) -> CacheResult<Handles> {
        let busy_timeout = self.limits.busy_timeout;

        match self.location.clone() {
            Location::Memory => {
                let conn = blocking(move || {
                    let conn = Connection::open_in_memory()?;
                    initialize_schema(&conn)?;
                    Ok(conn)
                })
                .await?;

                debug!("Opened in-memory cache");
                let shared = Arc::new(Mutex::new(conn));
                Ok(Handles {
                    writer: Arc::clone(&shared),
                    reader: shared,
                })
            }
            Location::File(path) => {
                let shown = path.display().to_string();
                let (writer, reader) = blocking(move || {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent)?;
                        }
                    }

                    let writer = Connection::open(&path)?;
                    writer.busy_timeout(busy_timeout)?;
                    writer.execute_batch(WRITER_PRAGMAS)?;
                    initialize_schema(&writer)?;

                    let reader = Connection::open_with_flags(
                        &path,
                        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                    )?;
                    reader.busy_timeout(busy_timeout)?;

                    Ok((writer, reader))
                })
                .await?;

                info!("Opened cache database at {}", shown);
                Ok(Handles {
                    writer: Arc::new(Mutex::new(writer)),
                    reader: Arc::new(Mutex::new(reader)),
                })
            }
        }
    }
}

fn is_expired(expires_at: i64, now: i64) -> bool {
    expires_at > 0 && expires_at < now
}

fn expiry_from(now: i64, ttl_minutes: u64) -> i64 {
    if ttl_minutes == 0 {
        0
    } else {
        now.saturating_add((ttl_minutes as i64).saturating_mul(60))
    }
}

/// Runs `f` on a connection while holding its lock, off the async runtime
async fn run_on<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> CacheResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> CacheResult<T> + Send + 'static,
{
    let mut guard = Arc::clone(conn).lock_owned().await;
    tokio::task::spawn_blocking(move || f(&mut guard))
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
}

async fn blocking<T, F>(f: F) -> CacheResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CacheResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
}

/// Deletes expired rows in batches, releasing the writer lock between them
async fn sweep_all(handles: &Handles, now: i64, batch: u32) -> CacheResult<usize> {
    let mut total = 0;
    loop {
        let removed = run_on(&handles.writer, move |conn| {
            Ok(conn.execute(SWEEP_SQL, params![now, batch])?)
        })
        .await?;

        total += removed;
        if removed < batch as usize {
            return Ok(total);
        }
        tokio::task::yield_now().await;
    }
}

async fn sweep_loop(handles: Weak<Handles>, clock: Arc<dyn Clock>, period: Duration, batch: u32) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately; open already swept.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(handles) = handles.upgrade() else {
            break;
        };

        match sweep_all(&handles, clock.now(), batch).await {
            Ok(0) => {}
            Ok(n) => debug!("Background sweep removed {} expired cache entries", n),
            Err(e) => warn!("Background cache sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;

    fn engine(clock: Arc<ManualClock>) -> CacheEngine {
        CacheEngine::in_memory(&CacheConfig::default()).with_clock(clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = engine(Arc::new(ManualClock::new(1_000)));
        assert!(cache.set("k", &json!({"a": 1}), 0, "ns").await.unwrap());

        let value = cache.get("k", "ns").await.unwrap();
        assert_eq!(value, Some(CachedValue::Json(json!({"a": 1}))));
        assert_eq!(cache.get("k", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lazy_open_and_idempotent_close() {
        let cache = engine(Arc::new(ManualClock::new(0)));
        assert!(!cache.is_open().await);

        cache.ttl("missing", "ns").await.unwrap();
        assert!(cache.is_open().await);

        cache.open().await.unwrap();
        cache.close().await.unwrap();
        cache.close().await.unwrap();
        assert!(!cache.is_open().await);
    }

    #[tokio::test]
    async fn test_expired_entry_is_deleted_on_read() {
        let clock = Arc::new(ManualClock::new(10_000));
        let cache = engine(Arc::clone(&clock));

        cache.set("k", &"v", 1, "ns").await.unwrap();
        clock.advance(61);

        assert_eq!(cache.get("k", "ns").await.unwrap(), None);
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_falsy_value_stored_as_sentinel() {
        let cache = engine(Arc::new(ManualClock::new(0)));
        cache.set("k", &json!([]), 0, "ns").await.unwrap();

        let value = cache.get("k", "ns").await.unwrap().unwrap();
        assert!(value.is_empty_sentinel());
    }

    #[tokio::test]
    async fn test_ttl_rounds_up() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = engine(Arc::clone(&clock));

        cache.set("k", &"v", 3, "ns").await.unwrap();
        clock.advance(30);
        assert_eq!(cache.ttl("k", "ns").await.unwrap(), 3);
        clock.advance(60);
        assert_eq!(cache.ttl("k", "ns").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sweep_in_batches() {
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            cleanup_batch_size: 2,
            ..CacheConfig::default()
        };
        let cache = CacheEngine::in_memory(&config).with_clock(clock.clone());

        for i in 0..5 {
            cache.set(&format!("k{}", i), &(i + 1), 1, "ns").await.unwrap();
        }
        cache.set("keep", &"v", 0, "ns").await.unwrap();

        clock.advance(120);
        assert_eq!(cache.sweep().await.unwrap(), 5);
        assert_eq!(cache.keys("*", "ns").await.unwrap(), vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = engine(Arc::clone(&clock));

        assert!(cache.set_if_absent("k", &true, 1, "ns").await.unwrap());
        assert!(!cache.set_if_absent("k", &true, 1, "ns").await.unwrap());

        clock.advance(120);
        assert!(cache.set_if_absent("k", &"again", 0, "ns").await.unwrap());
        assert!(!cache.set_if_absent("k", &true, 0, "ns").await.unwrap());
        assert_eq!(cache.get_json::<String>("k", "ns").await.unwrap().as_deref(), Some("again"));
    }
}
