//! SQLite store implementation
//!
//! This module provides a SQLite-based implementation of [`InfoStore`] and
//! [`FocusSource`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::debug;

use super::retry::{with_retry, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE};
use super::schema::initialize_schema;
use super::{ExtractedInfo, FocusSource, InfoKind, InfoRecord, InfoStore, StoreError, StoreResult};
use crate::extract::{FieldType, FocusPoint};

const FOCUS_COLUMNS: &str =
    "id, keywords, explanation, restrictions, role, purpose, custom_schema, field_types, activated";

/// SQLite store backend
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    retry_attempts: u32,
    retry_base: Duration,
}

impl SqliteStore {
    /// Opens (or creates) a store database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }

    /// Overrides the write retry policy
    pub fn with_retry_policy(mut self, attempts: u32, base: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_base = base;
        self
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let mut guard = Arc::clone(&self.conn).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut guard))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Inserts a focus point or replaces the one with the same id
    pub async fn upsert_focus_point(&self, focus: &FocusPoint) -> StoreResult<()> {
        let focus = focus.clone();
        let field_types = serde_json::to_string(&focus.field_types)?;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO focus_points
                    (id, keywords, explanation, restrictions, role, purpose,
                     custom_schema, field_types, activated, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    keywords = excluded.keywords,
                    explanation = excluded.explanation,
                    restrictions = excluded.restrictions,
                    role = excluded.role,
                    purpose = excluded.purpose,
                    custom_schema = excluded.custom_schema,
                    field_types = excluded.field_types,
                    activated = excluded.activated,
                    updated_at = excluded.updated_at",
                params![
                    focus.id,
                    focus.keywords,
                    focus.explanation,
                    focus.restrictions,
                    focus.role,
                    focus.purpose,
                    focus.custom_schema,
                    field_types,
                    focus.activated,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Gets a focus point by id, activated or not
    pub async fn get_focus_point(&self, id: &str) -> StoreResult<FocusPoint> {
        let id = id.to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM focus_points WHERE id = ?1", FOCUS_COLUMNS);
            let raw = conn.query_row(&sql, params![id], read_focus_row).optional()?;
            match raw {
                Some(raw) => raw.into_focus_point(),
                None => Err(StoreError::FocusNotFound(id)),
            }
        })
        .await
    }

    /// Lists every focus point ordered by id
    pub async fn list_focus_points(&self) -> StoreResult<Vec<FocusPoint>> {
        self.run(|conn| {
            let sql = format!("SELECT {} FROM focus_points ORDER BY id", FOCUS_COLUMNS);
            query_focus_points(conn, &sql)
        })
        .await
    }

    /// Gets all infos stored for a focus point, oldest first
    pub async fn infos_for_focus(&self, focus_id: &str) -> StoreResult<Vec<InfoRecord>> {
        let focus_id = focus_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, focus_id, focus_statement, kind, content, refs,
                        source_url, source_title, created
                 FROM infos WHERE focus_id = ?1 ORDER BY id",
            )?;

            let records = stmt
                .query_map(params![focus_id], |row| {
                    let kind: String = row.get(3)?;
                    Ok(InfoRecord {
                        id: row.get(0)?,
                        focus_id: row.get(1)?,
                        focus_statement: row.get(2)?,
                        info: ExtractedInfo {
                            kind: InfoKind::from_db_string(&kind).unwrap_or(InfoKind::Journal),
                            content: row.get(4)?,
                            references: row.get(5)?,
                            source_url: row.get(6)?,
                            source_title: row.get(7)?,
                            created: row.get(8)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
        .await
    }

    /// Counts stored infos across all focus points
    pub async fn count_infos(&self) -> StoreResult<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM infos", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

/// Focus point row before the `field_types` JSON is decoded
struct RawFocus {
    focus: FocusPoint,
    field_types: String,
}

impl RawFocus {
    fn into_focus_point(self) -> StoreResult<FocusPoint> {
        let mut focus = self.focus;
        focus.field_types = serde_json::from_str::<BTreeMap<String, FieldType>>(&self.field_types)?;
        Ok(focus)
    }
}

fn read_focus_row(row: &Row<'_>) -> rusqlite::Result<RawFocus> {
    Ok(RawFocus {
        focus: FocusPoint {
            id: row.get(0)?,
            keywords: row.get(1)?,
            explanation: row.get(2)?,
            restrictions: row.get(3)?,
            role: row.get(4)?,
            purpose: row.get(5)?,
            custom_schema: row.get(6)?,
            field_types: BTreeMap::new(),
            activated: row.get(8)?,
        },
        field_types: row.get(7)?,
    })
}

fn query_focus_points(conn: &Connection, sql: &str) -> StoreResult<Vec<FocusPoint>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map([], read_focus_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawFocus::into_focus_point).collect()
}

#[async_trait]
impl InfoStore for SqliteStore {
    async fn add_info(
        &self,
        focus_statement: &str,
        focus_id: &str,
        info: &ExtractedInfo,
    ) -> StoreResult<i64> {
        let id = with_retry("add_info", self.retry_attempts, self.retry_base, || {
            let focus_statement = focus_statement.to_string();
            let focus_id = focus_id.to_string();
            let info = info.clone();
            self.run(move |conn| {
                conn.execute(
                    "INSERT INTO infos
                        (focus_id, focus_statement, kind, content, refs,
                         source_url, source_title, created)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        focus_id,
                        focus_statement,
                        info.kind.to_db_string(),
                        info.content,
                        info.references,
                        info.source_url,
                        info.source_title,
                        info.created,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
        })
        .await?;

        debug!("Stored info {} for focus {}", id, focus_id);
        Ok(id)
    }
}

#[async_trait]
impl FocusSource for SqliteStore {
    async fn load_activated_focus_points(&self) -> StoreResult<Vec<FocusPoint>> {
        self.run(|conn| {
            let sql = format!(
                "SELECT {} FROM focus_points WHERE activated = 1 ORDER BY id",
                FOCUS_COLUMNS
            );
            query_focus_points(conn, &sql)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn focus(id: &str, activated: bool) -> FocusPoint {
        FocusPoint {
            id: id.to_string(),
            keywords: "AI chips".to_string(),
            activated,
            ..FocusPoint::default()
        }
    }

    fn info(content: &str) -> ExtractedInfo {
        ExtractedInfo {
            kind: InfoKind::Journal,
            content: content.to_string(),
            references: "[1]: https://a.com/p\n".to_string(),
            source_url: "https://a.com".to_string(),
            source_title: "A".to_string(),
            created: "2024-05-01 10:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_activated_only() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_focus_point(&focus("f1", true)).await.unwrap();
        store.upsert_focus_point(&focus("f2", false)).await.unwrap();

        let active = store.load_activated_focus_points().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "f1");
        assert_eq!(store.list_focus_points().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_focus_point_field_types_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let mut f = focus("f1", true);
        f.custom_schema = "price | in_stock".to_string();
        f.field_types.insert("price".to_string(), FieldType::Real);
        f.field_types.insert("in_stock".to_string(), FieldType::Boolean);
        store.upsert_focus_point(&f).await.unwrap();

        let loaded = store.get_focus_point("f1").await.unwrap();
        assert_eq!(loaded, f);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_focus_point(&focus("f1", true)).await.unwrap();
        let mut updated = focus("f1", true);
        updated.keywords = "robots".to_string();
        store.upsert_focus_point(&updated).await.unwrap();

        assert_eq!(store.get_focus_point("f1").await.unwrap().keywords, "robots");
    }

    #[tokio::test]
    async fn test_missing_focus_point() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.get_focus_point("nope").await;
        assert!(matches!(result, Err(StoreError::FocusNotFound(_))));
    }

    #[tokio::test]
    async fn test_add_info_and_list() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_info("(AI chips)", "f1", &info("first")).await.unwrap();
        store.add_info("(AI chips)", "f1", &info("second")).await.unwrap();
        store.add_info("(other)", "f2", &info("third")).await.unwrap();

        let infos = store.infos_for_focus("f1").await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].info.content, "first");
        assert_eq!(infos[0].focus_statement, "(AI chips)");
        assert_eq!(infos[1].info, info("second"));
        assert_eq!(store.count_infos().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_info("(x)", "f1", &info("kept")).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.infos_for_focus("f1").await.unwrap()[0].info.content, "kept");
    }
}
