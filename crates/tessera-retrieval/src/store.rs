//! SQLite vector index.
//!
//! Stores points in SQLite with embeddings as little-endian `f32` BLOBs.
//! Similarity is computed in Rust over every point of the collection, which
//! is plenty for a personal note vault plus a handful of fetched articles.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tessera_core::{DistanceMetric, IndexHit, IndexedPoint, Payload, TesseraError, VectorIndex};

use crate::rank::{cosine_similarity, dot_product};

/// Index statistics.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::store::IndexStats;
///
/// let stats = IndexStats {
///     collection: "notes".into(),
///     dimension: Some(768),
///     metric: None,
///     total_points: 100,
///     index_size_bytes: 50000,
/// };
/// assert_eq!(stats.total_points, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Bound collection name.
    pub collection: String,
    /// Vector size of the collection, if it exists.
    pub dimension: Option<usize>,
    /// Metric of the collection, if it exists.
    pub metric: Option<DistanceMetric>,
    /// Points stored in the collection.
    pub total_points: usize,
    /// Size of the index database in bytes.
    pub index_size_bytes: u64,
}

/// SQLite-backed [`VectorIndex`] bound to one collection.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::store::SqliteIndex;
///
/// let index = SqliteIndex::in_memory("notes").unwrap();
/// let stats = index.stats().unwrap();
/// assert_eq!(stats.total_points, 0);
/// assert!(stats.dimension.is_none());
/// ```
#[derive(Clone)]
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
    collection: String,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

struct CollectionInfo {
    dimension: usize,
    metric: DistanceMetric,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> TesseraError + '_ {
    move |e| TesseraError::IndexUnavailable(format!("{context}: {e}"))
}

impl SqliteIndex {
    /// Open or create an index database at `path`, bound to `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::IndexUnavailable`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use tessera_retrieval::store::SqliteIndex;
    ///
    /// let index = SqliteIndex::open(Path::new(".tessera/index.db"), "notes").unwrap();
    /// ```
    pub fn open(path: &Path, collection: &str) -> Result<Self, TesseraError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TesseraError::IndexUnavailable(format!("failed to create index directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(db_err("failed to open database"))?;
        Self::with_connection(conn, collection)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::IndexUnavailable`] if schema creation fails.
    pub fn in_memory(collection: &str) -> Result<Self, TesseraError> {
        let conn =
            Connection::open_in_memory().map_err(db_err("failed to create in-memory database"))?;
        Self::with_connection(conn, collection)
    }

    fn with_connection(conn: Connection, collection: &str) -> Result<Self, TesseraError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            );
            ",
        )
        .map_err(db_err("failed to create schema"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
        })
    }

    /// The collection this index reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TesseraError> {
        self.conn
            .lock()
            .map_err(|_| TesseraError::IndexUnavailable("index connection lock poisoned".into()))
    }

    /// Run `work` against a handle to this index on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> Result<T, TesseraError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteIndex) -> Result<T, TesseraError> + Send + 'static,
    {
        let index = self.clone();
        tokio::task::spawn_blocking(move || work(&index))
            .await
            .map_err(|e| TesseraError::IndexUnavailable(format!("index task aborted: {e}")))?
    }

    fn info(conn: &Connection, name: &str) -> Result<Option<CollectionInfo>, TesseraError> {
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT dimension, metric FROM collections WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err("failed to read collection"))?;

        match row {
            Some((dimension, metric)) => {
                let metric: DistanceMetric = metric.parse().map_err(|e: String| {
                    TesseraError::IndexUnavailable(format!("corrupted collection metadata: {e}"))
                })?;
                Ok(Some(CollectionInfo {
                    dimension: dimension as usize,
                    metric,
                }))
            }
            None => Ok(None),
        }
    }

    fn require_info(&self, conn: &Connection) -> Result<CollectionInfo, TesseraError> {
        Self::info(conn, &self.collection)?.ok_or_else(|| {
            TesseraError::IndexUnavailable(format!(
                "collection '{}' does not exist; run `tessera init --reset` to create it",
                self.collection
            ))
        })
    }

    /// Whether the bound collection has been created.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::IndexUnavailable`] on query failure.
    pub fn has_collection(&self) -> Result<bool, TesseraError> {
        let conn = self.lock()?;
        Ok(Self::info(&conn, &self.collection)?.is_some())
    }

    /// Get index statistics for the bound collection.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::IndexUnavailable`] on query failure.
    pub fn stats(&self) -> Result<IndexStats, TesseraError> {
        let conn = self.lock()?;
        let info = Self::info(&conn, &self.collection)?;

        let total_points: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM points WHERE collection = ?1",
                params![self.collection],
                |row| row.get(0),
            )
            .map_err(db_err("failed to count points"))?;

        // For in-memory databases, page_count returns a small number
        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(IndexStats {
            collection: self.collection.clone(),
            dimension: info.as_ref().map(|i| i.dimension),
            metric: info.as_ref().map(|i| i.metric),
            total_points: total_points as usize,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }

    fn reset_blocking(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), TesseraError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("failed to begin transaction"))?;
        tx.execute("DELETE FROM points WHERE collection = ?1", params![name])
            .map_err(db_err("failed to delete points"))?;
        tx.execute(
            "INSERT OR REPLACE INTO collections (name, dimension, metric) VALUES (?1, ?2, ?3)",
            params![name, dimension as i64, metric.to_string()],
        )
        .map_err(db_err("failed to create collection"))?;
        tx.commit().map_err(db_err("failed to commit reset"))?;
        Ok(())
    }

    fn upsert_blocking(&self, points: &[IndexedPoint]) -> Result<(), TesseraError> {
        let mut conn = self.lock()?;
        let info = self.require_info(&conn)?;
        for point in points {
            if point.vector.len() != info.dimension {
                return Err(TesseraError::DimensionMismatch {
                    expected: info.dimension,
                    actual: point.vector.len(),
                });
            }
        }

        let tx = conn
            .transaction()
            .map_err(db_err("failed to begin transaction"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO points (collection, id, title, text, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err("failed to prepare insert"))?;
            for point in points {
                stmt.execute(params![
                    self.collection,
                    point.id,
                    point.payload.title,
                    point.payload.text,
                    floats_to_bytes(&point.vector),
                ])
                .map_err(db_err("failed to insert point"))?;
            }
        }
        tx.commit().map_err(db_err("failed to commit points"))?;
        Ok(())
    }

    fn search_blocking(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>, TesseraError> {
        let conn = self.lock()?;
        let info = self.require_info(&conn)?;
        if vector.len() != info.dimension {
            return Err(TesseraError::DimensionMismatch {
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        let mut stmt = conn
            .prepare("SELECT title, text, embedding FROM points WHERE collection = ?1 ORDER BY rowid")
            .map_err(db_err("failed to prepare query"))?;

        let rows = stmt
            .query_map(params![self.collection], |row| {
                let embedding: Vec<u8> = row.get(2)?;
                Ok((
                    Payload {
                        title: row.get(0)?,
                        text: row.get(1)?,
                    },
                    bytes_to_floats(&embedding),
                ))
            })
            .map_err(db_err("failed to query points"))?;

        let mut hits = Vec::new();
        for row in rows {
            let (payload, embedding) = row.map_err(db_err("failed to read row"))?;
            let score = match info.metric {
                DistanceMetric::Cosine => cosine_similarity(vector, &embedding),
                DistanceMetric::Dot => dot_product(vector, &embedding),
            };
            hits.push(IndexHit { payload, score });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn reset_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), TesseraError> {
        tracing::debug!(collection = name, dimension, %metric, "resetting sqlite collection");
        let name = name.to_string();
        self.blocking(move |index| index.reset_blocking(&name, dimension, metric))
            .await
    }

    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<(), TesseraError> {
        if points.is_empty() {
            return Ok(());
        }
        tracing::debug!(collection = %self.collection, count = points.len(), "upserting points");
        self.blocking(move |index| index.upsert_blocking(&points)).await
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>, TesseraError> {
        let vector = vector.to_vec();
        self.blocking(move |index| index.search_blocking(&vector, limit))
            .await
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
