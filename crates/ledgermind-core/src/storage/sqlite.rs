//! SQLite-backed Metadata Index
//!
//! Separate reader/writer connections over the same WAL-mode database file,
//! following the single-writer-many-readers discipline: readers never block
//! on the writer's in-flight transaction because WAL readers see the last
//! committed snapshot.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::record::{Authority, Event, Kind, Phase, Record, Status};

/// Metadata Index error type.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The requested record id is absent from the index.
    #[error("record not found: {0}")]
    NotFound(String),
    /// A mutex guarding a connection or index was poisoned by a panicking
    /// holder.
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
    /// Initialization failure (directory creation, migration, etc).
    #[error("initialization error: {0}")]
    Init(String),
    /// `resolve_to_truth` found a cycle in the supersession graph.
    #[error("cycle detected resolving supersession chain from {0}")]
    CycleDetected(String),
}

/// Metadata Index result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Outcome of `resolve_to_truth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The walk reached an active descendant.
    Active(String),
    /// The walk terminated at a non-active descendant, either because it
    /// ran out of edges or hit `max_depth`.
    NoActiveTruth {
        /// The deepest record reached.
        deepest_id: String,
        /// Whether the walk was cut off by `max_depth` rather than running
        /// out of edges naturally.
        truncated: bool,
    },
    /// A cycle was detected during the walk.
    CycleDetected,
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let consequences_json: String = row.get("consequences")?;
    let consequences: Vec<String> = serde_json::from_str(&consequences_json).unwrap_or_default();

    let kind_str: String = row.get("kind")?;
    let status_str: String = row.get("status")?;
    let authority_str: String = row.get("authority")?;
    let phase_str: String = row.get("phase")?;
    let created_at_ms: i64 = row.get("created_at")?;
    let updated_at_ms: i64 = row.get("updated_at")?;

    Ok(Record {
        id: row.get("id")?,
        kind: match kind_str.as_str() {
            "decision" => Kind::Decision,
            "proposal" => Kind::Proposal,
            _ => Kind::Intervention,
        },
        title: row.get("title")?,
        target: row.get("target")?,
        rationale: row.get("rationale")?,
        consequences,
        status: Status::parse_str(&status_str).unwrap_or(Status::Proposal),
        authority: Authority::parse_str(&authority_str).unwrap_or(Authority::Agent),
        phase: Phase::parse_str(&phase_str).unwrap_or(Phase::Pattern),
        vitality: row.get("vitality")?,
        created_at: DateTime::from_timestamp_millis(created_at_ms).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp_millis(updated_at_ms).unwrap_or_else(Utc::now),
        supersedes: Vec::new(),
        evidence: Vec::new(),
    })
}

/// The Metadata Index.
pub struct MetadataStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl MetadataStore {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating and migrating if necessary) the index at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        if path.as_os_str() != ":memory:" {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Init(e.to_string()))?;
                }
            }
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer_lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::LockPoisoned("writer".into()))
    }

    fn reader_lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::LockPoisoned("reader".into()))
    }

    /// Begin a write transaction. Only one may be open at a time per
    /// process; cross-process exclusion is the audit log's job.
    pub fn begin(&self) -> Result<Txn<'_>> {
        let guard = self.writer_lock()?;
        guard.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Txn {
            guard,
            depth: 1,
            doomed: false,
            finished: false,
        })
    }

    /// Insert or replace a record's metadata, its supersession edges, and
    /// its evidence links. Must run inside a caller-provided transaction.
    pub fn upsert(&self, txn: &Txn<'_>, record: &Record) -> Result<()> {
        let conn = &*txn.guard;
        let consequences_json = serde_json::to_string(&record.consequences).unwrap_or_default();

        conn.execute(
            "INSERT INTO records
                (id, kind, title, target, rationale, consequences, status, authority, phase, vitality, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                target = excluded.target,
                rationale = excluded.rationale,
                consequences = excluded.consequences,
                status = excluded.status,
                authority = excluded.authority,
                phase = excluded.phase,
                vitality = excluded.vitality,
                updated_at = excluded.updated_at",
            params![
                record.id,
                record.kind.as_str(),
                record.title,
                record.target,
                record.rationale,
                consequences_json,
                record.status.as_str(),
                record.authority.as_str(),
                record.phase.as_str(),
                record.vitality,
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )?;

        conn.execute(
            "DELETE FROM supersession_edges WHERE new_id = ?1",
            params![record.id],
        )?;
        for old_id in &record.supersedes {
            conn.execute(
                "INSERT OR IGNORE INTO supersession_edges (new_id, old_id) VALUES (?1, ?2)",
                params![record.id, old_id],
            )?;
        }

        conn.execute(
            "DELETE FROM evidence_links WHERE record_id = ?1",
            params![record.id],
        )?;
        for event_id in &record.evidence {
            conn.execute(
                "INSERT OR IGNORE INTO evidence_links (record_id, event_id) VALUES (?1, ?2)",
                params![record.id, event_id],
            )?;
        }

        Ok(())
    }

    fn hydrate(&self, conn: &Connection, mut record: Record) -> rusqlite::Result<Record> {
        let mut stmt = conn.prepare_cached(
            "SELECT old_id FROM supersession_edges WHERE new_id = ?1 ORDER BY old_id",
        )?;
        let supersedes = stmt
            .query_map(params![record.id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        record.supersedes = supersedes;

        let mut stmt = conn.prepare_cached(
            "SELECT event_id FROM evidence_links WHERE record_id = ?1 ORDER BY event_id",
        )?;
        let evidence = stmt
            .query_map(params![record.id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        record.evidence = evidence;

        Ok(record)
    }

    /// Look up a single record by id.
    pub fn get(&self, id: &str) -> Result<Record> {
        let conn = self.reader_lock()?;
        let record = conn
            .query_row("SELECT * FROM records WHERE id = ?1", params![id], row_to_record)
            .optional()?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok(self.hydrate(&conn, record)?)
    }

    /// Batch-fetch records by id, eliminating N+1 patterns in resolution.
    /// Missing ids are simply absent from the returned map.
    pub fn get_batch(&self, ids: &[String]) -> Result<HashMap<String, Record>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.reader_lock()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("SELECT * FROM records WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

        let records = stmt
            .query_map(params.as_slice(), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = HashMap::with_capacity(records.len());
        for record in records {
            let hydrated = self.hydrate(&conn, record)?;
            out.insert(hydrated.id.clone(), hydrated);
        }
        Ok(out)
    }

    /// Single-row lookup of the active record for `target`, used by I1.
    pub fn find_active_by_target(&self, target: &str) -> Result<Option<Record>> {
        let conn = self.reader_lock()?;
        let record = conn
            .query_row(
                "SELECT * FROM records WHERE target = ?1 AND status = 'active'",
                params![target],
                row_to_record,
            )
            .optional()?;
        match record {
            Some(record) => Ok(Some(self.hydrate(&conn, record)?)),
            None => Ok(None),
        }
    }

    /// Evaluate the transitive closure of supersession edges from `id` in a
    /// single recursive query, stopping at the first active record or at
    /// `max_depth`.
    pub fn resolve_to_truth(&self, id: &str, max_depth: u32) -> Result<Resolution> {
        let conn = self.reader_lock()?;

        let mut stmt = conn.prepare(
            "WITH RECURSIVE walk(id, status, depth, path, looped) AS (
                SELECT r.id, r.status, 0, ',' || r.id || ',', 0
                FROM records r WHERE r.id = ?1
                UNION ALL
                SELECT r2.id, r2.status, w.depth + 1, w.path || r2.id || ',',
                    CASE WHEN EXISTS (
                        SELECT 1 FROM supersession_edges e2
                        WHERE e2.old_id = w.id
                          AND instr(w.path, ',' || e2.new_id || ',') > 0
                    ) THEN 1 ELSE w.looped END
                FROM walk w
                JOIN supersession_edges e ON e.old_id = w.id
                JOIN records r2 ON r2.id = e.new_id
                WHERE w.status != 'active'
                  AND w.depth < ?2
                  AND instr(w.path, ',' || r2.id || ',') = 0
            )
            SELECT id, status, depth, looped FROM walk ORDER BY depth DESC LIMIT 1",
        )?;

        let row: Option<(String, String, i64, i64)> = stmt
            .query_row(params![id, max_depth], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .optional()?;

        let Some((deepest_id, status, depth, looped)) = row else {
            return Ok(Resolution::NoActiveTruth {
                deepest_id: id.to_string(),
                truncated: false,
            });
        };

        if looped != 0 {
            return Ok(Resolution::CycleDetected);
        }
        if status == "active" {
            return Ok(Resolution::Active(deepest_id));
        }
        Ok(Resolution::NoActiveTruth {
            deepest_id,
            truncated: depth as u32 >= max_depth,
        })
    }

    /// Write-time I4 guard: does `from_id` already transitively supersede
    /// `target_id`? If so, adding an edge `target_id -> from_id` (i.e.
    /// `target_id` superseding `from_id`) would close a cycle. Checked
    /// before every new supersession edge is staged, independent of the
    /// walk-time cycle check in [`MetadataStore::resolve_to_truth`].
    pub fn supersedes_reaches(&self, from_id: &str, target_id: &str, max_depth: u32) -> Result<bool> {
        if from_id == target_id {
            return Ok(true);
        }
        let conn = self.reader_lock()?;
        let mut stmt = conn.prepare(
            "WITH RECURSIVE walk(id, depth) AS (
                SELECT old_id, 1 FROM supersession_edges WHERE new_id = ?1
                UNION ALL
                SELECT e.old_id, w.depth + 1
                FROM walk w
                JOIN supersession_edges e ON e.new_id = w.id
                WHERE w.depth < ?3
            )
            SELECT 1 FROM walk WHERE id = ?2 LIMIT 1",
        )?;
        let found: Option<i64> = stmt
            .query_row(params![from_id, target_id, max_depth], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Count the number of record versions (any status) stored for `target`.
    pub fn count_links(&self, target: &str) -> Result<u64> {
        let conn = self.reader_lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE target = ?1",
            params![target],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Batch-fetch evidence event ids linked to each of `ids`.
    pub fn get_linked_event_ids_batch(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut out: HashMap<String, Vec<String>> = ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        if ids.is_empty() {
            return Ok(out);
        }
        let conn = self.reader_lock()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT record_id, event_id FROM evidence_links WHERE record_id IN ({placeholders}) ORDER BY record_id, event_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (record_id, event_id) = row?;
            out.entry(record_id).or_default().push(event_id);
        }
        Ok(out)
    }

    /// Scoped bulk-upsert used by `sync_index`, returning the total number
    /// of rows touched.
    pub fn batch_update(&self, records: &[Record]) -> Result<usize> {
        let txn = self.begin()?;
        for record in records {
            self.upsert(&txn, record)?;
        }
        txn.commit()?;
        Ok(records.len())
    }

    /// Every record id currently in the index, regardless of status. Used
    /// by `sync_index` to find entries the log no longer accounts for.
    pub fn all_ids(&self) -> Result<Vec<String>> {
        let conn = self.reader_lock()?;
        let mut stmt = conn.prepare("SELECT id FROM records")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Remove each of `ids` entirely (metadata row, supersession edges,
    /// evidence links), inside one transaction. Used by `sync_index` to
    /// drop orphaned entries in a single batch.
    pub fn remove_batch(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let txn = self.begin()?;
        for id in ids {
            self.delete(&txn, id)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a record entirely: metadata row, supersession edges, and
    /// evidence links. Used by `purge`.
    pub fn delete(&self, txn: &Txn<'_>, id: &str) -> Result<()> {
        let conn = &*txn.guard;
        conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM supersession_edges WHERE new_id = ?1 OR old_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM evidence_links WHERE record_id = ?1", params![id])?;
        Ok(())
    }

    /// Append a new episodic event.
    pub fn append_event(&self, txn: &Txn<'_>, event: &Event) -> Result<()> {
        let conn = &*txn.guard;
        let metadata_json = serde_json::to_string(&event.metadata).unwrap_or_default();
        let targets_json = serde_json::to_string(&event.linked_targets).unwrap_or_default();
        conn.execute(
            "INSERT INTO events (id, prompt, response, success, metadata, linked_targets, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.prompt,
                event.response,
                event.success as i64,
                metadata_json,
                targets_json,
                event.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Link an existing event to `record_id` as evidence.
    pub fn link_evidence(&self, txn: &Txn<'_>, record_id: &str, event_id: &str) -> Result<()> {
        let conn = &*txn.guard;
        conn.execute(
            "INSERT OR IGNORE INTO evidence_links (record_id, event_id) VALUES (?1, ?2)",
            params![record_id, event_id],
        )?;
        Ok(())
    }

    /// Full-text search over title and rationale, returning `(id, bm25 rank)`
    /// ordered best-first.
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let conn = self.reader_lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, bm25(records_fts) AS rank FROM records_fts
             WHERE records_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sanitize_fts5_query(query), limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)? as f32))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Escape FTS5 query syntax characters so free-form user input can never be
/// interpreted as FTS5 query operators.
pub fn sanitize_fts5_query(query: &str) -> String {
    let escaped = query.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// A nestable write transaction. The outer `begin()` holds the writer lock
/// for its whole lifetime; nested `begin()` calls are a no-op bookkeeping
/// increment, and a nested `rollback()` marks the outer transaction doomed
/// without releasing the lock early. If a caller drops a `Txn` without
/// calling `commit()`/`rollback()` — an early return via `?` partway through
/// a multi-step write, say — `Drop` issues the `ROLLBACK` itself, since an
/// open transaction left on the shared writer connection would otherwise
/// wedge every subsequent `begin()` on it.
pub struct Txn<'a> {
    guard: MutexGuard<'a, Connection>,
    depth: u32,
    doomed: bool,
    finished: bool,
}

impl<'a> Txn<'a> {
    /// Nested begin: a bookkeeping no-op, matching caller-visible nesting.
    pub fn begin_nested(&mut self) {
        self.depth += 1;
    }

    /// Nested commit: decrements depth without touching SQL state.
    pub fn commit_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Nested rollback: decrements depth and marks the outer transaction
    /// doomed, so the eventual outer `commit()` becomes a rollback instead.
    pub fn rollback_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.doomed = true;
    }

    /// Commit the outer transaction, unless a nested rollback doomed it.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if self.doomed {
            self.guard.execute_batch("ROLLBACK")?;
            return Err(StorageError::Init("transaction doomed by nested rollback".into()));
        }
        self.guard.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Roll back the outer transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.guard.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl<'a> Drop for Txn<'a> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.guard.execute_batch("ROLLBACK");
        }
    }
}
