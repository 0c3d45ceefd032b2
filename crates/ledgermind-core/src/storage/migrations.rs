//! Database Migrations
//!
//! Schema migration definitions for the Metadata Index.

/// Migration definitions, applied in order on every open.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: records, supersession edges, evidence links, events",
    up: MIGRATION_V1_UP,
}];

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number.
    pub version: u32,
    /// Description.
    pub description: &'static str,
    /// SQL to apply.
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    target TEXT NOT NULL,
    rationale TEXT NOT NULL,
    consequences TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL,
    authority TEXT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'pattern',
    vitality REAL NOT NULL DEFAULT 0.0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    fid TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_target_status ON records(target, status);
CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
CREATE INDEX IF NOT EXISTS idx_records_phase_vitality ON records(phase, vitality);
CREATE INDEX IF NOT EXISTS idx_records_fid ON records(fid);

-- Supersession edges: new_id directly supersedes old_id.
CREATE TABLE IF NOT EXISTS supersession_edges (
    new_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    old_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    PRIMARY KEY (new_id, old_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_old_id ON supersession_edges(old_id);
CREATE INDEX IF NOT EXISTS idx_edges_new_id ON supersession_edges(new_id);

-- Evidence links: record_id is justified by event_id.
CREATE TABLE IF NOT EXISTS evidence_links (
    record_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    event_id TEXT NOT NULL,
    PRIMARY KEY (record_id, event_id)
);

CREATE INDEX IF NOT EXISTS idx_evidence_record_id ON evidence_links(record_id);
CREATE INDEX IF NOT EXISTS idx_evidence_event_id ON evidence_links(event_id);

-- Events: append-only episodic store, same index, distinct table.
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    success INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    linked_targets TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);

-- Target alias registry persistence, mirrors targets.json for recovery.
CREATE TABLE IF NOT EXISTS target_aliases (
    alias TEXT PRIMARY KEY,
    canonical TEXT NOT NULL
);

-- FTS5 full-text index over title + rationale, kept in sync via triggers.
CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
    id UNINDEXED,
    title,
    rationale,
    content='records',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS records_fts_insert AFTER INSERT ON records BEGIN
    INSERT INTO records_fts(rowid, id, title, rationale)
    VALUES (new.rowid, new.id, new.title, new.rationale);
END;

CREATE TRIGGER IF NOT EXISTS records_fts_delete AFTER DELETE ON records BEGIN
    INSERT INTO records_fts(records_fts, rowid, id, title, rationale)
    VALUES ('delete', old.rowid, old.id, old.title, old.rationale);
END;

CREATE TRIGGER IF NOT EXISTS records_fts_update AFTER UPDATE ON records BEGIN
    INSERT INTO records_fts(records_fts, rowid, id, title, rationale)
    VALUES ('delete', old.rowid, old.id, old.title, old.rationale);
    INSERT INTO records_fts(rowid, id, title, rationale)
    VALUES (new.rowid, new.id, new.title, new.rationale);
END;

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

/// Apply every migration in order, tracking the applied version in
/// `schema_version`.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if i64::from(migration.version) > current {
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                rusqlite::params![migration.version],
            )?;
        }
    }

    Ok(())
}
