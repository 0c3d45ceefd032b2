//! Content-addressed commit log implementation

use super::{lock::FileLock, AuditError};
use crate::record::{Authority, Kind, Phase, Record, Status};
use crate::storage::MetadataStore;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Hash of the (nonexistent) root commit every chain starts from.
pub const GENESIS: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One immutable commit: a record body plus a reference to its parent.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Content-addressed hash of this commit, hex-encoded sha256.
    pub id: String,
    /// Hash of the parent commit, or [`GENESIS`].
    pub parent: String,
    /// Commit message in the documented `<kind>:<status>:<target>:<id>` form.
    pub message: String,
    /// The record body this commit carries.
    pub record: Record,
}

/// Outcome of reconciling the Metadata Index against the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Ids present in the index but absent from the log, now removed.
    pub orphans_removed: Vec<String>,
    /// Ids present in the log but missing from the index, now inserted.
    pub entries_inserted: Vec<String>,
}

fn format_header(record: &Record, parent: &str) -> String {
    format!(
        "id: {}\nkind: {}\ntarget: {}\nstatus: {}\nauthority: {}\nphase: {}\nvitality: {}\ncreated_at: {}\nupdated_at: {}\nsupersedes: {}\nparent: {}\n",
        record.id,
        record.kind.as_str(),
        record.target,
        record.status.as_str(),
        record.authority.as_str(),
        record.phase.as_str(),
        record.vitality,
        record.created_at.timestamp_millis(),
        record.updated_at.timestamp_millis(),
        record.supersedes.join(","),
        parent,
    )
}

#[derive(serde::Serialize, serde::Deserialize)]
struct BodySection {
    title: String,
    rationale: String,
    consequences: Vec<String>,
    evidence: Vec<String>,
}

fn format_commit_message(record: &Record) -> String {
    format!(
        "{}:{}:{}:{}  message=\"{}\"  authority={}",
        record.kind.as_str(),
        record.status.as_str(),
        record.target,
        record.id,
        record.title.replace('"', "'"),
        record.authority.as_commit_code(),
    )
}

fn encode_commit(record: &Record, parent: &str) -> (String, String) {
    let header = format_header(record, parent);
    let body = BodySection {
        title: record.title.clone(),
        rationale: record.rationale.clone(),
        consequences: record.consequences.clone(),
        evidence: record.evidence.clone(),
    };
    let body_json = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());
    let content = format!("{header}\n{body_json}");
    let message = format_commit_message(record);
    (content, message)
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn decode_commit(id: &str, content: &str) -> Result<Commit, AuditError> {
    let (header, body_json) = content
        .split_once("\n\n")
        .ok_or_else(|| AuditError::MalformedBody(id.to_string(), "missing body separator".into()))?;

    let mut fields: HashMap<&str, &str> = HashMap::new();
    for line in header.lines() {
        if let Some((key, value)) = line.split_once(": ") {
            fields.insert(key, value);
        } else if let Some(key) = line.strip_suffix(':') {
            fields.insert(key, "");
        }
    }

    macro_rules! field {
        ($name:literal) => {
            fields
                .get($name)
                .ok_or_else(|| AuditError::MalformedBody(id.to_string(), format!("missing {}", $name)))?
        };
    }

    let body: BodySection = serde_json::from_str(body_json)
        .map_err(|e| AuditError::MalformedBody(id.to_string(), e.to_string()))?;

    let created_at: DateTime<Utc> = DateTime::from_timestamp_millis(
        field!("created_at")
            .parse()
            .map_err(|_| AuditError::MalformedBody(id.to_string(), "bad created_at".into()))?,
    )
    .ok_or_else(|| AuditError::MalformedBody(id.to_string(), "bad created_at".into()))?;

    let updated_at: DateTime<Utc> = DateTime::from_timestamp_millis(
        field!("updated_at")
            .parse()
            .map_err(|_| AuditError::MalformedBody(id.to_string(), "bad updated_at".into()))?,
    )
    .ok_or_else(|| AuditError::MalformedBody(id.to_string(), "bad updated_at".into()))?;

    let supersedes_raw = *field!("supersedes");
    let supersedes = if supersedes_raw.is_empty() {
        Vec::new()
    } else {
        supersedes_raw.split(',').map(str::to_string).collect()
    };

    let record = Record {
        id: field!("id").to_string(),
        kind: match *field!("kind") {
            "decision" => Kind::Decision,
            "proposal" => Kind::Proposal,
            "intervention" => Kind::Intervention,
            other => {
                return Err(AuditError::MalformedBody(id.to_string(), format!("bad kind {other}")))
            }
        },
        title: body.title,
        target: field!("target").to_string(),
        rationale: body.rationale,
        consequences: body.consequences,
        status: Status::parse_str(field!("status"))
            .ok_or_else(|| AuditError::MalformedBody(id.to_string(), "bad status".into()))?,
        authority: Authority::parse_str(field!("authority"))
            .ok_or_else(|| AuditError::MalformedBody(id.to_string(), "bad authority".into()))?,
        phase: Phase::parse_str(field!("phase"))
            .ok_or_else(|| AuditError::MalformedBody(id.to_string(), "bad phase".into()))?,
        vitality: field!("vitality")
            .parse()
            .map_err(|_| AuditError::MalformedBody(id.to_string(), "bad vitality".into()))?,
        created_at,
        updated_at,
        supersedes,
        evidence: body.evidence,
    };

    let parent = field!("parent").to_string();
    let message = format_commit_message(&record);

    Ok(Commit {
        id: id.to_string(),
        parent,
        message,
        record,
    })
}

/// Append-only, content-addressed store of record bodies.
pub struct AuditLog {
    root: PathBuf,
}

impl AuditLog {
    /// Open (creating if necessary) the audit log rooted at `root`, which is
    /// the `semantic/` directory under the storage path.
    pub fn open(root: PathBuf) -> Result<Self, AuditError> {
        std::fs::create_dir_all(root.join("objects"))?;
        std::fs::create_dir_all(root.join("refs"))?;
        Ok(Self { root })
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    fn object_path(&self, id: &str) -> PathBuf {
        let (prefix, rest) = id.split_at(2.min(id.len()));
        self.root.join("objects").join(prefix).join(rest)
    }

    fn head_path(&self) -> PathBuf {
        self.root.join("refs").join("HEAD")
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("log.idx")
    }

    /// Acquire the log's advisory file lock.
    pub fn lock(&self) -> Result<FileLock, AuditError> {
        FileLock::acquire(&self.lock_path())
    }

    /// Current HEAD ref, or [`GENESIS`] if the log is empty.
    pub fn head(&self) -> Result<String, AuditError> {
        match std::fs::read_to_string(self.head_path()) {
            Ok(contents) => Ok(contents.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GENESIS.to_string()),
            Err(e) => Err(AuditError::Io(e)),
        }
    }

    /// Append a new commit carrying `record`, parented on the current HEAD,
    /// returning the new commit ref without publishing it as HEAD.
    ///
    /// The caller (Transaction Manager) publishes by calling
    /// [`AuditLog::publish`] once every other staged resource is ready.
    pub fn stage(&self, record: &Record) -> Result<String, AuditError> {
        let parent = self.head()?;
        let (content, _message) = encode_commit(record, &parent);
        let commit_id = hash_content(&content);

        let object_path = self.object_path(&commit_id);
        if let Some(parent_dir) = object_path.parent() {
            std::fs::create_dir_all(parent_dir)?;
        }
        let mut file = std::fs::File::create(&object_path)?;
        file.write_all(content.as_bytes())?;
        Ok(commit_id)
    }

    /// Publish a previously staged commit ref as the new HEAD and append it
    /// to the replay index.
    pub fn publish(&self, commit_ref: &str) -> Result<(), AuditError> {
        let mut index_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path())?;
        writeln!(index_file, "{commit_ref}")?;

        std::fs::write(self.head_path(), commit_ref)?;
        Ok(())
    }

    /// Read back a single commit by ref.
    pub fn read_commit(&self, commit_ref: &str) -> Result<Commit, AuditError> {
        let path = self.object_path(commit_ref);
        let content = std::fs::read_to_string(&path)
            .map_err(|_| AuditError::CommitNotFound(commit_ref.to_string()))?;
        decode_commit(commit_ref, &content)
    }

    /// Whether the object for `commit_ref` has been written to disk. A
    /// staged-but-not-yet-published commit also satisfies this, since
    /// [`AuditLog::stage`] writes the object file immediately; use
    /// [`AuditLog::is_published`] to distinguish staged from published.
    pub fn contains(&self, commit_ref: &str) -> bool {
        self.object_path(commit_ref).exists()
    }

    /// Whether `commit_ref` has been published: it appears in the replay
    /// index, meaning [`AuditLog::publish`] ran to completion for it. Used
    /// by transaction recovery to tell a staged-only commit (crash before
    /// publish, safe to discard) from a published one (crash after the
    /// point of no return, must be driven to completion).
    pub fn is_published(&self, commit_ref: &str) -> Result<bool, AuditError> {
        let refs = match std::fs::read_to_string(self.index_path()) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(AuditError::Io(e)),
        };
        Ok(refs.lines().any(|line| line.trim() == commit_ref))
    }

    /// Stream every commit from `from_ref` (exclusive) forward to HEAD, in
    /// creation order, for index reconstruction.
    pub fn replay(&self, from_ref: &str) -> Result<Vec<Commit>, AuditError> {
        let refs = match std::fs::read_to_string(self.index_path()) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditError::Io(e)),
        };

        let mut commits = Vec::new();
        let mut seen_from = from_ref == GENESIS;
        for line in refs.lines() {
            let commit_ref = line.trim();
            if commit_ref.is_empty() {
                continue;
            }
            if !seen_from {
                if commit_ref == from_ref {
                    seen_from = true;
                }
                continue;
            }
            commits.push(self.read_commit(commit_ref)?);
        }
        Ok(commits)
    }

    /// Reconcile `store` against this log: replay the full history from
    /// [`GENESIS`], keeping the last commit seen per id as that id's
    /// current body, then (inside one batch transaction) upsert every id
    /// the log has and remove every index entry the log no longer accounts
    /// for. Used to rebuild the index after a failure the WAL recovery
    /// pass doesn't cover, or to verify the two stay consistent.
    pub fn sync_index(&self, store: &MetadataStore) -> Result<SyncReport, AuditError> {
        let commits = self.replay(GENESIS)?;
        let mut latest: HashMap<String, Record> = HashMap::new();
        for commit in commits {
            latest.insert(commit.record.id.clone(), commit.record);
        }

        let log_ids: HashSet<String> = latest.keys().cloned().collect();
        let index_ids: HashSet<String> = store.all_ids()?.into_iter().collect();

        let orphans: Vec<String> = index_ids.difference(&log_ids).cloned().collect();
        let missing: Vec<String> = log_ids.difference(&index_ids).cloned().collect();

        let records: Vec<Record> = latest.into_values().collect();
        store.batch_update(&records)?;
        store.remove_batch(&orphans)?;

        Ok(SyncReport {
            orphans_removed: orphans,
            entries_inserted: missing,
        })
    }
}
