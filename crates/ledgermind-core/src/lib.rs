//! # Ledgermind
//!
//! Transactional memory for autonomous agent decisions: a hybrid semantic
//! store with epistemic evolution. Decisions, proposals, and interventions
//! are versioned records under ACID write semantics; supersession chains
//! resolve recursively to their current truth, and lifecycle/authority-aware
//! ranking blends vector similarity with status, authority, phase, and
//! vitality bonuses.
//!
//! Two tiers back every record: a SQLite-backed [`storage::MetadataStore`]
//! for fast mutable lookups, and an append-only, content-addressed
//! [`audit::AuditLog`] that is the source of truth — the index can always be
//! rebuilt from it via [`audit::AuditLog::replay`]. A [`vector::VectorIndex`]
//! gives approximate nearest-neighbor search over embedded titles and
//! rationales, with an unindexed tail for inserts since the last compaction.
//! [`transaction::Coordinator`] runs every write across all three resources
//! and replays anything a crash left half-applied in `wal/` the next time
//! [`MemoryStore::open`] runs.
//!
//! [`MemoryStore`] is the facade every caller goes through: `record_decision`,
//! `supersede_decision`, `record_proposal`, `accept_proposal`,
//! `link_evidence`, `search_decisions`, `purge`.

pub mod audit;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod integrity;
pub mod lifecycle;
pub mod ranking;
pub mod record;
pub mod resolution;
pub mod storage;
pub mod transaction;
pub mod vector;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use lru::LruCache;

pub use config::Config;
pub use error::{InvariantCode, MemoryError, Result};
pub use record::{Authority, Kind, Phase, Record, SearchMode, SearchResult, Status};

use audit::AuditLog;
use embeddings::EmbeddingProvider;
use integrity::IntegrityChecker;
use lifecycle::{LifecycleEngine, TransitionMode};
use ranking::RankingEngine;
use record::{Event, TargetRegistry};
use storage::MetadataStore;
use transaction::Coordinator;
use vector::{VectorIndex, VectorIndexConfig};

type Listener = Box<dyn Fn(&Record) + Send + Sync>;

/// Active change-notification listeners, shared between [`MemoryStore`] and
/// every outstanding [`ChangeSubscription`] guard.
#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// RAII guard for a listener registered via [`MemoryStore::subscribe`].
/// Dropping it unregisters the listener; there is no separate unsubscribe
/// call to forget, so a scoped `let _sub = store.subscribe(...)` always
/// releases on scope exit, including on an early return or panic unwind.
pub struct ChangeSubscription {
    id: u64,
    registry: Arc<Mutex<ListenerRegistry>>,
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.listeners.remove(&self.id);
        }
    }
}

/// The Memory API: every public operation a caller performs against a store
/// rooted at one `storage_path`.
pub struct MemoryStore {
    metadata: MetadataStore,
    audit: AuditLog,
    vector: Arc<Mutex<VectorIndex>>,
    vector_path: PathBuf,
    wal_dir: PathBuf,
    embedder: Box<dyn EmbeddingProvider>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    targets: Mutex<TargetRegistry>,
    config: Config,
    cooldowns: Mutex<HashMap<Authority, Instant>>,
    access_log: Mutex<std::fs::File>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

/// Capacity of the query-embedding cache. One entry per distinct search
/// string; bounded so a pathological caller issuing unique queries forever
/// can't grow this without limit.
const QUERY_CACHE_CAPACITY: usize = 256;

impl MemoryStore {
    /// Open (creating if necessary) a store rooted at `storage_path`, laid
    /// out as documented: `semantic/` (Audit Log working tree),
    /// `semantic_meta.db` (Metadata Index), `vector_index/` (ANN index),
    /// `targets.json` (target alias registry), `audit.log` (access trail),
    /// `wal/` (transaction recovery markers). Replays any crash-interrupted
    /// write left behind in `wal/` before returning.
    pub fn open(
        storage_path: impl Into<PathBuf>,
        embedder: Box<dyn EmbeddingProvider>,
        config: Config,
    ) -> Result<Self> {
        let storage_path = storage_path.into();
        std::fs::create_dir_all(&storage_path)
            .map_err(|e| MemoryError::TransactionFailed(e.to_string()))?;

        let metadata = MetadataStore::open(storage_path.join("semantic_meta.db"))?;
        let audit = AuditLog::open(storage_path.join("semantic"))?;

        let vector_dir = storage_path.join("vector_index");
        std::fs::create_dir_all(&vector_dir)
            .map_err(|e| MemoryError::TransactionFailed(e.to_string()))?;
        let vector_path = vector_dir.join("index.usearch");
        let vector_config = VectorIndexConfig {
            dimensions: embedder.dimensions(),
            tail_fraction: config.ann_tail_fraction,
            ..VectorIndexConfig::default()
        };
        let vector = if vector_path.exists() {
            VectorIndex::load(&vector_path, vector_config)
        } else {
            VectorIndex::with_config(vector_config)?
        };

        let targets = TargetRegistry::load_on_open(&storage_path.join("targets.json"))
            .map_err(|e| MemoryError::TransactionFailed(e.to_string()))?;

        let access_log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(storage_path.join("audit.log"))
            .map_err(|e| MemoryError::TransactionFailed(e.to_string()))?;

        let store = Self {
            metadata,
            audit,
            vector: Arc::new(Mutex::new(vector)),
            vector_path,
            wal_dir: storage_path.join("wal"),
            embedder,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("capacity is nonzero"),
            )),
            targets: Mutex::new(targets),
            config,
            cooldowns: Mutex::new(HashMap::new()),
            access_log: Mutex::new(access_log),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        };

        let reconciled = store.coordinator()?.recover(store.embedder.as_ref())?;
        if reconciled > 0 {
            tracing::info!(reconciled, "recovered half-applied commits from wal");
        }

        Ok(store)
    }

    fn coordinator(&self) -> Result<Coordinator<'_>> {
        Ok(Coordinator::new(
            &self.metadata,
            &self.audit,
            &self.vector,
            self.vector_path.clone(),
            self.wal_dir.clone(),
        )?)
    }

    fn checker(&self) -> IntegrityChecker<'_> {
        IntegrityChecker::new(&self.metadata, self.config.max_resolution_depth)
    }

    fn resolve_target(&self, target: &str) -> String {
        self.targets
            .lock()
            .expect("target registry lock poisoned")
            .resolve(target)
    }

    /// Register `alias` as resolving to `canonical` for every future call
    /// that passes `alias` as a target. `canonical` is normalized as usual.
    pub fn register_target_alias(&self, alias: &str, canonical: &str) -> Result<()> {
        self.targets
            .lock()
            .expect("target registry lock poisoned")
            .persist_on_write(alias, canonical)
            .map_err(|e| MemoryError::TransactionFailed(e.to_string()))
    }

    /// Register a listener invoked with every record written by
    /// `record_decision`, `supersede_decision`, `record_proposal`,
    /// `accept_proposal`, or `link_evidence`. Drop the returned
    /// [`ChangeSubscription`] to stop receiving notifications.
    pub fn subscribe(&self, listener: impl Fn(&Record) + Send + Sync + 'static) -> ChangeSubscription {
        let mut registry = self.listeners.lock().expect("listener registry poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Box::new(listener));
        ChangeSubscription {
            id,
            registry: Arc::clone(&self.listeners),
        }
    }

    fn notify(&self, record: &Record) {
        let registry = self.listeners.lock().expect("listener registry poisoned");
        for listener in registry.listeners.values() {
            listener(record);
        }
    }

    /// Edge-level write throttle: at most one write per authority every
    /// `cooldown_seconds`, checked before the Audit Log lock is even
    /// attempted so a misbehaving caller can't pile up lock contention.
    fn check_cooldown(&self, authority: Authority) -> Result<()> {
        let mut cooldowns = self.cooldowns.lock().expect("cooldown lock poisoned");
        let now = Instant::now();
        let required = Duration::from_secs(self.config.cooldown_seconds);
        if let Some(&last) = cooldowns.get(&authority) {
            let elapsed = now.duration_since(last);
            if elapsed < required {
                return Err(MemoryError::CooldownActive {
                    authority,
                    retry_after_ms: (required - elapsed).as_millis() as i64,
                });
            }
        }
        cooldowns.insert(authority, now);
        Ok(())
    }

    fn embed_record(&self, record: &Record) -> Result<Vec<f32>> {
        Ok(self.embedder.embed(&format!("{}\n{}", record.title, record.rationale))?)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.lock().expect("query cache poisoned").get(query) {
            return Ok(cached.clone());
        }
        let embedding = self.embedder.embed(query)?;
        self.query_cache
            .lock()
            .expect("query cache poisoned")
            .put(query.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn log_access(&self, operation: &str, detail: &str) {
        use std::io::Write as _;
        if let Ok(mut file) = self.access_log.lock() {
            let _ = writeln!(file, "{} {operation} {detail}", Utc::now().to_rfc3339());
        }
    }

    fn write_record(&self, record: &Record, embedding: Option<&[f32]>) -> Result<()> {
        self.coordinator()?.run_write(&self.checker(), record, embedding)?;
        self.notify(record);

        let due = self
            .vector
            .lock()
            .expect("vector index lock poisoned")
            .needs_compact();
        if due {
            spawn_background_compaction(Arc::clone(&self.vector), self.vector_path.clone());
        }
        Ok(())
    }

    /// Record a new active decision for `target`. Fails I1 if an active
    /// record already exists there — call
    /// [`MemoryStore::supersede_decision`] instead.
    pub fn record_decision(
        &self,
        title: impl Into<String>,
        target: &str,
        rationale: impl Into<String>,
        consequences: Vec<String>,
        authority: Authority,
    ) -> Result<String> {
        self.check_cooldown(authority)?;
        let canonical_target = self.resolve_target(target);
        let record = Record::new(Kind::Decision, title, canonical_target, rationale, consequences, authority);
        let embedding = self.embed_record(&record)?;
        self.write_record(&record, Some(&embedding))?;
        self.log_access("record_decision", &record.id);
        Ok(record.id)
    }

    /// Supersede every id in `old_ids` with a new active decision for
    /// `target`. I2's 15-char rationale floor applies because `supersedes`
    /// is non-empty; I3 and I4 are checked against each `old_ids` entry
    /// before the new record is staged. `old_ids` are retired first so the
    /// new record's I1 check never sees a conflicting active record still
    /// standing for `target`; a crash between the retirements and the new
    /// write leaves the target briefly without an active record rather than
    /// violating an invariant, and a retry completes the supersession.
    pub fn supersede_decision(
        &self,
        title: impl Into<String>,
        target: &str,
        rationale: impl Into<String>,
        old_ids: &[String],
        consequences: Vec<String>,
        authority: Authority,
    ) -> Result<String> {
        self.check_cooldown(authority)?;
        let canonical_target = self.resolve_target(target);

        for old_id in old_ids {
            let mut old = self.metadata.get(old_id)?;
            old.status = Status::Superseded;
            old.updated_at = Utc::now();
            self.write_record(&old, None)?;
        }

        let mut record = Record::new(Kind::Decision, title, canonical_target, rationale, consequences, authority);
        record.supersedes = old_ids.to_vec();
        let embedding = self.embed_record(&record)?;
        self.write_record(&record, Some(&embedding))?;

        self.log_access("supersede_decision", &record.id);
        Ok(record.id)
    }

    /// Record a candidate decision, `status = proposal`, pending acceptance.
    pub fn record_proposal(
        &self,
        title: impl Into<String>,
        target: &str,
        rationale: impl Into<String>,
        consequences: Vec<String>,
        authority: Authority,
    ) -> Result<String> {
        self.check_cooldown(authority)?;
        let canonical_target = self.resolve_target(target);
        let mut record = Record::new(Kind::Proposal, title, canonical_target, rationale, consequences, authority);
        record.status = Status::Proposal;
        let embedding = self.embed_record(&record)?;
        self.write_record(&record, Some(&embedding))?;
        self.log_access("record_proposal", &record.id);
        Ok(record.id)
    }

    /// Accept a pending proposal: enforces I5 (review window elapsed) and
    /// I6 (evidence threshold met), then mints a new decision that
    /// supersedes the proposal, keeping acceptance symmetric with every
    /// other supersession instead of mutating the proposal in place.
    /// Returns the new decision's id.
    pub fn accept_proposal(&self, id: &str) -> Result<String> {
        let proposal = self.metadata.get(id)?;
        if proposal.status != Status::Proposal {
            return Err(MemoryError::NotFound(format!("{id} is not a pending proposal")));
        }

        let checker = self.checker();
        checker.check_review_window(proposal.created_at, Utc::now(), self.config.review_window_seconds)?;
        checker.check_evidence_threshold(proposal.evidence.len(), self.config.min_evidence)?;

        let mut decision = Record::new(
            Kind::Decision,
            proposal.title.clone(),
            proposal.target.clone(),
            proposal.rationale.clone(),
            proposal.consequences.clone(),
            proposal.authority,
        );
        decision.supersedes = vec![proposal.id.clone()];
        decision.evidence = proposal.evidence.clone();

        let embedding = self.embed_record(&decision)?;
        self.write_record(&decision, Some(&embedding))?;

        let mut retired = proposal;
        retired.status = Status::Superseded;
        retired.updated_at = Utc::now();
        self.write_record(&retired, None)?;

        self.log_access("accept_proposal", &decision.id);
        Ok(decision.id)
    }

    /// Append a new episodic event, independent of any target, for later
    /// linking via [`MemoryStore::link_evidence`].
    pub fn record_event(
        &self,
        prompt: impl Into<String>,
        response: impl Into<String>,
        success: bool,
    ) -> Result<String> {
        let event = Event::new(prompt, response, success);
        let txn = self.metadata.begin()?;
        self.metadata.append_event(&txn, &event)?;
        txn.commit()?;
        Ok(event.id)
    }

    /// Link `event_id` as evidence for the active record at `target`,
    /// reinforcing its vitality and, if evidence/age thresholds are
    /// crossed, promoting its lifecycle phase.
    pub fn link_evidence(&self, event_id: &str, target: &str) -> Result<()> {
        let canonical_target = self.resolve_target(target);
        let mut record = self
            .metadata
            .find_active_by_target(&canonical_target)?
            .ok_or_else(|| MemoryError::NotFound(canonical_target.clone()))?;

        if !record.evidence.iter().any(|existing| existing == event_id) {
            record.evidence.push(event_id.to_string());
        }
        let evidence_count = record.evidence.len();
        LifecycleEngine::reinforce(&mut record, evidence_count, Utc::now(), TransitionMode::ApiRequested);

        self.write_record(&record, None)?;
        self.log_access("link_evidence", &format!("{event_id} -> {canonical_target}"));
        Ok(())
    }

    /// Search for records matching `query`: embeds the query (cached by
    /// exact string), filters ANN candidates by `relevance_threshold`, then
    /// ranks the survivors per `mode`.
    pub fn search_decisions(&self, query: &str, limit: usize, mode: SearchMode) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed_query(query)?;
        let candidate_limit = limit.saturating_mul(4).max(20);

        let candidates: Vec<(String, f32)> = {
            let index = self.vector.lock().expect("vector index lock poisoned");
            index.search(&query_vector, candidate_limit)?
        };

        let filtered: Vec<(String, f32)> = candidates
            .into_iter()
            .filter(|(_, similarity)| *similarity >= self.config.relevance_threshold)
            .collect();

        let engine = RankingEngine::new(&self.metadata, self.config.max_resolution_depth);
        Ok(engine.rank(&filtered, mode, limit)?)
    }

    /// Reconcile the Metadata Index against the Audit Log: replays the full
    /// commit history, upserts every id the log has, and removes any index
    /// entry the log no longer accounts for. The index can always be
    /// rebuilt from the log this way; call after a `sync_index`-class
    /// failure the WAL recovery pass in [`MemoryStore::open`] doesn't cover,
    /// or to verify the two have not drifted apart.
    pub fn sync_index(&self) -> Result<audit::SyncReport> {
        Ok(self.audit.sync_index(&self.metadata)?)
    }

    /// Hard-delete `id`: removes it from the Metadata Index, tombstones its
    /// vector, and records a final commit in the Audit Log so the log stays
    /// the complete history of what happened to every id it ever saw.
    /// Restricted to `human`/`admin` authority.
    pub fn purge(&self, id: &str, authority: Authority) -> Result<()> {
        if authority == Authority::Agent {
            return Err(MemoryError::PermissionDenied(format!(
                "authority {authority} may not purge records"
            )));
        }

        let _lock = self.audit.lock()?;
        let mut record = self.metadata.get(id)?;

        let txn = self.metadata.begin()?;
        self.metadata.delete(&txn, id)?;
        txn.commit()?;

        {
            let mut index = self.vector.lock().expect("vector index lock poisoned");
            index.remove(id)?;
            index.save(&self.vector_path)?;
        }

        record.status = Status::Deprecated;
        record.updated_at = Utc::now();
        let commit_ref = self.audit.stage(&record)?;
        self.audit.publish(&commit_ref)?;

        self.log_access("purge", id);
        Ok(())
    }
}

/// Rebuild the ANN index off the calling write's thread: the expensive
/// rebuild runs with no lock held at all, and the vector index lock is
/// only taken twice, briefly, for the snapshot and for the final atomic
/// swap-in (plus the resulting save).
fn spawn_background_compaction(vector: Arc<Mutex<VectorIndex>>, vector_path: PathBuf) {
    std::thread::spawn(move || {
        let (snapshot, config) = {
            let index = vector.lock().expect("vector index lock poisoned");
            (index.snapshot_for_compaction(), index.config().clone())
        };

        match VectorIndex::build_compacted(&config, &snapshot) {
            Ok(compacted) => {
                let mut index = vector.lock().expect("vector index lock poisoned");
                index.install_compacted(compacted);
                if let Err(e) = index.save(&vector_path) {
                    tracing::warn!("failed to persist compacted vector index: {e}");
                }
            }
            Err(e) => tracing::warn!("background vector compaction failed: {e}"),
        }
    });
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.close_on_shutdown();
        }
    }
}
