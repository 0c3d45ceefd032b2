//! Ranking Engine
//!
//! Blends raw vector similarity with lifecycle/authority/status adjustments,
//! applies the mode filter, and runs the final truth-resolution pass. The
//! fusion helpers (`reciprocal_rank_fusion`, `linear_combination`) are kept
//! for combining keyword and semantic candidate lists before scoring.

use std::collections::{HashMap, HashSet};

use crate::record::{Record, SearchMode, SearchResult};
use crate::storage::{MetadataStore, Resolution, StorageError};

/// Cap on the log-decay age penalty.
const MAX_AGE_PENALTY: f32 = 0.3;

/// Half-life, in days, used by the age penalty's log-decay curve.
const AGE_PENALTY_HALF_LIFE_DAYS: f32 = 30.0;

/// Reciprocal Rank Fusion for combining search results from independent
/// sources (e.g. keyword and semantic candidate lists) before ranking.
pub fn reciprocal_rank_fusion(
    lists: &[&[(String, f32)]],
    k: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for list in lists {
        for (rank, (key, _)) in list.iter().enumerate() {
            *scores.entry(key.clone()).or_default() += 1.0 / (k + rank as f32);
        }
    }
    let mut results: Vec<(String, f32)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Linear combination of search results with explicit weights.
pub fn linear_combination(
    keyword_results: &[(String, f32)],
    semantic_results: &[(String, f32)],
    keyword_weight: f32,
    semantic_weight: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    let max_keyword = keyword_results.first().map(|(_, s)| *s).unwrap_or(1.0).max(0.001);
    for (key, score) in keyword_results {
        *scores.entry(key.clone()).or_default() += (score / max_keyword) * keyword_weight;
    }

    let max_semantic = semantic_results.first().map(|(_, s)| *s).unwrap_or(1.0).max(0.001);
    for (key, score) in semantic_results {
        *scores.entry(key.clone()).or_default() += (score / max_semantic) * semantic_weight;
    }

    let mut results: Vec<(String, f32)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

fn age_penalty(updated_at: chrono::DateTime<chrono::Utc>) -> f32 {
    let age_days = (chrono::Utc::now() - updated_at).num_seconds().max(0) as f32 / 86_400.0;
    let decay = 1.0 - (-age_days / AGE_PENALTY_HALF_LIFE_DAYS).exp();
    (decay * MAX_AGE_PENALTY).min(MAX_AGE_PENALTY)
}

/// The blended score for a single candidate, per the documented formula.
pub fn score(record: &Record, similarity: f32) -> f32 {
    similarity
        + record.status.status_bonus()
        + record.authority.authority_bonus()
        + record.phase.phase_bonus()
        + record.vitality * 0.1
        - age_penalty(record.updated_at)
}

fn tie_break(a: &Record, b: &Record) -> std::cmp::Ordering {
    b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id))
}

/// Ranking Engine: scores candidates, applies the mode filter and dedup
/// policy, then runs the truth-resolution pass.
pub struct RankingEngine<'a> {
    store: &'a MetadataStore,
    max_resolution_depth: u32,
}

impl<'a> RankingEngine<'a> {
    /// Construct a ranking engine bound to a Metadata Index.
    pub fn new(store: &'a MetadataStore, max_resolution_depth: u32) -> Self {
        Self {
            store,
            max_resolution_depth,
        }
    }

    /// Rank `candidates` (record id, raw similarity) under `mode`, returning
    /// ordered [`SearchResult`]s.
    pub fn rank(
        &self,
        candidates: &[(String, f32)],
        mode: SearchMode,
        limit: usize,
    ) -> Result<Vec<SearchResult>, StorageError> {
        let ids: Vec<String> = candidates.iter().map(|(id, _)| id.clone()).collect();
        let records = self.store.get_batch(&ids)?;
        let now = chrono::Utc::now();

        let mut scored: Vec<(Record, f32)> = candidates
            .iter()
            .filter_map(|(id, similarity)| {
                let record = records.get(id)?;
                if mode == SearchMode::Strict && record.status != crate::record::Status::Active {
                    return None;
                }
                // Vitality decays lazily at read time rather than via a
                // stored mutation, so a record that hasn't been reinforced
                // since its last write still scores as stale.
                let mut record = record.clone();
                crate::lifecycle::LifecycleEngine::decay(&mut record, now);
                let final_score = score(&record, *similarity);
                Some((record, final_score))
            })
            .collect();

        scored.sort_by(|(a, score_a), (b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| tie_break(a, b))
        });

        if mode == SearchMode::Balanced {
            let mut seen_targets = HashSet::new();
            scored.retain(|(record, _)| seen_targets.insert(record.target.clone()));
        }

        let resolved = self.resolve_truths(scored, mode)?;
        Ok(resolved.into_iter().take(limit).collect())
    }

    fn resolve_truths(
        &self,
        scored: Vec<(Record, f32)>,
        mode: SearchMode,
    ) -> Result<Vec<SearchResult>, StorageError> {
        if mode == SearchMode::Audit {
            return Ok(scored
                .into_iter()
                .map(|(record, final_score)| SearchResult {
                    id: record.id,
                    title: record.title,
                    target: record.target,
                    status: record.status,
                    rationale: record.rationale,
                    score: final_score,
                    truth_id: None,
                    superseded_by: None,
                })
                .collect());
        }

        let mut resolutions = Vec::with_capacity(scored.len());
        for (record, final_score) in scored {
            let resolution = self
                .store
                .resolve_to_truth(&record.id, self.max_resolution_depth)?;

            let truth_id = match &resolution {
                Resolution::Active(truth_id) if *truth_id == record.id => None,
                Resolution::Active(truth_id) => Some(truth_id.clone()),
                Resolution::NoActiveTruth { deepest_id, .. } if *deepest_id == record.id => None,
                Resolution::NoActiveTruth { deepest_id, .. } => Some(deepest_id.clone()),
                Resolution::CycleDetected => None,
            };
            resolutions.push((record, final_score, truth_id));
        }

        // Batch-fetch every distinct truth record so a candidate that
        // resolved to a different id is rendered as that truth's own
        // fields, not the stale superseded candidate's.
        let truth_ids: Vec<String> = resolutions
            .iter()
            .filter_map(|(_, _, truth_id)| truth_id.clone())
            .collect();
        let truths = self.store.get_batch(&truth_ids)?;

        let mut seen_truth_ids = HashSet::new();
        let mut results = Vec::with_capacity(resolutions.len());

        for (record, final_score, truth_id) in resolutions {
            let dedup_key = truth_id.clone().unwrap_or_else(|| record.id.clone());
            if !seen_truth_ids.insert(dedup_key) {
                continue;
            }

            let superseded_by = truth_id.clone();
            let source = match &truth_id {
                Some(id) => truths.get(id).cloned().unwrap_or(record),
                None => record,
            };

            results.push(SearchResult {
                id: source.id,
                title: source.title,
                target: source.target,
                status: source.status,
                rationale: source.rationale,
                score: final_score,
                truth_id,
                superseded_by,
            });
        }

        Ok(results)
    }
}
