//! Retrieval pipeline
//!
//! Binds topics, spreads activation, scores every fact, materializes the
//! top-K pool, and returns hydrated results. With a vector backend the
//! graph and vector rankings are merged; any vector failure degrades
//! silently to graph-only results.

use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::activation::ActivationEngine;
use crate::error::Result;
use crate::scoring::score_fact;
use crate::storage::queries;
use crate::types::{Entity, EntityId, Fact, FactId, RetrieveOptions, ScoredFact};
use crate::vector::VectorBackend;

/// Weight of the graph score in the hybrid merge
const GRAPH_WEIGHT: f32 = 0.7;

/// Weight of the vector score in the hybrid merge
const VECTOR_WEIGHT: f32 = 0.3;

/// Run the full pipeline. Callers wrap this in a transaction so the pool
/// swap is atomic.
pub fn retrieve(
    conn: &Connection,
    activation: &mut ActivationEngine,
    topics: &[String],
    options: &RetrieveOptions,
    vectors: Option<&dyn VectorBackend>,
    fuzzy_threshold: f32,
) -> Result<Vec<ScoredFact>> {
    activation.seed_topics(conn, topics, fuzzy_threshold)?;
    activation.spread(conn)?;

    let entities: HashMap<EntityId, Entity> = queries::list_entities(conn)?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

    let now = Utc::now();
    let mut scored: Vec<(Fact, f32)> = queries::list_facts(conn)?
        .into_iter()
        .map(|fact| {
            let subject = entities.get(&fact.subject_id);
            let score = score_fact(&fact, subject, topics, activation.levels(), now);
            (fact, score)
        })
        .collect();

    if options.use_vectors {
        if let Some(backend) = vectors {
            scored = merge_vector_hits(conn, scored, topics, options.pool_size, backend)?;
        }
    }

    // Descending by score, ties broken stably by fact id
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.id.cmp(&b.0.id))
    });
    scored.truncate(options.pool_size);

    let pool_rows: Vec<(FactId, f32)> = scored.iter().map(|(f, s)| (f.id, *s)).collect();
    queries::replace_pool(conn, &pool_rows)?;

    debug!(topics = topics.len(), results = scored.len(), "retrieval complete");

    Ok(scored
        .into_iter()
        .map(|(fact, score)| {
            let subject = entities.get(&fact.subject_id).cloned();
            let object = fact.object_id.and_then(|id| entities.get(&id).cloned());
            ScoredFact {
                fact,
                subject,
                object,
                score,
            }
        })
        .collect())
}

/// Merge graph scores with a vector ranking: facts present in both get
/// `0.7*graph + 0.3*vector`; vector-only hits enter at `0.3*vector`.
/// A failing backend leaves the graph ranking untouched.
fn merge_vector_hits(
    conn: &Connection,
    scored: Vec<(Fact, f32)>,
    topics: &[String],
    limit: usize,
    backend: &dyn VectorBackend,
) -> Result<Vec<(Fact, f32)>> {
    let query = topics.join(" ");
    let hits = match backend.search_by_vector(&query, limit) {
        Ok(hits) => hits,
        Err(err) => {
            warn!(error = %err, "vector backend failed, using graph-only results");
            return Ok(scored);
        }
    };

    let mut vector_scores: HashMap<FactId, f32> = hits.into_iter().collect();

    let mut merged: Vec<(Fact, f32)> = scored
        .into_iter()
        .map(|(fact, graph_score)| {
            let v = vector_scores.remove(&fact.id).unwrap_or(0.0);
            let combined = GRAPH_WEIGHT * graph_score + VECTOR_WEIGHT * v;
            (fact, combined)
        })
        .collect();

    // Hits the graph pass never saw (stale index entries are skipped)
    for (fact_id, v) in vector_scores {
        if let Some(fact) = queries::get_fact(conn, fact_id)? {
            merged.push((fact, VECTOR_WEIGHT * v));
        }
    }

    Ok(merged)
}
