//! Reflection: periodic maintenance over the fact graph
//!
//! Phases run in a fixed order: time decay, contradiction detection,
//! duplicate-entity consolidation, memory compression (similar-fact
//! merging, redundant-edge pruning, aged-fact summarization). Each phase
//! is well-defined on its own and converges under replay. Episodic TTL
//! eviction is deliberately not part of the pass; callers schedule
//! `cleanup_expired_episodic` themselves.

use chrono::Utc;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::queries;
use crate::text::similarity;
use crate::types::{EntityId, Fact, MemoryTier, Predicate};

/// Facts below this importance are dropped by decay
const IMPORTANCE_FLOOR: f32 = 0.1;

/// Content similarity (strictly) above this merges semantic facts
const MERGE_SIMILARITY: f32 = 0.85;

/// Age in days past which heavily-used semantic facts are summarized
const SUMMARIZE_AGE_DAYS: i64 = 90;

/// Prefix marking already-summarized content
const SUMMARY_PREFIX: &str = "[Summarized:";

/// Decay every fact's importance toward its tier base and delete facts
/// that fall below the floor. Returns (decayed, deleted).
///
/// Importance at or above the tier base relaxes exponentially toward the
/// base; importance already below the base decays toward zero, so stale
/// low-value facts eventually drop out entirely. Importance never
/// increases here.
pub fn apply_decay(conn: &Connection) -> Result<(usize, usize)> {
    let now = Utc::now();
    let mut decayed = 0;
    let mut deleted = 0;

    for fact in queries::list_facts(conn)? {
        let config = fact.tier.config();
        let hours_idle = ((now - fact.last_used).num_seconds() as f32 / 3600.0).max(0.0);
        let factor = (-config.decay_rate * hours_idle).exp();

        let new_importance = if fact.importance >= config.base_importance {
            config.base_importance + (fact.importance - config.base_importance) * factor
        } else {
            fact.importance * factor
        };

        if new_importance < IMPORTANCE_FLOOR {
            queries::delete_fact(conn, fact.id)?;
            deleted += 1;
        } else if new_importance < fact.importance {
            queries::update_fact_importance(conn, fact.id, new_importance)?;
            decayed += 1;
        }
    }

    debug!(decayed, deleted, "decay applied");
    Ok((decayed, deleted))
}

/// Record every pair of facts sharing (subject, predicate) whose content
/// differs. Pairs are logged low-id-first; re-detections on later runs
/// append again.
pub fn detect_contradictions(conn: &Connection) -> Result<usize> {
    let facts = queries::list_facts(conn)?;
    let mut groups: HashMap<(EntityId, Predicate), Vec<&Fact>> = HashMap::new();
    for fact in &facts {
        groups
            .entry((fact.subject_id, fact.predicate))
            .or_default()
            .push(fact);
    }

    let mut recorded = 0;
    for group in groups.values() {
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                if group[i].content != group[j].content {
                    queries::insert_contradiction(conn, group[i].id, group[j].id)?;
                    recorded += 1;
                }
            }
        }
    }

    if recorded > 0 {
        info!(recorded, "contradictions detected");
    }
    Ok(recorded)
}

/// Collapse entities sharing a canonical name into the first-seen one:
/// facts are repointed, alias sets merged, confidences averaged, and the
/// duplicates deleted. Returns the number of entities removed.
pub fn consolidate_entities(conn: &Connection) -> Result<usize> {
    let entities = queries::list_entities(conn)?;
    let mut groups: HashMap<&str, Vec<&crate::types::Entity>> = HashMap::new();
    for entity in &entities {
        groups
            .entry(entity.canonical_name.as_str())
            .or_default()
            .push(entity);
    }

    let mut removed = 0;
    for group in groups.values() {
        if group.len() < 2 {
            continue;
        }
        // list_entities is id-ordered, so the first member is first-seen
        let survivor = group[0];

        let mut aliases = survivor.aliases.clone();
        let mut seen: HashSet<String> = aliases.iter().cloned().collect();
        for dup in &group[1..] {
            for alias in &dup.aliases {
                if seen.insert(alias.clone()) {
                    aliases.push(alias.clone());
                }
            }
        }

        let confidence = group.iter().map(|e| e.confidence).sum::<f32>() / group.len() as f32;

        for dup in &group[1..] {
            queries::rewrite_fact_endpoints(conn, dup.id, survivor.id)?;
            queries::delete_entity(conn, dup.id)?;
            removed += 1;
        }
        queries::update_entity_observation(conn, survivor.id, &aliases, confidence)?;
    }

    if removed > 0 {
        info!(removed, "duplicate entities consolidated");
    }
    Ok(removed)
}

/// Memory compression: merge near-identical semantic facts, prune
/// redundant edges, summarize aged content. Returns facts affected.
pub fn compress_memories(conn: &Connection) -> Result<usize> {
    let merged = merge_similar_facts(conn)?;
    let pruned = prune_redundant_edges(conn)?;
    let summarized = summarize_aged_facts(conn)?;
    debug!(merged, pruned, summarized, "memory compression complete");
    Ok(merged + pruned + summarized)
}

/// Within the semantic tier, merge pairs sharing (subject, predicate)
/// whose content similarity exceeds the threshold. The lower-id fact
/// survives with summed confidence (capped), max importance, summed
/// use count, and the later last_used.
fn merge_similar_facts(conn: &Connection) -> Result<usize> {
    let facts = queries::list_facts_by_tier(conn, MemoryTier::Semantic)?;
    let mut groups: HashMap<(EntityId, Predicate), Vec<usize>> = HashMap::new();
    for (idx, fact) in facts.iter().enumerate() {
        groups
            .entry((fact.subject_id, fact.predicate))
            .or_default()
            .push(idx);
    }

    let mut facts = facts;
    let mut removed: HashSet<usize> = HashSet::new();
    let mut merged = 0;

    for indices in groups.values() {
        for a in 0..indices.len() {
            let i = indices[a];
            if removed.contains(&i) {
                continue;
            }
            for b in (a + 1)..indices.len() {
                let j = indices[b];
                if removed.contains(&j) {
                    continue;
                }
                if similarity(&facts[i].content, &facts[j].content) <= MERGE_SIMILARITY {
                    continue;
                }

                let (confidence, importance, use_count, last_used) = {
                    let (fi, fj) = (&facts[i], &facts[j]);
                    (
                        (fi.confidence + fj.confidence).min(1.0),
                        fi.importance.max(fj.importance),
                        fi.use_count + fj.use_count,
                        fi.last_used.max(fj.last_used),
                    )
                };

                queries::apply_fact_merge(
                    conn,
                    facts[i].id,
                    confidence,
                    importance,
                    use_count,
                    last_used,
                )?;
                queries::delete_fact(conn, facts[j].id)?;

                facts[i].confidence = confidence;
                facts[i].importance = importance;
                facts[i].use_count = use_count;
                facts[i].last_used = last_used;
                removed.insert(j);
                merged += 1;
            }
        }
    }

    Ok(merged)
}

/// For every (subject, predicate, object) triple stored more than once,
/// keep the single row with max importance (tie-break: max use count)
/// and delete the rest.
fn prune_redundant_edges(conn: &Connection) -> Result<usize> {
    let facts = queries::list_facts(conn)?;
    let mut groups: HashMap<(EntityId, Predicate, EntityId), Vec<&Fact>> = HashMap::new();
    for fact in &facts {
        if let Some(object_id) = fact.object_id {
            groups
                .entry((fact.subject_id, fact.predicate, object_id))
                .or_default()
                .push(fact);
        }
    }

    let mut pruned = 0;
    for group in groups.values_mut() {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.use_count.cmp(&a.use_count))
                .then(a.id.cmp(&b.id))
        });
        for fact in &group[1..] {
            queries::delete_fact(conn, fact.id)?;
            pruned += 1;
        }
    }

    Ok(pruned)
}

/// Replace the content of old, heavily-used, long semantic facts with a
/// truncated summary marker. Already-summarized content is left alone so
/// replays converge.
fn summarize_aged_facts(conn: &Connection) -> Result<usize> {
    let now = Utc::now();
    let cutoff = now - chrono::Duration::days(SUMMARIZE_AGE_DAYS);
    let mut summarized = 0;

    for fact in queries::list_facts_by_tier(conn, MemoryTier::Semantic)? {
        if fact.created_at >= cutoff
            || fact.importance <= 0.3
            || fact.use_count <= 3
            || fact.content.chars().count() < 50
            || fact.content.starts_with(SUMMARY_PREFIX)
        {
            continue;
        }

        let head: String = fact.content.chars().take(100).collect();
        let summary = format!("{} {}...]", SUMMARY_PREFIX, head);
        queries::update_fact_content(conn, fact.id, &summary)?;
        summarized += 1;
    }

    Ok(summarized)
}

/// Delete every episodic fact whose TTL has elapsed. Not invoked by the
/// reflection pass; callers schedule this independently.
pub fn cleanup_expired_episodic(conn: &Connection) -> Result<usize> {
    let now = Utc::now();
    let mut deleted = 0;

    for fact in queries::list_facts_by_tier(conn, MemoryTier::Episodic)? {
        if fact.ttl_ms.is_some() && fact.is_expired(now) {
            queries::delete_fact(conn, fact.id)?;
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(deleted, "expired episodic facts evicted");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts;
    use crate::storage::Storage;
    use crate::types::{AddFactInput, EntityType};

    fn backdate_last_used(conn: &Connection, fact_id: i64, hours: i64) {
        let when = (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339();
        conn.execute(
            "UPDATE facts SET last_used = ? WHERE id = ?",
            rusqlite::params![when, fact_id],
        )
        .unwrap();
    }

    #[test]
    fn decay_keeps_importance_at_tier_base() {
        let storage = Storage::open_in_memory().unwrap();
        let fact = storage
            .with_connection(|conn| {
                let id = facts::add_fact(
                    conn,
                    &AddFactInput::new("x", Predicate::Is, None, "x is x"),
                    0.8,
                )?;
                backdate_last_used(conn, id, 24 * 365);
                apply_decay(conn)?;
                queries::get_fact(conn, id)
            })
            .unwrap()
            .unwrap();

        // Semantic fact at base importance stays at base after a year
        assert!((fact.importance - 0.6).abs() < 1e-4);
    }

    #[test]
    fn decay_deletes_low_importance_facts() {
        let storage = Storage::open_in_memory().unwrap();
        let remaining = storage
            .with_connection(|conn| {
                let id = facts::add_fact(
                    conn,
                    &AddFactInput::new("x", Predicate::Is, None, "x is x"),
                    0.8,
                )?;
                queries::update_fact_importance(conn, id, 0.2)?;
                backdate_last_used(conn, id, 24 * 365);
                apply_decay(conn)?;
                queries::get_fact(conn, id)
            })
            .unwrap();

        assert!(remaining.is_none());
    }

    #[test]
    fn decay_never_increases_importance() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                for (content, hours) in [("a", 0), ("b", 5), ("c", 1000)] {
                    let id = facts::add_fact(
                        conn,
                        &AddFactInput::new(content, Predicate::Is, None, content),
                        0.8,
                    )?;
                    backdate_last_used(conn, id, hours);
                }
                let before: HashMap<i64, f32> = queries::list_facts(conn)?
                    .into_iter()
                    .map(|f| (f.id, f.importance))
                    .collect();
                apply_decay(conn)?;
                for fact in queries::list_facts(conn)? {
                    assert!(fact.importance <= before[&fact.id] + 1e-6);
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn contradictions_are_recorded_per_pair() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                facts::bulk_add(
                    conn,
                    &[
                        AddFactInput::new("William", Predicate::Prefers, None, "prefers tabs"),
                        AddFactInput::new("William", Predicate::Prefers, None, "prefers spaces"),
                    ],
                    0.8,
                )?;
                let recorded = detect_contradictions(conn)?;
                assert_eq!(recorded, 1);

                let log = queries::list_contradictions(conn)?;
                assert_eq!(log.len(), 1);
                assert!(log[0].fact1_id < log[0].fact2_id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn duplicate_facts_merge_into_lowest_id() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let input = AddFactInput::new(
                    "William",
                    Predicate::Prefers,
                    Some("tabs"),
                    "prefers tabs over spaces",
                );
                let first = facts::add_fact(conn, &input, 0.8)?;
                let second = facts::add_fact(conn, &input, 0.8)?;

                let compressed = compress_memories(conn)?;
                assert_eq!(compressed, 1);

                let survivor = queries::get_fact(conn, first)?.unwrap();
                assert!(queries::get_fact(conn, second)?.is_none());
                assert_eq!(survivor.use_count, 0);
                assert!((survivor.importance - 0.6).abs() < 1e-6);
                // confidence accumulates, capped at 1.0
                assert!((survivor.confidence - 1.0).abs() < 1e-6);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn redundant_edges_keep_the_most_important_row() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                // Distinct contents dodge the similarity merge so the
                // pruning pass does the work
                let a = facts::add_fact(
                    conn,
                    &AddFactInput::new("svc", Predicate::RunsOn, Some("linux"), "deployed on linux"),
                    0.8,
                )?;
                let b = facts::add_fact(
                    conn,
                    &AddFactInput::new(
                        "svc",
                        Predicate::RunsOn,
                        Some("linux"),
                        "runs in a container on the linux host",
                    ),
                    0.8,
                )?;
                queries::update_fact_importance(conn, b, 0.9)?;

                compress_memories(conn)?;

                assert!(queries::get_fact(conn, a)?.is_none());
                assert!(queries::get_fact(conn, b)?.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn aged_facts_get_summarized_once() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let id = facts::add_fact(
                    conn,
                    &AddFactInput::new(
                        "svc",
                        Predicate::Is,
                        None,
                        "a long-winded statement about the service and its many deployment details \
                         that easily clears the length gate",
                    ),
                    0.8,
                )?;
                let old = (Utc::now() - chrono::Duration::days(120)).to_rfc3339();
                conn.execute(
                    "UPDATE facts SET created_at = ?, use_count = 5, importance = 0.6 WHERE id = ?",
                    rusqlite::params![old, id],
                )?;

                compress_memories(conn)?;
                let once = queries::get_fact(conn, id)?.unwrap().content;
                assert!(once.starts_with(SUMMARY_PREFIX));

                compress_memories(conn)?;
                let twice = queries::get_fact(conn, id)?.unwrap().content;
                assert_eq!(once, twice);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn expired_episodic_facts_are_evicted() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let fresh = facts::add_fact(
                    conn,
                    &AddFactInput::new("x", Predicate::Mentioned, None, "fresh")
                        .tier(MemoryTier::Episodic),
                    0.8,
                )?;
                let stale = facts::add_fact(
                    conn,
                    &AddFactInput::new("y", Predicate::Mentioned, None, "stale")
                        .tier(MemoryTier::Episodic),
                    0.8,
                )?;
                let old = (Utc::now() - chrono::Duration::days(8)).to_rfc3339();
                conn.execute(
                    "UPDATE facts SET created_at = ? WHERE id = ?",
                    rusqlite::params![old, stale],
                )?;

                let deleted = cleanup_expired_episodic(conn)?;
                assert_eq!(deleted, 1);
                assert!(queries::get_fact(conn, fresh)?.is_some());
                assert!(queries::get_fact(conn, stale)?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn consolidation_is_a_no_op_on_distinct_entities() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                crate::resolver::add_entity(conn, "William", EntityType::Person, 0.8)?;
                crate::resolver::add_entity(conn, "Willem", EntityType::Person, 0.8)?;

                let removed = consolidate_entities(conn)?;
                assert_eq!(removed, 0);
                assert_eq!(queries::list_entities(conn)?.len(), 2);
                Ok(())
            })
            .unwrap();
    }
}
