//! Entity resolution and creation
//!
//! Lookup tries exact canonical match, then alias substring match, then
//! fuzzy edit-distance match. Re-observation accumulates aliases and
//! blends confidence; the observed type is never overwritten.

use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::Result;
use crate::storage::queries;
use crate::text::{normalize, similarity};
use crate::types::{Entity, EntityId, EntityType, MergeSuggestion};

/// Resolve a surface form to at most one entity.
///
/// Tries, in order: exact canonical-name match, substring match against
/// stored aliases, fuzzy match at or above `fuzzy_threshold` (ties broken
/// by higher similarity, then lower id).
pub fn resolve_entity(
    conn: &Connection,
    query: &str,
    fuzzy_threshold: f32,
) -> Result<Option<Entity>> {
    let needle = normalize(query);
    if needle.is_empty() {
        return Ok(None);
    }

    if let Some(entity) = queries::get_entity_by_canonical(conn, &needle)? {
        return Ok(Some(entity));
    }

    // Alias substring pass, in id order so the earliest entity wins
    for entity in queries::list_entities(conn)? {
        let hit = entity.aliases.iter().any(|alias| {
            let a = normalize(alias);
            !a.is_empty() && (a.contains(&needle) || needle.contains(&a))
        });
        if hit {
            return Ok(Some(entity));
        }
    }

    let matches = find_fuzzy_matches(conn, query, fuzzy_threshold)?;
    Ok(matches.into_iter().next().map(|(entity, _)| entity))
}

/// Create an entity, or fold a re-observation into the existing one.
///
/// An existing entity with the same canonical name gains `name` as an
/// alias (if novel) and its confidence becomes the arithmetic mean of the
/// old and new values. The stored type is kept as-is.
pub fn add_entity(
    conn: &Connection,
    name: &str,
    entity_type: EntityType,
    confidence: f32,
) -> Result<EntityId> {
    let canonical = normalize(name);

    if let Some(existing) = queries::get_entity_by_canonical(conn, &canonical)? {
        let mut aliases = existing.aliases.clone();
        if !aliases.iter().any(|a| a == name) {
            aliases.push(name.to_string());
        }
        let blended = (existing.confidence + confidence) / 2.0;
        queries::update_entity_observation(conn, existing.id, &aliases, blended)?;
        debug!(entity_id = existing.id, name, "entity re-observed");
        return Ok(existing.id);
    }

    queries::insert_entity(conn, name, &canonical, entity_type, confidence)
}

/// Scan all entities for fuzzy matches at or above `threshold`.
///
/// Per-entity score is the best similarity between the normalized query
/// and either the canonical name or any normalized alias. Results are
/// sorted by similarity descending, then id ascending.
pub fn find_fuzzy_matches(
    conn: &Connection,
    query: &str,
    threshold: f32,
) -> Result<Vec<(Entity, f32)>> {
    let needle = normalize(query);
    let mut matches = Vec::new();

    for entity in queries::list_entities(conn)? {
        let mut best = similarity(&needle, &entity.canonical_name);
        for alias in &entity.aliases {
            best = best.max(similarity(&needle, &normalize(alias)));
        }
        if best >= threshold {
            matches.push((entity, best));
        }
    }

    matches.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.id.cmp(&b.0.id))
    });

    Ok(matches)
}

/// Pairwise scan for entities that likely refer to the same thing.
///
/// The reason is upgraded from name similarity to shared relationships
/// when the two entities appear as subject of any common predicate.
pub fn suggest_entity_merges(conn: &Connection, threshold: f32) -> Result<Vec<MergeSuggestion>> {
    let entities = queries::list_entities(conn)?;
    let mut suggestions = Vec::new();

    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let sim = similarity(&entities[i].canonical_name, &entities[j].canonical_name);
            if sim < threshold {
                continue;
            }

            let shared = shared_subject_predicates(conn, entities[i].id, entities[j].id)?;
            let reason = if shared.is_empty() {
                "High name similarity".to_string()
            } else {
                format!(
                    "Shared relationships: {}",
                    shared.into_iter().collect::<Vec<_>>().join(", ")
                )
            };

            suggestions.push(MergeSuggestion {
                entity1: entities[i].clone(),
                entity2: entities[j].clone(),
                similarity: sim,
                reason,
            });
        }
    }

    suggestions.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(suggestions)
}

/// Predicates both entities use as subject
fn shared_subject_predicates(
    conn: &Connection,
    e1: EntityId,
    e2: EntityId,
) -> Result<BTreeSet<String>> {
    let predicates_of = |id: EntityId| -> Result<BTreeSet<String>> {
        Ok(queries::facts_touching(conn, id)?
            .into_iter()
            .filter(|f| f.subject_id == id)
            .map(|f| f.predicate.as_str().to_string())
            .collect())
    };

    let p1 = predicates_of(e1)?;
    let p2 = predicates_of(e2)?;
    Ok(p1.intersection(&p2).cloned().collect())
}
