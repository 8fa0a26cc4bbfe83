//! Database queries for entities, facts, and engine bookkeeping tables

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::types::*;

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// =============================================================================
// Entities
// =============================================================================

/// Parse an entity from a database row
pub fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let id: i64 = row.get("id")?;
    let name: String = row.get("name")?;
    let canonical_name: String = row.get("canonical_name")?;
    let entity_type_str: String = row.get("entity_type")?;
    let aliases_str: String = row.get("aliases")?;
    let confidence: f32 = row.get("confidence")?;
    let created_at: String = row.get("created_at")?;

    let entity_type = entity_type_str.parse().unwrap_or(EntityType::Other);
    let aliases: Vec<String> = serde_json::from_str(&aliases_str).unwrap_or_default();

    Ok(Entity {
        id,
        name,
        canonical_name,
        entity_type,
        aliases,
        confidence,
        created_at: parse_timestamp(&created_at),
    })
}

const ENTITY_COLUMNS: &str =
    "id, name, canonical_name, entity_type, aliases, confidence, created_at";

/// Insert a new entity, returning its id
pub fn insert_entity(
    conn: &Connection,
    name: &str,
    canonical_name: &str,
    entity_type: EntityType,
    confidence: f32,
) -> Result<EntityId> {
    let now = Utc::now().to_rfc3339();
    let aliases = serde_json::to_string(&[name])?;

    conn.execute(
        "INSERT INTO entities (name, canonical_name, entity_type, aliases, confidence, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![name, canonical_name, entity_type.as_str(), aliases, confidence, now],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Get an entity by id
pub fn get_entity(conn: &Connection, id: EntityId) -> Result<Option<Entity>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM entities WHERE id = ?",
        ENTITY_COLUMNS
    ))?;

    match stmt.query_row([id], entity_from_row) {
        Ok(entity) => Ok(Some(entity)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Find an entity by exact canonical name
pub fn get_entity_by_canonical(conn: &Connection, canonical: &str) -> Result<Option<Entity>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM entities WHERE canonical_name = ?",
        ENTITY_COLUMNS
    ))?;

    match stmt.query_row([canonical], entity_from_row) {
        Ok(entity) => Ok(Some(entity)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all entities ordered by id
pub fn list_entities(conn: &Connection) -> Result<Vec<Entity>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM entities ORDER BY id",
        ENTITY_COLUMNS
    ))?;

    let entities = stmt
        .query_map([], entity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entities)
}

/// Update the alias list and confidence of an entity
pub fn update_entity_observation(
    conn: &Connection,
    id: EntityId,
    aliases: &[String],
    confidence: f32,
) -> Result<()> {
    let aliases_json = serde_json::to_string(aliases)?;
    conn.execute(
        "UPDATE entities SET aliases = ?, confidence = ? WHERE id = ?",
        params![aliases_json, confidence, id],
    )?;
    Ok(())
}

/// Delete an entity row
pub fn delete_entity(conn: &Connection, id: EntityId) -> Result<()> {
    conn.execute("DELETE FROM entities WHERE id = ?", [id])?;
    Ok(())
}

/// Repoint all facts referencing `from` (as subject or object) to `to`
pub fn rewrite_fact_endpoints(conn: &Connection, from: EntityId, to: EntityId) -> Result<usize> {
    let subjects = conn.execute(
        "UPDATE facts SET subject_id = ? WHERE subject_id = ?",
        params![to, from],
    )?;
    let objects = conn.execute(
        "UPDATE facts SET object_id = ? WHERE object_id = ?",
        params![to, from],
    )?;
    Ok(subjects + objects)
}

// =============================================================================
// Facts
// =============================================================================

/// Parse a fact from a database row
pub fn fact_from_row(row: &Row) -> rusqlite::Result<Fact> {
    let id: i64 = row.get("id")?;
    let subject_id: i64 = row.get("subject_id")?;
    let predicate_str: String = row.get("predicate")?;
    let object_id: Option<i64> = row.get("object_id")?;
    let content: String = row.get("content")?;
    let tier_str: String = row.get("tier")?;
    let importance: f32 = row.get("importance")?;
    let confidence: f32 = row.get("confidence")?;
    let source: String = row.get("source")?;
    let last_used: String = row.get("last_used")?;
    let use_count: i64 = row.get("use_count")?;
    let created_at: String = row.get("created_at")?;
    let ttl_ms: Option<i64> = row.get("ttl_ms")?;

    let predicate = predicate_str.parse().unwrap_or(Predicate::RelatedTo);
    let tier = tier_str.parse().unwrap_or(MemoryTier::Semantic);

    Ok(Fact {
        id,
        subject_id,
        predicate,
        object_id,
        content,
        tier,
        importance,
        confidence,
        source,
        last_used: parse_timestamp(&last_used),
        use_count,
        created_at: parse_timestamp(&created_at),
        ttl_ms,
    })
}

const FACT_COLUMNS: &str = "id, subject_id, predicate, object_id, content, tier, importance, \
                            confidence, source, last_used, use_count, created_at, ttl_ms";

/// Insert a new fact, returning its id
#[allow(clippy::too_many_arguments)]
pub fn insert_fact(
    conn: &Connection,
    subject_id: EntityId,
    predicate: Predicate,
    object_id: Option<EntityId>,
    content: &str,
    tier: MemoryTier,
    importance: f32,
    confidence: f32,
    source: &str,
    ttl_ms: Option<i64>,
) -> Result<FactId> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO facts (subject_id, predicate, object_id, content, tier, importance,
                            confidence, source, last_used, use_count, created_at, ttl_ms)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        params![
            subject_id,
            predicate.as_str(),
            object_id,
            content,
            tier.as_str(),
            importance,
            confidence,
            source,
            now,
            now,
            ttl_ms,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Get a fact by id
pub fn get_fact(conn: &Connection, id: FactId) -> Result<Option<Fact>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {} FROM facts WHERE id = ?", FACT_COLUMNS))?;

    match stmt.query_row([id], fact_from_row) {
        Ok(fact) => Ok(Some(fact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all facts ordered by id
pub fn list_facts(conn: &Connection) -> Result<Vec<Fact>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM facts ORDER BY id", FACT_COLUMNS))?;

    let facts = stmt
        .query_map([], fact_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(facts)
}

/// List facts of one tier ordered by id
pub fn list_facts_by_tier(conn: &Connection, tier: MemoryTier) -> Result<Vec<Fact>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM facts WHERE tier = ? ORDER BY id",
        FACT_COLUMNS
    ))?;

    let facts = stmt
        .query_map([tier.as_str()], fact_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(facts)
}

/// All facts where the entity appears as subject or object
pub fn facts_touching(conn: &Connection, entity_id: EntityId) -> Result<Vec<Fact>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM facts WHERE subject_id = ? OR object_id = ?",
        FACT_COLUMNS
    ))?;

    let facts = stmt
        .query_map(params![entity_id, entity_id], fact_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(facts)
}

/// Record a use of a fact: bump importance (capped), refresh last_used,
/// increment use_count
pub fn touch_fact(conn: &Connection, id: FactId) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE facts SET importance = MIN(1.0, importance + 0.1),
                          last_used = ?,
                          use_count = use_count + 1
         WHERE id = ?",
        params![now, id],
    )?;
    Ok(updated > 0)
}

/// Overwrite the importance of a fact
pub fn update_fact_importance(conn: &Connection, id: FactId, importance: f32) -> Result<()> {
    conn.execute(
        "UPDATE facts SET importance = ? WHERE id = ?",
        params![importance, id],
    )?;
    Ok(())
}

/// Overwrite the content of a fact
pub fn update_fact_content(conn: &Connection, id: FactId, content: &str) -> Result<()> {
    conn.execute(
        "UPDATE facts SET content = ? WHERE id = ?",
        params![content, id],
    )?;
    Ok(())
}

/// Fold merge results into the surviving fact
pub fn apply_fact_merge(
    conn: &Connection,
    id: FactId,
    confidence: f32,
    importance: f32,
    use_count: i64,
    last_used: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE facts SET confidence = ?, importance = ?, use_count = ?, last_used = ?
         WHERE id = ?",
        params![confidence, importance, use_count, last_used.to_rfc3339(), id],
    )?;
    Ok(())
}

/// Delete a fact row
pub fn delete_fact(conn: &Connection, id: FactId) -> Result<()> {
    conn.execute("DELETE FROM facts WHERE id = ?", [id])?;
    Ok(())
}

// =============================================================================
// Pool
// =============================================================================

fn pool_entry_from_row(row: &Row) -> rusqlite::Result<PoolEntry> {
    let fact_id: i64 = row.get("fact_id")?;
    let relevance_score: f32 = row.get("relevance_score")?;
    let added_at: String = row.get("added_at")?;

    Ok(PoolEntry {
        fact_id,
        relevance_score,
        added_at: parse_timestamp(&added_at),
    })
}

/// Replace the pool contents; callers wrap this in a transaction so
/// readers only ever observe a full snapshot
pub fn replace_pool(conn: &Connection, entries: &[(FactId, f32)]) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    conn.execute("DELETE FROM pool", [])?;
    let mut stmt = conn
        .prepare_cached("INSERT INTO pool (fact_id, relevance_score, added_at) VALUES (?, ?, ?)")?;
    for (fact_id, score) in entries {
        stmt.execute(params![fact_id, score, now])?;
    }
    Ok(())
}

/// Read the current pool, highest score first
pub fn get_pool(conn: &Connection) -> Result<Vec<PoolEntry>> {
    let mut stmt = conn.prepare(
        "SELECT fact_id, relevance_score, added_at FROM pool ORDER BY relevance_score DESC",
    )?;

    let entries = stmt
        .query_map([], pool_entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

// =============================================================================
// Topics
// =============================================================================

fn topic_from_row(row: &Row) -> rusqlite::Result<Topic> {
    let topic: String = row.get("topic")?;
    let weight: f32 = row.get("weight")?;
    let last_seen: String = row.get("last_seen")?;

    Ok(Topic {
        topic,
        weight,
        last_seen: parse_timestamp(&last_seen),
    })
}

/// Record a topic sighting: weight <- 0.9 * weight + 1.0
pub fn upsert_topic(conn: &Connection, topic: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO topics (topic, weight, last_seen) VALUES (?, 1.0, ?)
         ON CONFLICT(topic) DO UPDATE SET
            weight = 0.9 * weight + 1.0,
            last_seen = excluded.last_seen",
        params![topic, now],
    )?;
    Ok(())
}

/// List all topics, most recently seen first
pub fn list_topics(conn: &Connection) -> Result<Vec<Topic>> {
    let mut stmt =
        conn.prepare("SELECT topic, weight, last_seen FROM topics ORDER BY last_seen DESC")?;

    let topics = stmt
        .query_map([], topic_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(topics)
}

// =============================================================================
// Contradictions
// =============================================================================

/// Append one contradiction pair to the log
pub fn insert_contradiction(conn: &Connection, fact1_id: FactId, fact2_id: FactId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO contradictions (fact1_id, fact2_id, detected_at) VALUES (?, ?, ?)",
        params![fact1_id, fact2_id, now],
    )?;
    Ok(())
}

/// Read the contradiction log, newest first
pub fn list_contradictions(conn: &Connection) -> Result<Vec<Contradiction>> {
    let mut stmt = conn.prepare(
        "SELECT id, fact1_id, fact2_id, detected_at FROM contradictions ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let detected_at: String = row.get("detected_at")?;
            Ok(Contradiction {
                id: row.get("id")?,
                fact1_id: row.get("fact1_id")?,
                fact2_id: row.get("fact2_id")?,
                detected_at: parse_timestamp(&detected_at),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// =============================================================================
// Co-references
// =============================================================================

fn co_reference_from_row(row: &Row) -> rusqlite::Result<CoReference> {
    let last_seen: String = row.get("last_seen")?;
    Ok(CoReference {
        pronoun: row.get("pronoun")?,
        entity_id: row.get("entity_id")?,
        context: row.get("context")?,
        last_seen: parse_timestamp(&last_seen),
    })
}

/// Bind a pronoun to an entity, replacing any prior binding
pub fn upsert_co_reference(
    conn: &Connection,
    pronoun: &str,
    entity_id: EntityId,
    context: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO co_references (pronoun, entity_id, context, last_seen) VALUES (?, ?, ?, ?)
         ON CONFLICT(pronoun) DO UPDATE SET
            entity_id = excluded.entity_id,
            context = excluded.context,
            last_seen = excluded.last_seen",
        params![pronoun, entity_id, context, now],
    )?;
    Ok(())
}

/// Most recent binding for a pronoun, if any
pub fn get_co_reference(conn: &Connection, pronoun: &str) -> Result<Option<CoReference>> {
    let mut stmt = conn.prepare_cached(
        "SELECT pronoun, entity_id, context, last_seen FROM co_references WHERE pronoun = ?",
    )?;

    match stmt.query_row([pronoun], co_reference_from_row) {
        Ok(cr) => Ok(Some(cr)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All current pronoun bindings
pub fn list_co_references(conn: &Connection) -> Result<Vec<CoReference>> {
    let mut stmt =
        conn.prepare("SELECT pronoun, entity_id, context, last_seen FROM co_references")?;

    let rows = stmt
        .query_map([], co_reference_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// =============================================================================
// Activation history
// =============================================================================

/// Persist a batch of activation snapshots
pub fn insert_activation_records(conn: &Connection, records: &[ActivationRecord]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO activation_history (entity_id, activation, source, timestamp)
         VALUES (?, ?, ?, ?)",
    )?;
    for record in records {
        stmt.execute(params![
            record.entity_id,
            record.activation,
            record.source,
            record.timestamp.to_rfc3339(),
        ])?;
    }
    Ok(())
}

/// Read the persisted activation history, oldest first
pub fn list_activation_history(conn: &Connection) -> Result<Vec<ActivationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, activation, source, timestamp FROM activation_history ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let timestamp: String = row.get("timestamp")?;
            Ok(ActivationRecord {
                entity_id: row.get("entity_id")?,
                activation: row.get("activation")?,
                source: row.get("source")?,
                timestamp: parse_timestamp(&timestamp),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// =============================================================================
// Reflections
// =============================================================================

/// Append a reflection-log row
pub fn insert_reflection(
    conn: &Connection,
    summary: &ReflectionSummary,
    errors: &[String],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let errors_json = serde_json::to_string(errors)?;
    conn.execute(
        "INSERT INTO reflections (ran_at, contradictions, entities_merged, facts_compressed, errors)
         VALUES (?, ?, ?, ?, ?)",
        params![
            now,
            summary.contradictions as i64,
            summary.entities as i64,
            summary.compressed as i64,
            errors_json,
        ],
    )?;
    Ok(())
}

// =============================================================================
// Stats
// =============================================================================

fn count_rows(conn: &Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}

/// Count rows across every table
pub fn collect_stats(conn: &Connection) -> Result<EngineStats> {
    Ok(EngineStats {
        entities: count_rows(conn, "SELECT COUNT(*) FROM entities")?,
        facts: count_rows(conn, "SELECT COUNT(*) FROM facts")?,
        episodic_facts: count_rows(conn, "SELECT COUNT(*) FROM facts WHERE tier = 'episodic'")?,
        semantic_facts: count_rows(conn, "SELECT COUNT(*) FROM facts WHERE tier = 'semantic'")?,
        structural_facts: count_rows(
            conn,
            "SELECT COUNT(*) FROM facts WHERE tier = 'structural'",
        )?,
        pool_entries: count_rows(conn, "SELECT COUNT(*) FROM pool")?,
        topics: count_rows(conn, "SELECT COUNT(*) FROM topics")?,
        contradictions: count_rows(conn, "SELECT COUNT(*) FROM contradictions")?,
        co_references: count_rows(conn, "SELECT COUNT(*) FROM co_references")?,
        activation_history_rows: count_rows(conn, "SELECT COUNT(*) FROM activation_history")?,
        reflections: count_rows(conn, "SELECT COUNT(*) FROM reflections")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn topic_weight_follows_sighting_formula() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                upsert_topic(conn, "rust")?;
                upsert_topic(conn, "rust")?;
                upsert_topic(conn, "rust")?;
                Ok(())
            })
            .unwrap();

        let topics = storage.with_connection(list_topics).unwrap();
        assert_eq!(topics.len(), 1);
        // 1.0 -> 1.9 -> 2.71
        assert!((topics[0].weight - 2.71).abs() < 1e-5);
    }

    #[test]
    fn fact_round_trip() {
        let storage = Storage::open_in_memory().unwrap();
        let fact = storage
            .with_connection(|conn| {
                let subject = insert_entity(conn, "William", "william", EntityType::Person, 0.9)?;
                let object = insert_entity(conn, "OpenLiam", "openliam", EntityType::Project, 0.5)?;
                let id = insert_fact(
                    conn,
                    subject,
                    Predicate::Created,
                    Some(object),
                    "William created OpenLiam",
                    MemoryTier::Semantic,
                    0.6,
                    0.7,
                    "conversation",
                    None,
                )?;
                get_fact(conn, id)
            })
            .unwrap()
            .unwrap();

        assert_eq!(fact.predicate, Predicate::Created);
        assert_eq!(fact.tier, MemoryTier::Semantic);
        assert_eq!(fact.use_count, 0);
        assert!(fact.object_id.is_some());
        assert_eq!(fact.ttl_ms, None);
    }

    #[test]
    fn touch_fact_caps_importance() {
        let storage = Storage::open_in_memory().unwrap();
        let fact = storage
            .with_connection(|conn| {
                let subject = insert_entity(conn, "x", "x", EntityType::Other, 0.5)?;
                let id = insert_fact(
                    conn,
                    subject,
                    Predicate::Is,
                    None,
                    "x is x",
                    MemoryTier::Structural,
                    0.95,
                    0.7,
                    "conversation",
                    None,
                )?;
                touch_fact(conn, id)?;
                touch_fact(conn, id)?;
                get_fact(conn, id)
            })
            .unwrap()
            .unwrap();

        assert_eq!(fact.importance, 1.0);
        assert_eq!(fact.use_count, 2);
    }

    #[test]
    fn pool_is_replaced_not_appended() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let subject = insert_entity(conn, "x", "x", EntityType::Other, 0.5)?;
                let f1 = insert_fact(
                    conn, subject, Predicate::Is, None, "a", MemoryTier::Semantic,
                    0.6, 0.7, "conversation", None,
                )?;
                let f2 = insert_fact(
                    conn, subject, Predicate::Has, None, "b", MemoryTier::Semantic,
                    0.6, 0.7, "conversation", None,
                )?;
                replace_pool(conn, &[(f1, 0.9), (f2, 0.5)])?;
                replace_pool(conn, &[(f2, 0.4)])?;
                Ok(())
            })
            .unwrap();

        let pool = storage.with_connection(get_pool).unwrap();
        assert_eq!(pool.len(), 1);
        assert!((pool[0].relevance_score - 0.4).abs() < 1e-6);
    }
}
