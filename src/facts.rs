//! Fact store operations
//!
//! Facts are typed edges between entities. Insertion resolves or creates
//! both endpoints, derives importance from the tier, and assigns the
//! episodic default TTL when none is supplied.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{CortexError, Result};
use crate::resolver;
use crate::storage::queries;
use crate::types::{AddFactInput, EntityType, FactId, Predicate};

/// Entity type hint derived from the predicate a subject appears in
pub fn infer_entity_type(predicate: Predicate) -> EntityType {
    match predicate {
        Predicate::Knows
        | Predicate::Prefers
        | Predicate::Learned
        | Predicate::Teachers
        | Predicate::Caregiver
        | Predicate::Autistic
        | Predicate::AffiliatedWith
        | Predicate::Created
        | Predicate::Uses
        | Predicate::Mentioned
        | Predicate::Discussed
        | Predicate::Queried
        | Predicate::Recalled => EntityType::Person,
        Predicate::ForkOf | Predicate::Github | Predicate::CreatedBy | Predicate::RunsOn => {
            EntityType::Project
        }
        Predicate::Model | Predicate::UsedFor => EntityType::Tool,
        Predicate::Is | Predicate::Has | Predicate::RelatedTo => EntityType::Other,
    }
}

/// Insert a fact, resolving or creating its endpoint entities.
///
/// Initial importance comes from the tier's base; episodic facts with no
/// explicit TTL get the 7-day default.
pub fn add_fact(conn: &Connection, input: &AddFactInput, fuzzy_threshold: f32) -> Result<FactId> {
    if input.subject.trim().is_empty() {
        return Err(CortexError::InvalidInput(
            "fact subject must not be empty".to_string(),
        ));
    }
    if matches!(&input.object, Some(o) if o.trim().is_empty()) {
        return Err(CortexError::InvalidInput(
            "fact object must not be empty".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&input.confidence) {
        return Err(CortexError::InvalidInput(format!(
            "confidence out of range: {}",
            input.confidence
        )));
    }

    let subject_id = match resolver::resolve_entity(conn, &input.subject, fuzzy_threshold)? {
        Some(entity) => entity.id,
        None => resolver::add_entity(
            conn,
            &input.subject,
            infer_entity_type(input.predicate),
            input.confidence,
        )?,
    };

    let object_id = match &input.object {
        Some(object) => Some(
            match resolver::resolve_entity(conn, object, fuzzy_threshold)? {
                Some(entity) => entity.id,
                None => resolver::add_entity(conn, object, EntityType::Other, input.confidence)?,
            },
        ),
        None => None,
    };

    let importance = input.tier.config().base_importance;
    let ttl_ms = input.ttl_ms.or_else(|| input.tier.default_ttl_ms());

    let id = queries::insert_fact(
        conn,
        subject_id,
        input.predicate,
        object_id,
        &input.content,
        input.tier,
        importance,
        input.confidence,
        &input.source,
        ttl_ms,
    )?;
    debug!(fact_id = id, predicate = input.predicate.as_str(), "fact added");
    Ok(id)
}

/// Reinforce a fact: +0.1 importance (capped at 1.0), fresh last_used,
/// incremented use_count
pub fn use_fact(conn: &Connection, id: FactId) -> Result<()> {
    if !queries::touch_fact(conn, id)? {
        return Err(CortexError::NotFound(id));
    }
    Ok(())
}

/// Apply `add_fact` to each input in order. Items are independently
/// durable; a failure stops the walk and reports the error.
pub fn bulk_add(
    conn: &Connection,
    inputs: &[AddFactInput],
    fuzzy_threshold: f32,
) -> Result<Vec<FactId>> {
    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        ids.push(add_fact(conn, input, fuzzy_threshold)?);
    }
    Ok(ids)
}
