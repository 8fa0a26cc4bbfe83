//! Pronoun co-reference tracking
//!
//! Bindings live in a per-instance cache backed by the co_references
//! table and expire after a short window. Only a closed pronoun set is
//! ever resolved.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use std::collections::HashMap;

use crate::error::Result;
use crate::resolver;
use crate::storage::queries;
use crate::text::normalize;
use crate::types::{Entity, EntityId};

/// Pronouns eligible for co-reference resolution
pub const PRONOUNS: &[&str] = &[
    "he",
    "she",
    "it",
    "they",
    "him",
    "her",
    "them",
    "this",
    "that",
    "the project",
    "the file",
];

/// Per-instance pronoun binding cache
pub struct CoReferenceTracker {
    cache: HashMap<String, (EntityId, DateTime<Utc>)>,
    window: Duration,
}

impl CoReferenceTracker {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            cache: HashMap::new(),
            window: Duration::minutes(window_minutes),
        }
    }

    /// Bind a pronoun to an entity, in cache and store
    pub fn bind(
        &mut self,
        conn: &Connection,
        pronoun: &str,
        entity_id: EntityId,
        context: &str,
    ) -> Result<()> {
        let key = normalize(pronoun);
        queries::upsert_co_reference(conn, &key, entity_id, context)?;
        self.cache.insert(key, (entity_id, Utc::now()));
        Ok(())
    }

    /// Resolve a pronoun to an entity.
    ///
    /// Tries, in order: a live cached binding, a live persisted binding,
    /// and finally the current conversational context (binding the first
    /// term that resolves to an entity). Unknown pronouns never resolve.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        pronoun: &str,
        current_context: &[String],
        fuzzy_threshold: f32,
    ) -> Result<Option<Entity>> {
        let key = normalize(pronoun);
        if !PRONOUNS.contains(&key.as_str()) {
            return Ok(None);
        }

        let now = Utc::now();

        if let Some(&(entity_id, bound_at)) = self.cache.get(&key) {
            if now - bound_at <= self.window {
                return queries::get_entity(conn, entity_id);
            }
        }

        if let Some(binding) = queries::get_co_reference(conn, &key)? {
            if now - binding.last_seen <= self.window {
                self.cache.insert(key, (binding.entity_id, binding.last_seen));
                return queries::get_entity(conn, binding.entity_id);
            }
        }

        for term in current_context {
            if let Some(entity) = resolver::resolve_entity(conn, term, fuzzy_threshold)? {
                self.bind(conn, &key, entity.id, term)?;
                return Ok(Some(entity));
            }
        }

        Ok(None)
    }
}
