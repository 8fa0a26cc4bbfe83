//! Spreading activation over the fact graph
//!
//! Topics seed entities at full activation; each spread pass propagates
//! salience along fact edges with geometric decay and per-predicate edge
//! weights. The graph may contain cycles; the layer bound and the
//! activation floor guarantee termination.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::error::Result;
use crate::resolver;
use crate::storage::queries;
use crate::types::{ActivationRecord, EntityId};

/// Entities below this activation neither propagate nor survive decay
pub const ACTIVATION_FLOOR: f32 = 0.01;

/// Fraction removed from entities idle for over an hour
const IDLE_DECAY: f32 = 0.05;

/// In-memory history ring capacity
const HISTORY_CAPACITY: usize = 1000;

/// Most recent history entries persisted per spread pass
const PERSISTED_SLICE: usize = 100;

/// Per-instance activation state: a salience map plus a bounded
/// history ring
pub struct ActivationEngine {
    levels: HashMap<EntityId, f32>,
    history: VecDeque<ActivationRecord>,
    depth: usize,
    decay: f32,
}

impl ActivationEngine {
    pub fn new(depth: usize, decay: f32) -> Self {
        Self {
            levels: HashMap::new(),
            history: VecDeque::new(),
            depth,
            decay,
        }
    }

    /// Reset the map and seed full activation from resolved topics.
    ///
    /// Every topic sighting also bumps its stored weight.
    pub fn seed_topics(
        &mut self,
        conn: &Connection,
        topics: &[String],
        fuzzy_threshold: f32,
    ) -> Result<()> {
        self.levels.clear();

        for topic in topics {
            queries::upsert_topic(conn, topic)?;
            if let Some(entity) = resolver::resolve_entity(conn, topic, fuzzy_threshold)? {
                self.levels.insert(entity.id, 1.0);
            }
        }

        debug!(seeds = self.levels.len(), "activation seeded");
        Ok(())
    }

    /// Propagate activation outward for the configured depth, then decay
    /// idle entities and snapshot the result into the history ring.
    pub fn spread(&mut self, conn: &Connection) -> Result<()> {
        for layer in 0..self.depth {
            let layer_decay = self.decay.powi(layer as i32 + 1);
            let mut next: HashMap<EntityId, f32> = HashMap::new();

            let active: Vec<(EntityId, f32)> = self
                .levels
                .iter()
                .filter(|(_, &a)| a >= ACTIVATION_FLOOR)
                .map(|(&id, &a)| (id, a))
                .collect();

            for (id, activation) in active {
                for fact in queries::facts_touching(conn, id)? {
                    let neighbor = if fact.subject_id == id {
                        fact.object_id
                    } else {
                        Some(fact.subject_id)
                    };
                    let Some(neighbor) = neighbor else { continue };
                    if neighbor == id {
                        continue;
                    }

                    let proposed = activation * layer_decay * fact.predicate.edge_weight();
                    let slot = next.entry(neighbor).or_insert(0.0);
                    if proposed > *slot {
                        *slot = proposed;
                    }
                }
            }

            // Element-wise max into the global map
            for (id, proposed) in next {
                let slot = self.levels.entry(id).or_insert(0.0);
                if proposed > *slot {
                    *slot = proposed;
                }
            }
        }

        self.decay_idle(Utc::now());
        self.snapshot(conn)?;
        Ok(())
    }

    /// Entities with no history entry in the last hour lose a slice of
    /// their activation; anything under the floor is dropped.
    fn decay_idle(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(1);
        let history = &self.history;
        for (id, activation) in self.levels.iter_mut() {
            let recently_seen = history
                .iter()
                .rev()
                .any(|r| r.entity_id == *id && r.timestamp > cutoff);
            if !recently_seen {
                *activation *= 1.0 - IDLE_DECAY;
            }
        }
        self.levels.retain(|_, a| *a >= ACTIVATION_FLOOR);
    }

    /// Append one record per active entity, trim the ring, and persist
    /// the most recent slice.
    fn snapshot(&mut self, conn: &Connection) -> Result<()> {
        let now = Utc::now();
        for (&entity_id, &activation) in &self.levels {
            self.history.push_back(ActivationRecord {
                entity_id,
                activation,
                source: "spread".to_string(),
                timestamp: now,
            });
        }
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        let start = self.history.len().saturating_sub(PERSISTED_SLICE);
        let recent: Vec<ActivationRecord> = self.history.iter().skip(start).cloned().collect();
        queries::insert_activation_records(conn, &recent)?;

        debug!(
            active = self.levels.len(),
            persisted = recent.len(),
            "spread pass complete"
        );
        Ok(())
    }

    /// Current activation of an entity (0 when absent)
    pub fn activation(&self, entity_id: EntityId) -> f32 {
        self.levels.get(&entity_id).copied().unwrap_or(0.0)
    }

    /// Snapshot of the current activation map
    pub fn levels(&self) -> &HashMap<EntityId, f32> {
        &self.levels
    }

    /// In-memory history entries for one entity since a timestamp
    pub fn history_since(
        &self,
        entity_id: EntityId,
        since: DateTime<Utc>,
    ) -> Vec<ActivationRecord> {
        self.history
            .iter()
            .filter(|r| r.entity_id == entity_id && r.timestamp >= since)
            .cloned()
            .collect()
    }
}
