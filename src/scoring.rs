//! Relevance scoring
//!
//! Pure per-fact scoring against the current topics and activation map.
//! No stored state is read or written here.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::text::normalize;
use crate::types::{Entity, EntityId, EntityType, Fact};

/// Bonus when a topic and the subject's canonical name contain each other
const TOPIC_NAME_BONUS: f32 = 0.4;

/// Bonus (at most once per topic) when any subject alias contains the topic
const TOPIC_ALIAS_BONUS: f32 = 0.3;

/// Weight of the subject's current activation
const ACTIVATION_WEIGHT: f32 = 0.3;

/// Salience prior for the subject's entity type
pub fn type_prior(entity_type: EntityType) -> f32 {
    match entity_type {
        EntityType::Person | EntityType::Project => 0.15,
        EntityType::Preference => 0.2,
        EntityType::Tool => 0.1,
        EntityType::Concept => 0.05,
        EntityType::Website | EntityType::Other => 0.0,
    }
}

/// Score one fact in [0, 1].
///
/// A missing subject entity falls back to the pre-topic-bonus score
/// (importance times confidence).
pub fn score_fact(
    fact: &Fact,
    subject: Option<&Entity>,
    topics: &[String],
    activation: &HashMap<EntityId, f32>,
    now: DateTime<Utc>,
) -> f32 {
    let base = fact.importance * fact.confidence;

    let Some(subject) = subject else {
        return base;
    };

    let mut score = base;

    for topic in topics {
        let needle = normalize(topic);
        if needle.is_empty() {
            continue;
        }
        if subject.canonical_name.contains(&needle) || needle.contains(&subject.canonical_name) {
            score += TOPIC_NAME_BONUS;
        }
        if subject
            .aliases
            .iter()
            .any(|alias| normalize(alias).contains(&needle))
        {
            score += TOPIC_ALIAS_BONUS;
        }
    }

    score += ACTIVATION_WEIGHT * activation.get(&subject.id).copied().unwrap_or(0.0);
    score += type_prior(subject.entity_type);

    let hours_idle = (now - fact.last_used).num_seconds() as f32 / 3600.0;
    score += (0.2 - 0.01 * hours_idle).max(0.0);

    score.min(1.0)
}
