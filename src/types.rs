//! Core types for CortexPool

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an entity
pub type EntityId = i64;

/// Unique identifier for a fact
pub type FactId = i64;

/// Default episodic TTL: 7 days in milliseconds
pub const EPISODIC_DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// A named node in the memory graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: EntityId,
    /// Original surface form as first observed
    pub name: String,
    /// Lowercased, trimmed, whitespace-collapsed form; unique across entities
    pub canonical_name: String,
    /// Entity classification
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// All surface forms ever observed, insertion-order preserved
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// When the entity was first observed
    pub created_at: DateTime<Utc>,
}

/// Entity type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Project,
    Concept,
    Tool,
    Preference,
    Website,
    #[default]
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Project => "project",
            EntityType::Concept => "concept",
            EntityType::Tool => "tool",
            EntityType::Preference => "preference",
            EntityType::Website => "website",
            EntityType::Other => "other",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "person" => Ok(EntityType::Person),
            "project" => Ok(EntityType::Project),
            "concept" => Ok(EntityType::Concept),
            "tool" => Ok(EntityType::Tool),
            "preference" => Ok(EntityType::Preference),
            "website" => Ok(EntityType::Website),
            "other" => Ok(EntityType::Other),
            _ => Err(format!("Unknown entity type: {}", s)),
        }
    }
}

/// A directed, typed edge between entities with attached content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier
    pub id: FactId,
    /// Subject entity (always present)
    pub subject_id: EntityId,
    /// Relationship predicate
    pub predicate: Predicate,
    /// Object entity (None for unary facts)
    pub object_id: Option<EntityId>,
    /// Human-readable statement
    pub content: String,
    /// Lifetime class governing decay and base importance
    pub tier: MemoryTier,
    /// Importance score (0.0 - 1.0)
    pub importance: f32,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Provenance tag
    pub source: String,
    /// When the fact was last retrieved or reinforced
    pub last_used: DateTime<Utc>,
    /// Number of times reinforced
    pub use_count: i64,
    /// When the fact was created
    pub created_at: DateTime<Utc>,
    /// Optional time-to-live in milliseconds from creation
    pub ttl_ms: Option<i64>,
}

impl Fact {
    /// True when a TTL is set and has elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_ms {
            Some(ttl) => self.created_at + chrono::Duration::milliseconds(ttl) < now,
            None => false,
        }
    }
}

/// Memory tier: lifetime class of a fact
///
/// Tiers control decay rate, default importance, and expected age:
/// - `Episodic`: short-lived conversational detail, fast decay, default TTL
/// - `Semantic`: durable knowledge about entities
/// - `Structural`: near-permanent relationships (identity, ownership)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    Episodic,
    #[default]
    Semantic,
    Structural,
}

/// Per-tier lifecycle parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Exponential decay rate per hour since last use
    pub decay_rate: f32,
    /// Importance assigned at creation
    pub base_importance: f32,
    /// Expected maximum age in hours (None = unbounded)
    pub max_age_hours: Option<i64>,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Episodic => "episodic",
            MemoryTier::Semantic => "semantic",
            MemoryTier::Structural => "structural",
        }
    }

    /// Lifecycle parameters for this tier
    pub fn config(&self) -> TierConfig {
        match self {
            MemoryTier::Episodic => TierConfig {
                decay_rate: 0.1,
                base_importance: 0.3,
                max_age_hours: Some(24),
            },
            MemoryTier::Semantic => TierConfig {
                decay_rate: 0.01,
                base_importance: 0.6,
                max_age_hours: Some(365 * 24),
            },
            MemoryTier::Structural => TierConfig {
                decay_rate: 0.001,
                base_importance: 0.8,
                max_age_hours: None,
            },
        }
    }

    /// Default TTL in milliseconds when none is supplied
    pub fn default_ttl_ms(&self) -> Option<i64> {
        match self {
            MemoryTier::Episodic => Some(EPISODIC_DEFAULT_TTL_MS),
            _ => None,
        }
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "episodic" => Ok(MemoryTier::Episodic),
            "semantic" => Ok(MemoryTier::Semantic),
            "structural" => Ok(MemoryTier::Structural),
            _ => Err(format!("Unknown memory tier: {}", s)),
        }
    }
}

/// Closed predicate vocabulary for fact edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    Knows,
    Created,
    ForkOf,
    Prefers,
    Uses,
    Learned,
    Teachers,
    RunsOn,
    Model,
    Github,
    Caregiver,
    Autistic,
    UsedFor,
    CreatedBy,
    Is,
    Has,
    AffiliatedWith,
    RelatedTo,
    Mentioned,
    Discussed,
    Queried,
    Recalled,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::Knows => "knows",
            Predicate::Created => "created",
            Predicate::ForkOf => "fork-of",
            Predicate::Prefers => "prefers",
            Predicate::Uses => "uses",
            Predicate::Learned => "learned",
            Predicate::Teachers => "teachers",
            Predicate::RunsOn => "runs-on",
            Predicate::Model => "model",
            Predicate::Github => "github",
            Predicate::Caregiver => "caregiver",
            Predicate::Autistic => "autistic",
            Predicate::UsedFor => "used-for",
            Predicate::CreatedBy => "created-by",
            Predicate::Is => "is",
            Predicate::Has => "has",
            Predicate::AffiliatedWith => "affiliated-with",
            Predicate::RelatedTo => "related-to",
            Predicate::Mentioned => "mentioned",
            Predicate::Discussed => "discussed",
            Predicate::Queried => "queried",
            Predicate::Recalled => "recalled",
        }
    }

    /// Propagation weight used by activation spreading
    pub fn edge_weight(&self) -> f32 {
        match self {
            Predicate::RelatedTo => 0.7,
            _ => 1.0,
        }
    }
}

impl std::str::FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "knows" => Ok(Predicate::Knows),
            "created" => Ok(Predicate::Created),
            "fork-of" => Ok(Predicate::ForkOf),
            "prefers" => Ok(Predicate::Prefers),
            "uses" => Ok(Predicate::Uses),
            "learned" => Ok(Predicate::Learned),
            "teachers" => Ok(Predicate::Teachers),
            "runs-on" => Ok(Predicate::RunsOn),
            "model" => Ok(Predicate::Model),
            "github" => Ok(Predicate::Github),
            "caregiver" => Ok(Predicate::Caregiver),
            "autistic" => Ok(Predicate::Autistic),
            "used-for" => Ok(Predicate::UsedFor),
            "created-by" => Ok(Predicate::CreatedBy),
            "is" => Ok(Predicate::Is),
            "has" => Ok(Predicate::Has),
            "affiliated-with" => Ok(Predicate::AffiliatedWith),
            "related-to" => Ok(Predicate::RelatedTo),
            "mentioned" => Ok(Predicate::Mentioned),
            "discussed" => Ok(Predicate::Discussed),
            "queried" => Ok(Predicate::Queried),
            "recalled" => Ok(Predicate::Recalled),
            _ => Err(format!("Unknown predicate: {}", s)),
        }
    }
}

/// Input for creating a new fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFactInput {
    /// Subject entity surface form (resolved or created on insert)
    pub subject: String,
    pub predicate: Predicate,
    /// Object entity surface form, if any
    pub object: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tier: MemoryTier,
    #[serde(default = "default_fact_confidence")]
    pub confidence: f32,
    #[serde(default = "default_source")]
    pub source: String,
    /// Time-to-live in milliseconds (episodic facts default to 7 days)
    pub ttl_ms: Option<i64>,
}

fn default_fact_confidence() -> f32 {
    0.7
}

fn default_source() -> String {
    "conversation".to_string()
}

impl AddFactInput {
    pub fn new(
        subject: impl Into<String>,
        predicate: Predicate,
        object: Option<&str>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.map(String::from),
            content: content.into(),
            tier: MemoryTier::default(),
            confidence: default_fact_confidence(),
            source: default_source(),
            ttl_ms: None,
        }
    }

    pub fn tier(mut self, tier: MemoryTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }
}

/// A materialized pool entry: one fact chosen by the last retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub fact_id: FactId,
    pub relevance_score: f32,
    pub added_at: DateTime<Utc>,
}

/// A topic observed in queries, with an EMA-like sighting weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic: String,
    pub weight: f32,
    pub last_seen: DateTime<Utc>,
}

/// A recorded pair of facts with the same subject and predicate but
/// different content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub id: i64,
    pub fact1_id: FactId,
    pub fact2_id: FactId,
    pub detected_at: DateTime<Utc>,
}

/// A pronoun-to-entity binding valid for a short time window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoReference {
    pub pronoun: String,
    pub entity_id: EntityId,
    pub context: String,
    pub last_seen: DateTime<Utc>,
}

/// One activation snapshot for an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub entity_id: EntityId,
    pub activation: f32,
    /// What produced the snapshot (e.g. "spread")
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// A retrieved fact hydrated with its endpoints and computed score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFact {
    pub fact: Fact,
    pub subject: Option<Entity>,
    pub object: Option<Entity>,
    pub score: f32,
}

/// Options for the retrieval pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    /// Maximum pool entries to materialize
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Merge graph scores with a vector backend when one is configured
    #[serde(default)]
    pub use_vectors: bool,
}

fn default_pool_size() -> usize {
    15
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            use_vectors: false,
        }
    }
}

/// A suggested pair of entities that likely refer to the same thing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSuggestion {
    pub entity1: Entity,
    pub entity2: Entity,
    pub similarity: f32,
    pub reason: String,
}

/// Per-phase counts returned by a reflection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectionSummary {
    /// Contradiction pairs recorded
    pub contradictions: usize,
    /// Duplicate entities consolidated
    pub entities: usize,
    /// Facts merged, pruned, or summarized
    pub compressed: usize,
}

/// Snapshot of the full store, for debugging and export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub entities: Vec<Entity>,
    pub facts: Vec<Fact>,
    pub pool: Vec<PoolEntry>,
    pub topics: Vec<Topic>,
    #[serde(rename = "coReferences")]
    pub co_references: Vec<CoReference>,
    #[serde(rename = "activationHistory")]
    pub activation_history: Vec<ActivationRecord>,
}

/// Counts across the store, for monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub entities: i64,
    pub facts: i64,
    pub episodic_facts: i64,
    pub semantic_facts: i64,
    pub structural_facts: i64,
    pub pool_entries: i64,
    pub topics: i64,
    pub contradictions: i64,
    pub co_references: i64,
    pub activation_history_rows: i64,
    pub reflections: i64,
}

/// Configuration for a CortexPool engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite datafile (":memory:" for ephemeral stores)
    pub db_path: String,
    /// Maximum pool entries materialized per retrieval
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Activation spreading depth
    #[serde(default = "default_spread_depth")]
    pub spread_depth: usize,
    /// Geometric decay applied per spreading layer
    #[serde(default = "default_spread_decay")]
    pub spread_decay: f32,
    /// Minimum similarity for fuzzy entity resolution
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
    /// How long a pronoun binding stays valid, in minutes
    #[serde(default = "default_coref_window")]
    pub coref_window_minutes: i64,
}

fn default_spread_depth() -> usize {
    2
}

fn default_spread_decay() -> f32 {
    0.5
}

fn default_fuzzy_threshold() -> f32 {
    0.8
}

fn default_coref_window() -> i64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            pool_size: default_pool_size(),
            spread_depth: default_spread_depth(),
            spread_decay: default_spread_decay(),
            fuzzy_threshold: default_fuzzy_threshold(),
            coref_window_minutes: default_coref_window(),
        }
    }
}
