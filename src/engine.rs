//! CortexPool engine
//!
//! Owns the backing store plus the per-instance in-memory state
//! (activation map, history ring, co-reference cache, current topics).
//! Two engines on distinct datafiles are fully isolated.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::activation::ActivationEngine;
use crate::coref::CoReferenceTracker;
use crate::error::{CortexError, Result};
use crate::storage::{queries, Storage};
use crate::types::*;
use crate::vector::VectorBackend;
use crate::{facts, reflection, resolver, retrieval};

/// Graph-structured memory engine for conversational agents
pub struct CortexPool {
    storage: Storage,
    config: EngineConfig,
    activation: ActivationEngine,
    coref: CoReferenceTracker,
    current_topics: Vec<String>,
    vectors: Option<Box<dyn VectorBackend>>,
}

impl CortexPool {
    /// Open or create an engine over the configured datafile
    pub fn open(config: EngineConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(CortexError::Config("pool_size must be positive".to_string()));
        }
        let storage = Storage::open(&config.db_path)?;
        Ok(Self {
            activation: ActivationEngine::new(config.spread_depth, config.spread_decay),
            coref: CoReferenceTracker::new(config.coref_window_minutes),
            current_topics: Vec::new(),
            vectors: None,
            storage,
            config,
        })
    }

    /// Ephemeral engine for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::open(EngineConfig::default())
    }

    /// Attach a vector backend for hybrid retrieval
    pub fn with_vector_backend(mut self, backend: Box<dyn VectorBackend>) -> Self {
        self.vectors = Some(backend);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Create an entity, or fold a re-observation into the existing one
    pub fn add_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        confidence: f32,
    ) -> Result<EntityId> {
        if name.trim().is_empty() {
            return Err(CortexError::InvalidInput(
                "entity name must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CortexError::InvalidInput(format!(
                "confidence out of range: {}",
                confidence
            )));
        }
        self.storage
            .with_transaction(|conn| resolver::add_entity(conn, name, entity_type, confidence))
    }

    pub fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        self.storage.with_connection(|conn| queries::get_entity(conn, id))
    }

    /// Exact, alias, then fuzzy lookup; misses return None
    pub fn resolve_entity(&self, query: &str) -> Result<Option<Entity>> {
        self.storage
            .with_connection(|conn| resolver::resolve_entity(conn, query, self.config.fuzzy_threshold))
    }

    pub fn list_entities(&self) -> Result<Vec<Entity>> {
        self.storage.with_connection(queries::list_entities)
    }

    pub fn find_fuzzy_matches(&self, query: &str, threshold: f32) -> Result<Vec<(Entity, f32)>> {
        self.storage
            .with_connection(|conn| resolver::find_fuzzy_matches(conn, query, threshold))
    }

    pub fn suggest_entity_merges(&self, threshold: f32) -> Result<Vec<MergeSuggestion>> {
        self.storage
            .with_connection(|conn| resolver::suggest_entity_merges(conn, threshold))
    }

    // -------------------------------------------------------------------------
    // Facts
    // -------------------------------------------------------------------------

    pub fn add_fact(&self, input: &AddFactInput) -> Result<FactId> {
        self.storage
            .with_transaction(|conn| facts::add_fact(conn, input, self.config.fuzzy_threshold))
    }

    /// Sequential `add_fact` over the batch; items are independently
    /// durable
    pub fn bulk_add(&self, inputs: &[AddFactInput]) -> Result<Vec<FactId>> {
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            ids.push(self.add_fact(input)?);
        }
        Ok(ids)
    }

    pub fn get_fact(&self, id: FactId) -> Result<Option<Fact>> {
        self.storage.with_connection(|conn| queries::get_fact(conn, id))
    }

    pub fn list_facts(&self) -> Result<Vec<Fact>> {
        self.storage.with_connection(queries::list_facts)
    }

    /// Facts where the entity appears as either endpoint
    pub fn get_facts_for_entity(&self, entity_id: EntityId) -> Result<Vec<Fact>> {
        self.storage
            .with_connection(|conn| queries::facts_touching(conn, entity_id))
    }

    /// Reinforce a fact (+0.1 importance, fresh last_used, use_count + 1)
    pub fn use_fact(&self, id: FactId) -> Result<()> {
        self.storage.with_transaction(|conn| facts::use_fact(conn, id))
    }

    // -------------------------------------------------------------------------
    // Topics & activation
    // -------------------------------------------------------------------------

    /// Bind the current conversation topics: weights are bumped and the
    /// activation map is reseeded
    pub fn set_topics(&mut self, topics: &[&str]) -> Result<()> {
        self.current_topics = topics.iter().map(|s| s.to_string()).collect();
        let current = self.current_topics.clone();
        let threshold = self.config.fuzzy_threshold;
        let activation = &mut self.activation;
        self.storage
            .with_transaction(|conn| activation.seed_topics(conn, &current, threshold))
    }

    /// One spreading pass over the fact graph
    pub fn spread_activation(&mut self) -> Result<()> {
        let activation = &mut self.activation;
        self.storage.with_transaction(|conn| activation.spread(conn))
    }

    /// Current activation of an entity (0 when absent)
    pub fn activation(&self, entity_id: EntityId) -> f32 {
        self.activation.activation(entity_id)
    }

    pub fn current_topics(&self) -> &[String] {
        &self.current_topics
    }

    pub fn topics(&self) -> Result<Vec<Topic>> {
        self.storage.with_connection(queries::list_topics)
    }

    /// In-memory activation snapshots for an entity since a timestamp
    pub fn get_activation_history(
        &self,
        entity_id: EntityId,
        since: DateTime<Utc>,
    ) -> Vec<ActivationRecord> {
        self.activation.history_since(entity_id, since)
    }

    // -------------------------------------------------------------------------
    // Retrieval
    // -------------------------------------------------------------------------

    /// Full pipeline: bind topics, spread, score, materialize the pool,
    /// return hydrated facts
    pub fn retrieve(
        &mut self,
        topics: &[&str],
        options: &RetrieveOptions,
    ) -> Result<Vec<ScoredFact>> {
        self.current_topics = topics.iter().map(|s| s.to_string()).collect();
        let current = self.current_topics.clone();
        let threshold = self.config.fuzzy_threshold;
        let activation = &mut self.activation;
        let vectors = self.vectors.as_deref();
        self.storage.with_transaction(|conn| {
            retrieval::retrieve(conn, activation, &current, options, vectors, threshold)
        })
    }

    /// Current pool snapshot, highest score first
    pub fn get_pool(&self) -> Result<Vec<PoolEntry>> {
        self.storage.with_connection(queries::get_pool)
    }

    // -------------------------------------------------------------------------
    // Reflection & eviction
    // -------------------------------------------------------------------------

    /// Run the maintenance pass. Phases run in order, each in its own
    /// transaction; a failing phase is recorded in the reflection log and
    /// the remaining phases still run. Episodic TTL eviction is NOT part
    /// of this pass.
    pub fn reflect(&mut self) -> Result<ReflectionSummary> {
        let mut summary = ReflectionSummary::default();
        let mut errors = Vec::new();

        if let Err(err) = self.storage.with_transaction(reflection::apply_decay) {
            warn!(error = %err, "decay phase failed");
            errors.push(format!("decay: {}", err));
        }

        match self
            .storage
            .with_transaction(reflection::detect_contradictions)
        {
            Ok(count) => summary.contradictions = count,
            Err(err) => {
                warn!(error = %err, "contradiction phase failed");
                errors.push(format!("contradictions: {}", err));
            }
        }

        match self
            .storage
            .with_transaction(reflection::consolidate_entities)
        {
            Ok(count) => summary.entities = count,
            Err(err) => {
                warn!(error = %err, "consolidation phase failed");
                errors.push(format!("consolidation: {}", err));
            }
        }

        match self.storage.with_transaction(reflection::compress_memories) {
            Ok(count) => summary.compressed = count,
            Err(err) => {
                warn!(error = %err, "compression phase failed");
                errors.push(format!("compression: {}", err));
            }
        }

        if !self.current_topics.is_empty() {
            let topics = self.current_topics.clone();
            let options = RetrieveOptions {
                pool_size: self.config.pool_size,
                use_vectors: false,
            };
            let threshold = self.config.fuzzy_threshold;
            let activation = &mut self.activation;
            let refresh = self.storage.with_transaction(|conn| {
                retrieval::retrieve(conn, activation, &topics, &options, None, threshold)
            });
            if let Err(err) = refresh {
                warn!(error = %err, "pool refresh failed");
                errors.push(format!("pool refresh: {}", err));
            }
        }

        self.storage
            .with_transaction(|conn| queries::insert_reflection(conn, &summary, &errors))?;

        info!(
            contradictions = summary.contradictions,
            entities = summary.entities,
            compressed = summary.compressed,
            "reflection complete"
        );
        Ok(summary)
    }

    /// Delete expired episodic facts; schedule this independently of
    /// `reflect`
    pub fn cleanup_expired_episodic(&self) -> Result<usize> {
        self.storage
            .with_transaction(reflection::cleanup_expired_episodic)
    }

    // -------------------------------------------------------------------------
    // Co-references
    // -------------------------------------------------------------------------

    pub fn add_co_reference(
        &mut self,
        pronoun: &str,
        entity_id: EntityId,
        context: &str,
    ) -> Result<()> {
        let coref = &mut self.coref;
        self.storage
            .with_transaction(|conn| coref.bind(conn, pronoun, entity_id, context))
    }

    pub fn resolve_co_reference(
        &mut self,
        pronoun: &str,
        current_context: &[&str],
    ) -> Result<Option<Entity>> {
        let context: Vec<String> = current_context.iter().map(|s| s.to_string()).collect();
        let threshold = self.config.fuzzy_threshold;
        let coref = &mut self.coref;
        self.storage
            .with_transaction(|conn| coref.resolve(conn, pronoun, &context, threshold))
    }

    // -------------------------------------------------------------------------
    // Export & monitoring
    // -------------------------------------------------------------------------

    /// Snapshot the full store as a JSON-serializable document
    pub fn export(&self) -> Result<ExportData> {
        self.storage.with_connection(|conn| {
            Ok(ExportData {
                entities: queries::list_entities(conn)?,
                facts: queries::list_facts(conn)?,
                pool: queries::get_pool(conn)?,
                topics: queries::list_topics(conn)?,
                co_references: queries::list_co_references(conn)?,
                activation_history: queries::list_activation_history(conn)?,
            })
        })
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.storage.with_connection(queries::collect_stats)
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.storage.checkpoint()
    }

    pub fn db_size(&self) -> Result<i64> {
        self.storage.db_size()
    }
}
