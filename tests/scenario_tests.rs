//! End-to-end scenarios over the public engine API
//!
//! Run with: cargo test --test scenario_tests

use cortexpool::{
    AddFactInput, CortexError, CortexPool, EntityType, FactId, MemoryTier, Predicate,
    RetrieveOptions, VectorBackend,
};

// ============================================================================
// ENTITY ALIASING
// ============================================================================

#[test]
fn reobserved_entity_keeps_one_row_with_both_surface_forms() {
    let engine = CortexPool::open_in_memory().unwrap();

    let first = engine.add_entity("William", EntityType::Person, 0.8).unwrap();
    let second = engine.add_entity("william", EntityType::Person, 0.6).unwrap();
    assert_eq!(first, second);

    let entities = engine.list_entities().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].canonical_name, "william");
    assert_eq!(entities[0].aliases, vec!["William", "william"]);
}

// ============================================================================
// TIER DEFAULTS
// ============================================================================

#[test]
fn episodic_fact_without_ttl_gets_seven_days() {
    let engine = CortexPool::open_in_memory().unwrap();

    let id = engine
        .add_fact(
            &AddFactInput::new("meeting", Predicate::Discussed, None, "discussed the roadmap")
                .tier(MemoryTier::Episodic),
        )
        .unwrap();

    let fact = engine.get_fact(id).unwrap().unwrap();
    assert_eq!(fact.ttl_ms, Some(604_800_000));
}

// ============================================================================
// RETRIEVAL
// ============================================================================

#[test]
fn seeded_fact_surfaces_with_activation() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    engine
        .add_fact(&AddFactInput::new(
            "William",
            Predicate::Created,
            Some("OpenLiam"),
            "William created OpenLiam",
        ))
        .unwrap();

    let results = engine
        .retrieve(&["OpenLiam"], &RetrieveOptions::default())
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].fact.content, "William created OpenLiam");
    assert!(results[0].score > 0.4);

    let openliam = engine.resolve_entity("OpenLiam").unwrap().unwrap();
    let william = engine.resolve_entity("William").unwrap().unwrap();
    assert!(
        engine.activation(openliam.id) > 0.0 || engine.activation(william.id) > 0.0,
        "spread left no activation on either endpoint"
    );
}

#[test]
fn pool_is_bounded_and_sorted_after_every_retrieve() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    for i in 0..40 {
        engine
            .add_fact(&AddFactInput::new(
                format!("topic-{}", i * 31),
                Predicate::Is,
                None,
                format!("statement {}", i),
            ))
            .unwrap();
    }

    for topics in [vec!["topic-0"], vec!["topic-31", "topic-62"], vec!["none"]] {
        let results = engine.retrieve(&topics, &RetrieveOptions::default()).unwrap();
        assert!(results.len() <= 15);

        let pool = engine.get_pool().unwrap();
        assert!(pool.len() <= 15);
        for pair in pool.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }
}

// ============================================================================
// REFLECTION
// ============================================================================

#[test]
fn duplicate_preference_facts_merge_on_reflect() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    let input = AddFactInput::new(
        "William",
        Predicate::Prefers,
        Some("tabs"),
        "prefers tabs over spaces",
    );
    engine.add_fact(&input).unwrap();
    engine.add_fact(&input).unwrap();

    let summary = engine.reflect().unwrap();
    assert!(summary.compressed >= 1);

    let remaining: Vec<_> = engine
        .list_facts()
        .unwrap()
        .into_iter()
        .filter(|f| f.predicate == Predicate::Prefers)
        .collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].use_count, 0);
    assert!((remaining[0].importance - 0.6).abs() < 1e-6);
}

#[test]
fn decay_scenario_holds_base_and_deletes_low_importance() {
    let engine = CortexPool::open_in_memory().unwrap();

    let held = engine
        .add_fact(&AddFactInput::new("alpha", Predicate::Is, None, "alpha statement"))
        .unwrap();
    let dropped = engine
        .add_fact(&AddFactInput::new("beta", Predicate::Is, None, "beta statement"))
        .unwrap();

    let year_ago = (chrono::Utc::now() - chrono::Duration::days(365)).to_rfc3339();
    engine
        .storage()
        .with_connection(|conn| {
            conn.execute(
                "UPDATE facts SET last_used = ? WHERE id = ?",
                rusqlite::params![year_ago, held],
            )?;
            conn.execute(
                "UPDATE facts SET last_used = ?, importance = 0.2 WHERE id = ?",
                rusqlite::params![year_ago, dropped],
            )?;
            Ok(())
        })
        .unwrap();

    engine
        .storage()
        .with_connection(cortexpool::reflection::apply_decay)
        .unwrap();

    let held_fact = engine.get_fact(held).unwrap().unwrap();
    assert!((held_fact.importance - 0.6).abs() < 1e-4);
    assert!(engine.get_fact(dropped).unwrap().is_none());
}

#[test]
fn contradictory_facts_are_logged_not_mutated() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    engine
        .add_fact(&AddFactInput::new(
            "editor config",
            Predicate::Is,
            None,
            "ships with tabs",
        ))
        .unwrap();
    engine
        .add_fact(&AddFactInput::new(
            "editor config",
            Predicate::Is,
            None,
            "spaces only, two wide",
        ))
        .unwrap();

    let summary = engine.reflect().unwrap();
    assert_eq!(summary.contradictions, 1);
    // Content survives untouched
    assert_eq!(engine.list_facts().unwrap().len(), 2);

    // Re-detection appends again on the next run
    let summary = engine.reflect().unwrap();
    assert_eq!(summary.contradictions, 1);
    assert_eq!(engine.stats().unwrap().contradictions, 2);
}

#[test]
fn reflect_twice_converges_on_the_same_entity_set() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    engine
        .bulk_add(&[
            AddFactInput::new("William", Predicate::Created, Some("OpenLiam"), "created it"),
            AddFactInput::new("william", Predicate::Uses, Some("rust"), "writes rust"),
            AddFactInput::new("Ada", Predicate::Knows, Some("William"), "they met at work"),
        ])
        .unwrap();

    engine.reflect().unwrap();
    let after_first: Vec<_> = engine
        .list_entities()
        .unwrap()
        .into_iter()
        .map(|e| (e.id, e.canonical_name))
        .collect();

    engine.reflect().unwrap();
    let after_second: Vec<_> = engine
        .list_entities()
        .unwrap()
        .into_iter()
        .map(|e| (e.id, e.canonical_name))
        .collect();

    assert_eq!(after_first, after_second);
}

#[test]
fn redundant_triples_are_unique_after_reflect() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    // Distinct contents so the similarity merge leaves both rows for the
    // pruning pass
    engine
        .add_fact(&AddFactInput::new(
            "svc",
            Predicate::RunsOn,
            Some("linux"),
            "deployed to the linux fleet",
        ))
        .unwrap();
    engine
        .add_fact(&AddFactInput::new(
            "svc",
            Predicate::RunsOn,
            Some("linux"),
            "runs in a container",
        ))
        .unwrap();

    engine.reflect().unwrap();

    let mut triples: Vec<(i64, Predicate, Option<i64>)> = engine
        .list_facts()
        .unwrap()
        .into_iter()
        .filter(|f| f.object_id.is_some())
        .map(|f| (f.subject_id, f.predicate, f.object_id))
        .collect();
    let before = triples.len();
    triples.sort_by_key(|t| (t.0, t.2));
    triples.dedup();
    assert_eq!(before, triples.len(), "duplicate triple survived pruning");
}

// ============================================================================
// VECTOR FALLBACK
// ============================================================================

struct AlwaysFailing;

impl VectorBackend for AlwaysFailing {
    fn embed(&self, _text: &str) -> cortexpool::Result<Vec<f32>> {
        Err(CortexError::Vector("embedder offline".to_string()))
    }

    fn search_by_vector(
        &self,
        _query: &str,
        _limit: usize,
    ) -> cortexpool::Result<Vec<(FactId, f32)>> {
        Err(CortexError::Vector("embedder offline".to_string()))
    }
}

#[test]
fn hybrid_retrieval_survives_a_dead_backend() {
    let mut graph_only = CortexPool::open_in_memory().unwrap();
    let mut hybrid =
        CortexPool::open_in_memory().unwrap().with_vector_backend(Box::new(AlwaysFailing));

    for engine in [&graph_only, &hybrid] {
        engine
            .bulk_add(&[
                AddFactInput::new("William", Predicate::Created, Some("OpenLiam"), "created it"),
                AddFactInput::new("Ada", Predicate::Uses, Some("python"), "writes python"),
            ])
            .unwrap();
    }

    let baseline = graph_only
        .retrieve(&["OpenLiam"], &RetrieveOptions::default())
        .unwrap();
    let degraded = hybrid
        .retrieve(
            &["OpenLiam"],
            &RetrieveOptions {
                pool_size: 15,
                use_vectors: true,
            },
        )
        .unwrap();

    assert_eq!(baseline.len(), degraded.len());
    for (a, b) in baseline.iter().zip(degraded.iter()) {
        assert_eq!(a.fact.content, b.fact.content);
        assert!((a.score - b.score).abs() < 1e-6);
    }
}

// ============================================================================
// CO-REFERENCES
// ============================================================================

#[test]
fn pronoun_binds_and_resolves_through_the_engine() {
    let mut engine = CortexPool::open_in_memory().unwrap();
    let william = engine.add_entity("William", EntityType::Person, 0.9).unwrap();

    engine
        .add_co_reference("he", william, "talking about William")
        .unwrap();
    let resolved = engine.resolve_co_reference("he", &[]).unwrap().unwrap();
    assert_eq!(resolved.id, william);

    // Outside the closed set, nothing resolves even with context
    assert!(engine
        .resolve_co_reference("somebody", &["William"])
        .unwrap()
        .is_none());
}
