//! Database migrations for CortexPool

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < SCHEMA_VERSION {
        migrate_v1(conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?)",
            [SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Named nodes of the memory graph
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            canonical_name TEXT NOT NULL UNIQUE,
            entity_type TEXT NOT NULL DEFAULT 'other',
            aliases TEXT NOT NULL DEFAULT '[]',
            confidence REAL NOT NULL DEFAULT 0.5,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Typed edges between entities; object_id NULL for unary facts
        CREATE TABLE IF NOT EXISTS facts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            predicate TEXT NOT NULL,
            object_id INTEGER,
            content TEXT NOT NULL,
            tier TEXT NOT NULL DEFAULT 'semantic',
            importance REAL NOT NULL DEFAULT 0.6,
            confidence REAL NOT NULL DEFAULT 0.7,
            source TEXT NOT NULL DEFAULT 'conversation',
            last_used TEXT NOT NULL,
            use_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            ttl_ms INTEGER,
            FOREIGN KEY (subject_id) REFERENCES entities(id),
            FOREIGN KEY (object_id) REFERENCES entities(id)
        );

        -- Materialized result set of the last retrieval
        CREATE TABLE IF NOT EXISTS pool (
            fact_id INTEGER NOT NULL,
            relevance_score REAL NOT NULL,
            added_at TEXT NOT NULL,
            FOREIGN KEY (fact_id) REFERENCES facts(id) ON DELETE CASCADE
        );

        -- Topics observed in queries, EMA-weighted
        CREATE TABLE IF NOT EXISTS topics (
            topic TEXT PRIMARY KEY,
            weight REAL NOT NULL DEFAULT 1.0,
            last_seen TEXT NOT NULL
        );

        -- Log of detected contradiction pairs
        CREATE TABLE IF NOT EXISTS contradictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fact1_id INTEGER NOT NULL,
            fact2_id INTEGER NOT NULL,
            detected_at TEXT NOT NULL
        );

        -- Pronoun bindings, one row per pronoun
        CREATE TABLE IF NOT EXISTS co_references (
            pronoun TEXT PRIMARY KEY,
            entity_id INTEGER NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            last_seen TEXT NOT NULL,
            FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        -- Persisted tail of the in-memory activation ring
        CREATE TABLE IF NOT EXISTS activation_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL,
            activation REAL NOT NULL,
            source TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        -- One row per reflection pass
        CREATE TABLE IF NOT EXISTS reflections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ran_at TEXT NOT NULL,
            contradictions INTEGER NOT NULL DEFAULT 0,
            entities_merged INTEGER NOT NULL DEFAULT 0,
            facts_compressed INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]'
        );

        -- Indexes for performance
        CREATE INDEX IF NOT EXISTS idx_facts_subject ON facts(subject_id);
        CREATE INDEX IF NOT EXISTS idx_facts_object ON facts(object_id);
        CREATE INDEX IF NOT EXISTS idx_facts_tier ON facts(tier);
        CREATE INDEX IF NOT EXISTS idx_facts_importance ON facts(importance DESC);
        CREATE INDEX IF NOT EXISTS idx_facts_tier_ttl ON facts(tier, ttl_ms);
        CREATE INDEX IF NOT EXISTS idx_activation_entity ON activation_history(entity_id);
        "#,
    )?;

    Ok(())
}
