//! CortexPool - persistent graph memory for conversational agents
//!
//! Facts are typed edges between named entities, stratified by lifetime
//! tier. Given the current conversation topics, retrieval returns a
//! bounded, ranked pool of the most relevant facts, driven by topic
//! matching, spreading activation over the fact graph, and tier-aware
//! importance with time decay. A maintenance pass (`reflect`) merges
//! duplicates, records contradictions, prunes redundant edges, and
//! summarizes aged content.
//!
//! ```no_run
//! use cortexpool::{AddFactInput, CortexPool, Predicate, RetrieveOptions};
//!
//! let mut memory = CortexPool::open_in_memory()?;
//! memory.add_fact(&AddFactInput::new(
//!     "William",
//!     Predicate::Created,
//!     Some("OpenLiam"),
//!     "William created the OpenLiam project",
//! ))?;
//!
//! let pool = memory.retrieve(&["OpenLiam"], &RetrieveOptions::default())?;
//! for hit in &pool {
//!     println!("{:.2} {}", hit.score, hit.fact.content);
//! }
//! # Ok::<(), cortexpool::CortexError>(())
//! ```

pub mod activation;
pub mod coref;
pub mod engine;
pub mod error;
pub mod facts;
pub mod reflection;
pub mod resolver;
pub mod retrieval;
pub mod scoring;
pub mod storage;
pub mod text;
pub mod types;
pub mod vector;

pub use engine::CortexPool;
pub use error::{CortexError, Result};
pub use storage::Storage;
pub use types::*;
pub use vector::VectorBackend;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
