//! Pluggable vector backend
//!
//! Retrieval can merge graph scores with an external vectorizer. The
//! backend is optional; when absent (or failing) the pipeline degrades
//! silently to graph-only results.

use crate::error::Result;
use crate::types::FactId;

/// Embedding width expected from backends
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// An external embedding service with its own fact index
pub trait VectorBackend: Send + Sync {
    /// Vectorize a text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Rank stored facts against a query text
    fn search_by_vector(&self, query: &str, limit: usize) -> Result<Vec<(FactId, f32)>>;
}

/// HTTP client for a vector sidecar exposing `/embed` and `/search`
#[cfg(feature = "remote-vectors")]
pub struct RemoteVectorBackend {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[cfg(feature = "remote-vectors")]
impl RemoteVectorBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[cfg(feature = "remote-vectors")]
impl VectorBackend for RemoteVectorBackend {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use crate::error::CortexError;

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&serde_json::json!({ "text": text }))
            .send()?;

        if !response.status().is_success() {
            return Err(CortexError::Vector(format!(
                "embed failed with status {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response.json()?;
        let vector: Vec<f32> = data["embedding"]
            .as_array()
            .ok_or_else(|| CortexError::Vector("invalid embed response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(CortexError::Vector(format!(
                "expected {} dimensions, got {}",
                EMBEDDING_DIMENSIONS,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn search_by_vector(&self, query: &str, limit: usize) -> Result<Vec<(FactId, f32)>> {
        use crate::error::CortexError;

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&serde_json::json!({ "query": query, "limit": limit }))
            .send()?;

        if !response.status().is_success() {
            return Err(CortexError::Vector(format!(
                "search failed with status {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response.json()?;
        let hits = data["results"]
            .as_array()
            .ok_or_else(|| CortexError::Vector("invalid search response".to_string()))?
            .iter()
            .filter_map(|hit| {
                let fact_id = hit["factId"].as_i64()?;
                let score = hit["score"].as_f64()? as f32;
                Some((fact_id, score))
            })
            .collect();

        Ok(hits)
    }
}
