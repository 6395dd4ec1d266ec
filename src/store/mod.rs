pub mod lancedb;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::sources::Credibility;

pub use lancedb::LanceStore;

/// Provenance carried by every chunk from scrape time through retrieval.
///
/// The named fields are always present; `extra` is an open extension map for
/// payload data that has no dedicated column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub organization: String,
    pub category: String,
    pub credibility: Credibility,
    pub last_verified: String,
    /// Origin URL of the page this chunk was extracted from.
    pub source: String,
    /// RFC 3339 timestamp of the ingestion run that produced this chunk.
    pub scraped_at: String,
    /// Collection this chunk belongs to.
    pub topic: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A bounded span of extracted page text plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk paired with its embedding, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieved chunk with its similarity score (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Storage capability consumed by the ingestion pipeline and the query
/// service. Implementations must be safe for concurrent reads of the same
/// collection; writes happen from a single ingestion run at a time.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether the named collection exists in the backing store.
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Insert a batch of records, creating the collection when it does not
    /// exist yet. Batches are appended; nothing is overwritten.
    async fn upsert(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()>;

    /// Top-k similarity search. Fails with
    /// [`RagError::CollectionUnavailable`](crate::RagError::CollectionUnavailable)
    /// when the collection does not exist.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}
