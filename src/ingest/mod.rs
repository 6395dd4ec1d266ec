
pub mod chunker;
pub mod dedup;
pub mod fetcher;
pub mod tracker;
pub mod validator;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{IngestConfig, ValidationConfig};
use crate::llm::LanguageModel;
use crate::sources::Topic;
use crate::store::{Chunk, ChunkRecord, VectorIndex};
use crate::{RagError, Result};

use self::chunker::Chunker;
use self::dedup::remove_duplicates;
use self::fetcher::PageFetcher;
use self::tracker::ScrapeTracker;
use self::validator::Validator;

/// Counters from a completed ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    pub sources_attempted: usize,
    pub documents_fetched: usize,
    pub chunks_rejected: usize,
    pub duplicates_removed: usize,
    pub chunks_stored: usize,
    /// Stored chunk counts keyed by source organization.
    pub by_organization: BTreeMap<String, usize>,
}

/// Result of an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Every source URL for the collection was already ingested; nothing was
    /// fetched and nothing was written.
    AlreadyScraped,
    Completed(IngestReport),
}

/// Drives the scrape, chunk, validate, dedup, embed, upsert pipeline for one
/// topic at a time. All effectful collaborators are injected.
pub struct IngestionOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn VectorIndex>,
    ingest: IngestConfig,
    validation: ValidationConfig,
}

impl IngestionOrchestrator {
    #[inline]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn VectorIndex>,
        ingest: IngestConfig,
        validation: ValidationConfig,
    ) -> Self {
        Self {
            fetcher,
            model,
            store,
            ingest,
            validation,
        }
    }

    /// Run the full pipeline for `topic`, writing chunks into the collection
    /// named after it.
    ///
    /// Unless `force` is set, sources already recorded by the tracker are
    /// skipped when the collection exists. The tracker is only updated after
    /// every chunk has been stored, so a failed run is retried in full.
    #[inline]
    pub async fn ingest(
        &self,
        topic: &Topic,
        tracker: &mut ScrapeTracker,
        force: bool,
    ) -> Result<IngestOutcome> {
        let collection = topic.name;
        let exists = self.store.collection_exists(collection).await?;

        let sources = if exists && !force {
            let remaining = tracker.unscraped(collection, &topic.sources);
            if remaining.is_empty() {
                info!(
                    "All {} sources for {} already scraped, nothing to do",
                    topic.sources.len(),
                    collection
                );
                return Ok(IngestOutcome::AlreadyScraped);
            }
            remaining
        } else {
            topic.sources.clone()
        };

        info!(
            "Ingesting {} sources into collection {}",
            sources.len(),
            collection
        );

        // One timestamp per run; chunks from the same run sort together.
        let scraped_at = Utc::now().to_rfc3339();
        let chunker = Chunker::new(self.ingest.chunk_size, self.ingest.chunk_overlap);

        let progress = ProgressBar::new(sources.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut documents_fetched = 0;

        for (i, source) in sources.iter().enumerate() {
            if i > 0 && self.ingest.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.ingest.rate_limit_ms)).await;
            }

            progress.set_message(source.organization.clone());
            let documents = self.fetcher.fetch(source).await;
            if documents.is_empty() {
                warn!("No content from {} ({})", source.url, source.organization);
            }

            documents_fetched += documents.len();
            for document in &documents {
                chunks.extend(chunker.chunk_document(document, collection, &scraped_at));
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        let total_chunked = chunks.len();
        debug!("Produced {} chunks from {} documents", total_chunked, documents_fetched);

        let validator = Validator::new(topic.terms, self.validation.min_score);
        let valid = validator.filter_valid(chunks);
        let chunks_rejected = total_chunked - valid.len();

        let after_validation = valid.len();
        let unique = remove_duplicates(valid);
        let duplicates_removed = after_validation - unique.len();

        if unique.is_empty() {
            return Err(RagError::Ingestion(format!(
                "No valid content for collection {}: {} sources yielded {} chunks, all rejected",
                collection,
                sources.len(),
                total_chunked
            )));
        }

        let chunks_stored = self.embed_and_store(collection, &unique).await?;

        tracker.mark_scraped(collection, &sources, chunks_stored)?;

        let mut by_organization: BTreeMap<String, usize> = BTreeMap::new();
        for chunk in &unique {
            *by_organization
                .entry(chunk.metadata.organization.clone())
                .or_default() += 1;
        }

        let report = IngestReport {
            collection: collection.to_string(),
            sources_attempted: sources.len(),
            documents_fetched,
            chunks_rejected,
            duplicates_removed,
            chunks_stored,
            by_organization,
        };

        info!(
            "Ingestion complete for {}: {} chunks stored ({} rejected, {} duplicates)",
            collection, report.chunks_stored, report.chunks_rejected, report.duplicates_removed
        );

        Ok(IngestOutcome::Completed(report))
    }

    /// Embed chunks and upsert them in fixed-size batches. A failure anywhere
    /// aborts the run with whatever earlier batches already written.
    async fn embed_and_store(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        let mut stored = 0;

        for batch in chunks.chunks(self.ingest.upsert_batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self.model.embed_batch(&texts)?;

            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Embedding count mismatch: {} chunks, {} vectors",
                    batch.len(),
                    vectors.len()
                )));
            }

            let records: Vec<ChunkRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| ChunkRecord {
                    id: Uuid::new_v4().to_string(),
                    vector,
                    chunk: chunk.clone(),
                })
                .collect();

            let count = records.len();
            self.store.upsert(collection, records).await?;
            stored += count;
            debug!("Upserted batch of {} ({} total)", count, stored);
        }

        Ok(stored)
    }
}
