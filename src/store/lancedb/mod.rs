
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Chunk, ChunkMetadata, ChunkRecord, ScoredChunk, VectorIndex};
use crate::sources::Credibility;
use crate::{RagError, Result};

/// LanceDB-backed vector store with one table per collection.
///
/// Table handles are cached after first open, so repeat queries against the
/// same collection skip the open cost. LanceDB tables are safe for concurrent
/// reads, which is what lets the cached handle be shared across requests.
pub struct LanceStore {
    connection: Connection,
    dimension: usize,
    tables: RwLock<HashMap<String, Table>>,
}

impl LanceStore {
    /// Connect to (or create) the database directory at `path`.
    #[inline]
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Store(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", path.display());
        debug!("Connecting to LanceDB at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Vector store initialized at {}", path.display());

        Ok(Self {
            connection,
            dimension,
            tables: RwLock::new(HashMap::new()),
        })
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("organization", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("credibility", DataType::Utf8, false),
            Field::new("last_verified", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("scraped_at", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, false),
            Field::new("extra", DataType::Utf8, true),
        ]))
    }

    /// Open a collection's table, reusing the cached handle when present.
    async fn open_collection(&self, collection: &str) -> Result<Table> {
        {
            let tables = self.tables.read().await;
            if let Some(table) = tables.get(collection) {
                return Ok(table.clone());
            }
        }

        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {}", e)))?;

        if !names.iter().any(|n| n == collection) {
            return Err(RagError::CollectionUnavailable(collection.to_string()));
        }

        let table = self
            .connection
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table {}: {}", collection, e)))?;

        self.tables
            .write()
            .await
            .insert(collection.to_string(), table.clone());

        debug!("Cached table handle for collection {}", collection);
        Ok(table)
    }

    async fn create_collection(&self, collection: &str) -> Result<Table> {
        info!("Creating collection {}", collection);

        let table = self
            .connection
            .create_empty_table(collection, self.schema())
            .execute()
            .await
            .map_err(|e| {
                RagError::Store(format!("Failed to create collection {}: {}", collection, e))
            })?;

        self.tables
            .write()
            .await
            .insert(collection.to_string(), table.clone());

        Ok(table)
    }

    fn create_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut organizations = Vec::with_capacity(len);
        let mut categories = Vec::with_capacity(len);
        let mut credibilities = Vec::with_capacity(len);
        let mut last_verifieds = Vec::with_capacity(len);
        let mut source_urls = Vec::with_capacity(len);
        let mut scraped_ats = Vec::with_capacity(len);
        let mut topics = Vec::with_capacity(len);
        let mut extras: Vec<Option<String>> = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            if record.vector.len() != self.dimension {
                return Err(RagError::Store(format!(
                    "Vector dimension mismatch: expected {}, got {}",
                    self.dimension,
                    record.vector.len()
                )));
            }

            let meta = &record.chunk.metadata;
            ids.push(record.id.as_str());
            contents.push(record.chunk.content.as_str());
            organizations.push(meta.organization.as_str());
            categories.push(meta.category.as_str());
            credibilities.push(meta.credibility.as_str());
            last_verifieds.push(meta.last_verified.as_str());
            source_urls.push(meta.source.as_str());
            scraped_ats.push(meta.scraped_at.as_str());
            topics.push(meta.topic.as_str());
            extras.push(if meta.extra.is_empty() {
                None
            } else {
                serde_json::to_string(&meta.extra).ok()
            });
            flat_values.extend_from_slice(&record.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(organizations)),
            Arc::new(StringArray::from(categories)),
            Arc::new(StringArray::from(credibilities)),
            Arc::new(StringArray::from(last_verifieds)),
            Arc::new(StringArray::from(source_urls)),
            Arc::new(StringArray::from(scraped_ats)),
            Arc::new(StringArray::from(topics)),
            Arc::new(StringArray::from(
                extras.iter().map(Option::as_deref).collect::<Vec<_>>(),
            )),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
        fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
            batch
                .column_by_name(name)
                .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
        }

        let contents = string_column(batch, "content")?;
        let organizations = string_column(batch, "organization")?;
        let categories = string_column(batch, "category")?;
        let credibilities = string_column(batch, "credibility")?;
        let last_verifieds = string_column(batch, "last_verified")?;
        let source_urls = string_column(batch, "source")?;
        let scraped_ats = string_column(batch, "scraped_at")?;
        let topics = string_column(batch, "topic")?;
        let extras = string_column(batch, "extra")?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut results = Vec::with_capacity(batch.num_rows());

        for row in 0..batch.num_rows() {
            let credibility: Credibility = credibilities
                .value(row)
                .parse()
                .map_err(RagError::Store)?;

            let extra: BTreeMap<String, String> = if extras.is_null(row) {
                BTreeMap::new()
            } else {
                serde_json::from_str(extras.value(row)).map_err(|e| {
                    RagError::Store(format!("Invalid extra metadata payload: {}", e))
                })?
            };

            let chunk = Chunk {
                content: contents.value(row).to_string(),
                metadata: ChunkMetadata {
                    organization: organizations.value(row).to_string(),
                    category: categories.value(row).to_string(),
                    credibility,
                    last_verified: last_verifieds.value(row).to_string(),
                    source: source_urls.value(row).to_string(),
                    scraped_at: scraped_ats.value(row).to_string(),
                    topic: topics.value(row).to_string(),
                    extra,
                },
            };

            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            results.push(ScoredChunk {
                chunk,
                score: 1.0 - distance,
            });
        }

        Ok(results)
    }
}

#[async_trait]
impl VectorIndex for LanceStore {
    #[inline]
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        if self.tables.read().await.contains_key(collection) {
            return Ok(true);
        }

        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {}", e)))?;

        Ok(names.iter().any(|n| n == collection))
    }

    #[inline]
    async fn upsert(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No records to upsert into {}", collection);
            return Ok(());
        }

        let record_batch = self.create_record_batch(&records)?;

        let table = match self.open_collection(collection).await {
            Ok(table) => table,
            Err(RagError::CollectionUnavailable(_)) => self.create_collection(collection).await?,
            Err(e) => return Err(e),
        };

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to insert records: {}", e)))?;

        info!("Stored {} records in collection {}", records.len(), collection);
        Ok(())
    }

    #[inline]
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        debug!("Searching collection {} with limit {}", collection, k);

        let table = self.open_collection(collection).await?;

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {}", e)))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?;

        let mut scored = Vec::new();
        for batch in &batches {
            scored.extend(Self::parse_search_batch(batch)?);
        }

        debug!("Search returned {} results", scored.len());
        Ok(scored)
    }
}
