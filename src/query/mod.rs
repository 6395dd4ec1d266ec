
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::llm::{AnswerStream, LanguageModel};
use crate::store::{Chunk, ChunkRecord, ScoredChunk, VectorIndex};
use crate::{RagError, Result};

/// Default number of chunks retrieved per question.
pub const DEFAULT_K: usize = 4;

/// Phrases a model uses to admit the context did not cover the question.
/// An answer containing any of these (case-insensitive) is treated as
/// ungrounded and gets no source attributions.
///
/// This is a substring heuristic over model output, not a guarantee; a model
/// phrasing its refusal differently will slip through with attributions
/// attached.
const UNGROUNDED_PHRASES: &[&str] = &[
    "doesn't contain",
    "does not contain",
    "no information",
    "cannot answer",
    "unable to answer",
    "not covered in the context",
    "not found in the context",
    "not mentioned in the context",
];

/// One retrieved passage, numbered as cited in the generated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAttribution {
    /// 1-based number matching the `[n]` citations in the answer.
    pub ordinal: usize,
    pub content: String,
    pub organization: String,
    pub url: String,
}

/// A complete answer with the passages it was grounded on. `sources` is
/// empty when the model admitted the context was insufficient.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceAttribution>,
}

/// An in-progress streamed answer. Attributions are withheld until the
/// caller has the full text, since groundedness is only decidable then.
pub struct StreamingQuery {
    pub stream: AnswerStream,
    sources: Vec<SourceAttribution>,
}

impl StreamingQuery {
    /// Attributions for the finished answer: the retrieved passages when the
    /// answer is grounded, nothing otherwise.
    #[inline]
    pub fn sources_for(&self, full_answer: &str) -> &[SourceAttribution] {
        if is_grounded(full_answer) {
            &self.sources
        } else {
            &[]
        }
    }

    /// The retrieved passages regardless of groundedness.
    #[inline]
    pub fn retrieved(&self) -> &[SourceAttribution] {
        &self.sources
    }
}

/// Retrieval-augmented question answering over one collection at a time.
/// Holds no collection state; every call names its target explicitly.
pub struct QueryService {
    store: Arc<dyn VectorIndex>,
    model: Arc<dyn LanguageModel>,
}

impl QueryService {
    #[inline]
    pub fn new(store: Arc<dyn VectorIndex>, model: Arc<dyn LanguageModel>) -> Self {
        Self { store, model }
    }

    /// Answer a question from `collection`, blocking until the full answer
    /// is generated.
    #[inline]
    pub async fn query(&self, collection: &str, question: &str, k: usize) -> Result<QueryResponse> {
        let (prompt, sources) = self.prepare(collection, question, k).await?;

        let Some(prompt) = prompt else {
            return Ok(empty_context_response());
        };

        let answer = self.model.generate(&prompt)?;
        let sources = if is_grounded(&answer) {
            sources
        } else {
            debug!("Answer judged ungrounded, withholding attributions");
            Vec::new()
        };

        Ok(QueryResponse { answer, sources })
    }

    /// Answer a question with incremental delivery. Dropping the returned
    /// stream cancels generation.
    #[inline]
    pub async fn query_stream(
        &self,
        collection: &str,
        question: &str,
        k: usize,
    ) -> Result<StreamingQuery> {
        let (prompt, sources) = self.prepare(collection, question, k).await?;

        let Some(prompt) = prompt else {
            // Deliver the fixed insufficiency answer through the stream so
            // callers handle both cases uniformly.
            let (sender, stream) = AnswerStream::channel(1);
            let _ = sender.try_send(Ok(empty_context_response().answer));
            return Ok(StreamingQuery {
                stream,
                sources: Vec::new(),
            });
        };

        Ok(StreamingQuery {
            stream: self.model.generate_stream(&prompt),
            sources,
        })
    }

    /// Retrieve the `k` most similar chunks without generating an answer.
    #[inline]
    pub async fn relevant_documents(
        &self,
        collection: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let question = validated(question)?;
        let query_vector = self.model.embed(question)?;
        self.store.search(collection, &query_vector, k).await
    }

    /// Embed and store pre-built chunks directly, bypassing the scrape
    /// pipeline. Creates the collection when it does not exist.
    #[inline]
    pub async fn add_documents(&self, collection: &str, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self.model.embed_batch(&texts)?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                chunk,
            })
            .collect();

        let count = records.len();
        self.store.upsert(collection, records).await?;
        info!("Added {} documents to collection {}", count, collection);
        Ok(count)
    }

    /// Shared retrieval step: returns the grounding prompt (`None` when
    /// nothing was retrieved) and the numbered attributions.
    async fn prepare(
        &self,
        collection: &str,
        question: &str,
        k: usize,
    ) -> Result<(Option<String>, Vec<SourceAttribution>)> {
        let question = validated(question)?;

        let query_vector = self.model.embed(question)?;
        let retrieved = self.store.search(collection, &query_vector, k).await?;

        debug!(
            "Retrieved {} chunks from {} for question ({} chars)",
            retrieved.len(),
            collection,
            question.len()
        );

        if retrieved.is_empty() {
            return Ok((None, Vec::new()));
        }

        let sources: Vec<SourceAttribution> = retrieved
            .iter()
            .enumerate()
            .map(|(i, scored)| SourceAttribution {
                ordinal: i + 1,
                content: scored.chunk.content.clone(),
                organization: scored.chunk.metadata.organization.clone(),
                url: scored.chunk.metadata.source.clone(),
            })
            .collect();

        let prompt = build_prompt(question, &sources);
        Ok((Some(prompt), sources))
    }
}

fn validated(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidQuery(
            "question must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn build_prompt(question: &str, sources: &[SourceAttribution]) -> String {
    let mut context = String::new();
    for source in sources {
        context.push_str(&format!(
            "[{}] {}: {}\n\n",
            source.ordinal, source.organization, source.content
        ));
    }

    format!(
        "You are a careful assistant answering health questions for a general \
         audience.\n\
         Answer the question using ONLY the numbered context passages below.\n\
         Cite the passages you rely on inline using their bracketed numbers, \
         for example [1].\n\
         If the context does not contain the information needed, say that the \
         context does not contain that information instead of guessing.\n\n\
         Context:\n{}Question: {}\n\nAnswer:",
        context, question
    )
}

fn empty_context_response() -> QueryResponse {
    QueryResponse {
        answer: "The knowledge base contains no information relevant to this question."
            .to_string(),
        sources: Vec::new(),
    }
}

/// Whether a finished answer actually drew on the supplied context.
#[inline]
pub fn is_grounded(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    !UNGROUNDED_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}
