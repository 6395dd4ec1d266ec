pub mod ollama;

use tokio::sync::mpsc;

use crate::Result;

pub use ollama::OllamaClient;

/// A lazy, finite, non-restartable sequence of generated text fragments.
///
/// Fragments arrive in generation order. Dropping the stream closes the
/// channel, which signals the producer to stop generating further fragments.
pub struct AnswerStream {
    receiver: mpsc::Receiver<Result<String>>,
}

impl AnswerStream {
    /// Create a bounded fragment channel; the producer pushes into the
    /// returned sender and stops when the send fails (consumer gone).
    #[inline]
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<String>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }

    /// Next fragment, or `None` once generation has completed.
    #[inline]
    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        self.receiver.recv().await
    }

    /// Drain the remaining fragments into a single string. Mostly useful in
    /// tests and for callers that do not need incremental delivery.
    #[inline]
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

/// Embedding and generation capability consumed by the pipeline and the
/// query service. Both are treated as black boxes: given text, an embedding
/// vector comes back; given a prompt, natural-language text comes back.
pub trait LanguageModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Blocking generation: returns the full answer text.
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Streaming generation: fragments are delivered through the returned
    /// stream as they are produced; a provider failure surfaces as an `Err`
    /// fragment followed by end of stream.
    fn generate_stream(&self, prompt: &str) -> AnswerStream;
}
