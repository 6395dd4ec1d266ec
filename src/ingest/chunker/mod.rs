
use std::collections::BTreeMap;

use tracing::debug;

use super::fetcher::RawDocument;
use crate::store::{Chunk, ChunkMetadata};

/// Deterministic text splitter. Same input and settings always produce the
/// same chunks; no IO, no clock, no randomness.
#[derive(Debug, Clone)]
pub struct Chunker {
    /// Target chunk length in characters.
    chunk_size: usize,
    /// Characters repeated from the end of one chunk at the start of the next,
    /// so sentences spanning a cut survive in at least one chunk.
    overlap: usize,
}

impl Chunker {
    #[inline]
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        debug_assert!(overlap < chunk_size);
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Split text into overlapping chunks, preferring paragraph breaks, then
    /// sentence ends, then word boundaries over mid-word cuts.
    #[inline]
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();

        if chars.is_empty() {
            return Vec::new();
        }

        if chars.len() <= self.chunk_size {
            let single = text.trim();
            return if single.is_empty() {
                Vec::new()
            } else {
                vec![single.to_string()]
            };
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let hard_end = (start + self.chunk_size).min(chars.len());
            let cut = if hard_end == chars.len() {
                hard_end
            } else {
                self.find_cut(&chars, start, hard_end)
            };

            let piece: String = chars[start..cut].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if cut == chars.len() {
                break;
            }

            // Step back by the overlap, but always move forward overall.
            let next = cut.saturating_sub(self.overlap);
            start = if next > start { next } else { cut };
        }

        debug!("Split {} chars into {} chunks", chars.len(), chunks.len());
        chunks
    }

    /// Best cut position in `(start, hard_end]`, searched backwards from the
    /// size limit. Boundaries closer than half a chunk to the start are
    /// ignored so a single early paragraph break cannot starve a chunk.
    fn find_cut(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_cut = start + self.chunk_size / 2;

        if let Some(cut) = find_boundary(chars, min_cut, hard_end, is_paragraph_break) {
            return cut;
        }
        if let Some(cut) = find_boundary(chars, min_cut, hard_end, is_sentence_end) {
            return cut;
        }
        if let Some(cut) = find_boundary(chars, min_cut, hard_end, is_word_break) {
            return cut;
        }

        hard_end
    }

    /// Build embedding-ready chunks from a fetched document, stamping each
    /// one with the source's provenance metadata.
    #[inline]
    pub fn chunk_document(
        &self,
        document: &RawDocument,
        topic: &str,
        scraped_at: &str,
    ) -> Vec<Chunk> {
        let entry = &document.entry;

        self.split(&document.text)
            .into_iter()
            .map(|content| Chunk {
                content,
                metadata: ChunkMetadata {
                    organization: entry.organization.clone(),
                    category: entry.category.clone(),
                    credibility: entry.credibility,
                    last_verified: entry.last_verified.clone(),
                    source: entry.url.clone(),
                    scraped_at: scraped_at.to_string(),
                    topic: topic.to_string(),
                    extra: BTreeMap::new(),
                },
            })
            .collect()
    }
}

/// Search backwards through `(min_cut, hard_end]` for the rightmost position
/// where `is_boundary(prev_char, next_char)` holds.
fn find_boundary(
    chars: &[char],
    min_cut: usize,
    hard_end: usize,
    is_boundary: fn(char, Option<char>) -> bool,
) -> Option<usize> {
    (min_cut + 1..=hard_end)
        .rev()
        .find(|&cut| is_boundary(chars[cut - 1], chars.get(cut).copied()))
}

fn is_paragraph_break(prev: char, next: Option<char>) -> bool {
    prev == '\n' && next == Some('\n')
}

fn is_sentence_end(prev: char, next: Option<char>) -> bool {
    matches!(prev, '.' | '!' | '?') && next.is_none_or(char::is_whitespace)
}

fn is_word_break(prev: char, _next: Option<char>) -> bool {
    prev.is_whitespace()
}
