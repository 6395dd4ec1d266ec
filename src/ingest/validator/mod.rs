#[cfg(test)]
mod tests;

use tracing::debug;

use crate::store::Chunk;

/// Content shorter than this is unlikely to carry a complete medical fact.
const MIN_CONTENT_LEN: usize = 100;
/// Boilerplate phrases only disqualify short chunks; a long chunk mentioning
/// cookies in passing can still be substantive.
const BOILERPLATE_LEN_LIMIT: usize = 500;

const SHORT_CONTENT_PENALTY: i32 = 30;
const OFF_TOPIC_PENALTY: i32 = 40;
const BOILERPLATE_PENALTY: i32 = 50;
const MISSING_ORGANIZATION_PENALTY: i32 = 20;
const MISSING_SOURCE_PENALTY: i32 = 20;

const BOILERPLATE_PHRASES: &[&str] = &[
    "cookie",
    "privacy policy",
    "terms of use",
    "terms and conditions",
    "subscribe to our newsletter",
    "sign up for our newsletter",
    "follow us",
    "all rights reserved",
    "javascript is disabled",
    "enable javascript",
];

/// Outcome of scoring a single chunk. Scoring starts at 100 and each failed
/// check subtracts a fixed penalty; the score can go negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub score: i32,
    pub issues: Vec<String>,
}

/// Quality gate between chunking and embedding. Pure: scoring depends only on
/// the chunk and the configured topic terms.
#[derive(Debug, Clone)]
pub struct Validator {
    topic_terms: Vec<String>,
    min_score: i32,
}

impl Validator {
    #[inline]
    pub fn new(topic_terms: &[&str], min_score: i32) -> Self {
        Self {
            topic_terms: topic_terms
                .iter()
                .map(|term| term.to_lowercase())
                .collect(),
            min_score,
        }
    }

    /// Score one chunk against the length, topicality, boilerplate, and
    /// provenance checks.
    #[inline]
    pub fn validate(&self, chunk: &Chunk) -> ValidationResult {
        let mut score = 100;
        let mut issues = Vec::new();
        let content = chunk.content.trim();
        let lowered = content.to_lowercase();

        if content.chars().count() < MIN_CONTENT_LEN {
            score -= SHORT_CONTENT_PENALTY;
            issues.push(format!(
                "content too short ({} chars, minimum {})",
                content.chars().count(),
                MIN_CONTENT_LEN
            ));
        }

        if !self.topic_terms.iter().any(|term| lowered.contains(term)) {
            score -= OFF_TOPIC_PENALTY;
            issues.push("no topic term found in content".to_string());
        }

        let boilerplate = BOILERPLATE_PHRASES
            .iter()
            .find(|phrase| lowered.contains(*phrase));
        if let Some(phrase) = boilerplate {
            if content.chars().count() < BOILERPLATE_LEN_LIMIT {
                score -= BOILERPLATE_PENALTY;
                issues.push(format!("short boilerplate content (matched \"{}\")", phrase));
            }
        }

        if chunk.metadata.organization.trim().is_empty() {
            score -= MISSING_ORGANIZATION_PENALTY;
            issues.push("missing organization metadata".to_string());
        }

        if chunk.metadata.source.trim().is_empty() {
            score -= MISSING_SOURCE_PENALTY;
            issues.push("missing source URL metadata".to_string());
        }

        ValidationResult {
            is_valid: score >= self.min_score,
            score,
            issues,
        }
    }

    /// Drop chunks failing validation, logging the score and issues for each
    /// rejection.
    #[inline]
    pub fn filter_valid(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let before = chunks.len();
        let kept: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| {
                let result = self.validate(chunk);
                if !result.is_valid {
                    debug!(
                        "Rejected chunk from {} (score {}): {}",
                        chunk.metadata.source,
                        result.score,
                        result.issues.join("; ")
                    );
                }
                result.is_valid
            })
            .collect();

        debug!("Validation kept {}/{} chunks", kept.len(), before);
        kept
    }
}
