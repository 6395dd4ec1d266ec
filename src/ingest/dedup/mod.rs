#[cfg(test)]
mod tests;

use std::collections::HashSet;

use tracing::debug;

use crate::store::Chunk;

/// Characters of trimmed content used as the duplicate fingerprint.
const FINGERPRINT_LEN: usize = 200;

/// Drop chunks whose content fingerprint was already seen in this batch,
/// keeping the first occurrence. Deduplication is batch-local: nothing is
/// compared against previously ingested collections.
///
/// Two chunks identical in their first 200 characters but diverging later are
/// treated as duplicates. That trade-off is deliberate: scraped pages repeat
/// entire navigation and summary blocks verbatim, and a prefix check catches
/// those without hashing full contents.
#[inline]
pub fn remove_duplicates(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let before = chunks.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);

    let kept: Vec<Chunk> = chunks
        .into_iter()
        .filter(|chunk| seen.insert(fingerprint(&chunk.content)))
        .collect();

    if kept.len() < before {
        debug!("Removed {} duplicate chunks of {}", before - kept.len(), before);
    }
    kept
}

fn fingerprint(content: &str) -> String {
    content.trim().chars().take(FINGERPRINT_LEN).collect()
}
