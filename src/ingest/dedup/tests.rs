use super::*;
use std::collections::BTreeMap;

use crate::sources::Credibility;
use crate::store::ChunkMetadata;

fn chunk(content: &str, source: &str) -> Chunk {
    Chunk {
        content: content.to_string(),
        metadata: ChunkMetadata {
            organization: "CDC".to_string(),
            category: "government".to_string(),
            credibility: Credibility::High,
            last_verified: "2025-06-21".to_string(),
            source: source.to_string(),
            scraped_at: "2025-06-21T10:00:00Z".to_string(),
            topic: "breast_cancer".to_string(),
            extra: BTreeMap::new(),
        },
    }
}

#[test]
fn exact_duplicates_keep_first_occurrence() {
    let chunks = vec![
        chunk("Mammography screening is recommended.", "https://a.example.org"),
        chunk("Mammography screening is recommended.", "https://b.example.org"),
    ];

    let kept = remove_duplicates(chunks);

    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].metadata.source, "https://a.example.org");
}

#[test]
fn distinct_chunks_survive() {
    let chunks = vec![
        chunk("Mammograms detect tumors early.", "https://a.example.org"),
        chunk("Biopsy confirms a diagnosis.", "https://a.example.org"),
        chunk("Chemotherapy targets dividing cells.", "https://a.example.org"),
    ];

    assert_eq!(remove_duplicates(chunks).len(), 3);
}

#[test]
fn fingerprint_ignores_surrounding_whitespace() {
    let chunks = vec![
        chunk("Screening saves lives.", "https://a.example.org"),
        chunk("  Screening saves lives.  \n", "https://b.example.org"),
    ];

    assert_eq!(remove_duplicates(chunks).len(), 1);
}

#[test]
fn chunks_matching_in_first_two_hundred_chars_are_duplicates() {
    let shared_prefix = "screening ".repeat(25);
    assert!(shared_prefix.len() > 200);

    let chunks = vec![
        chunk(&format!("{} first tail", shared_prefix), "https://a.example.org"),
        chunk(&format!("{} second tail", shared_prefix), "https://b.example.org"),
    ];

    assert_eq!(remove_duplicates(chunks).len(), 1);
}

#[test]
fn short_chunks_differing_before_two_hundred_chars_are_distinct() {
    let chunks = vec![
        chunk("Tumor grading describes cell appearance.", "https://a.example.org"),
        chunk("Tumor staging describes cancer spread.", "https://a.example.org"),
    ];

    assert_eq!(remove_duplicates(chunks).len(), 2);
}

#[test]
fn output_never_exceeds_input_and_has_unique_fingerprints() {
    let mut chunks = Vec::new();
    for i in 0..20 {
        chunks.push(chunk(&format!("Fact number {} about screening.", i % 7), "https://a.example.org"));
    }
    let input_len = chunks.len();

    let kept = remove_duplicates(chunks);

    assert!(kept.len() <= input_len);
    assert_eq!(kept.len(), 7);

    let fingerprints: std::collections::HashSet<String> =
        kept.iter().map(|c| fingerprint(&c.content)).collect();
    assert_eq!(fingerprints.len(), kept.len());
}

#[test]
fn empty_input_is_fine() {
    assert!(remove_duplicates(Vec::new()).is_empty());
}
