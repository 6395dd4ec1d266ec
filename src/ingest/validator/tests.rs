use super::*;
use std::collections::BTreeMap;

use crate::sources::Credibility;
use crate::store::ChunkMetadata;

const TERMS: &[&str] = &["menopause", "hot flash", "estrogen"];

fn validator() -> Validator {
    Validator::new(TERMS, 50)
}

fn chunk(content: &str) -> Chunk {
    Chunk {
        content: content.to_string(),
        metadata: ChunkMetadata {
            organization: "ACOG".to_string(),
            category: "professional-society".to_string(),
            credibility: Credibility::High,
            last_verified: "2025-06-14".to_string(),
            source: "https://www.acog.org/the-menopause-years".to_string(),
            scraped_at: "2025-06-14T10:00:00Z".to_string(),
            topic: "menopause".to_string(),
            extra: BTreeMap::new(),
        },
    }
}

fn on_topic_content() -> String {
    format!(
        "Menopause is confirmed after twelve consecutive months without a \
         menstrual period. Declining estrogen levels drive most symptoms. {}",
        "Hot flash frequency varies widely between individuals. ".repeat(3)
    )
}

#[test]
fn substantive_on_topic_chunk_passes() {
    let result = validator().validate(&chunk(&on_topic_content()));

    assert!(result.is_valid);
    assert_eq!(result.score, 100);
    assert!(result.issues.is_empty());
}

#[test]
fn short_content_loses_thirty() {
    let content = "Estrogen levels decline during the menopause transition period overall.";
    assert!(content.len() < 100);

    let result = validator().validate(&chunk(content));

    assert_eq!(result.score, 70);
    assert!(result.is_valid);
    assert_eq!(result.issues.len(), 1);
}

#[test]
fn off_topic_content_loses_forty() {
    let content = "The library opens at nine in the morning on weekdays and closes \
                   at five. Parking is available behind the main building for visitors.";

    let result = validator().validate(&chunk(content));

    assert_eq!(result.score, 60);
    assert!(result.is_valid);
}

#[test]
fn short_boilerplate_loses_fifty() {
    let content = "We use cookies to improve your experience on our menopause resource \
                   pages. By continuing you accept our use of cookies across this site.";

    let result = validator().validate(&chunk(content));

    assert_eq!(result.score, 50);
    assert!(result.is_valid, "exactly at threshold should pass");
}

#[test]
fn long_content_mentioning_boilerplate_phrase_is_not_penalized() {
    let content = format!(
        "{} Our cookie policy is described elsewhere. {}",
        on_topic_content(),
        "Night sweats often accompany the hormonal shift of menopause. ".repeat(5)
    );
    assert!(content.len() >= 500);

    let result = validator().validate(&chunk(&content));

    assert_eq!(result.score, 100);
}

#[test]
fn missing_provenance_loses_twenty_each() {
    let mut bad = chunk(&on_topic_content());
    bad.metadata.organization = String::new();
    bad.metadata.source = "   ".to_string();

    let result = validator().validate(&bad);

    assert_eq!(result.score, 60);
    assert_eq!(result.issues.len(), 2);
}

#[test]
fn penalties_are_additive_and_can_go_negative() {
    // 50 chars, no topic term, no organization, no source:
    // 100 - 30 - 40 - 20 - 20 = -10
    let mut bad = chunk("Click here to read more about our latest updates.");
    bad.metadata.organization = String::new();
    bad.metadata.source = String::new();

    let result = validator().validate(&bad);

    assert_eq!(result.score, -10);
    assert!(!result.is_valid);
    assert_eq!(result.issues.len(), 4);
}

#[test]
fn threshold_comes_from_configuration() {
    let strict = Validator::new(TERMS, 80);
    let content = "The library opens at nine in the morning on weekdays and closes \
                   at five. Parking is available behind the main building for visitors.";

    // Same chunk scores 60: passes the default gate, fails the strict one.
    assert!(validator().validate(&chunk(content)).is_valid);
    assert!(!strict.validate(&chunk(content)).is_valid);
}

#[test]
fn validation_is_pure() {
    let sample = chunk(&on_topic_content());
    assert_eq!(validator().validate(&sample), validator().validate(&sample));
}

#[test]
fn filter_valid_drops_only_failing_chunks() {
    let mut garbage = chunk("Follow us on social media!");
    garbage.metadata.organization = String::new();

    let kept = validator().filter_valid(vec![chunk(&on_topic_content()), garbage]);

    assert_eq!(kept.len(), 1);
    assert!(kept[0].content.contains("Menopause"));
}
