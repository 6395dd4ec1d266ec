//! End-to-end pipeline test: scrape pages from a local HTTP server, chunk,
//! validate, embed with a stub model, store in a real LanceDB directory, and
//! answer a question from what was stored.

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use medrag::config::{IngestConfig, ValidationConfig};
use medrag::ingest::fetcher::{FetcherConfig, HttpFetcher};
use medrag::ingest::tracker::ScrapeTracker;
use medrag::ingest::{IngestOutcome, IngestionOrchestrator};
use medrag::llm::{AnswerStream, LanguageModel};
use medrag::query::QueryService;
use medrag::sources::{Credibility, SourceEntry, Topic};
use medrag::store::{LanceStore, VectorIndex};
use medrag::Result;

const DIM: usize = 8;

/// Deterministic embedding from character statistics; close enough for
/// similarity ranking in a test corpus of a handful of chunks.
struct HashingModel;

impl LanguageModel for HashingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; DIM];
        for (i, ch) in text.chars().enumerate() {
            vector[i % DIM] += (ch as u32 % 23) as f32 / 23.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
        Ok(vector.into_iter().map(|v| v / norm).collect())
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("Perimenopause typically begins several years before menopause [1].".to_string())
    }

    fn generate_stream(&self, _prompt: &str) -> AnswerStream {
        let (sender, stream) = AnswerStream::channel(1);
        let _ = sender.try_send(Ok(
            "Perimenopause typically begins several years before menopause [1].".to_string(),
        ));
        stream
    }
}

fn page(title: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body>\
         <nav>Home | Privacy Policy | Subscribe to our newsletter</nav>\
         <article><h1>{title}</h1>{body}</article>\
         <footer>All rights reserved.</footer>\
         </body></html>"
    )
}

fn entry(server: &MockServer, page_path: &str, organization: &str) -> SourceEntry {
    SourceEntry {
        url: format!("{}{}", server.uri(), page_path),
        organization: organization.to_string(),
        category: "government".to_string(),
        credibility: Credibility::High,
        last_verified: "2025-06-14".to_string(),
    }
}

fn test_topic(sources: Vec<SourceEntry>) -> Topic {
    Topic {
        name: "menopause",
        terms: &["menopause", "perimenopause", "estrogen", "hot flash"],
        sources,
    }
}

async fn mount_pages(server: &MockServer) {
    let page_a = page(
        "The Menopause Transition",
        &[
            "Perimenopause is the transition that begins several years before \
             menopause, when the ovaries gradually produce less estrogen. \
             Cycle length commonly becomes irregular during this window, and \
             symptoms fluctuate from month to month for most people.",
            "Hot flash frequency peaks in the late transition and generally \
             declines within a few years after the final menstrual period, \
             though a minority experience symptoms for a decade or longer.",
        ],
    );
    let page_b = page(
        "Menopause Basics",
        &[
            "Menopause is confirmed after twelve consecutive months without a \
             menstrual period. The average age at natural menopause is 51, \
             but anywhere from 45 to 55 is typical and earlier onset occurs \
             after certain surgeries or treatments.",
            "Declining estrogen affects bone density, and screening for \
             osteoporosis becomes more important after menopause. Weight \
             bearing exercise and adequate calcium intake are protective.",
        ],
    );

    Mock::given(method("GET"))
        .and(path("/transition"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page_a, "text/html"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/basics"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page_b, "text/html"))
        .mount(server)
        .await;
}

fn fast_ingest_config() -> IngestConfig {
    IngestConfig {
        rate_limit_ms: 0,
        ..IngestConfig::default()
    }
}

#[tokio::test]
async fn scrape_store_and_query_round_trip() {
    let server = MockServer::start().await;
    mount_pages(&server).await;

    let dir = TempDir::new().expect("should create temp dir");
    let store = Arc::new(
        LanceStore::open(&dir.path().join("vectors"), DIM)
            .await
            .expect("should open store"),
    );
    let model = Arc::new(HashingModel);

    let fetcher = HttpFetcher::new(FetcherConfig {
        retry_delay_ms: 0,
        ..FetcherConfig::default()
    });
    let orchestrator = IngestionOrchestrator::new(
        Arc::new(fetcher),
        Arc::clone(&model) as Arc<dyn LanguageModel>,
        Arc::clone(&store) as Arc<dyn VectorIndex>,
        fast_ingest_config(),
        ValidationConfig::default(),
    );

    let topic = test_topic(vec![
        entry(&server, "/transition", "MedlinePlus/NIH"),
        entry(&server, "/basics", "Office on Women's Health"),
    ]);
    let mut tracker =
        ScrapeTracker::load(dir.path().join("tracker.json")).expect("should load tracker");

    // First run fetches and stores everything.
    let outcome = orchestrator
        .ingest(&topic, &mut tracker, false)
        .await
        .expect("ingest should succeed");
    let IngestOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.sources_attempted, 2);
    assert_eq!(report.documents_fetched, 2);
    assert!(report.chunks_stored > 0);
    assert!(
        store
            .collection_exists("menopause")
            .await
            .expect("should check existence")
    );

    // Second run is a no-op because the tracker remembers both URLs.
    let second = orchestrator
        .ingest(&topic, &mut tracker, false)
        .await
        .expect("second run should succeed");
    assert_eq!(second, IngestOutcome::AlreadyScraped);

    // Retrieval finds the stored content and attribution follows metadata.
    let service = QueryService::new(
        Arc::clone(&store) as Arc<dyn VectorIndex>,
        model as Arc<dyn LanguageModel>,
    );

    let response = service
        .query("menopause", "When does perimenopause start?", 4)
        .await
        .expect("query should succeed");

    assert!(!response.answer.is_empty());
    assert!(!response.sources.is_empty());
    for (i, source) in response.sources.iter().enumerate() {
        assert_eq!(source.ordinal, i + 1);
        assert!(
            source.organization == "MedlinePlus/NIH"
                || source.organization == "Office on Women's Health"
        );
        assert!(source.url.starts_with(&server.uri()));
    }

    let documents = service
        .relevant_documents("menopause", "bone density and osteoporosis", 2)
        .await
        .expect("retrieval should succeed");
    assert_eq!(documents.len(), 2);
    assert!(!documents[0].chunk.content.contains("Privacy Policy"));
}

#[tokio::test]
async fn tracker_survives_process_restart() {
    let server = MockServer::start().await;
    mount_pages(&server).await;

    let dir = TempDir::new().expect("should create temp dir");
    let store = Arc::new(
        LanceStore::open(&dir.path().join("vectors"), DIM)
            .await
            .expect("should open store"),
    );
    let model = Arc::new(HashingModel);
    let tracker_path = dir.path().join("tracker.json");

    let topic = test_topic(vec![entry(&server, "/transition", "MedlinePlus/NIH")]);

    {
        let orchestrator = IngestionOrchestrator::new(
            Arc::new(HttpFetcher::default()),
            Arc::clone(&model) as Arc<dyn LanguageModel>,
            Arc::clone(&store) as Arc<dyn VectorIndex>,
            fast_ingest_config(),
            ValidationConfig::default(),
        );
        let mut tracker = ScrapeTracker::load(&tracker_path).expect("should load tracker");
        orchestrator
            .ingest(&topic, &mut tracker, false)
            .await
            .expect("ingest should succeed");
    }

    // Fresh tracker instance, same file: history must carry over.
    let orchestrator = IngestionOrchestrator::new(
        Arc::new(HttpFetcher::default()),
        Arc::clone(&model) as Arc<dyn LanguageModel>,
        store as Arc<dyn VectorIndex>,
        fast_ingest_config(),
        ValidationConfig::default(),
    );
    let mut tracker = ScrapeTracker::load(&tracker_path).expect("should reload tracker");
    let outcome = orchestrator
        .ingest(&topic, &mut tracker, false)
        .await
        .expect("should succeed");

    assert_eq!(outcome, IngestOutcome::AlreadyScraped);
}
