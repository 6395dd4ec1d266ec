use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::config::Config;
use crate::ingest::fetcher::HttpFetcher;
use crate::ingest::tracker::ScrapeTracker;
use crate::ingest::{IngestOutcome, IngestionOrchestrator};
use crate::llm::{LanguageModel, OllamaClient};
use crate::query::{QueryService, SourceAttribution};
use crate::sources::{self, DEFAULT_TOPIC, Topic};
use crate::store::{LanceStore, VectorIndex};

fn load_config() -> Result<Config> {
    let dir = Config::default_dir()?;
    Config::load(dir)
}

async fn open_store(config: &Config) -> Result<Arc<LanceStore>> {
    let store = LanceStore::open(
        &config.vector_database_path(),
        config.ollama.embedding_dimension as usize,
    )
    .await
    .context("Failed to open vector store")?;
    Ok(Arc::new(store))
}

fn open_model(config: &Config) -> Result<Arc<OllamaClient>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    Ok(Arc::new(client))
}

fn resolve_topic(name: &str) -> Result<Topic> {
    sources::topic(name).with_context(|| {
        let known: Vec<&str> = sources::all_topics().iter().map(|t| t.name).collect();
        format!("Unknown topic '{}'. Known topics: {}", name, known.join(", "))
    })
}

/// Scrape and index one topic, or every registered topic.
#[inline]
pub async fn ingest(topic: String, force: bool) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let model = open_model(&config)?;
    let mut tracker =
        ScrapeTracker::load(config.tracker_path()).context("Failed to load scrape tracker")?;

    let orchestrator = IngestionOrchestrator::new(
        Arc::new(HttpFetcher::default()),
        model as Arc<dyn LanguageModel>,
        Arc::clone(&store) as Arc<dyn VectorIndex>,
        config.ingest.clone(),
        config.validation.clone(),
    );

    let topics = if topic == "all" {
        sources::all_topics()
    } else {
        vec![resolve_topic(&topic)?]
    };

    for topic in &topics {
        println!("Ingesting topic: {}", topic.name);

        match orchestrator.ingest(topic, &mut tracker, force).await {
            Ok(IngestOutcome::AlreadyScraped) => {
                println!("  All sources already scraped. Use --force to re-ingest.");
            }
            Ok(IngestOutcome::Completed(report)) => {
                println!("  Sources attempted: {}", report.sources_attempted);
                println!("  Documents fetched: {}", report.documents_fetched);
                println!("  Chunks stored: {}", report.chunks_stored);
                if report.chunks_rejected > 0 {
                    println!("  Chunks rejected by validation: {}", report.chunks_rejected);
                }
                if report.duplicates_removed > 0 {
                    println!("  Duplicates removed: {}", report.duplicates_removed);
                }
                println!("  By organization:");
                for (organization, count) in &report.by_organization {
                    println!("    {}: {}", organization, count);
                }
            }
            Err(e) => {
                bail!("Ingestion failed for topic {}: {}", topic.name, e);
            }
        }
    }

    Ok(())
}

/// Show per-collection scrape history.
#[inline]
pub fn status() -> Result<()> {
    let config = load_config()?;
    let tracker =
        ScrapeTracker::load(config.tracker_path()).context("Failed to load scrape tracker")?;

    if tracker.status().is_empty() {
        println!("Nothing has been ingested yet.");
        println!("Use 'medrag ingest <topic>' to get started.");
        return Ok(());
    }

    println!("Scrape status:");
    for (collection, last) in tracker.status() {
        println!("  {}", collection);
        println!("    Last run: {}", last.timestamp);
        println!("    URLs in last run: {}", last.url_count);
        println!("    Chunks stored in last run: {}", last.document_count);
        println!(
            "    Total URLs scraped: {}",
            tracker.scraped_url_count(collection)
        );
    }

    Ok(())
}

/// Forget scrape history for one topic or all of them. Vector data is left
/// in place; the next ingest run re-fetches and re-stores.
#[inline]
pub fn reset(topic: Option<String>) -> Result<()> {
    let config = load_config()?;
    let mut tracker =
        ScrapeTracker::load(config.tracker_path()).context("Failed to load scrape tracker")?;

    tracker.reset(topic.as_deref())?;

    match topic {
        Some(name) => println!("Scrape history reset for topic: {}", name),
        None => println!("Scrape history reset for all topics."),
    }

    Ok(())
}

/// Ask a question against an ingested topic.
#[inline]
pub async fn query(question: String, topic: Option<String>, k: usize, stream: bool) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let model = open_model(&config)?;
    let collection = topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    let service = QueryService::new(
        store as Arc<dyn VectorIndex>,
        model as Arc<dyn LanguageModel>,
    );

    info!("Querying collection {} (k={})", collection, k);

    if stream {
        let mut streaming = service.query_stream(&collection, &question, k).await?;

        let mut answer = String::new();
        while let Some(fragment) = streaming.stream.next_fragment().await {
            let fragment = fragment?;
            print!("{}", fragment);
            std::io::stdout().flush().ok();
            answer.push_str(&fragment);
        }
        println!();

        print_sources(streaming.sources_for(&answer));
    } else {
        let response = service.query(&collection, &question, k).await?;
        println!("{}", response.answer);
        print_sources(&response.sources);
    }

    Ok(())
}

/// Show the passages retrieval would hand to the model, without generating.
#[inline]
pub async fn sources(question: String, topic: Option<String>, k: usize) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let model = open_model(&config)?;
    let collection = topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    let service = QueryService::new(
        store as Arc<dyn VectorIndex>,
        model as Arc<dyn LanguageModel>,
    );

    let documents = service.relevant_documents(&collection, &question, k).await?;

    if documents.is_empty() {
        println!("No relevant passages found in collection {}.", collection);
        return Ok(());
    }

    for (i, scored) in documents.iter().enumerate() {
        println!(
            "[{}] {} (similarity {:.3})",
            i + 1,
            scored.chunk.metadata.organization,
            scored.score
        );
        println!("    {}", scored.chunk.metadata.source);
        println!("    {}", preview(&scored.chunk.content));
    }

    Ok(())
}

/// Print the active configuration, creating the default file when absent.
#[inline]
pub fn show_config() -> Result<()> {
    let config = load_config()?;

    if !config.config_file_path().exists() {
        config.save().context("Failed to write default config")?;
        println!("Wrote default config to {}", config.config_file_path().display());
    }

    println!("Config file: {}", config.config_file_path().display());
    println!("Vector store: {}", config.vector_database_path().display());
    println!("Tracker file: {}", config.tracker_path().display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn print_sources(sources: &[SourceAttribution]) {
    if sources.is_empty() {
        println!();
        println!("No sources: the knowledge base did not cover this question.");
        return;
    }

    println!();
    println!("Sources:");
    for source in sources {
        println!("  [{}] {} - {}", source.ordinal, source.organization, source.url);
    }
}

fn preview(content: &str) -> String {
    const PREVIEW_LEN: usize = 160;
    let mut preview: String = content.chars().take(PREVIEW_LEN).collect();
    if content.chars().count() > PREVIEW_LEN {
        preview.push_str("...");
    }
    preview
}
