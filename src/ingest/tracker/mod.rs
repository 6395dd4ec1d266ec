
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sources::SourceEntry;
use crate::Result;

/// Summary of the most recent completed run for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastScraped {
    /// RFC 3339 timestamp of the run.
    pub timestamp: String,
    /// URLs attempted in that run.
    pub url_count: usize,
    /// Chunks stored by that run.
    pub document_count: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerState {
    #[serde(default)]
    last_scraped: BTreeMap<String, LastScraped>,
    #[serde(default)]
    scraped_urls: BTreeMap<String, BTreeSet<String>>,
}

/// Persistent record of which source URLs have been ingested per collection.
///
/// State lives in a single JSON file and is rewritten after every mutation,
/// so an interrupted process never leaves the file behind reality.
#[derive(Debug)]
pub struct ScrapeTracker {
    path: PathBuf,
    state: TrackerState,
}

impl ScrapeTracker {
    /// Load tracker state from `path`, starting empty when the file does not
    /// exist yet.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read tracker file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse tracker file: {}", path.display()))?
        } else {
            debug!("No tracker file at {}, starting empty", path.display());
            TrackerState::default()
        };

        Ok(Self { path, state })
    }

    /// Sources from `sources` whose URLs have not been scraped into
    /// `collection` yet, in their original order.
    #[inline]
    pub fn unscraped(&self, collection: &str, sources: &[SourceEntry]) -> Vec<SourceEntry> {
        let Some(scraped) = self.state.scraped_urls.get(collection) else {
            return sources.to_vec();
        };

        sources
            .iter()
            .filter(|source| !scraped.contains(&source.url))
            .cloned()
            .collect()
    }

    /// Record a completed run: union the URLs into the collection's scraped
    /// set and overwrite its last-run summary. Persists before returning.
    #[inline]
    pub fn mark_scraped(
        &mut self,
        collection: &str,
        sources: &[SourceEntry],
        document_count: usize,
    ) -> Result<()> {
        let urls = self
            .state
            .scraped_urls
            .entry(collection.to_string())
            .or_default();
        for source in sources {
            urls.insert(source.url.clone());
        }

        self.state.last_scraped.insert(
            collection.to_string(),
            LastScraped {
                timestamp: Utc::now().to_rfc3339(),
                url_count: sources.len(),
                document_count,
            },
        );

        self.persist()
    }

    /// Forget scrape history for one collection, or for all collections when
    /// no name is given. Persists before returning.
    #[inline]
    pub fn reset(&mut self, collection: Option<&str>) -> Result<()> {
        match collection {
            Some(name) => {
                self.state.scraped_urls.remove(name);
                self.state.last_scraped.remove(name);
                info!("Reset scrape history for collection {}", name);
            }
            None => {
                self.state.scraped_urls.clear();
                self.state.last_scraped.clear();
                info!("Reset scrape history for all collections");
            }
        }

        self.persist()
    }

    /// Last-run summaries keyed by collection name.
    #[inline]
    pub fn status(&self) -> &BTreeMap<String, LastScraped> {
        &self.state.last_scraped
    }

    /// Number of URLs recorded as scraped for a collection.
    #[inline]
    pub fn scraped_url_count(&self, collection: &str) -> usize {
        self.state
            .scraped_urls
            .get(collection)
            .map_or(0, BTreeSet::len)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create tracker directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(&self.state)
            .context("Failed to serialize tracker state")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write tracker file: {}", self.path.display()))?;

        Ok(())
    }
}
