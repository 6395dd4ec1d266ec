
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::sources::SourceEntry;

/// Minimum extracted length before a scoped selector is trusted over the
/// whole-page fallback.
const MIN_SCOPED_CONTENT_LEN: usize = 100;

/// Extracted page text paired with the source entry it came from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub text: String,
    pub entry: SourceEntry,
}

/// Page retrieval capability. Implementations must fail soft: any network,
/// timeout, or markup failure yields an empty list, never an error, so an
/// ingestion run can proceed with the remaining sources.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, entry: &SourceEntry) -> Vec<RawDocument>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Maximum retry attempts for retryable HTTP errors (5xx, 429, transport).
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Selectors tried in order to scope extraction to the page's main
    /// content region; falls back to whole-page text when none match.
    pub content_selectors: Vec<String>,
    /// Elements whose subtrees are dropped during text extraction.
    pub excluded_elements: Vec<String>,
}

impl Default for FetcherConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: "medrag/0.1.0 (Medical Source Indexer)".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            content_selectors: vec![
                "article".to_string(),
                "main".to_string(),
                "[role=main]".to_string(),
                "#content".to_string(),
                ".content".to_string(),
                "body".to_string(),
            ],
            excluded_elements: vec![
                "script".to_string(),
                "style".to_string(),
                "nav".to_string(),
                "header".to_string(),
                "footer".to_string(),
                "aside".to_string(),
                "form".to_string(),
                "noscript".to_string(),
            ],
        }
    }
}

/// HTTP fetcher with bounded retry for transient failures.
#[derive(Debug)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    config: FetcherConfig,
}

impl HttpFetcher {
    #[inline]
    pub fn new(config: FetcherConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(config.user_agent.as_str())
            .build()
            .into();

        Self { agent, config }
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, String> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retrying request to {} (attempt {})", url, attempt + 1);
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }

            match self.try_get(url) {
                Ok(body) => return Ok(body),
                Err((retryable, message)) => {
                    if !retryable || attempt == self.config.max_retries {
                        return Err(message);
                    }
                    last_error = message;
                }
            }
        }

        Err(last_error)
    }

    /// Single GET attempt; the bool in the error marks retryability.
    fn try_get(&self, url: &str) -> Result<String, (bool, String)> {
        match self.agent.get(url).call() {
            Ok(mut response) => response
                .body_mut()
                .read_to_string()
                .map_err(|e| (false, format!("Failed to read response body: {}", e))),
            Err(ureq::Error::StatusCode(status)) => {
                let retryable = status >= 500 || status == 429;
                Err((retryable, format!("HTTP error {}", status)))
            }
            Err(e) => Err((true, format!("Transport error: {}", e))),
        }
    }

    /// Extract readable text from HTML, preferring scoped content regions.
    fn extract_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);

        for selector_str in &self.config.content_selectors {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };

            if let Some(element) = document.select(&selector).next() {
                let text = self.collect_text(*element);
                if text.len() > MIN_SCOPED_CONTENT_LEN {
                    return text;
                }
            }
        }

        // Whole-page fallback
        Selector::parse("body")
            .ok()
            .and_then(|selector| {
                document
                    .select(&selector)
                    .next()
                    .map(|element| self.collect_text(*element))
            })
            .unwrap_or_default()
    }

    /// Depth-first text collection that skips excluded element subtrees.
    fn collect_text(&self, root: ego_tree::NodeRef<'_, scraper::Node>) -> String {
        let mut out = String::new();
        self.collect_text_into(root, &mut out);
        normalize_whitespace(&out)
    }

    fn collect_text_into(&self, node: ego_tree::NodeRef<'_, scraper::Node>, out: &mut String) {
        for child in node.children() {
            match child.value() {
                scraper::Node::Text(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(trimmed);
                    }
                }
                scraper::Node::Element(element) => {
                    let name = element.name();
                    if self
                        .config
                        .excluded_elements
                        .iter()
                        .any(|excluded| excluded == name)
                    {
                        continue;
                    }
                    self.collect_text_into(child, out);
                }
                _ => {}
            }
        }
    }
}

impl Default for HttpFetcher {
    #[inline]
    fn default() -> Self {
        Self::new(FetcherConfig::default())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[inline]
    async fn fetch(&self, entry: &SourceEntry) -> Vec<RawDocument> {
        debug!("Fetching {}", entry.url);

        let html = match self.get_with_retry(&entry.url).await {
            Ok(html) => html,
            Err(message) => {
                warn!("Fetch failed for {}: {}", entry.url, message);
                return Vec::new();
            }
        };

        let text = self.extract_text(&html);
        if text.trim().is_empty() {
            warn!("No extractable content at {}", entry.url);
            return Vec::new();
        }

        debug!("Extracted {} chars from {}", text.len(), entry.url);
        vec![RawDocument {
            text,
            entry: entry.clone(),
        }]
    }
}

fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }

    out.trim_end().to_string()
}
