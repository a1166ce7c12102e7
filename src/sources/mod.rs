// Sources module
// Turns URLs and file paths into documents ready for chunking

pub mod extractor;


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use ureq::Agent;
use url::Url;

use self::extractor::extract_content;
use crate::config::FetchConfig;
use crate::{IndexError, Result};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// A unit of ingested content. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// URL or file path the content came from
    pub source: String,
    /// Plain text content
    pub content: String,
    /// Metadata such as `source` and `title`
    pub metadata: BTreeMap<String, String>,
    /// Why the source could not be fetched; such documents are skipped on ingest
    pub fetch_failure: Option<String>,
}

impl Document {
    #[inline]
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        let source = source.into();
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source.clone());
        Self {
            source,
            content: content.into(),
            metadata,
            fetch_failure: None,
        }
    }

    /// An empty document standing in for a source that could not be fetched
    #[inline]
    pub fn unavailable(source: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut document = Self::new(source, String::new());
        document.fetch_failure = Some(reason.into());
        document
    }

    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub const fn is_available(&self) -> bool {
        self.fetch_failure.is_none()
    }
}

/// Where a source identifier points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl SourceLocation {
    /// Classify `source` as an http(s) URL or a local path (`file://` URLs included)
    #[inline]
    pub fn parse(source: &str) -> Result<Self> {
        match Url::parse(source) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                Ok(Self::Remote(validate_url(source)?))
            }
            Ok(url) if url.scheme() == "file" => url.to_file_path().map(Self::Local).map_err(|()| {
                IndexError::Fetch {
                    source_id: source.to_string(),
                    reason: "file URL does not name a local path".to_string(),
                }
            }),
            // Single letters are Windows drive prefixes, not schemes
            Ok(url) if url.scheme().len() > 1 => Err(IndexError::Fetch {
                source_id: source.to_string(),
                reason: format!("unsupported URL scheme '{}'", url.scheme()),
            }),
            _ => Ok(Self::Local(PathBuf::from(source))),
        }
    }
}

/// Validate an http(s) URL with a host
#[inline]
pub fn validate_url(url_str: &str) -> Result<Url> {
    let invalid = |reason: String| IndexError::Fetch {
        source_id: url_str.to_string(),
        reason,
    };

    let url = Url::parse(url_str).map_err(|e| invalid(format!("invalid URL format: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("URL must use HTTP or HTTPS scheme".to_string()));
    }

    if url.host_str().is_none() {
        return Err(invalid("URL must have a valid host".to_string()));
    }

    Ok(url)
}

/// Raw response from a remote source
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client with retry logic for fetching remote sources
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: Agent,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    #[inline]
    pub fn new(config: &FetchConfig) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            max_retries: config.max_retries,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// GET `url`, retrying transport errors, 429 and 5xx responses
    #[inline]
    pub async fn get(&self, url: &Url) -> Result<FetchedPage> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retrying request to {} (attempt {})", url, attempt + 1);
                tokio::time::sleep(self.retry_delay).await;
            }

            let client = self.clone();
            let target = url.clone();
            let outcome = tokio::task::spawn_blocking(move || client.try_get(&target))
                .await
                .map_err(|e| IndexError::Fetch {
                    source_id: url.to_string(),
                    reason: format!("fetch task failed: {}", e),
                })?;

            match outcome {
                Ok(page) => {
                    debug!("Fetched {} ({} bytes)", url, page.body.len());
                    return Ok(page);
                }
                Err(FetchAttemptError::Retryable(reason)) => {
                    warn!("Retryable error for {}: {}", url, reason);
                    last_error = Some(reason);
                }
                Err(FetchAttemptError::Fatal(reason)) => {
                    return Err(IndexError::Fetch {
                        source_id: url.to_string(),
                        reason,
                    });
                }
            }
        }

        Err(IndexError::Fetch {
            source_id: url.to_string(),
            reason: last_error.unwrap_or_else(|| "all retry attempts failed".to_string()),
        })
    }

    fn try_get(&self, url: &Url) -> std::result::Result<FetchedPage, FetchAttemptError> {
        debug!("Making HTTP GET request to: {}", url);

        match self.agent.get(url.as_str()).call() {
            Ok(mut response) => {
                let status = response.status().as_u16();
                if status == 429 || status >= 500 {
                    return Err(FetchAttemptError::Retryable(format!("HTTP error {}", status)));
                }
                if !(200..300).contains(&status) {
                    return Err(FetchAttemptError::Fatal(format!("HTTP error {}", status)));
                }

                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let body = response
                    .body_mut()
                    .with_config()
                    .limit(MAX_BODY_BYTES)
                    .read_to_vec()
                    .map_err(|e| {
                        FetchAttemptError::Fatal(format!("failed to read response body: {}", e))
                    })?;

                Ok(FetchedPage { body, content_type })
            }
            Err(
                e @ (ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_)),
            ) => Err(FetchAttemptError::Retryable(e.to_string())),
            Err(e) => Err(FetchAttemptError::Fatal(e.to_string())),
        }
    }
}

enum FetchAttemptError {
    Retryable(String),
    Fatal(String),
}

/// Fetches sources into documents, recording failures instead of aborting
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: HttpClient,
}

impl SourceFetcher {
    #[inline]
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            http: HttpClient::new(config),
        }
    }

    #[inline]
    pub const fn with_http_client(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetch one source. A failure yields an empty document carrying the reason.
    #[inline]
    pub async fn fetch_document(&self, source: &str) -> Document {
        match self.try_fetch(source).await {
            Ok(document) => document,
            Err(e) => {
                let reason = match e {
                    IndexError::Fetch { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!("Skipping {}: {}", source, reason);
                Document::unavailable(source, reason)
            }
        }
    }

    /// Fetch sources in order
    #[inline]
    pub async fn fetch_documents(&self, sources: &[String]) -> Vec<Document> {
        let mut documents = Vec::with_capacity(sources.len());
        for source in sources {
            documents.push(self.fetch_document(source).await);
        }
        documents
    }

    async fn try_fetch(&self, source: &str) -> Result<Document> {
        let (body, content_type, is_html_path) = match SourceLocation::parse(source)? {
            SourceLocation::Remote(url) => {
                let page = self.http.get(&url).await?;
                (page.body, page.content_type, false)
            }
            SourceLocation::Local(path) => {
                let body = tokio::fs::read(&path).await.map_err(|e| IndexError::Fetch {
                    source_id: source.to_string(),
                    reason: format!("failed to read {}: {}", path.display(), e),
                })?;
                (body, None, has_html_extension(&path))
            }
        };

        let text = String::from_utf8_lossy(&body);
        Ok(build_document(source, &text, content_type.as_deref(), is_html_path))
    }
}

fn has_html_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

fn looks_like_html(text: &str) -> bool {
    let head: String = text.trim_start().chars().take(15).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Build a document from decoded source text, extracting HTML when detected
pub(crate) fn build_document(
    source: &str,
    text: &str,
    content_type: Option<&str>,
    is_html_path: bool,
) -> Document {
    let is_html = content_type.map_or_else(
        || is_html_path || looks_like_html(text),
        |content_type| content_type.to_ascii_lowercase().contains("html"),
    );

    if !is_html {
        let mut document = Document::new(source, text);
        if let Some(content_type) = content_type {
            document = document.with_metadata("content_type", content_type);
        }
        return document;
    }

    let extracted = extract_content(text);
    let mut document = Document::new(source, extracted.text);
    for (key, value) in extracted.metadata {
        // Fixed keys win over page-supplied meta tags
        if key != "source" && key != "title" {
            document.metadata.insert(key, value);
        }
    }
    if let Some(title) = extracted.title {
        document = document.with_metadata("title", title);
    }
    if let Some(content_type) = content_type {
        document = document.with_metadata("content_type", content_type);
    }
    document
}
