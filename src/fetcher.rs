//! One page fetch against the search endpoint
//!
//! "No more results" is signalled by an HTTP 200 response whose `images`
//! array is empty. Every other unsuccessful shape (non-2xx status,
//! `success: false`, undecodable body) is a network error and leaves the
//! session retryable.
use crate::config::EndpointConfig;
use crate::error::{PixsearchError, Result};
use crate::query::SearchQuery;
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    /// Stable source URL, used for deduplication.
    pub identifier: String,
    /// URL actually displayed; may differ from `identifier` (e.g. a proxied copy).
    pub display_url: String,
    pub title: String,
}

impl ImageResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            display_url: identifier.clone(),
            identifier,
            title: String::new(),
        }
    }

    pub fn with_display_url(mut self, display_url: impl Into<String>) -> Self {
        self.display_url = display_url.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// True while the identifier has not been tried as a display source.
    pub fn has_untried_fallback(&self) -> bool {
        self.display_url != self.identifier
    }
}

/// Stateless page fetch. An empty vector means the query is exhausted.
pub trait ResultFetcher: Send + Sync {
    fn fetch(&self, query: &SearchQuery) -> Result<Vec<ImageResult>>;
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    success: bool,
    #[serde(default)]
    images: Vec<WireImage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireImage {
    Url(String),
    Detailed {
        #[serde(alias = "url")]
        identifier: String,
        #[serde(default)]
        display_url: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
}

impl From<WireImage> for ImageResult {
    fn from(image: WireImage) -> Self {
        match image {
            WireImage::Url(url) => ImageResult::new(url),
            WireImage::Detailed {
                identifier,
                display_url,
                title,
            } => {
                let display_url = display_url
                    .filter(|url| !url.trim().is_empty())
                    .unwrap_or_else(|| identifier.clone());
                ImageResult {
                    identifier,
                    display_url,
                    title: title.unwrap_or_default(),
                }
            }
        }
    }
}

/// Decodes an endpoint response into its images.
pub fn parse_response(status: u16, body: &str) -> Result<Vec<ImageResult>> {
    let parsed: std::result::Result<WireResponse, _> = serde_json::from_str(body);

    if !(200..300).contains(&status) {
        let detail = parsed
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(PixsearchError::Network(detail));
    }

    let response =
        parsed.map_err(|e| PixsearchError::Network(format!("invalid response body: {e}")))?;

    if !response.success {
        return Err(PixsearchError::Network(
            response
                .error
                .unwrap_or_else(|| "search backend reported failure".to_string()),
        ));
    }

    Ok(response
        .images
        .into_iter()
        .map(ImageResult::from)
        .filter(|image| !image.identifier.trim().is_empty())
        .collect())
}

/// Fetcher that POSTs JSON to `{base_url}/search_api`.
pub struct HttpFetcher {
    client: Client,
    search_url: String,
}

impl HttpFetcher {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            search_url: format!("{}/search_api", config.base_url.trim_end_matches('/')),
        })
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

impl ResultFetcher for HttpFetcher {
    fn fetch(&self, query: &SearchQuery) -> Result<Vec<ImageResult>> {
        debug!(
            "POST {} query='{}' page={}",
            self.search_url, query.text, query.page
        );
        let response = self.client.post(&self.search_url).json(query).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        let images = parse_response(status, &body)?;
        debug!("page {} returned {} images", query.page, images.len());
        Ok(images)
    }
}
