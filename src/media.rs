//! Checks whether a media URL actually serves an image
use crate::config::{EndpointConfig, MediaConfig};
use crate::error::{PixsearchError, Result};
use log::debug;
use lru::LruCache;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

pub trait MediaProbe {
    /// `Ok(())` if `url` loads as an image.
    fn probe(&self, url: &str) -> Result<()>;
}

/// Probe issuing a GET and checking status and content type.
///
/// Outcomes are remembered per URL so stepping back and forth through the
/// viewer does not refetch.
pub struct HttpMediaProbe {
    client: Client,
    cache: Mutex<LruCache<String, std::result::Result<(), String>>>,
}

impl HttpMediaProbe {
    pub fn new(endpoint: &EndpointConfig, media: &MediaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(media.probe_timeout_secs))
            .user_agent(endpoint.user_agent.clone())
            .build()?;
        let capacity = NonZeroUsize::new(media.probe_cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn fetch(&self, url: &str) -> std::result::Result<(), String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        check_content_type(&content_type)
    }
}

fn check_content_type(content_type: &str) -> std::result::Result<(), String> {
    // Some hosts omit the header entirely; only reject explicit non-images.
    if content_type.is_empty()
        || content_type.starts_with("image/")
        || content_type.starts_with("application/octet-stream")
    {
        Ok(())
    } else {
        Err(format!("not an image ({content_type})"))
    }
}

impl MediaProbe for HttpMediaProbe {
    fn probe(&self, url: &str) -> Result<()> {
        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(url).cloned());

        let outcome = match cached {
            Some(outcome) => outcome,
            None => {
                let outcome = self.fetch(url);
                debug!("probe {url}: {outcome:?}");
                if let Ok(mut cache) = self.cache.lock() {
                    cache.put(url.to_string(), outcome.clone());
                }
                outcome
            }
        };

        outcome.map_err(|reason| PixsearchError::ImageLoad {
            url: url.to_string(),
            reason,
        })
    }
}
