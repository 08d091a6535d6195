//! Search query model and the shareable URL contract
use crate::error::{PixsearchError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the URL parameter carrying the query text.
pub const QUERY_PARAM: &str = "query";

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    #[default]
    Any,
    Small,
    Medium,
    Large,
    Wallpaper,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Any => "any",
            ImageSize::Small => "small",
            ImageSize::Medium => "medium",
            ImageSize::Large => "large",
            ImageSize::Wallpaper => "wallpaper",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = PixsearchError;

    fn from_str(s: &str) -> Result<Self> {
        <ImageSize as ValueEnum>::from_str(s, true)
            .map_err(|_| PixsearchError::Preferences(format!("unknown image size '{s}'")))
    }
}

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    #[default]
    Any,
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Any => "any",
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = PixsearchError;

    fn from_str(s: &str) -> Result<Self> {
        <TimeRange as ValueEnum>::from_str(s, true)
            .map_err(|_| PixsearchError::Preferences(format!("unknown time range '{s}'")))
    }
}

/// Filter options that accompany every page request of a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SearchFilters {
    pub size: ImageSize,
    pub time_range: TimeRange,
    pub safe_search: bool,
    pub proxy_mode: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            size: ImageSize::Any,
            time_range: TimeRange::Any,
            safe_search: true,
            proxy_mode: false,
        }
    }
}

/// One page request as sent to the search endpoint.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    #[serde(rename = "query")]
    pub text: String,
    pub size: ImageSize,
    pub time_range: TimeRange,
    pub safe_search: bool,
    pub proxy_mode: bool,
    pub page: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, filters: &SearchFilters, page: u32) -> Self {
        Self {
            text: text.into(),
            size: filters.size,
            time_range: filters.time_range,
            safe_search: filters.safe_search,
            proxy_mode: filters.proxy_mode,
            page: page.max(1),
        }
    }
}

/// Builds the bookmarkable URL for `text` under `base`.
pub fn share_url(base: &str, text: &str) -> String {
    format!(
        "{}/search?{}={}",
        base.trim_end_matches('/'),
        QUERY_PARAM,
        urlencoding::encode(text)
    )
}

/// Extracts and percent-decodes the `query` parameter from a shareable URL.
///
/// Returns `Ok(None)` when the URL carries no (or an empty) query parameter.
pub fn query_from_url(url: &str) -> Result<Option<String>> {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let params = match without_fragment.split_once('?') {
        Some((_, params)) => params,
        None => return Ok(None),
    };

    for pair in params.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != QUERY_PARAM {
            continue;
        }
        let plus_decoded = value.replace('+', " ");
        let decoded = urlencoding::decode(&plus_decoded)
            .map_err(|e| PixsearchError::ShareUrl(format!("{url}: {e}")))?;
        let text = decoded.trim();
        if text.is_empty() {
            return Ok(None);
        }
        return Ok(Some(text.to_string()));
    }

    Ok(None)
}
