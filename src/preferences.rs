//! Durable key/value preferences and the search history list
use crate::error::{PixsearchError, Result};
use crate::query::{ImageSize, SearchFilters, TimeRange};
use anyhow::Context;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const KEY_THEME: &str = "theme";
pub const KEY_IMAGE_SIZE: &str = "image_size";
pub const KEY_TIME_RANGE: &str = "time_range";
pub const KEY_SAFE_SEARCH: &str = "safe_search";
pub const KEY_PROXY_MODE: &str = "proxy_mode";
pub const KEY_SEARCH_HISTORY: &str = "search_history";

pub const MAX_HISTORY: usize = 5;

/// Synchronous, last-write-wins key/value persistence.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` and persists it before returning.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// All stored pairs, sorted by key.
    fn entries(&self) -> Vec<(String, String)>;
}

/// Store that lives only as long as the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferenceStore {
    values: HashMap<String, String>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }
}

/// Store backed by a flat TOML table, rewritten on every `set`.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FilePreferenceStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            Self::read(&path).map_err(|e| PixsearchError::Preferences(format!("{e:#}")))?
        } else {
            debug!("No preference file at {}, starting empty", path.display());
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    /// Location used when no path is configured.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("pixsearch").join("preferences.toml"))
            .unwrap_or_else(|| PathBuf::from(".pixsearch-preferences.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preference file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse preference file")
    }

    fn write(&self) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(&self.values).context("Failed to serialize preferences")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create preference directory: {}", parent.display())
                })?;
            }
        }

        fs::write(&self.path, content).with_context(|| {
            format!("Failed to write preference file: {}", self.path.display())
        })?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.write()
            .map_err(|e| PixsearchError::Preferences(format!("{e:#}")))
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

/// Typed view over a [`PreferenceStore`].
pub struct Preferences<S: PreferenceStore> {
    store: S,
}

impl<S: PreferenceStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Raw write, validated for the keys this crate interprets.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_THEME if value != "light" && value != "dark" => {
                return Err(PixsearchError::Preferences(format!(
                    "theme must be 'light' or 'dark', got '{value}'"
                )));
            }
            KEY_IMAGE_SIZE => {
                value.parse::<ImageSize>()?;
            }
            KEY_TIME_RANGE => {
                value.parse::<TimeRange>()?;
            }
            KEY_SAFE_SEARCH | KEY_PROXY_MODE if value != "true" && value != "false" => {
                return Err(PixsearchError::Preferences(format!(
                    "{key} must be 'true' or 'false', got '{value}'"
                )));
            }
            _ => {}
        }
        self.store.set(key, value)
    }

    pub fn theme(&self) -> Theme {
        match self.store.get(KEY_THEME).as_deref() {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.store.set(KEY_THEME, &theme.to_string())
    }

    pub fn toggle_theme(&mut self) -> Result<Theme> {
        let theme = self.theme().toggled();
        self.set_theme(theme)?;
        Ok(theme)
    }

    pub fn image_size(&self) -> ImageSize {
        self.parsed(KEY_IMAGE_SIZE).unwrap_or_default()
    }

    pub fn set_image_size(&mut self, size: ImageSize) -> Result<()> {
        self.store.set(KEY_IMAGE_SIZE, size.as_str())
    }

    pub fn time_range(&self) -> TimeRange {
        self.parsed(KEY_TIME_RANGE).unwrap_or_default()
    }

    pub fn set_time_range(&mut self, range: TimeRange) -> Result<()> {
        self.store.set(KEY_TIME_RANGE, range.as_str())
    }

    /// Enabled unless explicitly stored as `"false"`.
    pub fn safe_search(&self) -> bool {
        self.store.get(KEY_SAFE_SEARCH).as_deref() != Some("false")
    }

    pub fn set_safe_search(&mut self, enabled: bool) -> Result<()> {
        self.store.set(KEY_SAFE_SEARCH, &enabled.to_string())
    }

    /// Disabled unless explicitly stored as `"true"`.
    pub fn proxy_mode(&self) -> bool {
        self.store.get(KEY_PROXY_MODE).as_deref() == Some("true")
    }

    pub fn set_proxy_mode(&mut self, enabled: bool) -> Result<()> {
        self.store.set(KEY_PROXY_MODE, &enabled.to_string())
    }

    /// Filter defaults seeded from the stored values.
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            size: self.image_size(),
            time_range: self.time_range(),
            safe_search: self.safe_search(),
            proxy_mode: self.proxy_mode(),
        }
    }

    /// Persists every field of `filters`.
    pub fn save_filters(&mut self, filters: &SearchFilters) -> Result<()> {
        self.set_image_size(filters.size)?;
        self.set_time_range(filters.time_range)?;
        self.set_safe_search(filters.safe_search)?;
        self.set_proxy_mode(filters.proxy_mode)
    }

    /// Most-recent-first list of past queries.
    pub fn history(&self) -> Vec<String> {
        let raw = match self.store.get(KEY_SEARCH_HISTORY) {
            Some(raw) => raw,
            None => return Vec::new(),
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(history) => history,
            Err(e) => {
                warn!("Ignoring unreadable search history: {e}");
                Vec::new()
            }
        }
    }

    /// Moves `query` to the front of the history, dropping any entry that
    /// differs only in case and keeping at most [`MAX_HISTORY`] items.
    pub fn record_search(&mut self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(self.history());
        }

        let lowered = query.to_lowercase();
        let mut history = self.history();
        history.retain(|entry| entry.to_lowercase() != lowered);
        history.insert(0, query.to_string());
        history.truncate(MAX_HISTORY);

        let encoded = serde_json::to_string(&history)
            .map_err(|e| PixsearchError::Preferences(e.to_string()))?;
        self.store.set(KEY_SEARCH_HISTORY, &encoded)?;
        Ok(history)
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.store.set(KEY_SEARCH_HISTORY, "[]")
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid stored value for {key}: '{raw}'");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn prefs() -> Preferences<MemoryPreferenceStore> {
        Preferences::new(MemoryPreferenceStore::new())
    }

    #[test]
    fn defaults_apply_when_nothing_is_stored() {
        let prefs = prefs();
        assert_eq!(prefs.theme(), Theme::Dark);
        assert_eq!(prefs.filters(), SearchFilters::default());
        assert!(prefs.history().is_empty());
    }

    #[test]
    fn safe_search_only_disabled_by_literal_false() {
        let mut prefs = prefs();
        prefs.store.set(KEY_SAFE_SEARCH, "nope").unwrap();
        assert!(prefs.safe_search());
        prefs.set_safe_search(false).unwrap();
        assert!(!prefs.safe_search());
    }

    #[test]
    fn last_write_wins() {
        let mut prefs = prefs();
        prefs.set(KEY_IMAGE_SIZE, "small").unwrap();
        prefs.set(KEY_IMAGE_SIZE, "large").unwrap();
        assert_eq!(prefs.image_size(), ImageSize::Large);
    }

    #[test]
    fn set_rejects_values_for_known_keys() {
        let mut prefs = prefs();
        assert!(prefs.set(KEY_THEME, "purple").is_err());
        assert!(prefs.set(KEY_PROXY_MODE, "yes").is_err());
        assert!(prefs.set(KEY_TIME_RANGE, "decade").is_err());
        assert!(prefs.set("custom", "anything").is_ok());
    }

    #[test]
    fn invalid_stored_filter_falls_back_to_default() {
        let mut prefs = prefs();
        prefs.store.set(KEY_TIME_RANGE, "fortnight").unwrap();
        assert_eq!(prefs.time_range(), TimeRange::Any);
    }

    #[test]
    fn toggle_theme_persists() {
        let mut prefs = prefs();
        assert_eq!(prefs.toggle_theme().unwrap(), Theme::Light);
        assert_eq!(prefs.get(KEY_THEME).as_deref(), Some("light"));
        assert_eq!(prefs.toggle_theme().unwrap(), Theme::Dark);
    }

    #[test]
    fn history_is_most_recent_first_and_capped() {
        let mut prefs = prefs();
        for q in ["one", "two", "three", "four", "five", "six"] {
            prefs.record_search(q).unwrap();
        }
        assert_eq!(prefs.history(), vec!["six", "five", "four", "three", "two"]);
    }

    #[test]
    fn history_dedups_case_insensitively() {
        let mut prefs = prefs();
        prefs.record_search("Cats").unwrap();
        prefs.record_search("dogs").unwrap();
        let history = prefs.record_search("CATS").unwrap();
        assert_eq!(history, vec!["CATS", "dogs"]);
    }

    #[test]
    fn corrupt_history_reads_as_empty() {
        let mut prefs = prefs();
        prefs.store.set(KEY_SEARCH_HISTORY, "not json").unwrap();
        assert!(prefs.history().is_empty());
        assert_eq!(prefs.record_search("cats").unwrap(), vec!["cats"]);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("prefs.toml");

        let mut store = FilePreferenceStore::open(&path).unwrap();
        store.set(KEY_THEME, "light").unwrap();
        store.set(KEY_SAFE_SEARCH, "false").unwrap();
        assert!(path.exists());

        let reopened = Preferences::new(FilePreferenceStore::open(&path).unwrap());
        assert_eq!(reopened.theme(), Theme::Light);
        assert!(!reopened.safe_search());
    }

    #[test]
    fn file_store_reports_unparseable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.toml");
        fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(
            FilePreferenceStore::open(&path),
            Err(PixsearchError::Preferences(_))
        ));
    }
}
