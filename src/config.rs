use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub browse: BrowseConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 15,
            user_agent: format!("pixsearch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseConfig {
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: u32,
    #[serde(default = "default_page_rows")]
    pub page_rows: u32,
}

fn default_scroll_threshold() -> u32 {
    500
}
fn default_page_rows() -> u32 {
    20
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            scroll_threshold: default_scroll_threshold(),
            page_rows: default_page_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_cache_size")]
    pub probe_cache_size: usize,
}

fn default_probe_timeout() -> u64 {
    10
}
fn default_probe_cache_size() -> usize {
    256
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            probe_cache_size: default_probe_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Overrides the preference file location.
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match Self::find_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| "Failed to parse config file")
    }

    /// Where `config-init` writes when no path is given.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("pixsearch").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".pixsearch.toml"))
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("pixsearch/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".pixsearch.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".pixsearch.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
