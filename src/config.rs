use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api.base_url`.
pub const BASE_URL_ENV: &str = "TASKBOARD_API_BASE_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub search: SearchConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Root of the REST API, e.g. `http://localhost:8000`
  #[serde(default)]
  pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long an entry without subscribers survives before it is collected
  #[serde(default = "default_keep_unused_for_secs")]
  pub keep_unused_for_secs: u64,
}

fn default_keep_unused_for_secs() -> u64 {
  60
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      keep_unused_for_secs: default_keep_unused_for_secs(),
    }
  }
}

impl CacheConfig {
  pub fn keep_unused_for(&self) -> Duration {
    Duration::from_secs(self.keep_unused_for_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  /// Shorter terms never reach the network
  #[serde(default = "default_min_term_length")]
  pub min_term_length: usize,
  /// Quiet period before typed input is committed
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

fn default_min_term_length() -> usize {
  3
}

fn default_debounce_ms() -> u64 {
  500
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      min_term_length: default_min_term_length(),
      debounce_ms: default_debounce_ms(),
    }
  }
}

impl SearchConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

impl Config {
  /// Load configuration from file and environment.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taskboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taskboard/config.yaml
  ///
  /// A missing file is fine as long as `TASKBOARD_API_BASE_URL` supplies the base URL.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if p.exists() => Some(p.to_path_buf()),
      Some(p) => return Err(eyre!("Config file not found: {}", p.display())),
      None => Self::find_config_file(),
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    config.with_base_url_override(std::env::var(BASE_URL_ENV).ok())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("taskboard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taskboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is an empty mapping
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Apply the environment override and check that a base URL is set.
  fn with_base_url_override(mut self, env_value: Option<String>) -> Result<Self> {
    if let Some(url) = env_value.filter(|v| !v.trim().is_empty()) {
      self.api.base_url = url;
    }

    if self.api.base_url.trim().is_empty() {
      return Err(eyre!(
        "API base URL not configured. Set {} or api.base_url in ~/.config/taskboard/config.yaml",
        BASE_URL_ENV
      ));
    }

    Ok(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_fill_missing_sections() {
    let config = Config::parse("api:\n  base_url: http://localhost:8000\n").unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8000");
    assert_eq!(config.cache.keep_unused_for(), Duration::from_secs(60));
    assert_eq!(config.search.min_term_length, 3);
    assert_eq!(config.search.debounce(), Duration::from_millis(500));
  }

  #[test]
  fn test_partial_section() {
    let config = Config::parse("search:\n  debounce_ms: 250\n").unwrap();
    assert_eq!(config.search.debounce_ms, 250);
    assert_eq!(config.search.min_term_length, 3);
  }

  #[test]
  fn test_empty_file() {
    let config = Config::parse("").unwrap();
    assert!(config.api.base_url.is_empty());
  }

  #[test]
  fn test_env_overrides_file() {
    let config = Config::parse("api:\n  base_url: http://file\n")
      .unwrap()
      .with_base_url_override(Some("http://env".into()))
      .unwrap();
    assert_eq!(config.api.base_url, "http://env");
  }

  #[test]
  fn test_missing_base_url_is_error() {
    assert!(Config::default().with_base_url_override(None).is_err());
    assert!(Config::default()
      .with_base_url_override(Some("  ".into()))
      .is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/taskboard.yaml"))).is_err());
  }
}
