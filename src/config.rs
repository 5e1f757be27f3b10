use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub cache: CacheSection,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
  /// Name of the cache store (e.g., "macro-terminal-v1")
  pub name: String,
  /// Origin that relative assets resolve against
  pub origin: Url,
  /// Assets to pre-populate on install
  pub assets: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database path (defaults to $XDG_DATA_HOME/precache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_user_agent() -> String {
  concat!("precache/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./precache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/precache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/precache/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("precache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("precache").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;

    if config.cache.name.trim().is_empty() {
      return Err(eyre!("cache.name must not be empty"));
    }

    Ok(config)
  }

  /// The immutable cache configuration handed to the shim.
  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig {
      name: self.cache.name.clone(),
      origin: self.cache.origin.clone(),
      assets: self.cache.assets.clone(),
    }
  }
}
