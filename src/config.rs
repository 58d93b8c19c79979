use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::db::Database;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the app is served from; same-origin responses are cacheable
  pub origin: String,
  /// Version-tagged cache store name; bump on deploy to evict old stores
  pub cache_name: String,
  /// Assets stored at install time
  pub precache: Vec<String>,
  /// Page served for navigations while offline (must be precached)
  pub offline_page: String,
  /// Path fragment marking API reads (network-first)
  pub api_prefix: String,
  /// Background sync tag for queued expense creations
  pub sync_tag: String,
  pub fetch_timeout_secs: u64,
  /// How long to wait for a page to hand over its token
  pub token_timeout_secs: u64,
  /// SQLite file (default: $XDG_DATA_HOME/expense-sync/offline.db)
  pub database: Option<PathBuf>,
  /// Directory for rolling log files; no file logging if unset
  pub log_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      cache_name: "expense-tracker-v1".to_string(),
      precache: vec![
        "/".to_string(),
        "/static/js/bundle.js".to_string(),
        "/static/css/main.css".to_string(),
        "/manifest.json".to_string(),
        "/offline.html".to_string(),
      ],
      offline_page: "/offline.html".to_string(),
      api_prefix: "/api/".to_string(),
      sync_tag: "expense-sync".to_string(),
      fetch_timeout_secs: 10,
      token_timeout_secs: 5,
      database: None,
      log_dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./expense-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/expense-sync/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("expense-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("expense-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if self.cache_name.trim().is_empty() {
      return Err(eyre!("cache_name must not be empty"));
    }
    if !self.precache.contains(&self.offline_page) {
      return Err(eyre!(
        "offline_page {} is not listed in precache",
        self.offline_page
      ));
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve an app-relative path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.fetch_timeout_secs)
  }

  pub fn token_timeout(&self) -> Duration {
    Duration::from_secs(self.token_timeout_secs)
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Database::default_path(),
    }
  }

  /// Get the session token from the environment, if set.
  ///
  /// Checks EXPENSE_TRACKER_TOKEN.
  pub fn get_token() -> Option<String> {
    std::env::var("EXPENSE_TRACKER_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }

  /// Get the login password from environment variables.
  ///
  /// Checks EXPENSE_TRACKER_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("EXPENSE_TRACKER_PASSWORD").map_err(|_| {
      eyre!("Password not found. Set EXPENSE_TRACKER_PASSWORD environment variable.")
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.precache.len(), 5);
    assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
      &path,
      "origin: https://expenses.example.com\ncache_name: expense-tracker-v2\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.cache_name, "expense-tracker-v2");
    assert_eq!(config.sync_tag, "expense-sync");
    assert_eq!(
      config.resolve("/api/expenses").unwrap().as_str(),
      "https://expenses.example.com/api/expenses"
    );
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }

  #[test]
  fn test_offline_page_must_be_precached() {
    let config = Config {
      precache: vec!["/".to_string()],
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }
}
