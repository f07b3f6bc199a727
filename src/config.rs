use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::source::HttpSourceOptions;

pub const DEFAULT_UPSTREAM_URL: &str = "https://gorest.co.in/public/v1/posts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: PathBuf,
    pub bind: String,
    pub upstream_url: String,
    /// Number of upstream pages walked by one ingestion run
    pub pages: u32,
    pub request_timeout_secs: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    /// Widest range a single range fetch may span
    pub max_range: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("pagemirror.db"),
            bind: "0.0.0.0:5000".to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            pages: 50,
            request_timeout_secs: 10,
            retries: 2,
            backoff_ms: 250,
            max_range: 1000,
        }
    }
}

impl AppConfig {
    pub fn source_options(&self) -> HttpSourceOptions {
        HttpSourceOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            retries: self.retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    /// Override fields from `PAGEMIRROR_*` environment variables.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("PAGEMIRROR_DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = var("PAGEMIRROR_BIND") {
            self.bind = v;
        }
        if let Some(v) = var("PAGEMIRROR_UPSTREAM_URL") {
            self.upstream_url = v;
        }
        if let Some(v) = var("PAGEMIRROR_PAGES") {
            self.pages = v
                .parse()
                .map_err(|e| anyhow::anyhow!("PAGEMIRROR_PAGES must be a positive integer: {e}"))?;
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("pagemirror.toml")
}

/// Load the config file if present, then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path)?;
        toml::from_str(&contents)?
    } else {
        AppConfig::default()
    };

    config.apply_env()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

pub fn write_config(path: &Path, config: &AppConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str("pages = 3\nbind = \"127.0.0.1:9000\"").unwrap();
        assert_eq!(config.pages, 3);
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.max_range, 1000);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagemirror.toml");
        let config = AppConfig {
            pages: 7,
            ..AppConfig::default()
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: AppConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_vars(|key| match key {
                "PAGEMIRROR_PAGES" => Some("12".to_string()),
                "PAGEMIRROR_UPSTREAM_URL" => Some("http://localhost:8080/posts".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.pages, 12);
        assert_eq!(config.upstream_url, "http://localhost:8080/posts");

        let bad = config.apply_vars(|key| (key == "PAGEMIRROR_PAGES").then(|| "many".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("mirror.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().exists());
    }
}
