//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so running without a config file is the
//! normal case. CLI flags override whatever the file provides.

use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

/// User agent presented to every source; the boards block obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// Application configuration.
///
/// ```yaml
/// # airboard.yaml
/// user_agent: "Mozilla/5.0 ..."
/// diagnostics_dir: data/temp
/// max_result: 10
/// max_fetch_page: 3
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Where failing page snapshots are written; `None` disables them.
    pub diagnostics_dir: Option<PathBuf>,
    /// Default cap on returned records.
    pub max_result: usize,
    /// Default hard ceiling on page fetches per query.
    pub max_fetch_page: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            diagnostics_dir: None,
            max_result: 20,
            max_fetch_page: 3,
        }
    }
}

/// Load configuration from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&raw)?;
            info!(path, "Loaded configuration");
            Ok(config)
        }
        None => Ok(AppConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_result, 20);
        assert_eq!(config.max_fetch_page, 3);
        assert!(config.diagnostics_dir.is_none());
        assert!(config.user_agent.contains("Mozilla"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: AppConfig = serde_yaml::from_str("max_result: 5\ndiagnostics_dir: data/temp\n").unwrap();
        assert_eq!(config.max_result, 5);
        assert_eq!(config.diagnostics_dir, Some(PathBuf::from("data/temp")));
        assert_eq!(config.max_fetch_page, 3);
    }

    #[test]
    fn test_load_config_without_path_is_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config.max_result, AppConfig::default().max_result);
    }
}
