//! Layered configuration for Dealboard.
//!
//! Settings are resolved file → environment → CLI:
//!
//! 1. `dealboard.toml` (explicit `--config` path, else `./dealboard.toml`,
//!    else `<config dir>/dealboard/config.toml`)
//! 2. environment (`HUBSPOT_API_KEY`, `HUBSPOT_BASE_URL`, `DEALBOARD_PORT`),
//!    with `.env` loaded first by the binary
//! 3. CLI flags, applied by the command layer
//!
//! # Configuration File Format
//!
//! ```toml
//! [hubspot]
//! base_url = "https://api.hubapi.com"
//! api_key = "pat-na1-..."
//! page_limit = 100
//! timeout_secs = 30
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! dev_mode = false
//! open_browser = true
//!
//! [logging]
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HUBSPOT_BASE_URL: &str = "https://api.hubapi.com";
pub const CONFIG_FILE_NAME: &str = "dealboard.toml";

/// CRM connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSpotSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Private app token. Usually supplied through `HUBSPOT_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Page size for deal listing (HubSpot caps this at 100).
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_HUBSPOT_BASE_URL.to_string()
}

fn default_page_limit() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HubSpotSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            page_limit: default_page_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Proxy server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local front-end dev server.
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_open_browser() -> bool {
    true
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
            open_browser: default_open_browser(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON log lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// The complete dealboard.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealboardConfig {
    #[serde(default)]
    pub hubspot: HubSpotSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DealboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse dealboard.toml")
    }

    /// Resolve the config file and apply environment overrides.
    ///
    /// An explicit path must exist; the implicit locations are optional and
    /// fall back to defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_locations().into_iter().find(|p| p.exists()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Candidate config file locations, in priority order.
    pub fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("dealboard").join("config.toml"));
        }
        paths
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("HUBSPOT_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.hubspot.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = lookup("HUBSPOT_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.hubspot.base_url = url.trim().to_string();
        }
        if let Some(port) = lookup("DEALBOARD_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid DEALBOARD_PORT '{}'", port))?;
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize dealboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.hubspot.api_key.is_none() {
            warnings.push(
                "No HubSpot API key configured; set HUBSPOT_API_KEY or [hubspot] api_key".into(),
            );
        }
        if self.hubspot.page_limit == 0 || self.hubspot.page_limit > 100 {
            warnings.push(format!(
                "hubspot.page_limit = {} is outside 1..=100; HubSpot will reject it",
                self.hubspot.page_limit
            ));
        }
        if !self.hubspot.base_url.starts_with("http://")
            && !self.hubspot.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "hubspot.base_url '{}' is not an http(s) URL",
                self.hubspot.base_url
            ));
        }
        warnings
    }

    /// The API key with its middle masked, for display.
    pub fn masked_api_key(&self) -> Option<String> {
        self.hubspot.api_key.as_ref().map(|key| {
            let visible: String = key.chars().take(4).collect();
            format!("{}****", visible)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DealboardConfig::default();
        assert_eq!(config.hubspot.base_url, DEFAULT_HUBSPOT_BASE_URL);
        assert_eq!(config.hubspot.page_limit, 100);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let content = r#"
[server]
port = 8080

[logging]
json = true
"#;
        let config = DealboardConfig::parse(content).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.open_browser);
        assert!(config.logging.json);
        assert_eq!(config.hubspot.timeout_secs, 30);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = DealboardConfig::parse("[server\nport = ").unwrap_err();
        assert!(err.to_string().contains("Failed to parse dealboard.toml"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = DealboardConfig::parse(
            r#"
[hubspot]
api_key = "from-file"
"#,
        )
        .unwrap();
        config
            .apply_env(env(&[
                ("HUBSPOT_API_KEY", "from-env"),
                ("HUBSPOT_BASE_URL", "http://localhost:9999"),
                ("DEALBOARD_PORT", "7000"),
            ]))
            .unwrap();
        assert_eq!(config.hubspot.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.hubspot.base_url, "http://localhost:9999");
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_blank_env_key_is_ignored() {
        let mut config = DealboardConfig::default();
        config.hubspot.api_key = Some("kept".into());
        config.apply_env(env(&[("HUBSPOT_API_KEY", "  ")])).unwrap();
        assert_eq!(config.hubspot.api_key.as_deref(), Some("kept"));
    }

    #[test]
    fn test_invalid_port_env_is_an_error() {
        let mut config = DealboardConfig::default();
        let err = config
            .apply_env(env(&[("DEALBOARD_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains("DEALBOARD_PORT"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = DealboardConfig::default();
        config.server.port = 6100;
        config.save(&path).unwrap();

        let loaded = DealboardConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 6100);
        assert!(loaded.hubspot.api_key.is_none());
    }

    #[test]
    fn test_resolve_explicit_missing_file_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(DealboardConfig::resolve(Some(&missing)).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = DealboardConfig::default();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("API key")));

        config.hubspot.api_key = Some("pat-123".into());
        config.hubspot.page_limit = 500;
        config.hubspot.base_url = "ftp://example".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_masked_api_key() {
        let mut config = DealboardConfig::default();
        assert!(config.masked_api_key().is_none());
        config.hubspot.api_key = Some("pat-na1-secret".into());
        assert_eq!(config.masked_api_key().as_deref(), Some("pat-****"));
    }
}
