//! Configuration view and validation commands: `dealboard config`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use console::style;

use dealboard::config::{CONFIG_FILE_NAME, DealboardConfig};

use super::super::ConfigCommands;

pub fn cmd_config(
    config: &DealboardConfig,
    explicit: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("Dealboard Configuration").bold());
            println!("=======================");
            println!();
            match config_source(explicit) {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No config file found; using defaults"),
            }
            println!();
            print!("{}", render_config(config));
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{}", style("Configuration is valid.").green());
            } else {
                println!("{}", style("Configuration warnings:").yellow().bold());
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            let path = PathBuf::from(CONFIG_FILE_NAME);
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            DealboardConfig::default().save(&path)?;
            println!("Created {}", path.display());
        }
    }
    Ok(())
}

/// Which file `DealboardConfig::resolve` read, if any.
fn config_source(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => DealboardConfig::default_locations()
            .into_iter()
            .find(|p| p.exists()),
    }
}

/// Effective values in TOML-like form, with the API key masked.
fn render_config(config: &DealboardConfig) -> String {
    let api_key = config
        .masked_api_key()
        .map(|k| format!("\"{}\"", k))
        .unwrap_or_else(|| "(not set)".to_string());
    format!(
        "[hubspot]\n  base_url = \"{}\"\n  api_key = {}\n  page_limit = {}\n  timeout_secs = {}\n\n\
         [server]\n  host = \"{}\"\n  port = {}\n  dev_mode = {}\n  open_browser = {}\n\n\
         [logging]\n  json = {}\n",
        config.hubspot.base_url,
        api_key,
        config.hubspot.page_limit,
        config.hubspot.timeout_secs,
        config.server.host,
        config.server.port,
        config.server.dev_mode,
        config.server.open_browser,
        config.logging.json,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_masks_key() {
        let mut config = DealboardConfig::default();
        config.hubspot.api_key = Some("pat-na1-secret".into());
        let text = render_config(&config);
        assert!(text.contains("api_key = \"pat-****\""));
        assert!(!text.contains("secret"));
        assert!(text.contains("port = 5000"));
    }

    #[test]
    fn test_render_config_without_key() {
        let text = render_config(&DealboardConfig::default());
        assert!(text.contains("api_key = (not set)"));
    }

    #[test]
    fn test_explicit_source_wins() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(config_source(Some(path)), Some(path.to_path_buf()));
    }
}
