use std::path::{Path, PathBuf};

use atemschutz_core::{Layout, Site};
use serde::Deserialize;

use crate::error::ToolError;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    /// Replaces the built-in site layout when present.
    pub sites: Option<Vec<Site>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn layout(&self) -> Result<Layout, ToolError> {
        match &self.sites {
            Some(sites) => Ok(Layout::new(sites.iter().cloned())?),
            None => Ok(Layout::standard()),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("atemschutz").join("config.toml"))
}

pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("atemschutz")
        .join("store")
}

fn parse(path: &Path, content: &str) -> Result<Config, ToolError> {
    toml::from_str(content).map_err(|source| ToolError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the configuration.
///
/// An explicitly given file must exist; the default location is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ToolError> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)?;
        return parse(path, &content);
    }

    let Some(path) = config_path() else {
        return Ok(Config::default());
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    parse(&path, &content)
}

pub fn resolve_store_path(cli_path: Option<PathBuf>, config: &Config) -> PathBuf {
    cli_path
        .or_else(|| config.store.path.clone())
        .unwrap_or_else(default_store_path)
}
