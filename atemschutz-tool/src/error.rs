use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Config error in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid site layout: {0}")]
    Layout(#[from] atemschutz_core::LayoutError),

    #[error("Store error: {0}")]
    Store(#[from] atemschutz_core::StoreError),

    #[error("Failed to open store: {0}")]
    Rocks(#[from] atemschutz_rocks::RocksError),

    #[error(transparent)]
    Placement(#[from] atemschutz_core::PlacementError),

    #[error("Unknown site: {0}")]
    UnknownSite(String),
}
