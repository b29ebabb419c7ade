use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Logger configuration of the tool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub level_filter: LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level_filter: LevelFilter::Info }
    }
}

/// Settings read from an optional TOML file. Every field can be overridden
/// from the command line.
///
/// ```toml
/// data_dir = "data"
/// event_types = "data/events/fighter.yml"
/// article_event_types = "data/events/article.yml"
///
/// [logger]
/// level_filter = "DEBUG"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ToolConfig {
    /// Root of the attribute schemas (`common/`, `unique/`).
    pub data_dir: Option<PathBuf>,
    pub event_types: Option<PathBuf>,
    pub article_event_types: Option<PathBuf>,
    pub logger: LoggerConfig,
}

impl ToolConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`, or returns the defaults when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        event_types: Option<PathBuf>,
        article_event_types: Option<PathBuf>,
        level_filter: Option<LevelFilter>,
    ) -> Self {
        if data_dir.is_some() {
            self.data_dir = data_dir;
        }
        if event_types.is_some() {
            self.event_types = event_types;
        }
        if article_event_types.is_some() {
            self.article_event_types = article_event_types;
        }
        if let Some(level) = level_filter {
            self.logger.level_filter = level;
        }
        self
    }
}
