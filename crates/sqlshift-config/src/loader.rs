use std::path::{Path, PathBuf};

use sqlshift_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const DEFAULT_FILE_NAMES: &[&str] = &["config.yml", "config.yaml", "config.toml"];

/// Locates and parses the sqlshift configuration file.
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// `explicit_path` must exist when given. Without it, the default
    /// config directory is searched and defaults are used if nothing is there.
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        Self {
            explicit_path,
            config_dir: default_config_dir(),
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn load(&self) -> Result<AppConfig> {
        let config = match self.resolve_path()? {
            Some(path) => {
                info!("loading config from {}", path.display());
                parse_file(&path)?
            }
            None => {
                debug!(
                    "no config file in {}, using defaults",
                    self.config_dir.display()
                );
                AppConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.explicit_path {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.clone()));
        }

        Ok(DEFAULT_FILE_NAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|candidate| candidate.is_file()))
    }
}

/// `~/.config/sqlshift` on Linux, the platform equivalent elsewhere.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqlshift")
}

fn parse_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}
