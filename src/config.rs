use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the per-state cutoff exports.
    pub data_dir: PathBuf,
    /// Durable metadata cache database.
    pub meta_db: PathBuf,
    /// Optional score→rank curve table; the builtin reference curves are
    /// used when absent.
    pub curves: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            meta_db: PathBuf::from("cache/meta.db"),
            curves: None,
        }
    }
}

impl Config {
    /// Load `config.toml` when present, falling back to defaults, with
    /// `NEET_DATA_DIR`/`NEET_META_DB` environment overrides on top.
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let mut config = if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Ok(dir) = std::env::var("NEET_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(db) = std::env::var("NEET_META_DB") {
            config.meta_db = PathBuf::from(db);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.curves.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let config: Config = toml::from_str("data_dir = \"exports\"").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("exports"));
        assert_eq!(config.meta_db, PathBuf::from("cache/meta.db"));
    }
}
