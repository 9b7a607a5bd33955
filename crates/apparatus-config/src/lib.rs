use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

fn default_history_capacity() -> usize {
    10
}

fn default_history_debounce_ms() -> u64 {
    500
}

fn default_update_warmup_ms() -> u64 {
    2000
}

fn default_comment_color() -> String {
    "#fff59d".to_string()
}

fn default_reading_column_template() -> String {
    "Reading %d%".to_string()
}

/// Editor tunables loaded from `~/.config/apparatus/config.toml`. Every
/// field has a default so a partial (or absent) file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum undo snapshots kept per apparatus editor.
    pub history_capacity: usize,
    /// Edit-coalescing window before a history snapshot is taken.
    pub history_debounce_ms: u64,
    /// Time after mount before live update callbacks are accepted.
    pub update_warmup_ms: u64,
    /// Highlight color for comments created without an explicit color.
    pub default_comment_color: String,
    /// Column-name template for export reading columns; `%d%` becomes the
    /// 1-based reading index.
    pub reading_column_template: String,
    /// Optional directory exports are written to; tilde and shell variables
    /// are expanded on load.
    pub export_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            history_debounce_ms: default_history_debounce_ms(),
            update_warmup_ms: default_update_warmup_ms(),
            default_comment_color: default_comment_color(),
            reading_column_template: default_reading_column_template(),
            export_dir: None,
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        if let Some(dir) = &config.export_dir {
            config.export_dir = Self::expand_path(dir).or(config.export_dir);
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/apparatus");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let result = Config::load_from_path("/this/path/does/not/exist/config.toml").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.history_debounce_ms, 500);
        assert_eq!(config.reading_column_template, "Reading %d%");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_capacity = 25\n").unwrap();

        let config = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(config.history_capacity, 25);
        assert_eq!(config.update_warmup_ms, 2000);
    }

    #[test]
    fn test_parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_capacity = \"many\"\n").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            history_capacity: 5,
            default_comment_color: "#abcdef".to_string(),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.history_capacity, 5);
        assert_eq!(loaded.default_comment_color, "#abcdef");
    }

    #[test]
    fn test_export_dir_tilde_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "export_dir = \"~/exports\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap().unwrap();
        let export_dir = config.export_dir.unwrap();
        assert!(!export_dir.to_string_lossy().starts_with('~'));
    }
}
