use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_sample_window_ms")]
    pub sample_window_ms: u64,
    #[serde(default = "default_perf_window_ms")]
    pub perf_window_ms: u64,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_window_ms: default_sample_window_ms(),
            perf_window_ms: default_perf_window_ms(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_window_ms == 0 {
            return Err(ConfigError::Validation(
                "sample_window_ms must be > 0".to_string(),
            ));
        }
        if self.perf_window_ms == 0 {
            return Err(ConfigError::Validation(
                "perf_window_ms must be > 0".to_string(),
            ));
        }
        if let Some(deadline_ms) = self.deadline_ms {
            if deadline_ms <= self.sample_window_ms || deadline_ms <= self.perf_window_ms {
                return Err(ConfigError::Validation(
                    "deadline_ms must exceed both sampling windows".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

const fn default_sample_window_ms() -> u64 {
    1000
}

const fn default_perf_window_ms() -> u64 {
    1000
}

const fn default_deadline_ms() -> Option<u64> {
    Some(10_000)
}
