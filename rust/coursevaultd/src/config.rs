use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store;

/// Settings path picked up at startup when set.
pub const SETTINGS_ENV: &str = "COURSEVAULT_SETTINGS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub config_root_folder: PathBuf,
    pub assignment_root_folder: PathBuf,
    pub default_assignment_root_folder: PathBuf,
    pub semesters_data_file: String,
    pub courses_data_file: String,
    pub assignments_data_file: String,
}

impl Settings {
    pub fn semesters_path(&self) -> PathBuf {
        self.config_root_folder.join(&self.semesters_data_file)
    }

    pub fn courses_path(&self) -> PathBuf {
        self.config_root_folder.join(&self.courses_data_file)
    }

    pub fn assignments_path(&self) -> PathBuf {
        self.config_root_folder.join(&self.assignments_data_file)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file not found: {path:?}")]
    NotFound { path: PathBuf },
    #[error("settings file {path:?} is invalid: {source}")]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to read settings {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write settings {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let write_err = |source: io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let bytes = store::to_pretty_json(settings)
        .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    store::write_replacing(path, &bytes).map_err(write_err)
}

pub fn settings_path_from_env() -> Option<PathBuf> {
    std::env::var_os(SETTINGS_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
