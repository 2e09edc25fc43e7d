use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cascade::Cascade;
use crate::error::CascadeError;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub settings_path: Option<PathBuf>,
    pub vault: Option<Cascade>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `settings.json` and replaces the active workspace. Any open
    /// edit sessions of the previous workspace are dropped with it.
    pub fn select_workspace(&mut self, settings_path: &Path) -> Result<(), CascadeError> {
        let vault = Cascade::open(settings_path)?;
        self.settings_path = Some(settings_path.to_path_buf());
        self.vault = Some(vault);
        Ok(())
    }
}
