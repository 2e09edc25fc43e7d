use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud upload failed for {path:?}: {message}")]
    Upload { path: PathBuf, message: String },
    #[error("cloud delete failed for {url}: {message}")]
    Delete { url: String, message: String },
}

/// Remote copy of assignment files. No real provider is wired in yet.
pub trait CloudBackend {
    /// Returns the remote URL, or `None` when nothing was stored remotely.
    fn upload(&self, file: &Path) -> Result<Option<String>, CloudError>;
    fn delete(&self, url: &str) -> Result<(), CloudError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoCloud;

impl CloudBackend for NoCloud {
    fn upload(&self, _file: &Path) -> Result<Option<String>, CloudError> {
        Ok(None)
    }

    fn delete(&self, _url: &str) -> Result<(), CloudError> {
        Ok(())
    }
}
