use serde_json::json;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::cloud::CloudError;
use crate::config::ConfigError;
use crate::guard::EntityKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data file not found: {path:?}")]
    NotFound { path: PathBuf },
    #[error("data file {path:?} could not be parsed: {source}")]
    Corruption {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path:?}: {source}")]
    Persistence { path: PathBuf, source: io::Error },
}

impl StoreError {
    pub fn path(&self) -> &PathBuf {
        match self {
            StoreError::NotFound { path }
            | StoreError::Corruption { path, .. }
            | StoreError::Read { path, .. }
            | StoreError::Persistence { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    CreateDir,
    Name,
    Copy,
    Verify,
    RemoveSource,
    Remove,
}

impl MigrationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStep::CreateDir => "create_dir",
            MigrationStep::Name => "name",
            MigrationStep::Copy => "copy",
            MigrationStep::Verify => "verify",
            MigrationStep::RemoveSource => "remove_source",
            MigrationStep::Remove => "remove",
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file-level failure. Batch migrations collect these instead of
/// aborting.
#[derive(Debug, Error)]
#[error("{step} failed for {path:?}: {source}")]
pub struct MigrationError {
    pub assignment_id: Option<i64>,
    pub step: MigrationStep,
    pub path: PathBuf,
    pub source: io::Error,
}

impl MigrationError {
    pub fn new(
        assignment_id: Option<i64>,
        step: MigrationStep,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self {
            assignment_id,
            step,
            path: path.into(),
            source,
        }
    }

    pub fn report(&self) -> serde_json::Value {
        json!({
            "assignmentId": self.assignment_id,
            "step": self.step.as_str(),
            "path": self.path.to_string_lossy(),
            "message": self.source.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("invalid input: {problems:?}")]
    Validation { problems: Vec<String> },
    #[error("{what} already exists")]
    Duplicate { what: String },
    #[error("{kind} {id} still has {count} {dependents}")]
    DependentRecords {
        kind: EntityKind,
        id: i64,
        count: usize,
        dependents: &'static str,
    },
    #[error("a {kind} edit or delete is already in progress")]
    OperationInProgress { kind: EntityKind },
    #[error("{kind} {id} not found")]
    UnknownRecord { kind: &'static str, id: i64 },
    #[error("no open {kind} edit session matches this token")]
    UnknownSession { kind: EntityKind },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("records do not form a consistent hierarchy: {problems:?}")]
    Inconsistent { problems: Vec<String> },
    #[error("backup failed: {0:#}")]
    Backup(anyhow::Error),
}

impl CascadeError {
    pub fn validation(problem: impl Into<String>) -> Self {
        CascadeError::Validation {
            problems: vec![problem.into()],
        }
    }

    /// Stable code surfaced to the UI.
    pub fn code(&self) -> &'static str {
        match self {
            CascadeError::Validation { .. } => "validation_failed",
            CascadeError::Duplicate { .. } => "duplicate",
            CascadeError::DependentRecords { .. } => "dependent_records",
            CascadeError::OperationInProgress { .. } => "operation_in_progress",
            CascadeError::UnknownRecord { .. } => "not_found",
            CascadeError::UnknownSession { .. } => "unknown_session",
            CascadeError::Store(StoreError::NotFound { .. }) => "not_found",
            CascadeError::Store(StoreError::Corruption { .. }) => "corrupt_data",
            CascadeError::Store(StoreError::Read { .. }) => "io_failed",
            CascadeError::Store(StoreError::Persistence { .. }) => "persist_failed",
            CascadeError::Migration(_) => "file_migration_failed",
            CascadeError::Cloud(_) => "io_failed",
            CascadeError::Config(ConfigError::NotFound { .. }) => "not_found",
            CascadeError::Config(ConfigError::Invalid { .. }) => "corrupt_data",
            CascadeError::Config(ConfigError::Read { .. }) => "io_failed",
            CascadeError::Config(ConfigError::Write { .. }) => "persist_failed",
            CascadeError::Inconsistent { .. } => "corrupt_data",
            CascadeError::Backup(_) => "io_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CascadeError::Validation { problems } | CascadeError::Inconsistent { problems } => {
                Some(json!({ "problems": problems }))
            }
            CascadeError::DependentRecords {
                kind,
                id,
                count,
                dependents,
            } => Some(json!({
                "entity": kind.as_str(),
                "id": id,
                "count": count,
                "dependents": dependents,
            })),
            CascadeError::OperationInProgress { kind } => {
                Some(json!({ "entity": kind.as_str() }))
            }
            CascadeError::Store(e) => Some(json!({ "path": e.path().to_string_lossy() })),
            CascadeError::Migration(e) => Some(e.report()),
            _ => None,
        }
    }
}
