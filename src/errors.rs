// src/errors.rs

//! Crate-wide error types.
//!
//! - [`EtlError`] is what configuration loading and the binary surface.
//! - [`GraphError`] comes out of [`crate::dag::DependencyGraph`] construction.
//! - [`StoreError`], [`CredentialError`], [`LoadError`] and [`TaskError`]
//!   describe what can go wrong while a task is executing; the scheduler only
//!   looks at [`TaskError::is_retryable`].

use std::fmt;

use thiserror::Error;

use crate::engine::TaskId;
use crate::warehouse::Row;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EtlError>;

/// Failure to construct a [`crate::dag::DependencyGraph`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency graph has no tasks")]
    Empty,

    #[error("task '{0}' is declared more than once")]
    DuplicateTask(TaskId),

    #[error("task '{task}' depends on unknown task '{missing}'")]
    UnknownTask { task: TaskId, missing: TaskId },

    #[error("cycle detected in dependency graph involving tasks {}", involved.join(", "))]
    Cycle { involved: Vec<TaskId> },
}

/// A warehouse statement failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("warehouse error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::new(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential '{reference}' could not be resolved: {reason}")]
    Unresolved { reference: String, reason: String },
}

/// Which statement of a load was running when the store failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOperation {
    Delete,
    Copy,
    Insert,
}

impl fmt::Display for LoadOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadOperation::Delete => "delete",
            LoadOperation::Copy => "copy",
            LoadOperation::Insert => "insert",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} on table '{table}' failed: {source}")]
pub struct LoadError {
    pub table: String,
    pub operation: LoadOperation,
    #[source]
    pub source: StoreError,
}

/// Detail of the first quality check that did not hold.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFailure {
    /// Zero-based position of the check within its gate.
    pub index: usize,
    pub description: String,
    pub query: String,
    pub observed: Row,
}

impl fmt::Display for QualityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quality check #{} ({}) failed; observed {:?} for query: {}",
            self.index + 1,
            self.description,
            self.observed,
            self.query.trim()
        )
    }
}

/// Error returned by [`crate::task::Task::execute`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{0}")]
    QualityCheckFailed(QualityFailure),

    #[error("probe query failed: {0}")]
    Probe(StoreError),

    #[error("template error: {0}")]
    Template(String),

    #[error("task aborted")]
    Aborted,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Store and credential failures may be transient; everything else needs
    /// an operator.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Credential(_) | TaskError::Load(_) | TaskError::Probe(_)
        )
    }

    pub fn quality_failure(&self) -> Option<&QualityFailure> {
        match self {
            TaskError::QualityCheckFailed(failure) => Some(failure),
            _ => None,
        }
    }
}
