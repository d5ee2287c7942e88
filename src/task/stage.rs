// src/task/stage.rs

//! Staging loader: replace a staging table with one batch from object storage.

use tracing::info;

use crate::errors::{LoadError, LoadOperation};
use crate::task::locator::{SourceLocator, StageSource};
use crate::task::{TaskContext, TaskResult, TaskServices, TaskSummary};
use crate::warehouse::sql::{self, CopyParams};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_TIME_FORMAT: &str = "epochmillisecs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub table: String,
    /// Credential reference passed to the [`crate::warehouse::CredentialProvider`].
    pub credentials: String,
    pub source: StageSource,
    pub region: String,
    pub time_format: String,
}

impl StageSpec {
    pub fn new(table: impl Into<String>, credentials: impl Into<String>, source: StageSource) -> Self {
        Self {
            table: table.into(),
            credentials: credentials.into(),
            source,
            region: DEFAULT_REGION.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

/// Delete everything in the staging table, then bulk-copy the batch.
///
/// Staging tables keep no history, so running this twice leaves the same
/// contents as running it once.
pub async fn execute(spec: &StageSpec, ctx: &TaskContext, services: &TaskServices) -> TaskResult {
    let credentials = services.credentials.resolve(&spec.credentials)?;
    let location = SourceLocator::resolve(&spec.source, ctx)?;

    info!(
        task = %ctx.task_id,
        table = %spec.table,
        attempt = ctx.attempt,
        "clearing staging table"
    );
    services
        .warehouse
        .run(&sql::delete_all(&spec.table))
        .await
        .map_err(|source| LoadError {
            table: spec.table.clone(),
            operation: LoadOperation::Delete,
            source,
        })?;

    info!(
        task = %ctx.task_id,
        table = %spec.table,
        source = %location.uri,
        json_paths = %location.json_paths,
        "copying batch into staging table"
    );
    let copy = sql::copy_json(&CopyParams {
        table: &spec.table,
        source_uri: &location.uri,
        json_paths: &location.json_paths,
        credentials: &credentials,
        time_format: &spec.time_format,
        region: &spec.region,
    });
    services
        .warehouse
        .run(&copy)
        .await
        .map_err(|source| LoadError {
            table: spec.table.clone(),
            operation: LoadOperation::Copy,
            source,
        })?;

    Ok(TaskSummary::new(2).with_note(format!("staged {} from {}", spec.table, location.uri)))
}
