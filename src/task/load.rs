// src/task/load.rs

//! Fact and dimension loaders: move rows from staging into a target table.

use tracing::{info, warn};

use crate::errors::{LoadError, LoadOperation};
use crate::task::{TaskContext, TaskResult, TaskServices, TaskSummary};
use crate::types::InsertMode;
use crate::warehouse::sql::{self, InsertParams};

/// Natural key used to skip rows that are already in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeKey {
    /// Column of the target table holding the key.
    pub target_column: String,
    /// Column of the source query producing the key.
    pub source_column: String,
}

impl DedupeKey {
    /// Key whose name is the same on both sides.
    pub fn same(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            target_column: column.clone(),
            source_column: column,
        }
    }

    pub fn mapped(source_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            source_column: source_column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    pub table: String,
    pub columns: Vec<String>,
    /// Opaque select whose columns line up with `columns`.
    pub source_query: String,
    pub insert_mode: InsertMode,
    pub dedupe: Option<DedupeKey>,
}

/// Optionally clear the target, then insert the source rows not already
/// present under the dedupe key.
pub async fn execute(spec: &LoadSpec, ctx: &TaskContext, services: &TaskServices) -> TaskResult {
    let mut statements = 0;

    match &spec.insert_mode {
        InsertMode::DeleteAndLoad => {
            info!(
                task = %ctx.task_id,
                table = %spec.table,
                "delete_load mode: clearing target table"
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
            statements += 1;
        }
        InsertMode::Append => {
            info!(
                task = %ctx.task_id,
                table = %spec.table,
                "append mode: adding new rows on top of existing ones"
            );
        }
        InsertMode::Unrecognized(raw) => {
            warn!(
                task = %ctx.task_id,
                table = %spec.table,
                insert_mode = %raw,
                "insert mode not recognized; defaulting to append"
            );
        }
    }

    let insert = sql::insert_select(&InsertParams {
        table: &spec.table,
        columns: &spec.columns,
        source_query: &spec.source_query,
        dedupe: spec
            .dedupe
            .as_ref()
            .map(|k| (k.source_column.as_str(), k.target_column.as_str())),
    });

    services
        .warehouse
        .run(&insert)
        .await
        .map_err(|source| LoadError {
            table: spec.table.clone(),
            operation: LoadOperation::Insert,
            source,
        })?;
    statements += 1;

    info!(task = %ctx.task_id, table = %spec.table, "insert finished");

    let applied = if spec.insert_mode.clears_target() {
        "delete_load"
    } else {
        "append"
    };
    Ok(TaskSummary::new(statements).with_note(format!("loaded {} ({applied})", spec.table)))
}
