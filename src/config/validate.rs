// src/config/validate.rs

use std::sync::Arc;
use std::time::Duration;

use crate::config::model::{
    CheckConfig, ConfigFile, DefaultSection, RawConfigFile, TaskConfig, TaskKindConfig,
};
use crate::dag::DependencyGraph;
use crate::errors::{EtlError, Result};
use crate::task::stage::{DEFAULT_REGION, DEFAULT_TIME_FORMAT};
use crate::task::{
    DedupeKey, Expectation, LoadSpec, QualityCheck, QualityGate, RetryPolicy, StageSource,
    StageSpec, Task, TaskKind,
};
use crate::types::{parse_duration, InsertMode, PathResolution};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EtlError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_global_config(&raw)?;
        validate_task_dependencies(&raw)?;

        let tasks = raw
            .task
            .iter()
            .map(|(id, cfg)| build_task(id, cfg, &raw.default))
            .collect::<Result<Vec<_>>>()?;

        // Dependencies are carried by each task's `after`; cycles surface
        // here as `GraphError::Cycle`.
        let graph = DependencyGraph::build(tasks, Vec::new())?;

        Ok(ConfigFile {
            config: raw.config,
            warehouse: raw.warehouse,
            default: raw.default,
            task: raw.task,
            graph: Arc::new(graph),
        })
    }
}

fn config_error(msg: impl Into<String>) -> EtlError {
    EtlError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<id>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.workers == 0 {
        return Err(config_error("[config].workers must be >= 1 (got 0)"));
    }
    if cfg.warehouse.max_connections == 0 {
        return Err(config_error(
            "[warehouse].max_connections must be >= 1 (got 0)",
        ));
    }
    if cfg.default.max_attempts == 0 {
        return Err(config_error("[default].max_attempts must be >= 1 (got 0)"));
    }
    duration_field("[default].retry_delay", &cfg.default.retry_delay)?;
    duration_field("[default].max_retry_delay", &cfg.default.max_retry_delay)?;
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (id, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == id {
                return Err(config_error(format!(
                    "task '{id}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(config_error(format!(
                    "task '{id}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn duration_field(field: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).map_err(|e| config_error(format!("{field}: {e}")))
}

fn required<'a>(id: &str, field: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(config_error(format!(
            "task '{id}' is missing required field `{field}`"
        ))),
    }
}

/// Turn one `[task.<id>]` table into a [`Task`].
pub fn build_task(id: &str, cfg: &TaskConfig, defaults: &DefaultSection) -> Result<Task> {
    let kind = match cfg.kind {
        TaskKindConfig::Stage => TaskKind::Stage(build_stage(id, cfg)?),
        TaskKindConfig::Fact => TaskKind::LoadFact(build_load(id, cfg)?),
        TaskKindConfig::Dimension => TaskKind::LoadDimension(build_load(id, cfg)?),
        TaskKindConfig::Quality => TaskKind::QualityGate(build_gate(id, &cfg.checks)?),
        TaskKindConfig::Marker => TaskKind::Marker,
    };

    let mut task = Task::new(id, kind).with_retry(retry_policy(id, cfg, defaults)?);
    for upstream in &cfg.after {
        task = task.after(upstream.as_str());
    }
    Ok(task)
}

/// Task overrides win over `[default]`. Quality gates and markers get a
/// single attempt unless the task sets `max_attempts`.
fn retry_policy(id: &str, cfg: &TaskConfig, defaults: &DefaultSection) -> Result<RetryPolicy> {
    let single_shot = matches!(cfg.kind, TaskKindConfig::Quality | TaskKindConfig::Marker);
    let max_attempts = match cfg.max_attempts {
        Some(0) => {
            return Err(config_error(format!(
                "task '{id}': max_attempts must be >= 1 (got 0)"
            )));
        }
        Some(n) => n,
        None if single_shot => 1,
        None => defaults.max_attempts,
    };

    let delay = duration_field(
        &format!("task '{id}' retry_delay"),
        cfg.retry_delay.as_deref().unwrap_or(&defaults.retry_delay),
    )?;
    let max_delay = duration_field(
        &format!("task '{id}' max_retry_delay"),
        cfg.max_retry_delay
            .as_deref()
            .unwrap_or(&defaults.max_retry_delay),
    )?;
    let backoff = cfg.backoff.unwrap_or(defaults.backoff);

    Ok(RetryPolicy::from_parts(max_attempts, backoff, delay, max_delay))
}

fn build_stage(id: &str, cfg: &TaskConfig) -> Result<StageSpec> {
    let table = required(id, "table", &cfg.table)?;
    let credentials = required(id, "credentials", &cfg.credentials)?;
    let bucket = required(id, "bucket", &cfg.bucket)?;
    let key = required(id, "key", &cfg.key)?;

    let source = StageSource {
        bucket: bucket.to_string(),
        key_template: key.to_string(),
        path_resolution: PathResolution::parse(cfg.json_paths.as_deref().unwrap_or("auto")),
    };

    let mut spec = StageSpec::new(table, credentials, source);
    spec.region = cfg.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string());
    spec.time_format = cfg
        .time_format
        .clone()
        .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string());
    Ok(spec)
}

fn build_load(id: &str, cfg: &TaskConfig) -> Result<LoadSpec> {
    let table = required(id, "table", &cfg.table)?;
    let query = required(id, "query", &cfg.query)?;

    let columns: Vec<String> = cfg
        .columns
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if columns.is_empty() {
        return Err(config_error(format!(
            "task '{id}': `columns` must list at least one column"
        )));
    }

    let dedupe = match (&cfg.dedupe_column, &cfg.dedupe_source_column) {
        (Some(target), Some(source)) => Some(DedupeKey::mapped(source.trim(), target.trim())),
        (Some(target), None) => Some(DedupeKey::same(target.trim())),
        (None, Some(_)) => {
            return Err(config_error(format!(
                "task '{id}': `dedupe_source_column` requires `dedupe_column`"
            )));
        }
        (None, None) => None,
    };

    Ok(LoadSpec {
        table: table.to_string(),
        columns,
        source_query: query.to_string(),
        insert_mode: InsertMode::parse(cfg.insert_mode.as_deref().unwrap_or("append")),
        dedupe,
    })
}

fn build_gate(id: &str, checks: &[CheckConfig]) -> Result<QualityGate> {
    if checks.is_empty() {
        return Err(config_error(format!(
            "task '{id}': quality task needs at least one entry in `checks`"
        )));
    }

    let mut gate = QualityGate::default();
    for (index, check) in checks.iter().enumerate() {
        let expectation: Expectation = check
            .expect
            .parse()
            .map_err(|e| config_error(format!("task '{id}' check #{}: {e}", index + 1)))?;

        let mut built = QualityCheck::expecting(check.query.clone(), expectation);
        if let Some(description) = &check.description {
            built.description = description.clone();
        }
        gate = gate.with_check(built);
    }
    Ok(gate)
}
