// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod task;
pub mod types;
pub mod warehouse;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, WarehouseSection};
use crate::dag::RunReport;
use crate::pipeline::Pipeline;
use crate::task::{Backoff, RunContext, TaskKind, TaskServices};
use crate::warehouse::{EnvCredentialProvider, PostgresWarehouse};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the warehouse connection and credential provider
/// - the pipeline run
/// - Ctrl-C handling
///
/// Returns `None` for a dry run.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading pipeline file {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(None);
    }

    let url = warehouse_url(&cfg.warehouse)?;
    let warehouse = PostgresWarehouse::connect(&url, cfg.warehouse.max_connections)
        .await
        .context("connecting to the warehouse")?;

    let services = TaskServices {
        warehouse: Arc::new(warehouse),
        credentials: Arc::new(EnvCredentialProvider),
    };

    let workers = args.workers.unwrap_or(cfg.config.workers);
    let pipeline = Pipeline::new(Arc::clone(&cfg.graph), services).with_workers(workers);

    let mut run_ctx = RunContext::new(args.run_time.unwrap_or_else(Utc::now));
    for (key, value) in args.params {
        run_ctx = run_ctx.with_param(key, value);
    }
    let logical_run_time = run_ctx.logical_run_time;

    // Ctrl-C → abort the run; in-flight tasks are dropped, the rest skipped.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; aborting run");
            cancel.cancel();
        });
    }

    let report = pipeline.run_once_with_abort(run_ctx, cancel).await?;

    println!("logical run time: {}", logical_run_time.to_rfc3339());
    println!("{report}");

    Ok(Some(report))
}

fn warehouse_url(section: &WarehouseSection) -> Result<String> {
    if let Some(url) = &section.url {
        return Ok(url.clone());
    }
    std::env::var(&section.url_env).with_context(|| {
        format!(
            "no [warehouse].url configured and environment variable {} is not set",
            section.url_env
        )
    })
}

/// Dry-run output: tasks in execution order with kind, upstream and retries.
fn print_dry_run(cfg: &ConfigFile) {
    println!("etldag dry-run");
    println!("  config.workers = {}", cfg.config.workers);
    println!();

    println!("tasks ({}, in execution order):", cfg.graph.len());
    for task in cfg.graph.tasks() {
        println!("  - {} [{}]", task.id, task.kind);
        if !task.upstream.is_empty() {
            let upstream: Vec<_> = task.upstream.iter().map(String::as_str).collect();
            println!("      after: {}", upstream.join(", "));
        }
        match &task.kind {
            TaskKind::Stage(spec) => {
                println!("      table: {}", spec.table);
                println!(
                    "      source: s3://{}/{}",
                    spec.source.bucket, spec.source.key_template
                );
            }
            TaskKind::LoadFact(spec) | TaskKind::LoadDimension(spec) => {
                println!("      table: {} ({})", spec.table, spec.insert_mode);
                if let Some(key) = &spec.dedupe {
                    println!(
                        "      dedupe: {} -> {}",
                        key.source_column, key.target_column
                    );
                }
            }
            TaskKind::QualityGate(gate) => {
                for check in &gate.checks {
                    println!("      check: {}", check.description);
                }
            }
            TaskKind::Marker => {}
        }
        if task.retry.max_attempts > 1 {
            let backoff = match task.retry.backoff {
                Backoff::Fixed(d) => format!("every {}s", d.as_secs()),
                Backoff::Exponential { initial, max } => {
                    format!("exponential from {}s up to {}s", initial.as_secs(), max.as_secs())
                }
            };
            println!("      attempts: {} ({backoff})", task.retry.max_attempts);
        }
    }

    debug!("dry-run complete (no execution)");
}
