// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};

/// Command-line arguments for `etldag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "etldag",
    version,
    about = "Run a warehouse ETL pipeline once as a dependency graph of tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "etldag.toml")]
    pub config: String,

    /// Logical run time (RFC 3339). Defaults to now.
    ///
    /// Drives the `{ds}`, `{ts}`, ... placeholders of stage keys.
    #[arg(long, value_name = "TIME", value_parser = parse_run_time)]
    pub run_time: Option<DateTime<Utc>>,

    /// Extra template parameter, may be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Override `[config].workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ETLDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't touch the warehouse.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_run_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{s}': {e}"))
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_and_run_time_parse() {
        let args = CliArgs::try_parse_from([
            "etldag",
            "--run-time",
            "2020-03-21T10:00:00+02:00",
            "--param",
            "env=prod",
            "--param",
            "filter=a=b",
        ])
        .unwrap();

        assert_eq!(args.run_time.unwrap().to_rfc3339(), "2020-03-21T08:00:00+00:00");
        assert_eq!(
            args.params,
            vec![
                ("env".to_string(), "prod".to_string()),
                ("filter".to_string(), "a=b".to_string()),
            ]
        );
        assert_eq!(args.config, "etldag.toml");
    }

    #[test]
    fn malformed_param_is_rejected() {
        assert!(CliArgs::try_parse_from(["etldag", "--param", "novalue"]).is_err());
    }
}
