// src/task/locator.rs

//! Batch source resolution for staging loads.
//!
//! A stage source is declared as a bucket, a key template and a path
//! resolution mode. At run time the template placeholders are filled from
//! the task context and the result is turned into concrete URIs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::TaskError;
use crate::task::TaskContext;
use crate::types::PathResolution;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Where a staging table's raw data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSource {
    pub bucket: String,
    /// Object key or prefix; may contain `{ds}`-style placeholders.
    pub key_template: String,
    pub path_resolution: PathResolution,
}

/// A resolved source, ready to be put into a COPY statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub uri: String,
    /// `auto`, or the URI of the JSONPaths manifest.
    pub json_paths: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceLocator;

impl SourceLocator {
    pub fn resolve(source: &StageSource, ctx: &TaskContext) -> Result<SourceLocation, TaskError> {
        let key = render_template(&source.key_template, &template_params(ctx))?;
        let uri = object_uri(&source.bucket, &key);

        let json_paths = match &source.path_resolution {
            PathResolution::Auto => "auto".to_string(),
            PathResolution::Manifest(manifest_key) => object_uri(&source.bucket, manifest_key),
        };

        Ok(SourceLocation { uri, json_paths })
    }
}

fn object_uri(bucket: &str, key: &str) -> String {
    format!(
        "s3://{}/{}",
        bucket.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Built-in parameters derived from the logical run time, overlaid with the
/// run's explicit parameters.
pub fn template_params(ctx: &TaskContext) -> BTreeMap<String, String> {
    let t = ctx.logical_run_time;
    let mut params = BTreeMap::new();
    params.insert("ds".to_string(), t.format("%Y-%m-%d").to_string());
    params.insert("ds_nodash".to_string(), t.format("%Y%m%d").to_string());
    params.insert("ts".to_string(), t.to_rfc3339());
    params.insert("year".to_string(), t.format("%Y").to_string());
    params.insert("month".to_string(), t.format("%m").to_string());
    params.insert("day".to_string(), t.format("%d").to_string());
    params.insert("hour".to_string(), t.format("%H").to_string());
    params.insert("run_id".to_string(), ctx.run_id.to_string());

    for (k, v) in &ctx.params {
        params.insert(k.clone(), v.clone());
    }
    params
}

/// Replace every `{name}` in `template`. Unknown names are an error rather
/// than being left in place.
pub fn render_template(
    template: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, TaskError> {
    let mut missing: Option<String> = None;

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match params.get(name) {
            Some(v) => v.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(TaskError::Template(format!(
            "unknown placeholder '{{{name}}}' in '{template}'"
        ))),
        None => Ok(rendered.into_owned()),
    }
}
