// src/task/quality.rs

//! Quality gate: read-only checks that must hold before a run counts as done.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::info;

use crate::errors::{QualityFailure, TaskError};
use crate::task::{TaskContext, TaskResult, TaskServices, TaskSummary};
use crate::warehouse::Row;

pub type Predicate = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// A probe query plus the condition its single result row must satisfy.
#[derive(Clone)]
pub struct QualityCheck {
    pub description: String,
    pub probe_query: String,
    pub predicate: Predicate,
}

impl fmt::Debug for QualityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityCheck")
            .field("description", &self.description)
            .field("probe_query", &self.probe_query)
            .finish_non_exhaustive()
    }
}

impl QualityCheck {
    pub fn new<F>(description: impl Into<String>, probe_query: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            probe_query: probe_query.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Check whose first result value must satisfy `expectation`.
    pub fn expecting(probe_query: impl Into<String>, expectation: Expectation) -> Self {
        let description = format!("first value {expectation}");
        Self::new(description, probe_query, move |row| expectation.holds(row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Typed comparison of the first value of the probe row against a number,
/// written in config as e.g. `"== 0"` or `"> 100"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expectation {
    pub op: CompareOp,
    pub value: f64,
}

static EXPECTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(==|!=|>=|<=|>|<)\s*(-?\d+(?:\.\d+)?)\s*$")
        .expect("expectation regex is valid")
});

impl FromStr for Expectation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = EXPECTATION.captures(s).ok_or_else(|| {
            format!("invalid expectation '{s}' (expected e.g. \"== 0\" or \"> 10\")")
        })?;

        let op = match &caps[1] {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            _ => CompareOp::Lt,
        };
        let value = caps[2]
            .parse::<f64>()
            .map_err(|e| format!("invalid number in expectation '{s}': {e}"))?;

        Ok(Self { op, value })
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.symbol(), self.value)
    }
}

impl Expectation {
    /// An empty row or a NULL / non-numeric first value never holds.
    pub fn holds(&self, row: &Row) -> bool {
        let Some(observed) = row.first().and_then(|v| v.as_f64()) else {
            return false;
        };

        match self.op {
            CompareOp::Eq => observed == self.value,
            CompareOp::Ne => observed != self.value,
            CompareOp::Gt => observed > self.value,
            CompareOp::Ge => observed >= self.value,
            CompareOp::Lt => observed < self.value,
            CompareOp::Le => observed <= self.value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    pub checks: Vec<QualityCheck>,
}

impl QualityGate {
    pub fn new(checks: Vec<QualityCheck>) -> Self {
        Self { checks }
    }

    pub fn with_check(mut self, check: QualityCheck) -> Self {
        self.checks.push(check);
        self
    }
}

/// Run every check in order; stop at the first one that does not hold.
pub async fn execute(gate: &QualityGate, ctx: &TaskContext, services: &TaskServices) -> TaskResult {
    let total = gate.checks.len();

    for (index, check) in gate.checks.iter().enumerate() {
        let rows = services
            .warehouse
            .query(&check.probe_query)
            .await
            .map_err(TaskError::Probe)?;
        let row = rows.into_iter().next().unwrap_or_default();

        if !(check.predicate)(&row) {
            return Err(TaskError::QualityCheckFailed(QualityFailure {
                index,
                description: check.description.clone(),
                query: check.probe_query.clone(),
                observed: row,
            }));
        }

        info!(
            task = %ctx.task_id,
            check = index + 1,
            total,
            description = %check.description,
            "quality check passed"
        );
    }

    info!(task = %ctx.task_id, "{total}/{total} quality checks passed");
    Ok(TaskSummary::new(total as u32).with_note(format!("{total}/{total} checks passed")))
}
