//! In-memory stand-in for the warehouse.
//!
//! `FakeWarehouse` understands exactly the statement shapes the loaders emit
//! (`DELETE FROM`, `COPY ... FROM '<uri>'`, `INSERT INTO ... SELECT src.*`)
//! and answers probe queries from canned results. Everything it sees is
//! recorded so tests can assert on statement order.

use std::collections::{BTreeMap, HashSet};
use std::sync::{LazyLock, Mutex, MutexGuard};

use async_trait::async_trait;
use regex::Regex;

use etldag::errors::StoreError;
use etldag::warehouse::{Row, Value, WarehouseClient};

static DELETE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DELETE FROM (\w+)$").unwrap());

static COPY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^COPY (\w+) FROM '((?:[^']|'')*)' ").unwrap());

static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^INSERT INTO (\w+) \(([^)]*)\) SELECT src\.\* FROM \((.*)\) AS src(?: WHERE src\.(\w+) IS NOT NULL AND src\.\w+ NOT IN \(SELECT DISTINCT (\w+) FROM \w+ WHERE \w+ IS NOT NULL\))?$",
    )
    .unwrap()
});

static COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT COUNT\(\*\) FROM (\w+)$").unwrap());

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct SourceRows {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug)]
struct Failure {
    pattern: Regex,
    remaining: Option<usize>,
    message: String,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, FakeTable>,
    objects: BTreeMap<String, Vec<Row>>,
    sources: BTreeMap<String, SourceRows>,
    canned: BTreeMap<String, Vec<Row>>,
    failures: Vec<Failure>,
    statements: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeWarehouse {
    inner: Mutex<Inner>,
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .trim_end()
        .to_string()
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Declare a table with its column order.
    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.lock().tables.insert(
            name.to_string(),
            FakeTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Rows a `COPY ... FROM '<uri>'` will load.
    pub fn with_object(self, uri: &str, rows: Vec<Row>) -> Self {
        self.lock().objects.insert(uri.to_string(), rows);
        self
    }

    /// Result set produced by `source_query` when used as an insert source.
    pub fn with_source(self, source_query: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.lock().sources.insert(
            normalize(source_query),
            SourceRows {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    /// Canned result for a probe query.
    pub fn with_query_result(self, query: &str, rows: Vec<Row>) -> Self {
        self.lock().canned.insert(normalize(query), rows);
        self
    }

    /// Fail the next `times` statements matching `pattern`.
    pub fn fail_times(&self, pattern: &str, times: usize, message: &str) {
        self.lock().failures.push(Failure {
            pattern: Regex::new(pattern).unwrap(),
            remaining: Some(times),
            message: message.to_string(),
        });
    }

    /// Fail every statement matching `pattern`.
    pub fn fail_always(&self, pattern: &str, message: &str) {
        self.lock().failures.push(Failure {
            pattern: Regex::new(pattern).unwrap(),
            remaining: None,
            message: message.to_string(),
        });
    }

    /// Every statement and query seen so far, normalized to single spaces.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
        let re = Regex::new(pattern).unwrap();
        self.statements()
            .into_iter()
            .filter(|s| re.is_match(s))
            .collect()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn set_rows(&self, table: &str, rows: Vec<Row>) {
        self.lock().tables.entry(table.to_string()).or_default().rows = rows;
    }
}

impl Inner {
    fn record(&mut self, sql: &str) -> Result<String, StoreError> {
        let sql = normalize(sql);
        self.statements.push(sql.clone());

        for failure in self.failures.iter_mut() {
            if !failure.pattern.is_match(&sql) {
                continue;
            }
            match failure.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            return Err(StoreError::new(failure.message.clone()));
        }
        Ok(sql)
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        if let Some(caps) = DELETE.captures(sql) {
            self.tables.entry(caps[1].to_string()).or_default().rows.clear();
            return Ok(());
        }

        if let Some(caps) = COPY.captures(sql) {
            let uri = caps[2].replace("''", "'");
            let rows = self
                .objects
                .get(&uri)
                .cloned()
                .ok_or_else(|| StoreError::new(format!("no object at {uri}")))?;
            self.tables
                .entry(caps[1].to_string())
                .or_default()
                .rows
                .extend(rows);
            return Ok(());
        }

        if let Some(caps) = INSERT.captures(sql) {
            let table = caps[1].to_string();
            let insert_columns: Vec<String> =
                caps[2].split(',').map(|c| c.trim().to_string()).collect();
            let source = self
                .sources
                .get(&normalize(&caps[3]))
                .cloned()
                .ok_or_else(|| StoreError::new(format!("unknown source query: {}", &caps[3])))?;

            let target = self.tables.entry(table.clone()).or_default();
            if target.columns.is_empty() {
                target.columns = insert_columns.clone();
            }

            let rows: Vec<Row> = match (caps.get(4), caps.get(5)) {
                (Some(src_col), Some(tgt_col)) => {
                    let src_idx = position(&source.columns, src_col.as_str())?;
                    let tgt_idx = position(&target.columns, tgt_col.as_str())?;
                    let existing: HashSet<String> = target
                        .rows
                        .iter()
                        .filter_map(|r| r.get(tgt_idx))
                        .filter(|v| !v.is_null())
                        .map(|v| v.to_string())
                        .collect();
                    source
                        .rows
                        .into_iter()
                        .filter(|r| match r.get(src_idx) {
                            Some(Value::Null) | None => false,
                            Some(v) => !existing.contains(&v.to_string()),
                        })
                        .collect()
                }
                _ => source.rows,
            };

            target.rows.extend(rows);
            return Ok(());
        }

        Err(StoreError::new(format!("unsupported statement: {sql}")))
    }

    fn answer(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        if let Some(rows) = self.canned.get(sql) {
            return Ok(rows.clone());
        }
        if let Some(caps) = COUNT.captures(sql) {
            let count = self.tables.get(&caps[1]).map_or(0, |t| t.rows.len());
            return Ok(vec![vec![Value::Int(count as i64)]]);
        }
        Err(StoreError::new(format!("unexpected query: {sql}")))
    }
}

fn position(columns: &[String], column: &str) -> Result<usize, StoreError> {
    columns
        .iter()
        .position(|c| c == column)
        .ok_or_else(|| StoreError::new(format!("column \"{column}\" does not exist")))
}

#[async_trait]
impl WarehouseClient for FakeWarehouse {
    async fn run(&self, sql: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sql = inner.record(sql)?;
        inner.execute(&sql)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.lock();
        let sql = inner.record(sql)?;
        inner.answer(&sql)
    }
}
