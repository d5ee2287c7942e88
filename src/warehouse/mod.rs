// src/warehouse/mod.rs

//! The warehouse seam.
//!
//! Tasks never talk to a database directly; they go through a
//! [`WarehouseClient`], which is all the engine knows about the target store.
//!
//! - [`sql`] renders the statements the loaders send.
//! - [`postgres`] is the production client (Redshift speaks the Postgres
//!   wire protocol).
//! - [`credentials`] resolves the access keys used by bulk copies.

pub mod credentials;
pub mod postgres;
pub mod sql;

use std::fmt;

use async_trait::async_trait;

use crate::errors::StoreError;

pub use credentials::{CredentialProvider, Credentials, EnvCredentialProvider, StaticCredentialProvider};
pub use postgres::PostgresWarehouse;

/// A single typed cell returned by [`WarehouseClient::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null | Value::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// One result row, columns in select order.
pub type Row = Vec<Value>;

/// Executes SQL against the target store.
///
/// A client may be shared by concurrently running tasks; each call is an
/// independent round trip.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Execute a statement that returns no rows.
    async fn run(&self, sql: &str) -> Result<(), StoreError>;

    /// Execute a query and return every row.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError>;
}
