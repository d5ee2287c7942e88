// src/warehouse/postgres.rs

//! Postgres-protocol warehouse client (Redshift, Postgres).
//!
//! Statements go through the simple-query protocol (`raw_sql`) since COPY
//! and caller-supplied SQL are sent verbatim and never prepared.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::errors::StoreError;
use crate::warehouse::{Row, Value, WarehouseClient};

/// Pooled connection to the target warehouse.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    /// Connect with at most `max_connections` pooled connections.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        debug!(max_connections, "connected to warehouse");
        Ok(Self { pool })
    }
}

#[async_trait]
impl WarehouseClient for PostgresWarehouse {
    async fn run(&self, sql: &str) -> Result<(), StoreError> {
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        debug!(rows_affected = result.rows_affected(), "statement executed");
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &PgRow) -> Result<Row, StoreError> {
    let mut out = Vec::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(idx)?.is_null() {
            out.push(Value::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => Value::Bool(row.try_get(idx)?),
            "INT2" => Value::Int(row.try_get::<i16, _>(idx)?.into()),
            "INT4" => Value::Int(row.try_get::<i32, _>(idx)?.into()),
            "INT8" => Value::Int(row.try_get(idx)?),
            "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx)?.into()),
            "FLOAT8" => Value::Float(row.try_get(idx)?),
            other => match row.try_get::<String, _>(idx) {
                Ok(s) => Value::Text(s),
                Err(e) => {
                    warn!(
                        column = %column.name(),
                        type_name = %other,
                        error = %e,
                        "unsupported column type; reporting as text placeholder"
                    );
                    Value::Text(format!("<{other}>"))
                }
            },
        };
        out.push(value);
    }

    Ok(out)
}
