// src/warehouse/sql.rs

//! Statement rendering for the loaders.
//!
//! Caller-supplied SQL (source queries, probes) is treated as opaque text and
//! only ever embedded as a whole; nothing here edits it.

use crate::warehouse::Credentials;

/// Everything a bulk `COPY` of JSON objects needs.
#[derive(Debug, Clone)]
pub struct CopyParams<'a> {
    pub table: &'a str,
    pub source_uri: &'a str,
    /// `auto` or the URI of a JSONPaths manifest.
    pub json_paths: &'a str,
    pub credentials: &'a Credentials,
    pub time_format: &'a str,
    pub region: &'a str,
}

/// Insert-select description consumed by [`insert_select`].
#[derive(Debug, Clone)]
pub struct InsertParams<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub source_query: &'a str,
    /// `(source column, target column)` used to skip rows already loaded.
    pub dedupe: Option<(&'a str, &'a str)>,
}

/// Escape a value for use inside a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn delete_all(table: &str) -> String {
    format!("DELETE FROM {table}")
}

pub fn copy_json(params: &CopyParams<'_>) -> String {
    format!(
        "COPY {table} FROM '{uri}' ACCESS_KEY_ID '{ak}' SECRET_ACCESS_KEY '{sk}' \
         FORMAT AS JSON '{paths}' TIMEFORMAT AS '{fmt}' REGION '{region}'",
        table = params.table,
        uri = quote_literal(params.source_uri),
        ak = quote_literal(&params.credentials.access_key),
        sk = quote_literal(&params.credentials.secret_key),
        paths = quote_literal(params.json_paths),
        fmt = quote_literal(params.time_format),
        region = quote_literal(params.region),
    )
}

/// `INSERT INTO t (cols) SELECT src.* FROM (<source>) AS src [WHERE <dedupe>]`.
///
/// The dedupe predicate ignores NULL keys already in the target, otherwise
/// `NOT IN` would reject every row. Source rows with a NULL key are dropped:
/// they can never match an existing row.
pub fn insert_select(params: &InsertParams<'_>) -> String {
    let mut sql = format!(
        "INSERT INTO {table} ({cols}) SELECT src.* FROM ({source}) AS src",
        table = params.table,
        cols = params.columns.join(", "),
        source = params.source_query.trim().trim_end_matches(';').trim_end(),
    );

    if let Some((source_col, target_col)) = params.dedupe {
        sql.push_str(&format!(
            " WHERE src.{source_col} IS NOT NULL AND src.{source_col} NOT IN (SELECT DISTINCT {target_col} FROM {table} WHERE {target_col} IS NOT NULL)",
            table = params.table,
        ));
    }

    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            access_key: "AKIA".to_string(),
            secret_key: "se'cret".to_string(),
        }
    }

    #[test]
    fn copy_escapes_literals() {
        let creds = creds();
        let sql = copy_json(&CopyParams {
            table: "staging_events",
            source_uri: "s3://udacity-dend/log_data",
            json_paths: "s3://udacity-dend/log_json_path.json",
            credentials: &creds,
            time_format: "epochmillisecs",
            region: "us-west-2",
        });

        assert!(sql.starts_with("COPY staging_events FROM 's3://udacity-dend/log_data'"));
        assert!(sql.contains("SECRET_ACCESS_KEY 'se''cret'"));
        assert!(sql.contains("FORMAT AS JSON 's3://udacity-dend/log_json_path.json'"));
        assert!(sql.ends_with("REGION 'us-west-2'"));
    }

    #[test]
    fn insert_without_dedupe_has_no_where_clause() {
        let cols = vec!["userid".to_string(), "level".to_string()];
        let sql = insert_select(&InsertParams {
            table: "users",
            columns: &cols,
            source_query: "SELECT userid, level FROM staging_events;\n",
            dedupe: None,
        });
        assert_eq!(
            sql,
            "INSERT INTO users (userid, level) SELECT src.* FROM (SELECT userid, level FROM staging_events) AS src"
        );
    }

    #[test]
    fn dedupe_wraps_the_source_instead_of_appending_to_it() {
        let cols = vec!["playid".to_string(), "start_time".to_string()];
        let source = "SELECT md5(x) songplay_id, ts FROM staging_events WHERE page = 'NextSong'";
        let sql = insert_select(&InsertParams {
            table: "songplays",
            columns: &cols,
            source_query: source,
            dedupe: Some(("songplay_id", "playid")),
        });

        assert!(sql.contains(&format!("FROM ({source}) AS src")));
        assert!(sql.ends_with(
            "WHERE src.songplay_id IS NOT NULL AND src.songplay_id NOT IN (SELECT DISTINCT playid FROM songplays WHERE playid IS NOT NULL)"
        ));
    }
}
