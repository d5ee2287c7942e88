// src/types.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// How a table loader treats rows already present in its target table.
///
/// - `Append`: keep existing rows and insert only new ones (default).
/// - `DeleteAndLoad`: empty the target table before inserting.
/// - `Unrecognized`: the configured mode was not understood. It behaves
///   exactly like `Append`; the raw value is kept so the loader can log it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InsertMode {
    #[default]
    Append,
    DeleteAndLoad,
    Unrecognized(String),
}

impl InsertMode {
    /// Parse a configured mode. Never fails: unknown values map to
    /// [`InsertMode::Unrecognized`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "append" => InsertMode::Append,
            "delete_load" | "delete_and_load" | "deleteandload" => InsertMode::DeleteAndLoad,
            _ => InsertMode::Unrecognized(raw.to_string()),
        }
    }

    /// Whether the target table is cleared before inserting.
    pub fn clears_target(&self) -> bool {
        matches!(self, InsertMode::DeleteAndLoad)
    }
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertMode::Append => f.write_str("append"),
            InsertMode::DeleteAndLoad => f.write_str("delete_load"),
            InsertMode::Unrecognized(raw) => write!(f, "unrecognized({raw})"),
        }
    }
}

/// How the bulk copy finds the field layout of the JSON source files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResolution {
    /// Let the warehouse discover fields from the objects themselves.
    Auto,
    /// Use a JSONPaths manifest stored under this key in the same bucket.
    Manifest(String),
}

impl PathResolution {
    /// `"auto"` (any case) selects auto-discovery; anything else is a
    /// manifest key.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            PathResolution::Auto
        } else {
            PathResolution::Manifest(trimmed.to_string())
        }
    }
}

/// Shape of the delay between attempts of a failing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(format!(
                "invalid backoff: {other} (expected \"fixed\" or \"exponential\")"
            )),
        }
    }
}

/// Parse durations like `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_mode_falls_back_to_append_semantics() {
        assert_eq!(InsertMode::parse("append"), InsertMode::Append);
        assert_eq!(InsertMode::parse(" DELETE_LOAD "), InsertMode::DeleteAndLoad);

        let odd = InsertMode::parse("truncate");
        assert_eq!(odd, InsertMode::Unrecognized("truncate".to_string()));
        assert!(!odd.clears_target());
    }

    #[test]
    fn path_resolution_auto_is_case_insensitive() {
        assert_eq!(PathResolution::parse("Auto"), PathResolution::Auto);
        assert_eq!(
            PathResolution::parse("log_json_path.json"),
            PathResolution::Manifest("log_json_path.json".to_string())
        );
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("20ms"), Ok(Duration::from_millis(20)));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = parse_duration("9999999999999999h").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("18446744073709551615s").is_ok());
    }
}
