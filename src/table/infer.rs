use chrono::NaiveDateTime;
use tracing::debug;

use super::Value;

/// Strings read as null.
const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Observed type of a column, unified over its non-null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Bool,
    Timestamp,
    /// Text, mixed cells, or no observations at all.
    Object,
}

impl ColumnKind {
    pub fn unify<'a, I>(cells: I) -> ColumnKind
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut kind: Option<ColumnKind> = None;
        for v in cells {
            let k = match v {
                Value::Null => continue,
                Value::Int(_) => ColumnKind::Int,
                Value::Float(_) => ColumnKind::Float,
                Value::Bool(_) => ColumnKind::Bool,
                Value::Timestamp(_) => ColumnKind::Timestamp,
                Value::Text(_) => return ColumnKind::Object,
            };
            kind = match (kind, k) {
                (None, k) => Some(k),
                (Some(a), b) if a == b => Some(a),
                (Some(ColumnKind::Int), ColumnKind::Float)
                | (Some(ColumnKind::Float), ColumnKind::Int) => Some(ColumnKind::Float),
                _ => return ColumnKind::Object,
            };
        }
        kind.unwrap_or(ColumnKind::Object)
    }
}

pub fn is_null_marker(raw: &str) -> bool {
    NULL_MARKERS.contains(&raw.trim())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

pub fn parse_timestamp(v: &str) -> Option<NaiveDateTime> {
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(ts);
        }
    }
    // ISO 8601, with or without fractional seconds and a trailing `Z`
    NaiveDateTime::parse_from_str(v.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn kind_of(v: &str) -> ColumnKind {
    if v.parse::<i64>().is_ok() {
        ColumnKind::Int
    } else if v.parse::<f64>().is_ok() {
        ColumnKind::Float
    } else if parse_bool(v).is_some() {
        ColumnKind::Bool
    } else if parse_timestamp(v).is_some() {
        ColumnKind::Timestamp
    } else {
        ColumnKind::Object
    }
}

/// Look at every non-null raw cell of a column:
///  - the first one fixes the candidate kind
///  - ints and floats widen to float
///  - any other disagreement stops the scan and keeps the column as text
pub fn derive_kind<'a, I>(column: &str, cells: I) -> ColumnKind
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Option<ColumnKind> = None;
    for raw in cells {
        let v = raw.trim();
        if is_null_marker(v) {
            continue;
        }
        let k = kind_of(v);
        seen = match (seen, k) {
            (None, k) => Some(k),
            (Some(a), b) if a == b => Some(a),
            (Some(ColumnKind::Int), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Int) => Some(ColumnKind::Float),
            (Some(prev), k) => {
                debug!(
                    "derive_kind: column `{}` conflict: {:?} vs {:?}, keeping text",
                    column, prev, k
                );
                return ColumnKind::Object;
            }
        };
    }
    seen.unwrap_or(ColumnKind::Object)
}

/// Convert one raw cell into a value of the column's derived kind.
pub fn parse_cell(kind: ColumnKind, raw: &str) -> Value {
    if is_null_marker(raw) {
        return Value::Null;
    }
    let v = raw.trim();
    let parsed = match kind {
        ColumnKind::Int => v.parse().ok().map(Value::Int),
        ColumnKind::Float => v.parse().ok().map(Value::Float),
        ColumnKind::Bool => parse_bool(v).map(Value::Bool),
        ColumnKind::Timestamp => parse_timestamp(v).map(Value::Timestamp),
        ColumnKind::Object => None,
    };
    parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
}
