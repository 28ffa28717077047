use anyhow::{bail, Result};
use tracing::{debug, info};

use super::{Column, SqlType};
use crate::table::{ColumnKind, Table, Value};

/// Longest text that still fits a `VARCHAR` column.
pub const MAX_VARCHAR_LEN: usize = 255;

/// Name of the column that becomes the primary key of a clean table.
const PRIMARY_KEY: &str = "id";

/// Pick a relational type for one column from what was observed in it:
///  - ints → INTEGER, or BIGINT once a value leaves the 32-bit range
///  - floats → DOUBLE, bools → BOOLEAN, timestamps → TIMESTAMP
///  - everything else is rendered as text and sized by its longest value
pub fn infer_sql_type<'a, I>(kind: ColumnKind, column_name: &str, cells: I) -> SqlType
where
    I: IntoIterator<Item = &'a Value>,
{
    match kind {
        ColumnKind::Int => {
            let wide = cells
                .into_iter()
                .filter_map(Value::as_i64)
                .any(|v| i32::try_from(v).is_err());
            if wide {
                SqlType::BigInt
            } else {
                SqlType::Integer
            }
        }
        ColumnKind::Float => SqlType::Double,
        ColumnKind::Bool => SqlType::Boolean,
        ColumnKind::Timestamp => SqlType::Timestamp,
        ColumnKind::Object => {
            let max_len = cells
                .into_iter()
                .map(|v| v.to_string().chars().count())
                .max()
                .unwrap_or(0);
            if max_len > MAX_VARCHAR_LEN {
                info!(
                    "Adjusting column {} to TEXT due to length {}.",
                    column_name, max_len
                );
                SqlType::Text
            } else {
                SqlType::Varchar(MAX_VARCHAR_LEN)
            }
        }
    }
}

/// Derive one [`Column`] per table column. With `with_primary_key`, a column
/// named `id` becomes the primary key.
pub fn derive_columns(table: &Table, with_primary_key: bool) -> Result<Vec<Column>> {
    if table.num_columns() == 0 {
        bail!("derive_columns: table has no columns");
    }

    let mut cols = Vec::with_capacity(table.num_columns());
    for name in table.columns() {
        let kind = table.column_kind(name)?;
        let ty = infer_sql_type(kind, name, table.column(name)?);
        debug!("derive_columns: `{}` observed {:?} → {}", name, kind, ty);
        cols.push(Column {
            name: name.clone(),
            ty,
            primary_key: with_primary_key && name == PRIMARY_KEY,
        });
    }
    Ok(cols)
}
