// src/schema/arrow.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{
        ArrayRef, BooleanBuilder, Float64Builder, Int32Builder, Int64Builder, StringBuilder,
        TimestampMicrosecondBuilder,
    },
    datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::types::{Column, SqlType};
use crate::table::{Table, Value};

/// Map a relational column type onto an Arrow DataType.
///
/// - INTEGER            → Int32
/// - BIGINT             → Int64
/// - DOUBLE             → Float64
/// - BOOLEAN            → Boolean
/// - TIMESTAMP          → Timestamp(µs)
/// - VARCHAR(n), TEXT   → Utf8
pub fn map_to_arrow_type(ty: SqlType) -> DataType {
    match ty {
        SqlType::Integer => DataType::Int32,
        SqlType::BigInt => DataType::Int64,
        SqlType::Double => DataType::Float64,
        SqlType::Boolean => DataType::Boolean,
        SqlType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        SqlType::Varchar(_) | SqlType::Text => DataType::Utf8,
    }
}

/// Build an ArrowSchema (inside an Arc) from a slice of `Column`s.
pub fn build_arrow_schema(cols: &[Column]) -> Arc<ArrowSchema> {
    let fields: Vec<ArrowField> = cols
        .iter()
        .map(|col| ArrowField::new(&col.name, map_to_arrow_type(col.ty), !col.primary_key))
        .collect();

    Arc::new(ArrowSchema::new(fields))
}

/// Convert a table into one RecordBatch typed by `cols`.
pub fn build_record_batch(table: &Table, cols: &[Column]) -> Result<RecordBatch> {
    if cols.len() != table.num_columns() {
        bail!(
            "{} column definitions for a table with {} columns",
            cols.len(),
            table.num_columns()
        );
    }

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(cols.len());
    for col in cols {
        let cells = table.column(&col.name)?;
        let arr: ArrayRef = match col.ty {
            SqlType::Integer => {
                let mut b = Int32Builder::new();
                for v in cells {
                    b.append_option(v.as_i64().map(i32::try_from).transpose()?);
                }
                Arc::new(b.finish())
            }
            SqlType::BigInt => {
                let mut b = Int64Builder::new();
                for v in cells {
                    b.append_option(v.as_i64());
                }
                Arc::new(b.finish())
            }
            SqlType::Double => {
                let mut b = Float64Builder::new();
                for v in cells {
                    b.append_option(v.as_f64());
                }
                Arc::new(b.finish())
            }
            SqlType::Boolean => {
                let mut b = BooleanBuilder::new();
                for v in cells {
                    b.append_option(match v {
                        Value::Bool(x) => Some(*x),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            SqlType::Timestamp => {
                let mut b = TimestampMicrosecondBuilder::new();
                for v in cells {
                    b.append_option(match v {
                        Value::Timestamp(t) => Some(t.and_utc().timestamp_micros()),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            SqlType::Varchar(_) | SqlType::Text => {
                let mut b = StringBuilder::new();
                for v in cells {
                    if v.is_null() {
                        b.append_null();
                    } else {
                        b.append_value(v.to_string());
                    }
                }
                Arc::new(b.finish())
            }
        };
        arrays.push(arr);
    }

    RecordBatch::try_new(build_arrow_schema(cols), arrays).context("building record batch")
}
