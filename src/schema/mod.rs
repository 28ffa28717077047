pub mod arrow;
pub mod derive;
pub mod types;

pub use arrow::{build_arrow_schema, build_record_batch, map_to_arrow_type};
pub use derive::{derive_columns, infer_sql_type, MAX_VARCHAR_LEN};
pub use types::{Column, SqlType};
