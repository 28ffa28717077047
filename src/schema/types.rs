// src/schema/types.rs

use serde::Serialize;
use std::fmt;

/// Relational column type chosen for a loaded table.
#[derive(Debug, Serialize, PartialEq, Clone, Copy, Eq, Hash)]
pub enum SqlType {
    Integer,
    BigInt,
    Double,
    Boolean,
    Timestamp,
    Varchar(usize),
    Text,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Integer => f.write_str("INTEGER"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Double => f.write_str("DOUBLE"),
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::Timestamp => f.write_str("TIMESTAMP"),
            SqlType::Varchar(n) => write!(f, "VARCHAR({})", n),
            SqlType::Text => f.write_str("TEXT"),
        }
    }
}

/// A single column definition of a table to create.
#[derive(Debug, Serialize, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub ty: SqlType,
    pub primary_key: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_renders_as_ddl_and_json() -> anyhow::Result<()> {
        let cols = [
            Column { name: "id".into(), ty: SqlType::Integer, primary_key: true },
            Column { name: "title".into(), ty: SqlType::Varchar(255), primary_key: false },
        ];
        assert_eq!(cols[1].ty.to_string(), "VARCHAR(255)");
        assert_eq!(
            serde_json::to_string(&cols)?,
            r#"[{"name":"id","ty":"Integer","primary_key":true},{"name":"title","ty":{"Varchar":255},"primary_key":false}]"#
        );
        Ok(())
    }
}
