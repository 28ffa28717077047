// src/load.rs

use anyhow::{anyhow, Context, Result};
use std::str::FromStr;
use tracing::{debug, error, info, instrument};

use crate::config::DbTarget;
use crate::duck::{self, InsertPath};
use crate::schema::{derive_columns, Column};
use crate::table::Table;

/// What to do when the clean target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Leave the existing table untouched and log an error.
    Fail,
    /// Drop and recreate the table.
    Replace,
    /// Insert into the existing table.
    Append,
}

impl FromStr for LoadMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(LoadMode::Fail),
            "replace" => Ok(LoadMode::Replace),
            "append" => Ok(LoadMode::Append),
            other => Err(anyhow!(
                "unknown load mode `{}` (expected fail, replace or append)",
                other
            )),
        }
    }
}

/// Outcome of a clean load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: usize, created: bool },
    SkippedExisting,
}

fn log_schema(table_name: &str, cols: &[Column]) -> Result<()> {
    let schema = serde_json::to_string(cols).context("serializing derived schema")?;
    debug!(table = table_name, %schema, "derived schema");
    Ok(())
}

/// Create or replace `table_name` from the table's inferred schema and insert its rows.
#[instrument(level = "info", skip(db, table), fields(rows = table.num_rows()))]
pub fn load_raw_data(db: &DbTarget, table: &Table, table_name: &str) -> Result<usize> {
    info!("Creating table {} from the raw dataset.", table_name);
    let cols = derive_columns(table, false)?;
    log_schema(table_name, &cols)?;
    let path = InsertPath::for_target(db);
    let mut conn = duck::connect(db)?;
    let rows = duck::in_transaction(&mut conn, |tx| {
        duck::create_table_from_schema(tx, table_name, &cols, true)?;
        duck::insert_rows(tx, table_name, table, path)
    })?;
    info!("Table {} created successfully.", table_name);
    Ok(rows)
}

/// Load the merged dataset into `table_name`, creating it with an inferred
/// schema (primary key on `id`) when needed. Replacing drops, recreates and
/// fills the table in one transaction, so a failed load keeps the old rows.
#[instrument(level = "info", skip(db, table), fields(rows = table.num_rows()))]
pub fn load_clean_data(
    db: &DbTarget,
    table: &Table,
    table_name: &str,
    mode: LoadMode,
) -> Result<LoadOutcome> {
    info!("Loading clean data to table {}.", table_name);
    let path = InsertPath::for_target(db);
    let mut conn = duck::connect(db)?;
    let exists = duck::table_exists(&conn, table_name)?;

    let create = match (exists, mode) {
        (true, LoadMode::Fail) => {
            error!("Table {} already exists.", table_name);
            return Ok(LoadOutcome::SkippedExisting);
        }
        (true, LoadMode::Append) => None,
        (true, LoadMode::Replace) | (false, _) => {
            let cols = derive_columns(table, true)?;
            log_schema(table_name, &cols)?;
            Some(cols)
        }
    };
    let created = create.is_some();

    let rows = duck::in_transaction(&mut conn, |tx| {
        if let Some(cols) = &create {
            duck::create_table_from_schema(tx, table_name, cols, exists)?;
        }
        duck::insert_rows(tx, table_name, table, path)
    })
    .with_context(|| format!("loading data into {}", table_name))?;

    if created {
        info!("Table {} created successfully.", table_name);
    }
    info!("Data loaded to table {}.", table_name);
    Ok(LoadOutcome::Loaded { rows, created })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use tempfile::TempDir;

    fn target() -> Result<(TempDir, DbTarget)> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("load.duckdb");
        Ok((dir, DbTarget::File(path)))
    }

    fn merged(n: i64) -> Table {
        let rows = (0..n)
            .map(|i| vec![Value::Int(i), format!("track {}", i).into(), Value::Bool(i % 2 == 0)])
            .collect();
        Table::from_rows(
            vec!["id".into(), "track_name".into(), "is_nominated".into()],
            rows,
        )
        .expect("merged")
    }

    fn count(db: &DbTarget, name: &str) -> Result<usize> {
        let conn = duck::connect(db)?;
        Ok(duck::read_table(&conn, name)?.num_rows())
    }

    #[test]
    fn parses_modes() -> Result<()> {
        assert_eq!("Replace".parse::<LoadMode>()?, LoadMode::Replace);
        assert_eq!(" append ".parse::<LoadMode>()?, LoadMode::Append);
        assert_eq!("fail".parse::<LoadMode>()?, LoadMode::Fail);
        assert!("merge".parse::<LoadMode>().is_err());
        Ok(())
    }

    #[test]
    fn fail_mode_leaves_existing_table() -> Result<()> {
        let (_dir, db) = target()?;
        let first = load_clean_data(&db, &merged(3), "merged_data", LoadMode::Fail)?;
        assert_eq!(first, LoadOutcome::Loaded { rows: 3, created: true });

        let second = load_clean_data(&db, &merged(5), "merged_data", LoadMode::Fail)?;
        assert_eq!(second, LoadOutcome::SkippedExisting);
        assert_eq!(count(&db, "merged_data")?, 3);
        Ok(())
    }

    #[test]
    fn replace_mode_swaps_contents() -> Result<()> {
        let (_dir, db) = target()?;
        load_clean_data(&db, &merged(3), "merged_data", LoadMode::Replace)?;
        let out = load_clean_data(&db, &merged(2), "merged_data", LoadMode::Replace)?;
        assert_eq!(out, LoadOutcome::Loaded { rows: 2, created: true });
        assert_eq!(count(&db, "merged_data")?, 2);
        Ok(())
    }

    #[test]
    fn failed_replace_keeps_previous_rows() -> Result<()> {
        let (_dir, db) = target()?;
        load_clean_data(&db, &merged(3), "merged_data", LoadMode::Replace)?;

        let clashing = Table::from_rows(
            vec!["id".into(), "track_name".into(), "is_nominated".into()],
            vec![
                vec![Value::Int(0), "one".into(), Value::Bool(true)],
                vec![Value::Int(0), "two".into(), Value::Bool(false)],
            ],
        )?;
        assert!(load_clean_data(&db, &clashing, "merged_data", LoadMode::Replace).is_err());

        let conn = duck::connect(&db)?;
        let kept = duck::read_table(&conn, "merged_data")?;
        assert_eq!(kept, merged(3));
        Ok(())
    }

    #[test]
    fn append_mode_hits_primary_key() -> Result<()> {
        let (_dir, db) = target()?;
        load_clean_data(&db, &merged(2), "merged_data", LoadMode::Append)?;
        // same ids again violate the primary key; nothing is half-written
        assert!(load_clean_data(&db, &merged(2), "merged_data", LoadMode::Append).is_err());
        assert_eq!(count(&db, "merged_data")?, 2);
        Ok(())
    }

    #[test]
    fn raw_load_replaces() -> Result<()> {
        let (_dir, db) = target()?;
        assert_eq!(load_raw_data(&db, &merged(4), "grammy_awards_raw")?, 4);
        assert_eq!(load_raw_data(&db, &merged(1), "grammy_awards_raw")?, 1);
        assert_eq!(count(&db, "grammy_awards_raw")?, 1);
        Ok(())
    }
}
