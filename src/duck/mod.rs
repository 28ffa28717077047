use anyhow::{Context, Result};
use chrono::DateTime;
use duckdb::{
    params_from_iter,
    types::{TimeUnit, ToSqlOutput, Value as DuckValue},
    Connection, ToSql,
};
use std::fs;
use tracing::{debug, info, warn};

use crate::config::{DbTarget, PgParams};
use crate::schema::Column;
use crate::table::{Table, Value};

/// Catalog name of an attached PostgreSQL database.
const PG_ALIAS: &str = "warehouse";

/// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
pub fn open_disk_db(path: &std::path::Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Connection::open(path).with_context(|| format!("opening DuckDB file {}", path.display()))
}

/// Open a DuckDB in‐memory database
pub fn open_mem_db() -> Result<Connection> {
    Ok(Connection::open_in_memory()?)
}

/// Catalog name of the server's maintenance database while it is attached.
const PG_ADMIN_ALIAS: &str = "pg_admin";

/// Quote a string as a SQL literal.
fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn attach_postgres_sql(conn_string: &str, alias: &str) -> String {
    format!(
        "ATTACH {} AS {} (TYPE POSTGRES);",
        sql_literal(conn_string),
        quote_ident(alias)
    )
}

fn database_exists_sql(database: &str) -> String {
    let lookup = format!(
        "SELECT 1 FROM pg_database WHERE datname = {}",
        sql_literal(database)
    );
    format!(
        "SELECT count(*) FROM postgres_query({}, {});",
        sql_literal(PG_ADMIN_ALIAS),
        sql_literal(&lookup)
    )
}

fn create_database_sql(database: &str) -> String {
    let create = format!("CREATE DATABASE {}", quote_ident(database));
    format!(
        "CALL postgres_execute({}, {});",
        sql_literal(PG_ADMIN_ALIAS),
        sql_literal(&create)
    )
}

/// Create the configured database through the maintenance database if the
/// server doesn't have it yet.
fn ensure_postgres_database(conn: &Connection, pg: &PgParams) -> Result<()> {
    conn.execute_batch(&attach_postgres_sql(
        &pg.maintenance_conn_string(),
        PG_ADMIN_ALIAS,
    ))
    .context("attaching the postgres maintenance database")?;

    let found: i64 = conn
        .query_row(&database_exists_sql(&pg.database), [], |r| r.get(0))
        .with_context(|| format!("looking up database {}", pg.database))?;
    if found == 0 {
        conn.execute_batch(&create_database_sql(&pg.database))
            .with_context(|| format!("creating database {}", pg.database))?;
        info!(database = %pg.database, "Database created");
    }

    conn.execute_batch(&format!("DETACH {};", quote_ident(PG_ADMIN_ALIAS)))?;
    Ok(())
}

/// Open an in-memory engine with the PostgreSQL database attached and
/// selected, creating the database first when the server lacks it.
pub fn open_postgres(pg: &PgParams) -> Result<Connection> {
    let conn = open_mem_db()?;
    conn.execute_batch("INSTALL postgres; LOAD postgres;")
        .context("loading the DuckDB postgres extension")?;

    let attach = attach_postgres_sql(&pg.conn_string(), PG_ALIAS);
    if let Err(e) = conn.execute_batch(&attach) {
        warn!(database = %pg.database, "attach failed ({}), checking that the database exists", e);
        ensure_postgres_database(&conn, pg)?;
        conn.execute_batch(&attach)
            .context("attaching PostgreSQL database")?;
    }
    conn.execute_batch(&format!("USE {};", quote_ident(PG_ALIAS)))?;
    Ok(conn)
}

/// Open a fresh connection to the configured target.
pub fn connect(target: &DbTarget) -> Result<Connection> {
    let conn = match target {
        DbTarget::Memory => open_mem_db()?,
        DbTarget::File(path) => open_disk_db(path)?,
        DbTarget::Postgres(pg) => open_postgres(pg)?,
    };
    info!(db = ?target, "Connection opened. You can now query the database.");
    Ok(conn)
}

/// Quote an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let n: i64 = conn
        .query_row(
            "SELECT count(*) FROM information_schema.tables \
             WHERE table_catalog = current_database() \
               AND table_schema = current_schema() \
               AND table_name = ?",
            [name],
            |r| r.get(0),
        )
        .with_context(|| format!("checking whether {} exists", name))?;
    Ok(n > 0)
}

/// Column names of `name` in declaration order.
pub fn table_columns(conn: &Connection, name: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_catalog = current_database() \
           AND table_schema = current_schema() \
           AND table_name = ? \
         ORDER BY ordinal_position",
    )?;
    let names = stmt
        .query_map([name], |r| r.get::<_, String>(0))?
        .collect::<duckdb::Result<Vec<_>>>()?;
    Ok(names)
}

pub fn create_table_sql(name: &str, cols: &[Column]) -> String {
    let defs: Vec<String> = cols
        .iter()
        .map(|c| {
            let mut d = format!("{} {}", quote_ident(&c.name), c.ty);
            if c.primary_key {
                d.push_str(" PRIMARY KEY");
            }
            d
        })
        .collect();
    format!("CREATE TABLE {} ({});", quote_ident(name), defs.join(", "))
}

/// Create `name` from column definitions; `replace` drops any existing table first.
pub fn create_table_from_schema(
    conn: &Connection,
    name: &str,
    cols: &[Column],
    replace: bool,
) -> Result<()> {
    if replace {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(name)))
            .with_context(|| format!("dropping table {}", name))?;
    }
    let sql = create_table_sql(name, cols);
    debug!(sql = %sql, "creating table");
    conn.execute_batch(&sql)
        .with_context(|| format!("creating table {}", name))?;
    Ok(())
}

/// How rows reach a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPath {
    /// DuckDB's bulk Appender; native DuckDB catalogs only.
    Appender,
    /// One prepared `INSERT` per row; works against attached catalogs too.
    Statements,
}

impl InsertPath {
    pub fn for_target(target: &DbTarget) -> Self {
        match target {
            DbTarget::Memory | DbTarget::File(_) => InsertPath::Appender,
            DbTarget::Postgres(_) => InsertPath::Statements,
        }
    }
}

/// Run `f` inside one transaction; nothing `f` did survives an error.
pub fn in_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit().context("committing transaction")?;
    Ok(out)
}

/// Append every row of `table` to `name`. Callers wrap this in
/// [`in_transaction`] so a failing row leaves nothing behind.
pub fn insert_rows(conn: &Connection, name: &str, table: &Table, path: InsertPath) -> Result<usize> {
    // the Appender writes in table order, so it needs identical columns
    let path = match path {
        InsertPath::Appender if table_columns(conn, name)? != table.columns() => {
            debug!(table = name, "column order differs; inserting row by row");
            InsertPath::Statements
        }
        p => p,
    };

    match path {
        InsertPath::Appender => {
            let mut appender = conn
                .appender(name)
                .with_context(|| format!("opening appender on {}", name))?;
            for (i, row) in table.rows().iter().enumerate() {
                let params: Vec<&dyn ToSql> = row.iter().map(|v| v as &dyn ToSql).collect();
                appender
                    .append_row(params.as_slice())
                    .with_context(|| format!("appending row {} to {}", i, name))?;
            }
            appender
                .flush()
                .with_context(|| format!("flushing rows into {}", name))?;
        }
        InsertPath::Statements => {
            let cols: Vec<String> = table.columns().iter().map(|c| quote_ident(c)).collect();
            let placeholders = vec!["?"; cols.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(name),
                cols.join(", "),
                placeholders
            );
            let mut stmt = conn
                .prepare(&sql)
                .with_context(|| format!("preparing insert into {}", name))?;
            for (i, row) in table.rows().iter().enumerate() {
                stmt.execute(params_from_iter(row.iter()))
                    .with_context(|| format!("inserting row {} into {}", i, name))?;
            }
        }
    }
    Ok(table.num_rows())
}

/// Read a whole table into memory.
pub fn read_table(conn: &Connection, name: &str) -> Result<Table> {
    let columns = table_columns(conn, name)?;
    if columns.is_empty() {
        anyhow::bail!("table {} does not exist", name);
    }
    let select: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(name));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut table = Table::new(columns);
    let width = table.num_columns();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(from_duck(row.get::<_, DuckValue>(i)?));
        }
        table.push_row(cells)?;
    }
    Ok(table)
}

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let v = match self {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Float(f) => DuckValue::Double(*f),
            Value::Text(s) => DuckValue::Text(s.clone()),
            Value::Timestamp(t) => {
                DuckValue::Timestamp(TimeUnit::Microsecond, t.and_utc().timestamp_micros())
            }
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

fn from_duck(v: DuckValue) -> Value {
    match v {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Int(i.into()),
        DuckValue::SmallInt(i) => Value::Int(i.into()),
        DuckValue::Int(i) => Value::Int(i.into()),
        DuckValue::BigInt(i) => Value::Int(i),
        DuckValue::UTinyInt(i) => Value::Int(i.into()),
        DuckValue::USmallInt(i) => Value::Int(i.into()),
        DuckValue::UInt(i) => Value::Int(i.into()),
        DuckValue::UBigInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64)),
        DuckValue::HugeInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64)),
        DuckValue::Float(f) => Value::Float(f.into()),
        DuckValue::Double(f) => Value::Float(f),
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|d| Value::Timestamp(d.naive_utc()))
                .unwrap_or(Value::Null)
        }
        other => Value::Text(format!("{:?}", other)),
    }
}
