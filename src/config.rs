// src/config.rs

use anyhow::{anyhow, bail, Context, Result};
use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::load::LoadMode;

pub const DEFAULT_TRACKS_SOURCE: &str = "./data/spotify_dataset.csv";
pub const DEFAULT_NOMINATIONS_TABLE: &str = "grammy_awards_raw";
pub const DEFAULT_MERGED_TABLE: &str = "merged_data";
pub const DEFAULT_DUCKDB_PATH: &str = "warehouse.duckdb";

/// Connection parameters for a PostgreSQL database attached through DuckDB.
#[derive(Clone, PartialEq, Eq)]
pub struct PgParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl PgParams {
    /// libpq keyword/value connection string.
    pub fn conn_string(&self) -> String {
        self.conn_string_for(&self.database)
    }

    /// Connection string for the server's `postgres` maintenance database.
    pub fn maintenance_conn_string(&self) -> String {
        self.conn_string_for("postgres")
    }

    fn conn_string_for(&self, database: &str) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, database
        )
    }
}

impl fmt::Debug for PgParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgresql://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    Memory,
    File(PathBuf),
    Postgres(PgParams),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Gcs {
        bucket: String,
        folder_id: String,
        credentials: Option<PathBuf>,
    },
    Local(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DagConfig {
    pub retries: u32,
    pub retry_delay: Duration,
    pub max_parallel: usize,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay: Duration::from_secs(60),
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db: DbTarget,
    pub tracks_source: String,
    pub nominations_table: String,
    pub merged_table: String,
    pub load_mode: LoadMode,
    pub export: Option<ExportTarget>,
    pub snapshot_dir: Option<PathBuf>,
    pub dag: DagConfig,
    pub schedule_interval: Duration,
}

impl Config {
    /// Read configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded environment from {}", path.display());
        }
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map; empty values count as unset.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |k: &str| vars.get(k).map(|v| v.trim()).filter(|v| !v.is_empty());

        let db = if let Some(path) = get("DUCKDB_PATH") {
            if path == ":memory:" {
                DbTarget::Memory
            } else {
                DbTarget::File(PathBuf::from(path))
            }
        } else if let Some(host) = get("PG_HOST") {
            let require = |k: &str| {
                get(k)
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("{} must be set when PG_HOST is set", k))
            };
            DbTarget::Postgres(PgParams {
                host: host.to_string(),
                port: parse_var(&get, "PG_PORT")?.unwrap_or(5432),
                user: require("PG_USER")?,
                password: get("PG_PASSWORD").unwrap_or_default().to_string(),
                database: require("PG_DATABASE")?,
            })
        } else {
            DbTarget::File(PathBuf::from(DEFAULT_DUCKDB_PATH))
        };

        let export = match (get("GCS_BUCKET"), get("GCS_FOLDER_ID"), get("EXPORT_DIR")) {
            (Some(bucket), Some(folder), _) => Some(ExportTarget::Gcs {
                bucket: bucket.to_string(),
                folder_id: folder.to_string(),
                credentials: get("GCS_CREDENTIALS").map(PathBuf::from),
            }),
            (Some(_), None, _) => bail!("GCS_FOLDER_ID must be set when GCS_BUCKET is set"),
            (None, _, Some(dir)) => Some(ExportTarget::Local(PathBuf::from(dir))),
            (None, _, None) => None,
        };

        let load_mode = match get("LOAD_MODE") {
            Some(m) => m
                .parse::<LoadMode>()
                .map_err(|e| e.context("parsing LOAD_MODE"))?,
            None => LoadMode::Replace,
        };

        let defaults = DagConfig::default();
        let dag = DagConfig {
            retries: parse_var(&get, "DAG_RETRIES")?.unwrap_or(defaults.retries),
            retry_delay: parse_var(&get, "DAG_RETRY_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            max_parallel: parse_var(&get, "DAG_MAX_PARALLEL")?.unwrap_or(defaults.max_parallel),
        };
        if dag.max_parallel == 0 {
            bail!("DAG_MAX_PARALLEL must be at least 1");
        }

        let schedule_interval = parse_var(&get, "SCHEDULE_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(24 * 60 * 60));
        if schedule_interval.is_zero() {
            bail!("SCHEDULE_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            db,
            tracks_source: get("TRACKS_SOURCE")
                .unwrap_or(DEFAULT_TRACKS_SOURCE)
                .to_string(),
            nominations_table: get("NOMINATIONS_TABLE")
                .unwrap_or(DEFAULT_NOMINATIONS_TABLE)
                .to_string(),
            merged_table: get("MERGED_TABLE")
                .unwrap_or(DEFAULT_MERGED_TABLE)
                .to_string(),
            load_mode,
            export,
            snapshot_dir: get("SNAPSHOT_DIR").map(PathBuf::from),
            dag,
            schedule_interval,
        })
    }
}

fn parse_var<'a, T, F>(get: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<&'a str>,
{
    get(key)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid {}: `{}`", key, v)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() -> Result<()> {
        let cfg = Config::from_vars(HashMap::new())?;
        assert_eq!(cfg.db, DbTarget::File(PathBuf::from(DEFAULT_DUCKDB_PATH)));
        assert_eq!(cfg.nominations_table, "grammy_awards_raw");
        assert_eq!(cfg.merged_table, "merged_data");
        assert_eq!(cfg.load_mode, LoadMode::Replace);
        assert_eq!(cfg.export, None);
        assert_eq!(cfg.dag, DagConfig::default());
        assert_eq!(cfg.schedule_interval, Duration::from_secs(86_400));
        Ok(())
    }

    #[test]
    fn postgres_from_env() -> Result<()> {
        let cfg = Config::from_vars(vars(&[
            ("PG_HOST", "db.local"),
            ("PG_USER", "etl"),
            ("PG_PASSWORD", "secret"),
            ("PG_DATABASE", "music"),
        ]))?;
        let DbTarget::Postgres(pg) = &cfg.db else {
            panic!("expected postgres target, got {:?}", cfg.db);
        };
        assert_eq!(pg.port, 5432);
        assert_eq!(
            pg.conn_string(),
            "host=db.local port=5432 user=etl password=secret dbname=music"
        );
        assert_eq!(
            pg.maintenance_conn_string(),
            "host=db.local port=5432 user=etl password=secret dbname=postgres"
        );
        assert!(!format!("{:?}", pg).contains("secret"));
        Ok(())
    }

    #[test]
    fn duckdb_path_wins_over_postgres() -> Result<()> {
        let cfg = Config::from_vars(vars(&[("DUCKDB_PATH", ":memory:"), ("PG_HOST", "x")]))?;
        assert_eq!(cfg.db, DbTarget::Memory);
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_vars(vars(&[("PG_HOST", "h"), ("PG_USER", "u")])).is_err());
        assert!(Config::from_vars(vars(&[("DAG_RETRIES", "many")])).is_err());
        assert!(Config::from_vars(vars(&[("DAG_MAX_PARALLEL", "0")])).is_err());
        assert!(Config::from_vars(vars(&[("GCS_BUCKET", "b")])).is_err());
        assert!(Config::from_vars(vars(&[("LOAD_MODE", "upsert")])).is_err());
    }

    #[test]
    fn export_targets() -> Result<()> {
        let cfg = Config::from_vars(vars(&[
            ("GCS_BUCKET", "bucket"),
            ("GCS_FOLDER_ID", "folder"),
            ("GCS_CREDENTIALS", "/keys/sa.json"),
            ("EXPORT_DIR", "/tmp/out"),
        ]))?;
        assert_eq!(
            cfg.export,
            Some(ExportTarget::Gcs {
                bucket: "bucket".into(),
                folder_id: "folder".into(),
                credentials: Some(PathBuf::from("/keys/sa.json")),
            })
        );

        let cfg = Config::from_vars(vars(&[("EXPORT_DIR", "/tmp/out"), ("LOAD_MODE", "append")]))?;
        assert_eq!(cfg.export, Some(ExportTarget::Local(PathBuf::from("/tmp/out"))));
        assert_eq!(cfg.load_mode, LoadMode::Append);
        Ok(())
    }
}
