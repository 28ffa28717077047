// src/pipeline/mod.rs

use anyhow::{anyhow, Context, Result};
use std::{path::PathBuf, sync::Arc};
use tokio::runtime::Handle;
use tracing::info;

use crate::config::{Config, ExportTarget};
use crate::dag::Dag;
use crate::extract::{extract_nominations, extract_tracks};
use crate::load::{load_clean_data, LoadOutcome};
use crate::store::{write_parquet_snapshot, Exporter, GcsStore, LocalStore};
use crate::table::Table;
use crate::transform::{merge_datasets, transform_nominations, transform_tracks};

pub const SPOTIFY_EXTRACTION: &str = "spotify_extraction";
pub const GRAMMYS_EXTRACTION: &str = "grammys_extraction";
pub const SPOTIFY_TRANSFORMATION: &str = "spotify_transformation";
pub const GRAMMYS_TRANSFORMATION: &str = "grammys_transformation";
pub const MERGE: &str = "merge";
pub const LOAD: &str = "load";
pub const STORE: &str = "store";
pub const SNAPSHOT: &str = "snapshot";

/// What a pipeline task hands to its downstream tasks.
#[derive(Debug)]
pub enum Artifact {
    Table(Table),
    Loaded(LoadOutcome),
    Exported(String),
    Snapshot(PathBuf),
}

impl Artifact {
    pub fn table(&self) -> Result<&Table> {
        match self {
            Artifact::Table(t) => Ok(t),
            other => Err(anyhow!("expected a table, got {:?}", other)),
        }
    }
}

fn input(inputs: &[Arc<Artifact>], i: usize) -> Result<&Table> {
    inputs
        .get(i)
        .ok_or_else(|| anyhow!("missing upstream input {}", i))?
        .table()
}

/// Open the configured export target. GCS needs to run inside a Tokio runtime.
pub fn exporter(target: &ExportTarget) -> Result<Box<dyn Exporter>> {
    match target {
        ExportTarget::Local(dir) => Ok(Box::new(LocalStore::new(dir.clone()))),
        ExportTarget::Gcs {
            bucket,
            folder_id,
            credentials,
        } => {
            let handle = Handle::try_current().context("GCS export needs a Tokio runtime")?;
            let store =
                handle.block_on(GcsStore::connect(bucket, folder_id, credentials.as_deref()))?;
            Ok(Box::new(store))
        }
    }
}

/// Wire the extract → transform → merge → load → store graph for `cfg`.
pub fn build_pipeline(cfg: &Config) -> Result<Dag<Artifact>> {
    let tracks_source = cfg.tracks_source.clone();
    let db = cfg.db.clone();
    let nominations_table = cfg.nominations_table.clone();

    let mut builder = Dag::<Artifact>::builder()
        .task(SPOTIFY_EXTRACTION, &[], move |_| {
            Ok(Artifact::Table(extract_tracks(&tracks_source)?))
        })
        .task(GRAMMYS_EXTRACTION, &[], move |_| {
            Ok(Artifact::Table(extract_nominations(&db, &nominations_table)?))
        })
        .task(SPOTIFY_TRANSFORMATION, &[SPOTIFY_EXTRACTION], |inputs| {
            Ok(Artifact::Table(transform_tracks(input(inputs, 0)?.clone())?))
        })
        .task(GRAMMYS_TRANSFORMATION, &[GRAMMYS_EXTRACTION], |inputs| {
            Ok(Artifact::Table(transform_nominations(input(inputs, 0)?.clone())?))
        })
        .task(
            MERGE,
            &[SPOTIFY_TRANSFORMATION, GRAMMYS_TRANSFORMATION],
            |inputs| {
                Ok(Artifact::Table(merge_datasets(
                    input(inputs, 0)?,
                    input(inputs, 1)?,
                )?))
            },
        );

    let db = cfg.db.clone();
    let merged_table = cfg.merged_table.clone();
    let mode = cfg.load_mode;
    builder = builder.task(LOAD, &[MERGE], move |inputs| {
        let merged = input(inputs, 0)?;
        let outcome = load_clean_data(&db, merged, &merged_table, mode)?;
        // the loaded table travels on to the store task
        info!(?outcome, "load finished");
        Ok(Artifact::Table(merged.clone()))
    });

    if let Some(target) = cfg.export.clone() {
        let title = cfg.merged_table.clone();
        builder = builder.task(STORE, &[LOAD], move |inputs| {
            let store = exporter(&target)?;
            Ok(Artifact::Exported(store.store(&title, input(inputs, 0)?)?))
        });
    }

    if let Some(dir) = cfg.snapshot_dir.clone() {
        let name = cfg.merged_table.clone();
        builder = builder.task(SNAPSHOT, &[MERGE], move |inputs| {
            Ok(Artifact::Snapshot(write_parquet_snapshot(
                &dir,
                &name,
                input(inputs, 0)?,
            )?))
        });
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DagConfig, DbTarget};
    use crate::dag::TaskState;
    use crate::duck;
    use crate::load::{load_raw_data, LoadMode};
    use crate::table::{read_csv, read_csv_from, Value};
    use std::{fs, io::Cursor, time::Duration};
    use tempfile::TempDir;

    const TRACKS: &str = "\
,track_id,artists,album_name,track_name,popularity,duration_ms,explicit,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,time_signature,track_genre
0,t1,Billie Eilish,WHEN WE ALL FALL ASLEEP,bad guy,85,194087,False,0.701,0.425,7,-10.965,1,0.375,0.328,0.13,0.1,0.562,135.128,4,electropop
1,t2,Adele,25,Hello,70,295502,False,0.481,0.451,5,-6.134,0,0.0347,0.336,0.0,0.0872,0.289,157.98,4,pop
2,t3,Nobody,Nothing,Quiet Song,5,100000,False,0.5,0.1,1,-20.0,1,0.03,0.9,0.8,0.95,0.7,80.0,3,sleep
";

    const NOMINATIONS: &str = "\
year,title,published_at,updated_at,category,nominee,artist,workers,img,winner
2019,62nd Annual GRAMMY Awards,2020-05-19T05:10:28-07:00,2020-05-19T05:10:28-07:00,Song Of The Year,Bad Guy,Billie Eilish,\"Billie Eilish O'Connell & Finneas O'Connell, songwriters (Billie Eilish)\",https://img,True
2016,59th Annual GRAMMY Awards,2017-05-19T05:10:28-07:00,2017-05-19T05:10:28-07:00,Record Of The Year,Hello,Adele,\"Greg Kurstin, producer\",https://img,True
";

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::new("awardsetl=debug"))
            .try_init();
    }

    fn setup() -> Result<(TempDir, Config)> {
        init_logging();
        let dir = tempfile::tempdir()?;
        let tracks = dir.path().join("spotify_dataset.csv");
        fs::write(&tracks, TRACKS)?;

        let db = DbTarget::File(dir.path().join("warehouse.duckdb"));
        let raw = read_csv_from(Cursor::new(NOMINATIONS))?;
        load_raw_data(&db, &raw, "grammy_awards_raw")?;

        let cfg = Config {
            db,
            tracks_source: tracks.display().to_string(),
            nominations_table: "grammy_awards_raw".into(),
            merged_table: "merged_data".into(),
            load_mode: LoadMode::Replace,
            export: Some(ExportTarget::Local(dir.path().join("export"))),
            snapshot_dir: Some(dir.path().join("snapshots")),
            dag: DagConfig {
                retries: 0,
                retry_delay: Duration::from_millis(1),
                max_parallel: 4,
            },
            schedule_interval: Duration::from_secs(60),
        };
        Ok((dir, cfg))
    }

    #[test]
    fn graph_shape_follows_config() -> Result<()> {
        let (_dir, mut cfg) = setup()?;
        let dag = build_pipeline(&cfg)?;
        let ids: Vec<_> = dag.task_ids().collect();
        assert_eq!(
            ids,
            vec![
                SPOTIFY_EXTRACTION,
                GRAMMYS_EXTRACTION,
                SPOTIFY_TRANSFORMATION,
                GRAMMYS_TRANSFORMATION,
                MERGE,
                LOAD,
                STORE,
                SNAPSHOT
            ]
        );
        assert_eq!(
            dag.upstream_of(MERGE),
            Some(&[SPOTIFY_TRANSFORMATION.to_string(), GRAMMYS_TRANSFORMATION.to_string()][..])
        );

        cfg.export = None;
        cfg.snapshot_dir = None;
        let dag = build_pipeline(&cfg)?;
        assert_eq!(dag.task_ids().last(), Some(LOAD));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn end_to_end_run() -> Result<()> {
        let (dir, cfg) = setup()?;
        let report = build_pipeline(&cfg)?.run(&cfg.dag).await;
        assert!(report.succeeded(), "{:?}", report);

        let conn = duck::connect(&cfg.db)?;
        let loaded = duck::read_table(&conn, "merged_data")?;
        assert_eq!(loaded.num_rows(), 3);
        assert_eq!(loaded.columns()[0], "id");
        assert!(!loaded.has_column("nominee"));

        let exported = read_csv(dir.path().join("export").join("merged_data.csv"))?;
        assert_eq!(exported.num_rows(), 3);
        let nominated: Vec<_> = exported.column("is_nominated")?.cloned().collect();
        assert_eq!(
            nominated,
            vec![Value::Bool(true), Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(
            exported.value(2, "category")?,
            &Value::from("Not applicable")
        );

        assert!(dir.path().join("snapshots").join("merged_data").is_dir());

        // a second daily run replaces the table instead of piling up rows
        let again = build_pipeline(&cfg)?.run(&cfg.dag).await;
        assert!(again.succeeded());
        let conn = duck::connect(&cfg.db)?;
        assert_eq!(duck::read_table(&conn, "merged_data")?.num_rows(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_skips_downstream() -> Result<()> {
        let (_dir, mut cfg) = setup()?;
        cfg.tracks_source = "/no/such/spotify.csv".into();
        let report = build_pipeline(&cfg)?.run(&cfg.dag).await;

        let state = |id: &str| report.task(id).map(|t| t.state);
        assert_eq!(state(SPOTIFY_EXTRACTION), Some(TaskState::Failed));
        assert_eq!(state(GRAMMYS_EXTRACTION), Some(TaskState::Success));
        assert_eq!(state(GRAMMYS_TRANSFORMATION), Some(TaskState::Success));
        for id in [SPOTIFY_TRANSFORMATION, MERGE, LOAD, STORE, SNAPSHOT] {
            assert_eq!(state(id), Some(TaskState::UpstreamFailed), "{}", id);
        }
        Ok(())
    }
}
