// src/store/snapshot.rs

use anyhow::{Context, Result};
use chrono::Utc;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::schema::{build_record_batch, derive_columns};
use crate::table::Table;

/// Write `table` to `<dir>/<name>/date=YYYYMMDD/<name>_<micros>.parquet`.
///
/// The file is written under a `.tmp` name and renamed into place, so a
/// partition never holds a half-written snapshot.
pub fn write_parquet_snapshot(dir: &Path, name: &str, table: &Table) -> Result<PathBuf> {
    let cols = derive_columns(table, true)?;
    let batch = build_record_batch(table, &cols)?;

    let now = Utc::now();
    let partition = dir
        .join(name)
        .join(format!("date={}", now.format("%Y%m%d")));
    fs::create_dir_all(&partition)
        .with_context(|| format!("creating snapshot dir {}", partition.display()))?;

    let fname = format!("{}_{}.parquet", name, now.timestamp_micros());
    let tmp = partition.join(format!("{}.tmp", fname));
    let final_path = partition.join(&fname);

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(&batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;
    fs::rename(&tmp, &final_path)?;

    info!(path = %final_path.display(), rows = table.num_rows(), "snapshot written");
    Ok(final_path)
}
