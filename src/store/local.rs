// src/store/local.rs

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use tracing::info;

use super::Exporter;
use crate::table::{write_csv, Table};

/// Writes exports as CSV files under a directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for LocalStore {
    fn store(&self, title: &str, table: &Table) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating export dir {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.csv", title));
        write_csv(&path, table)?;
        info!(path = %path.display(), rows = table.num_rows(), "File {} exported.", title);
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{read_csv, Value};

    #[test]
    fn writes_csv_under_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalStore::new(dir.path().join("out"));
        let t = Table::from_rows(
            vec!["id".into(), "track_name".into()],
            vec![vec![Value::Int(0), "Hello".into()]],
        )?;

        let location = store.store("merged_data", &t)?;
        assert!(location.ends_with("merged_data.csv"));
        assert_eq!(read_csv(dir.path().join("out").join("merged_data.csv"))?, t);

        // a second export overwrites the first
        store.store("merged_data", &Table::new(vec!["id".into()]))?;
        let back = read_csv(dir.path().join("out").join("merged_data.csv"))?;
        assert_eq!(back.num_rows(), 0);
        Ok(())
    }
}
