// src/extract/mod.rs

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use std::{io::Cursor, path::Path};
use tracing::{info, instrument};
use url::Url;

use crate::config::DbTarget;
use crate::duck;
use crate::table::{self, Table};

/// Where the tracks CSV comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(std::path::PathBuf),
    Url(Url),
}

impl Source {
    /// `http(s)://…` parses as a URL, anything else is a local path.
    pub fn parse(raw: &str) -> Source {
        match Url::parse(raw) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Source::Url(u),
            _ => Source::Path(raw.into()),
        }
    }
}

/// Download the given URL into memory.
pub fn download(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let resp = client
        .get(url.clone())
        .send()
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    let bytes = resp
        .bytes()
        .with_context(|| format!("reading body from {}", url))?;
    Ok(bytes.to_vec())
}

/// Extract the tracks dataset from a CSV path or URL.
#[instrument(level = "info")]
pub fn extract_tracks(source: &str) -> Result<Table> {
    let table = match Source::parse(source) {
        Source::Path(path) => {
            if !Path::new(&path).exists() {
                bail!(
                    "file not found: {}. Make sure you entered the correct path.",
                    path.display()
                );
            }
            table::read_csv(&path)?
        }
        Source::Url(url) => {
            let body = download(&Client::new(), &url)?;
            table::read_csv_from(Cursor::new(body))
                .with_context(|| format!("reading CSV from {}", url))?
        }
    };
    let (rows, cols) = table.shape();
    info!(rows, cols, "Data extracted from {}.", source);
    Ok(table)
}

/// Extract the raw nominations table from the database.
#[instrument(level = "info", skip(db))]
pub fn extract_nominations(db: &DbTarget, table_name: &str) -> Result<Table> {
    info!("Extracting data from the {} table.", table_name);
    let conn = duck::connect(db)?;
    let table = duck::read_table(&conn, table_name)
        .with_context(|| format!("extracting data from the {} table", table_name))?;
    let (rows, cols) = table.shape();
    info!(rows, cols, "Data extracted from the {} table.", table_name);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load_raw_data;
    use crate::table::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn source_detection() {
        assert!(matches!(
            Source::parse("https://example.com/tracks.csv"),
            Source::Url(_)
        ));
        assert!(matches!(Source::parse("./data/spotify_dataset.csv"), Source::Path(_)));
        assert!(matches!(Source::parse("C:/data/x.csv"), Source::Path(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = extract_tracks("/definitely/not/here.csv").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn extracts_tracks_from_file() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        write!(tmp, ",track_id,popularity\n0,a,10\n1,b,20\n")?;
        let t = extract_tracks(&tmp.path().to_string_lossy())?;
        assert_eq!(t.shape(), (2, 3));
        assert_eq!(t.value(1, "popularity")?, &Value::Int(20));
        Ok(())
    }

    #[test]
    fn extracts_nominations_table() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = DbTarget::File(dir.path().join("raw.duckdb"));
        let raw = Table::from_rows(
            vec!["year".into(), "nominee".into()],
            vec![vec![Value::Int(2019), "Bad Guy".into()]],
        )?;
        load_raw_data(&db, &raw, "grammy_awards_raw")?;

        let t = extract_nominations(&db, "grammy_awards_raw")?;
        assert_eq!(t, raw);
        assert!(extract_nominations(&db, "missing_table").is_err());
        Ok(())
    }
}
