use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::{fs::File, io::Read, path::Path};
use tracing::debug;

use super::infer::{derive_kind, parse_cell};
use super::Table;

/// Read a headed CSV file into a [`Table`], inferring each column's kind.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_csv_from(file).with_context(|| format!("reading CSV {}", path.display()))
}

/// Read headed CSV from any reader.
pub fn read_csv_from<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("reading CSV header")?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut raw: Vec<csv::StringRecord> = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        // idx + 2: one for the header, one for 1-based line numbers
        let record = result.with_context(|| format!("CSV parse error at record {}", idx + 2))?;
        raw.push(record);
    }

    let kinds: Vec<_> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| derive_kind(name, raw.iter().map(|r| r.get(i).unwrap_or(""))))
        .collect();
    debug!(columns = headers.len(), rows = raw.len(), "parsed CSV");

    let rows = raw
        .iter()
        .map(|r| {
            kinds
                .iter()
                .enumerate()
                .map(|(i, k)| parse_cell(*k, r.get(i).unwrap_or("")))
                .collect()
        })
        .collect();

    Table::from_rows(headers, rows)
}

/// Serialize a table as CSV: header row, then one record per row.
pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut wtr = WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.into_inner().context("flushing CSV buffer")
}

pub fn write_csv<P: AsRef<Path>>(path: P, table: &Table) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_csv_bytes(table)?;
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}
