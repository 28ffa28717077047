use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::table::{Table, Value};

/// Suffix for nominations columns that collide with a tracks column.
const RIGHT_SUFFIX: &str = "_grammys";

/// Sentinel for titles and categories of tracks without a nomination.
pub const NOT_APPLICABLE: &str = "Not applicable";

const DROPPED_AFTER_MERGE: &[&str] = &[
    "year",
    "artist",
    "nominee",
    "nominee_clean",
    "track_name_clean",
];

/// Join key: lower-cased, trimmed text. Nulls and non-text never match.
fn clean_key(v: &Value) -> Option<String> {
    v.as_str().map(|s| s.trim().to_lowercase())
}

/// Left-join tracks with nominations on `track_name` ≈ `nominee`, fill the
/// nomination columns of unmatched tracks and number the rows in `id`.
#[instrument(level = "info", skip_all)]
pub fn merge_datasets(tracks: &Table, nominations: &Table) -> Result<Table> {
    info!("Starting dataset merge.");
    info!(
        "Initial tracks dataset has {} rows and {} columns.",
        tracks.num_rows(),
        tracks.num_columns()
    );
    info!(
        "Initial nominations dataset has {} rows and {} columns.",
        nominations.num_rows(),
        nominations.num_columns()
    );

    let left_key = tracks.column_index("track_name")?;
    let right_key = nominations.column_index("nominee")?;

    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in nominations.rows().iter().enumerate() {
        if let Some(k) = clean_key(&row[right_key]) {
            by_key.entry(k).or_default().push(i);
        }
    }

    let mut columns: Vec<String> = tracks.columns().to_vec();
    for name in nominations.columns() {
        if tracks.has_column(name) {
            columns.push(format!("{}{}", name, RIGHT_SUFFIX));
        } else {
            columns.push(name.clone());
        }
    }

    let right_width = nominations.num_columns();
    let mut merged = Table::new(columns);
    for left in tracks.rows() {
        let matches = clean_key(&left[left_key]).and_then(|k| by_key.get(&k));
        match matches {
            Some(idxs) => {
                for &i in idxs {
                    let mut row = left.clone();
                    row.extend(nominations.rows()[i].iter().cloned());
                    merged.push_row(row)?;
                }
            }
            None => {
                let mut row = left.clone();
                row.extend(std::iter::repeat(Value::Null).take(right_width));
                merged.push_row(row)?;
            }
        }
    }

    merged.fill_nulls("title", NOT_APPLICABLE.into())?;
    merged.fill_nulls("category", NOT_APPLICABLE.into())?;
    merged.fill_nulls("is_nominated", Value::Bool(false))?;

    merged.drop_columns_if_present(DROPPED_AFTER_MERGE);

    let ids = (0..merged.num_rows() as i64).map(Value::Int).collect();
    merged.insert_column(0, "id", ids)?;

    info!(
        "Merge process completed. The final dataset has {} rows and {} columns.",
        merged.num_rows(),
        merged.num_columns()
    );
    Ok(merged)
}
