// src/store/mod.rs

pub mod gcs;
pub mod local;
pub mod snapshot;

use anyhow::Result;

use crate::table::Table;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use snapshot::write_parquet_snapshot;

/// Content type of exported objects.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Somewhere a finished dataset can be published as CSV.
pub trait Exporter: Send + Sync {
    /// Publish `table` as `<title>.csv`, returning where it landed.
    fn store(&self, title: &str, table: &Table) -> Result<String>;
}
