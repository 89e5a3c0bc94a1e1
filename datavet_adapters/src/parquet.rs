//! Parquet adapter.
//!
//! The footer is probed before registration; a truncated or garbage file is
//! reported as corruption instead of surfacing later as a planning error.
//! Registration hands the file to the engine as-is, native types included.

use std::fs::File;
use std::path::Path;

use datafusion::parquet::file::reader::{FileReader, SerializedFileReader};
use datafusion::prelude::ParquetReadOptions;
use datavet_engine::Session;
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::LoadDiagnostics;

/// Footer metadata of a parquet file.
#[derive(Debug, Clone, Copy)]
pub struct ParquetProbe {
    pub num_rows: i64,
    pub num_row_groups: usize,
}

/// Reads the footer; fails on anything that is not a structurally sound
/// parquet file.
pub fn probe_metadata(path: &Path) -> Result<ParquetProbe> {
    let file =
        File::open(path).map_err(|e| AdapterError::Open(format!("parquet open: {e}")))?;
    let reader = SerializedFileReader::new(file)
        .map_err(|e| AdapterError::Open(format!("parquet_metadata: {e}")))?;
    let metadata = reader.metadata();
    Ok(ParquetProbe {
        num_rows: metadata.file_metadata().num_rows(),
        num_row_groups: metadata.num_row_groups(),
    })
}

/// Registers `path` as `relation` with its native column types.
pub async fn load_parquet(session: &Session, path: &Path, relation: &str) -> Result<LoadDiagnostics> {
    session
        .ctx()
        .register_parquet(
            relation,
            path.to_string_lossy().as_ref(),
            ParquetReadOptions::default(),
        )
        .await?;
    debug!(path = %path.display(), "parquet registered");
    Ok(LoadDiagnostics {
        mode: "register_parquet".to_string(),
        ..Default::default()
    })
}
