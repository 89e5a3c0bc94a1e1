//! # Datavet Adapters
//!
//! Gets heterogeneous sources into the validation engine: archive staging,
//! format detection, and one loader per source family. Every loader ends
//! the same way, with the raw relation registered in the session, so the
//! pipeline downstream of loading is format-agnostic.
//!
//! Native columnar sources (CSV, Parquet) register directly. Sources the
//! engine cannot scan (GeoPackage layers, shapefiles) are staged as
//! bounded all-text batches; see [`chunk`].

use serde::{Deserialize, Serialize};

pub mod chunk;
pub mod csv;
pub mod error;
pub mod format;
pub mod geopackage;
pub mod parquet;
pub mod shapefile;
pub mod stage;

pub use chunk::{DEFAULT_BATCH_ROWS, LoadOptions};
pub use error::{AdapterError, Result, UnpackError};
pub use format::InputFormat;
pub use stage::{StagedInput, stage_input};

/// What a loader did, merged into report diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadDiagnostics {
    /// Load path taken (`register_csv`, `register_parquet`, `chunked_copy`,
    /// `paged_read`)
    pub mode: String,

    /// Columns actually staged, when the loader narrows or fixes them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_columns: Option<Vec<String>>,

    /// Rows copied by a fallback load path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_copied: Option<u64>,

    /// Why the zero-copy attach path was not taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_attach_unavailable: Option<String>,

    /// Delimiter used for CSV sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}
