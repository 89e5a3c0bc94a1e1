//! CSV adapter.
//!
//! Registers the file directly with the engine under an all-text schema, so
//! typing is decided by the validation casts rather than by inference. The
//! header row is sniffed up front to build the schema and to fail fast on
//! unreadable files.

use std::path::Path;

use arrow_schema::{DataType, Field, Schema};
use datafusion::prelude::CsvReadOptions;
use datavet_engine::Session;
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::LoadDiagnostics;

/// Reads the header row.
pub fn sniff_headers(path: &Path, delimiter: u8) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| AdapterError::Open(format!("csv open: {e}")))?;
    let headers = reader
        .headers()
        .map_err(|e| AdapterError::Open(format!("csv header: {e}")))?;
    Ok(headers.iter().map(String::from).collect())
}

/// Registers `path` as `relation` with every column nullable text.
pub async fn load_csv(
    session: &Session,
    path: &Path,
    relation: &str,
    delimiter: Option<u8>,
) -> Result<LoadDiagnostics> {
    let delimiter = delimiter.unwrap_or(b',');
    let headers = sniff_headers(path, delimiter)?;
    if headers.is_empty() {
        return Err(AdapterError::Open("csv has no header row".to_string()));
    }

    let fields: Vec<Field> = headers
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    let schema = Schema::new(fields);

    // The extension filter must match the staged file's actual name.
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let options = CsvReadOptions::new()
        .has_header(true)
        .delimiter(delimiter)
        .schema(&schema)
        .file_extension(&extension);

    session
        .ctx()
        .register_csv(relation, path.to_string_lossy().as_ref(), options)
        .await?;

    debug!(path = %path.display(), columns = headers.len(), "csv registered");
    Ok(LoadDiagnostics {
        mode: "register_csv".to_string(),
        selected_columns: Some(headers),
        delimiter: Some((delimiter as char).to_string()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_load_csv_all_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "id,name\n1,alpha\n2,\n").unwrap();

        let session = Session::new();
        let diag = load_csv(&session, &path, "v_raw", None).await.unwrap();
        assert_eq!(diag.mode, "register_csv");
        assert_eq!(
            diag.selected_columns.as_deref(),
            Some(&["id".to_string(), "name".to_string()][..])
        );

        assert_eq!(session.count_rows("v_raw").await.unwrap(), 2);
        let cols = session.columns("v_raw").await.unwrap();
        assert!(cols.iter().all(|(_, t)| *t == DataType::Utf8));
    }

    #[tokio::test]
    async fn test_load_csv_custom_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "a;b\n1;2\n").unwrap();

        let session = Session::new();
        let diag = load_csv(&session, &path, "v_raw", Some(b';')).await.unwrap();
        assert_eq!(diag.delimiter.as_deref(), Some(";"));
        let cols = session.columns("v_raw").await.unwrap();
        assert_eq!(cols[0].0, "a");
        assert_eq!(cols[1].0, "b");
    }

    #[test]
    fn test_sniff_missing_file() {
        let err = sniff_headers(Path::new("/no/such.csv"), b',').unwrap_err();
        assert!(matches!(err, AdapterError::Open(_)));
    }
}
