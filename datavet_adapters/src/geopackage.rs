//! GeoPackage adapter.
//!
//! A GeoPackage is a SQLite container with a `gpkg_contents` catalog. The
//! preferred load path is a zero-copy catalog attach; when the engine build
//! cannot attach SQLite (see [`datavet_engine::Capabilities`]) the layer is
//! copied into the engine in bounded chunks, all values as text and blobs
//! hex-encoded, with geometry coercion left to normalization.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use datavet_engine::{Capabilities, Session};
use tracing::{debug, warn};

use crate::chunk::{LoadOptions, TextBatcher};
use crate::error::{AdapterError, Result};
use crate::LoadDiagnostics;

/// How a SQLite-backed container reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Zero-copy foreign catalog attach
    DirectAttach,
    /// Bounded LIMIT/OFFSET copy into an in-memory relation
    ChunkedCopy,
}

/// Picks the load strategy from the session capabilities. The reason for a
/// fallback is returned so diagnostics can carry it.
pub fn select_strategy(capabilities: &Capabilities) -> (LoadStrategy, Option<String>) {
    if capabilities.sqlite_catalog {
        (LoadStrategy::DirectAttach, None)
    } else {
        (
            LoadStrategy::ChunkedCopy,
            capabilities.sqlite_catalog_reason.clone(),
        )
    }
}

/// Runs SQLite's integrity probe. Returns raised findings, or the open
/// error itself when the file is not a database at all.
pub fn quick_check(path: &Path) -> Vec<String> {
    let conn = match open_read_only(path) {
        Ok(conn) => conn,
        Err(err) => return vec![err.to_string()],
    };
    let probe = || -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare("PRAGMA quick_check")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut findings = Vec::new();
        for row in rows {
            let line = row?;
            if line != "ok" {
                findings.push(line);
            }
        }
        Ok(findings)
    };
    match probe() {
        Ok(findings) => findings,
        Err(err) => vec![format!("quick_check failed: {err}")],
    }
}

/// Feature and attribute layers from the `gpkg_contents` catalog. Falls back
/// to plain user tables for SQLite files without the catalog.
pub fn list_layers(path: &Path) -> Result<Vec<String>> {
    let conn = open_read_only(path)?;
    let from_catalog = conn
        .prepare(
            "SELECT table_name FROM gpkg_contents \
             WHERE data_type IN ('features', 'attributes') ORDER BY table_name",
        )
        .and_then(|mut stmt| {
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()
        });
    if let Ok(layers) = from_catalog {
        return Ok(layers);
    }

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' AND name NOT LIKE 'gpkg_%' \
         AND name NOT LIKE 'rtree_%' ORDER BY name",
    )?;
    let layers = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(layers)
}

/// Column names of `layer`, in table order.
pub fn table_columns(path: &Path, layer: &str) -> Result<Vec<String>> {
    let conn = open_read_only(path)?;
    columns_of(&conn, layer)
}

/// Loads `layer` from `path` as `relation`. `needed` narrows the copy to
/// the template's columns when they intersect the table.
pub async fn load_geopackage(
    session: &Session,
    path: &Path,
    layer: &str,
    relation: &str,
    needed: Option<&[String]>,
    options: &LoadOptions,
) -> Result<LoadDiagnostics> {
    let (strategy, fallback_reason) = select_strategy(session.capabilities());
    if strategy == LoadStrategy::DirectAttach {
        // Capability probing never grants this in the current engine build.
        return Err(AdapterError::Open(
            "sqlite catalog attach selected but no provider is available".to_string(),
        ));
    }
    if let Some(reason) = &fallback_reason {
        debug!(layer, reason, "geopackage loaded by chunked copy");
    }

    let conn = open_read_only(path)?;
    let present = columns_of(&conn, layer)?;
    let selected: Vec<String> = match needed {
        Some(needed) => {
            let narrowed: Vec<String> = present
                .iter()
                .filter(|c| needed.iter().any(|n| n.eq_ignore_ascii_case(c)))
                .cloned()
                .collect();
            if narrowed.is_empty() { present.clone() } else { narrowed }
        }
        None => present.clone(),
    };

    let select_list = selected
        .iter()
        .map(|c| quote_sqlite(c))
        .collect::<Vec<_>>()
        .join(", ");
    let table = quote_sqlite(layer);
    let total: Option<u64> = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .ok();

    let mut batcher = TextBatcher::new();
    let mut offset: u64 = 0;
    loop {
        options.check_deadline()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {select_list} FROM {table} LIMIT {} OFFSET {offset}",
            options.batch_rows
        ))?;
        let mut rows = stmt.query([])?;
        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); selected.len()];
        let mut chunk_rows: u64 = 0;
        while let Some(row) = rows.next()? {
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(value_to_text(row.get_ref(i)?));
            }
            chunk_rows += 1;
        }
        if chunk_rows == 0 {
            break;
        }
        batcher.push_chunk(&selected, columns)?;
        offset += chunk_rows;
        if total.is_some_and(|t| offset >= t) {
            break;
        }
    }

    if let Some(total) = total
        && batcher.rows() != total
    {
        warn!(
            layer,
            copied = batcher.rows(),
            total,
            "row count changed while copying"
        );
    }

    let copied = batcher.rows();
    batcher.register(session, relation, &selected)?;
    Ok(LoadDiagnostics {
        mode: "chunked_copy".to_string(),
        selected_columns: Some(selected),
        rows_copied: Some(copied),
        direct_attach_unavailable: fallback_reason,
        ..Default::default()
    })
}

fn open_read_only(path: &Path) -> std::result::Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn columns_of(conn: &Connection, layer: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_sqlite(layer)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    if names.is_empty() {
        return Err(AdapterError::Open(format!("no such layer: {layer}")));
    }
    Ok(names)
}

fn quote_sqlite(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Text rendering used during the copy. Blobs travel hex-encoded so they
/// survive the all-text relation and can be coerced back by normalization.
fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gpkg_contents (table_name TEXT, data_type TEXT);
             INSERT INTO gpkg_contents VALUES ('parcels', 'features');
             CREATE TABLE parcels (fid INTEGER, name TEXT, geom BLOB);
             INSERT INTO parcels VALUES (1, 'a', X'0102');
             INSERT INTO parcels VALUES (2, NULL, NULL);
             INSERT INTO parcels VALUES (3, 'c', X'0304');
             CREATE TABLE empty_layer (fid INTEGER, v TEXT);
             INSERT INTO gpkg_contents VALUES ('empty_layer', 'attributes');",
        )
        .unwrap();
    }

    #[test]
    fn test_list_layers_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gpkg");
        fixture(&path);
        assert_eq!(list_layers(&path).unwrap(), vec!["empty_layer", "parcels"]);
    }

    #[test]
    fn test_quick_check_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.gpkg");
        std::fs::write(&path, b"definitely not sqlite").unwrap();
        assert!(!quick_check(&path).is_empty());
    }

    #[test]
    fn test_quick_check_sound_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gpkg");
        fixture(&path);
        assert!(quick_check(&path).is_empty());
    }

    #[test]
    fn test_strategy_falls_back_with_reason() {
        let session = Session::new();
        let (strategy, reason) = select_strategy(session.capabilities());
        assert_eq!(strategy, LoadStrategy::ChunkedCopy);
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn test_chunked_copy_small_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gpkg");
        fixture(&path);

        let session = Session::new();
        let options = LoadOptions {
            batch_rows: 2,
            ..Default::default()
        };
        let diag = load_geopackage(&session, &path, "parcels", "v_raw", None, &options)
            .await
            .unwrap();

        assert_eq!(diag.mode, "chunked_copy");
        assert_eq!(diag.rows_copied, Some(3));
        assert_eq!(session.count_rows("v_raw").await.unwrap(), 3);

        // Blobs arrive hex-encoded.
        let hexed = session
            .scalar_count("SELECT COUNT(*) FROM v_raw WHERE \"geom\" = '0102'")
            .await
            .unwrap();
        assert_eq!(hexed, 1);
    }

    #[tokio::test]
    async fn test_needed_columns_narrow_the_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gpkg");
        fixture(&path);

        let session = Session::new();
        let needed = vec!["name".to_string(), "not_there".to_string()];
        let diag = load_geopackage(
            &session,
            &path,
            "parcels",
            "v_raw",
            Some(&needed),
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(diag.selected_columns.as_deref(), Some(&["name".to_string()][..]));
        assert_eq!(session.columns("v_raw").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_layer_registers_empty_relation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gpkg");
        fixture(&path);

        let session = Session::new();
        let diag = load_geopackage(
            &session,
            &path,
            "empty_layer",
            "v_raw",
            None,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(diag.rows_copied, Some(0));
        assert_eq!(session.count_rows("v_raw").await.unwrap(), 0);
        assert_eq!(session.columns("v_raw").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_layer_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gpkg");
        fixture(&path);

        let session = Session::new();
        let err = load_geopackage(
            &session,
            &path,
            "nope",
            "v_raw",
            None,
            &LoadOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no such layer"));
    }
}
