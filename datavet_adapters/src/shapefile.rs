//! Shapefile adapter.
//!
//! A shapefile is a multi-file bundle: `.shp` (geometry), `.shx` (index),
//! `.dbf` (attributes). Attributes and geometry are read in lockstep and
//! staged as text batches, with geometry carried as hex-encoded WKB under a
//! `geometry` column for normalization to coerce.

use std::path::Path;

use geozero::{CoordDimensions, ToWkb};
use shapefile::dbase::{self, FieldValue};
use shapefile::Shape;
use datavet_engine::Session;
use tracing::debug;

use crate::chunk::{LoadOptions, TextBatcher};
use crate::error::{AdapterError, Result};
use crate::LoadDiagnostics;

/// Column the staged geometry lands under.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Structural problems with the bundle: missing sidecars, unreadable
/// headers. Empty means the bundle opens.
pub fn integrity_errors(path: &Path) -> Vec<String> {
    let mut errors = Vec::new();
    for ext in ["shp", "shx", "dbf"] {
        if !sidecar_exists(path, ext) {
            errors.push(format!("missing_sidecar:.{ext}"));
        }
    }
    if errors.is_empty()
        && let Err(err) = shapefile::Reader::from_path(path)
    {
        errors.push(format!("read_info_failed: {err}"));
    }
    errors
}

/// Attribute field names from the `.dbf` sidecar, in table order.
pub fn field_names(path: &Path) -> Result<Vec<String>> {
    let dbf = path.with_extension("dbf");
    let reader = dbase::Reader::from_path(&dbf)
        .map_err(|e| AdapterError::Open(format!("dbf open: {e}")))?;
    Ok(reader
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect())
}

/// Loads the bundle at `path` (its `.shp`) as `relation`. `needed` narrows
/// the attribute columns; geometry is always carried.
pub async fn load_shapefile(
    session: &Session,
    path: &Path,
    relation: &str,
    needed: Option<&[String]>,
    options: &LoadOptions,
) -> Result<LoadDiagnostics> {
    let fields = field_names(path)?;
    let selected: Vec<String> = match needed {
        Some(needed) => {
            let narrowed: Vec<String> = fields
                .iter()
                .filter(|f| needed.iter().any(|n| n.eq_ignore_ascii_case(f)))
                .cloned()
                .collect();
            if narrowed.is_empty() { fields.clone() } else { narrowed }
        }
        None => fields.clone(),
    };
    let mut staged_columns = selected.clone();
    staged_columns.push(GEOMETRY_COLUMN.to_string());

    let mut reader = shapefile::Reader::from_path(path)?;
    let mut batcher = TextBatcher::new();
    let fresh = || vec![Vec::new(); staged_columns.len()];
    let mut columns: Vec<Vec<Option<String>>> = fresh();
    let mut pending: usize = 0;

    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item?;
        for (i, field) in selected.iter().enumerate() {
            columns[i].push(record.get(field).and_then(field_value_to_text));
        }
        columns[selected.len()].push(shape_to_wkb_hex(shape));
        pending += 1;

        if pending >= options.batch_rows {
            options.check_deadline()?;
            batcher.push_chunk(&staged_columns, std::mem::replace(&mut columns, fresh()))?;
            pending = 0;
        }
    }
    if pending > 0 {
        batcher.push_chunk(&staged_columns, columns)?;
    }

    let rows = batcher.rows();
    batcher.register(session, relation, &staged_columns)?;
    debug!(path = %path.display(), rows, "shapefile staged");
    Ok(LoadDiagnostics {
        mode: "paged_read".to_string(),
        selected_columns: Some(staged_columns),
        rows_copied: Some(rows),
        ..Default::default()
    })
}

fn sidecar_exists(path: &Path, ext: &str) -> bool {
    path.with_extension(ext).is_file() || path.with_extension(ext.to_uppercase()).is_file()
}

/// Text rendering for attribute values; unset values become NULL.
fn field_value_to_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(v) => v.clone(),
        FieldValue::Numeric(v) => v.map(|f| f.to_string()),
        FieldValue::Float(v) => v.map(|f| f.to_string()),
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Logical(v) => v.map(|b| b.to_string()),
        FieldValue::Currency(f) | FieldValue::Double(f) => Some(f.to_string()),
        FieldValue::Date(v) => {
            v.map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        FieldValue::Memo(s) => Some(s.clone()),
        FieldValue::DateTime(dt) => {
            let (date, time) = (dt.date(), dt.time());
            Some(format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                date.year(),
                date.month(),
                date.day(),
                time.hours(),
                time.minutes(),
                time.seconds()
            ))
        }
    }
}

/// Converts a shape to hex-encoded WKB; null and unconvertible shapes stage
/// as NULL geometry.
fn shape_to_wkb_hex(shape: Shape) -> Option<String> {
    if matches!(shape, Shape::NullShape) {
        return None;
    }
    let geometry: geo_types::Geometry<f64> = shape.try_into().ok()?;
    let wkb = geometry.to_wkb(CoordDimensions::xy()).ok()?;
    Some(hex::encode(wkb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shapefile::dbase::TableWriterBuilder;

    fn write_fixture(path: &Path) {
        let table = TableWriterBuilder::new()
            .add_character_field("name".try_into().unwrap(), 20)
            .add_numeric_field("area".try_into().unwrap(), 10, 2);
        let mut writer = shapefile::Writer::from_path(path, table).unwrap();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let mut record = dbase::Record::default();
            record.insert(
                "name".to_string(),
                FieldValue::Character(Some(name.to_string())),
            );
            record.insert("area".to_string(), FieldValue::Numeric(Some(i as f64 + 0.5)));
            let point = shapefile::Point::new(i as f64, i as f64 * 2.0);
            writer.write_shape_and_record(&point, &record).unwrap();
        }
    }

    #[test]
    fn test_integrity_reports_missing_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("lonely.shp");
        std::fs::write(&shp, b"stub").unwrap();

        let errors = integrity_errors(&shp);
        assert!(errors.contains(&"missing_sidecar:.shx".to_string()));
        assert!(errors.contains(&"missing_sidecar:.dbf".to_string()));
    }

    #[test]
    fn test_integrity_sound_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("parcels.shp");
        write_fixture(&shp);
        assert!(integrity_errors(&shp).is_empty());
    }

    #[test]
    fn test_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("parcels.shp");
        write_fixture(&shp);
        assert_eq!(field_names(&shp).unwrap(), vec!["name", "area"]);
    }

    #[tokio::test]
    async fn test_load_stages_attributes_and_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("parcels.shp");
        write_fixture(&shp);

        let session = Session::new();
        let diag = load_shapefile(&session, &shp, "v_raw", None, &LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(diag.mode, "paged_read");
        assert_eq!(diag.rows_copied, Some(3));

        assert_eq!(session.count_rows("v_raw").await.unwrap(), 3);
        let cols = session.columns("v_raw").await.unwrap();
        let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "area", GEOMETRY_COLUMN]);

        let with_geometry = session
            .scalar_count("SELECT COUNT(*) FROM v_raw WHERE \"geometry\" IS NOT NULL")
            .await
            .unwrap();
        assert_eq!(with_geometry, 3);
    }

    #[tokio::test]
    async fn test_small_batches_preserve_rows() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("parcels.shp");
        write_fixture(&shp);

        let session = Session::new();
        let options = LoadOptions {
            batch_rows: 1,
            ..Default::default()
        };
        let diag = load_shapefile(&session, &shp, "v_raw", None, &options)
            .await
            .unwrap();
        assert_eq!(diag.rows_copied, Some(3));
        assert_eq!(session.count_rows("v_raw").await.unwrap(), 3);
    }

    #[test]
    fn test_field_value_rendering() {
        assert_eq!(
            field_value_to_text(&FieldValue::Character(Some("x".into()))),
            Some("x".to_string())
        );
        assert_eq!(field_value_to_text(&FieldValue::Character(None)), None);
        assert_eq!(
            field_value_to_text(&FieldValue::Integer(7)),
            Some("7".to_string())
        );
        assert_eq!(
            field_value_to_text(&FieldValue::Logical(Some(true))),
            Some("true".to_string())
        );
    }
}
