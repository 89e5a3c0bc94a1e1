//! The validation engine.
//!
//! Runs every template check against a registered relation as aggregate SQL
//! and folds the findings into an [`EngineResult`]. Checks are independent;
//! a failing check never short-circuits the rest, so a single run reports
//! everything it can.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int32Type, Int64Type, UInt64Type};
use arrow_array::{Array, ArrayRef};
use arrow_schema::DataType;
use datafusion::arrow::util::display::array_value_to_string;
use serde_json::Value;
use tracing::debug;

use datavet_core::{ColumnSpec, DtypeMismatchDetail, EngineResult, Issue, Template};

use crate::error::Result;
use crate::geom::is_geometry_type;
use crate::session::Session;
use crate::sql::{is_text_type, null_predicate, quote_ident, quote_literal, sql_type, value_as_text};

/// Validates `relation` against `template` and returns the aggregated
/// findings. The relation is expected to be geometry-normalized already.
pub async fn validate(
    session: &Session,
    relation: &str,
    template: &Template,
) -> Result<EngineResult> {
    let started = Instant::now();
    let mut result = EngineResult::new();
    let rel = quote_ident(relation);

    let present: HashMap<String, DataType> =
        session.columns(relation).await?.into_iter().collect();

    // Schema diff first; value checks still run over whatever is present.
    let missing: Vec<String> = template
        .columns
        .iter()
        .filter(|c| !present.contains_key(&c.name))
        .map(|c| c.name.clone())
        .collect();
    if !missing.is_empty() {
        result.push(Issue::missing_columns(missing));
    }
    if !template.allow_extra_columns {
        let declared: Vec<&str> = template.column_names();
        let mut extra: Vec<String> = present
            .keys()
            .filter(|name| !declared.contains(&name.as_str()))
            .cloned()
            .collect();
        extra.sort();
        if !extra.is_empty() {
            result.push(Issue::extra_columns(extra));
        }
    }

    let mut dtype_details: Vec<DtypeMismatchDetail> = Vec::new();
    for col in &template.columns {
        let Some(physical) = present.get(&col.name) else {
            continue;
        };
        let id = quote_ident(&col.name);
        let null_pred = null_predicate(
            &col.name,
            &template.null_equivalents,
            is_text_type(physical),
        );

        // Null accounting is always collected, clean runs included.
        let nulls = session
            .scalar_count(&format!("SELECT COUNT(*) FROM {rel} WHERE {null_pred}"))
            .await?;
        result.metrics.nulls.insert(col.name.clone(), nulls);

        // Castability of non-null values to the declared logical type.
        if col.dtype == "geometry" {
            if !is_geometry_type(physical) {
                dtype_details.push(DtypeMismatchDetail {
                    column: col.name.clone(),
                    expected: col.dtype.clone(),
                    invalid_rows: 0,
                });
            }
        } else if let Some(sql_ty) = sql_type(&col.dtype) {
            let bad = session
                .scalar_count(&format!(
                    "SELECT COUNT(*) FROM {rel} \
                     WHERE NOT ({null_pred}) AND TRY_CAST({id} AS {sql_ty}) IS NULL"
                ))
                .await?;
            if bad > 0 {
                dtype_details.push(DtypeMismatchDetail {
                    column: col.name.clone(),
                    expected: col.dtype.clone(),
                    invalid_rows: bad,
                });
            }
        } else {
            // Unrecognized logical type fails closed.
            dtype_details.push(DtypeMismatchDetail {
                column: col.name.clone(),
                expected: col.dtype.clone(),
                invalid_rows: 0,
            });
        }

        if let Some(values) = &col.enum_values
            && !values.is_empty()
            && let Some(pred) = enum_predicate(col, values)
        {
            let bad = session
                .scalar_count(&format!(
                    "SELECT COUNT(*) FROM {rel} WHERE NOT ({null_pred}) AND {pred}"
                ))
                .await?;
            if bad > 0 {
                result.push(Issue::enum_violation(col.name.clone(), bad));
            }
        }

        if let Some(pred) = range_predicate(col) {
            let bad = session
                .scalar_count(&format!(
                    "SELECT COUNT(*) FROM {rel} WHERE NOT ({null_pred}) AND ({pred})"
                ))
                .await?;
            if bad > 0 {
                result.push(Issue::range_violation(col.name.clone(), bad));
            }
        }
    }
    if !dtype_details.is_empty() {
        result.push(Issue::dtype_mismatch(dtype_details));
    }

    // Required columns must hold no nulls or null-equivalents.
    for col in &template.columns {
        if !col.required || !present.contains_key(&col.name) {
            continue;
        }
        if let Some(&nulls) = result.metrics.nulls.get(&col.name)
            && nulls > 0
        {
            result.push(Issue::null_required(col.name.clone(), nulls));
        }
    }

    for check in &template.duplicate_checks {
        if !check.keys.iter().all(|k| present.contains_key(k)) {
            debug!(keys = ?check.keys, "duplicate check skipped, key column absent");
            continue;
        }
        let key_list = check
            .keys
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let batches = session
            .query(&format!(
                "SELECT {key_list}, COUNT(*) AS dup_count FROM {rel} \
                 GROUP BY {key_list} HAVING COUNT(*) > 1 \
                 ORDER BY {key_list} LIMIT {}",
                check.sample_limit
            ))
            .await?;

        let mut examples: Vec<BTreeMap<String, Value>> = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let mut example = BTreeMap::new();
                for (i, key) in check.keys.iter().enumerate() {
                    example.insert(key.clone(), cell_to_json(batch.column(i), row));
                }
                example.insert(
                    "count".to_string(),
                    cell_to_json(batch.column(check.keys.len()), row),
                );
                examples.push(example);
            }
        }
        if !examples.is_empty() {
            result.push(Issue::duplicates(check.keys.clone(), examples, check.severity));
        }
    }

    result.timing_sec = started.elapsed().as_secs_f64();
    debug!(
        ok = result.ok,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validation finished"
    );
    Ok(result)
}

/// Membership predicate for the enum check. Numeric columns compare the cast
/// value so `"01"` and `1` agree; everything else compares the raw value as
/// text. Returns `None` when no value renders to a comparable literal.
fn enum_predicate(col: &ColumnSpec, values: &[Value]) -> Option<String> {
    let numeric_ty = match col.dtype.as_str() {
        "int64" | "float64" => sql_type(&col.dtype),
        _ => None,
    };
    let id = quote_ident(&col.name);

    let (lhs, list): (String, Vec<String>) = match numeric_ty {
        Some(sql_ty) => (
            format!("TRY_CAST({id} AS {sql_ty})"),
            values
                .iter()
                .map(|v| match v {
                    Value::Number(n) => n.to_string(),
                    other => format!(
                        "TRY_CAST({} AS {sql_ty})",
                        quote_literal(&value_as_text(other))
                    ),
                })
                .collect(),
        ),
        None => (
            id,
            values
                .iter()
                .map(|v| quote_literal(&value_as_text(v)))
                .collect(),
        ),
    };
    if list.is_empty() {
        return None;
    }
    Some(format!("{lhs} NOT IN ({})", list.join(", ")))
}

/// Out-of-bounds predicate for the range check. Applies to numeric logical
/// types only; the cast value is compared so uncastable rows stay with the
/// dtype check.
fn range_predicate(col: &ColumnSpec) -> Option<String> {
    let range = col.range.as_ref()?;
    let sql_ty = match col.dtype.as_str() {
        "int64" | "float64" => sql_type(&col.dtype)?,
        _ => return None,
    };
    let casted = format!("TRY_CAST({} AS {sql_ty})", quote_ident(&col.name));

    let mut clauses = Vec::new();
    if let Some(min) = range.min {
        clauses.push(format!("{casted} < {min}"));
    }
    if let Some(max) = range.max {
        clauses.push(format!("{casted} > {max}"));
    }
    if clauses.is_empty() {
        return None;
    }
    Some(clauses.join(" OR "))
}

/// Reads one cell into a JSON value for duplicate-group examples.
fn cell_to_json(col: &ArrayRef, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    match col.data_type() {
        DataType::Utf8 => col.as_string::<i32>().value(row).into(),
        DataType::LargeUtf8 => col.as_string::<i64>().value(row).into(),
        DataType::Int32 => col.as_primitive::<Int32Type>().value(row).into(),
        DataType::Int64 => col.as_primitive::<Int64Type>().value(row).into(),
        DataType::UInt64 => col.as_primitive::<UInt64Type>().value(row).into(),
        DataType::Float64 => col.as_primitive::<Float64Type>().value(row).into(),
        DataType::Boolean => col.as_boolean().value(row).into(),
        _ => array_value_to_string(col, row)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_util::register_text_table;
    use datavet_core::IssueCode;
    use pretty_assertions::assert_eq;

    fn template(body: &str) -> Template {
        serde_json::from_str(body).unwrap()
    }

    fn error_codes(result: &EngineResult) -> Vec<IssueCode> {
        result.errors.iter().map(|i| i.code).collect()
    }

    #[tokio::test]
    async fn test_clean_run_populates_null_metrics() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[
                ("id", vec![Some("1"), Some("2")]),
                ("area", vec![Some("1.5"), Some("2.0")]),
            ],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [
                    {"name": "id", "dtype": "int64", "required": true},
                    {"name": "area", "dtype": "float64"}
                ]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        assert!(result.ok);
        assert!(result.errors.is_empty());
        assert_eq!(result.metrics.nulls.get("id"), Some(&0));
        assert_eq!(result.metrics.nulls.get("area"), Some(&0));
        assert!(result.timing_sec >= 0.0);
    }

    #[tokio::test]
    async fn test_dtype_and_enum_violations() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[
                ("id", vec![Some("1"), Some("x"), Some("3")]),
                ("status", vec![Some("A"), Some("B"), Some("Z")]),
            ],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [
                    {"name": "id", "dtype": "int64"},
                    {"name": "status", "dtype": "string", "enum": ["A", "B"]}
                ]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        assert!(!result.ok);
        let codes = error_codes(&result);
        assert!(codes.contains(&IssueCode::DtypeMismatch));
        assert!(codes.contains(&IssueCode::EnumViolation));

        let dtype = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::DtypeMismatch)
            .unwrap();
        let details = dtype.details.as_ref().unwrap();
        assert_eq!(details[0].column, "id");
        assert_eq!(details[0].invalid_rows, 1);

        let enum_issue = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::EnumViolation)
            .unwrap();
        assert_eq!(enum_issue.invalid_rows, Some(1));
    }

    #[tokio::test]
    async fn test_numeric_enum_compares_cast_values() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[("code", vec![Some("01"), Some("2"), Some("7")])],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [{"name": "code", "dtype": "int64", "enum": [1, 2, 3]}]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        let enum_issue = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::EnumViolation)
            .unwrap();
        // "01" casts to 1 and passes; only "7" is outside the domain.
        assert_eq!(enum_issue.invalid_rows, Some(1));
    }

    #[tokio::test]
    async fn test_range_ignores_uncastable_rows() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[("area", vec![Some("-1"), Some("50"), Some("oops"), None])],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [
                    {"name": "area", "dtype": "float64", "range": {"min": 0.0, "max": 10.0}}
                ]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        let codes = error_codes(&result);
        assert!(codes.contains(&IssueCode::DtypeMismatch));

        let range = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::RangeViolation)
            .unwrap();
        // -1 and 50 are out of bounds; "oops" belongs to the dtype check.
        assert_eq!(range.invalid_rows, Some(2));
    }

    #[tokio::test]
    async fn test_null_equivalents_and_required() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[("name", vec![Some("a"), Some("NA"), Some(""), None])],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "null_equivalents": ["", "NA"],
                "columns": [{"name": "name", "dtype": "string", "required": true}]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        assert_eq!(result.metrics.nulls.get("name"), Some(&3));
        let null_issue = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::NullRequired)
            .unwrap();
        assert_eq!(null_issue.invalid_rows, Some(3));
    }

    #[tokio::test]
    async fn test_schema_diff() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[("id", vec![Some("1")]), ("surprise", vec![Some("x")])],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "allow_extra_columns": false,
                "columns": [
                    {"name": "id", "dtype": "int64"},
                    {"name": "absent", "dtype": "string"}
                ]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        let missing = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::MissingColumns)
            .unwrap();
        assert_eq!(missing.columns.as_deref(), Some(&["absent".to_string()][..]));

        let extra = result
            .warnings
            .iter()
            .find(|i| i.code == IssueCode::ExtraColumns)
            .unwrap();
        assert_eq!(
            extra.columns.as_deref(),
            Some(&["surprise".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_duplicates_warning_severity_keeps_ok() {
        let session = Session::new();
        register_text_table(
            &session,
            "v",
            &[("parcel_id", vec![Some("p1"), Some("p1"), Some("p2")])],
        );
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [{"name": "parcel_id", "dtype": "string"}],
                "duplicate_checks": [
                    {"keys": ["parcel_id"], "severity": "warning", "sample_limit": 10}
                ]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        assert!(result.ok);
        let dup = result
            .warnings
            .iter()
            .find(|i| i.code == IssueCode::Duplicates)
            .unwrap();
        let examples = dup.examples.as_ref().unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0]["parcel_id"], Value::from("p1"));
        assert_eq!(examples[0]["count"], Value::from(2));
    }

    #[tokio::test]
    async fn test_duplicate_check_skipped_when_key_absent() {
        let session = Session::new();
        register_text_table(&session, "v", &[("id", vec![Some("1"), Some("1")])]);
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [{"name": "id", "dtype": "string"}],
                "duplicate_checks": [{"keys": ["id", "other"]}]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        assert!(result.ok);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_dtype_fails_closed() {
        let session = Session::new();
        register_text_table(&session, "v", &[("id", vec![Some("1")])]);
        let tpl = template(
            r#"{
                "template_id": "t", "version": "1.0.0",
                "columns": [{"name": "id", "dtype": "uuid"}]
            }"#,
        );

        let result = validate(&session, "v", &tpl).await.unwrap();
        assert!(!result.ok);
        let dtype = result
            .errors
            .iter()
            .find(|i| i.code == IssueCode::DtypeMismatch)
            .unwrap();
        assert_eq!(dtype.details.as_ref().unwrap()[0].expected, "uuid");
    }
}
