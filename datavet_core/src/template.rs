//! Validation template types.
//!
//! A template is the declarative, versioned document a dataset is checked
//! against. It is loaded once per run and read-only thereafter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned validation template.
///
/// Describes the expected columns, their logical types and value domains,
/// null handling, and uniqueness constraints for one dataset family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Stable identifier used for template lookup
    pub template_id: String,

    /// Three-component version string (e.g. "1.2.0"); highest wins when no
    /// explicit version is requested
    pub version: String,

    /// Whether columns not declared in the template are accepted silently.
    /// When false, extras are reported as an `EXTRA_COLUMNS` warning.
    #[serde(default = "default_true")]
    pub allow_extra_columns: bool,

    /// Literals treated as semantically null for text-typed columns only
    /// (e.g. "", "NA", "-"). Never applied to non-text physical columns.
    #[serde(default)]
    pub null_equivalents: Vec<Value>,

    /// Expected columns
    pub columns: Vec<ColumnSpec>,

    /// Duplicate-key checks to run over the relation
    #[serde(default)]
    pub duplicate_checks: Vec<DuplicateCheck>,
}

impl Template {
    /// Names of all declared columns, in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Numeric (major, minor, patch) ordinal of `version`; unparsable
    /// components count as 0 so ordering stays total.
    pub fn version_ordinal(&self) -> (u64, u64, u64) {
        version_ordinal(&self.version)
    }
}

/// Parses a three-component version string into a comparable ordinal.
pub fn version_ordinal(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// One expected column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name as it must appear in the relation
    pub name: String,

    /// Logical type: one of int64, float64, string, bool, date, timestamp,
    /// geometry. Kept as a string so an unrecognized type fails closed during
    /// validation instead of being rejected at parse time.
    pub dtype: String,

    /// When true, any null (or null-equivalent) value is a `NULL_REQUIRED`
    /// error
    #[serde(default)]
    pub required: bool,

    /// Closed value domain; membership is checked for non-null rows
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    /// Numeric bounds; either side may be absent (unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
}

/// Inclusive numeric bounds for a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// A duplicate-key detection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheck {
    /// Key columns grouped together; the check is skipped when any is absent
    pub keys: Vec<String>,

    /// Severity of the resulting `DUPLICATES` issue
    #[serde(default)]
    pub severity: Severity,

    /// Upper bound on materialized duplicate-group examples
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

/// Issue severity. Warnings never affect the aggregate `ok` flag or the
/// exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sample_limit() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_template_defaults() {
        let tpl: Template = serde_json::from_str(
            r#"{
                "template_id": "t",
                "version": "0.1.0",
                "columns": [{"name": "id", "dtype": "int64"}]
            }"#,
        )
        .unwrap();

        assert!(tpl.allow_extra_columns);
        assert!(tpl.null_equivalents.is_empty());
        assert!(tpl.duplicate_checks.is_empty());
        assert!(!tpl.columns[0].required);
        assert!(tpl.columns[0].enum_values.is_none());
    }

    #[test]
    fn test_duplicate_check_defaults() {
        let check: DuplicateCheck =
            serde_json::from_str(r#"{"keys": ["parcel_id"]}"#).unwrap();
        assert_eq!(check.severity, Severity::Error);
        assert_eq!(check.sample_limit, 1000);

        let check: DuplicateCheck =
            serde_json::from_str(r#"{"keys": ["a", "b"], "severity": "warning", "sample_limit": 5}"#)
                .unwrap();
        assert_eq!(check.severity, Severity::Warning);
        assert_eq!(check.sample_limit, 5);
    }

    #[test]
    fn test_enum_and_range_parsing() {
        let col: ColumnSpec = serde_json::from_str(
            r#"{"name": "area", "dtype": "float64", "range": {"min": 0.0}}"#,
        )
        .unwrap();
        let range = col.range.unwrap();
        assert_eq!(range.min, Some(0.0));
        assert_eq!(range.max, None);

        let col: ColumnSpec = serde_json::from_str(
            r#"{"name": "status", "dtype": "string", "enum": ["A", "B"]}"#,
        )
        .unwrap();
        assert_eq!(col.enum_values.unwrap().len(), 2);
    }

    #[test]
    fn test_version_ordinal() {
        assert_eq!(version_ordinal("1.2.3"), (1, 2, 3));
        assert_eq!(version_ordinal("2.0"), (2, 0, 0));
        assert_eq!(version_ordinal("x.y.z"), (0, 0, 0));
        assert!(version_ordinal("1.10.0") > version_ordinal("1.9.9"));
    }
}
