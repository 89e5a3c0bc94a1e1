//! Issue and report data model.
//!
//! Issues are append-only facts produced by the pipeline and the validation
//! engine; the `Report` freezes them together with input/template/provenance
//! metadata and carries the deterministic exit-code mapping.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::template::Severity;

/// Exit code for a clean run.
pub const EXIT_OK: i32 = 0;
/// Exit code when the input itself is unusable (unpack or corruption).
pub const EXIT_CORRUPTED: i32 = 2;
/// Exit code for schema-level failures (missing columns).
pub const EXIT_SCHEMA: i32 = 3;
/// Exit code for value-level failures (type, enum, range, required-null).
pub const EXIT_TYPES_OR_VALUES: i32 = 4;
/// Exit code for duplicate-key failures.
pub const EXIT_DUPLICATES: i32 = 5;
/// Exit code when validation failed for any other reason.
pub const EXIT_OTHER: i32 = 6;

/// Stable issue codes; the public vocabulary of the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    CorruptedFile,
    MissingColumns,
    ExtraColumns,
    DtypeMismatch,
    EnumViolation,
    RangeViolation,
    NullRequired,
    Duplicates,
    UnpackError,
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueCode::CorruptedFile => "CORRUPTED_FILE",
            IssueCode::MissingColumns => "MISSING_COLUMNS",
            IssueCode::ExtraColumns => "EXTRA_COLUMNS",
            IssueCode::DtypeMismatch => "DTYPE_MISMATCH",
            IssueCode::EnumViolation => "ENUM_VIOLATION",
            IssueCode::RangeViolation => "RANGE_VIOLATION",
            IssueCode::NullRequired => "NULL_REQUIRED",
            IssueCode::Duplicates => "DUPLICATES",
            IssueCode::UnpackError => "UNPACK_ERROR",
        };
        write!(f, "{s}")
    }
}

/// Per-column payload of a `DTYPE_MISMATCH` issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtypeMismatchDetail {
    /// Offending column
    pub column: String,
    /// Logical type the template declared
    pub expected: String,
    /// Non-null rows that failed to cast
    pub invalid_rows: u64,
}

/// One structured validation finding.
///
/// Issues are never mutated after emission; helper constructors cover each
/// code so payload shapes stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<BTreeMap<String, Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<DtypeMismatchDetail>>,
}

impl Issue {
    fn new(code: IssueCode, severity: Severity) -> Self {
        Self {
            code,
            severity,
            detail: None,
            column: None,
            columns: None,
            keys: None,
            invalid_rows: None,
            examples: None,
            details: None,
        }
    }

    /// The input could not be opened, probed, or validated.
    pub fn corrupted_file(detail: impl Into<String>) -> Self {
        let mut issue = Self::new(IssueCode::CorruptedFile, Severity::Error);
        issue.detail = Some(detail.into());
        issue
    }

    /// Archive staging failed.
    pub fn unpack_error(detail: impl Into<String>) -> Self {
        let mut issue = Self::new(IssueCode::UnpackError, Severity::Error);
        issue.detail = Some(detail.into());
        issue
    }

    /// Expected columns absent from the relation.
    pub fn missing_columns(columns: Vec<String>) -> Self {
        let mut issue = Self::new(IssueCode::MissingColumns, Severity::Error);
        issue.columns = Some(columns);
        issue
    }

    /// Columns present but not declared, when the template disallows extras.
    pub fn extra_columns(columns: Vec<String>) -> Self {
        let mut issue = Self::new(IssueCode::ExtraColumns, Severity::Warning);
        issue.columns = Some(columns);
        issue
    }

    /// Aggregated castability failures across all offending columns.
    pub fn dtype_mismatch(details: Vec<DtypeMismatchDetail>) -> Self {
        let mut issue = Self::new(IssueCode::DtypeMismatch, Severity::Error);
        issue.columns = Some(details.iter().map(|d| d.column.clone()).collect());
        issue.details = Some(details);
        issue
    }

    /// Values outside the declared enum for one column.
    pub fn enum_violation(column: impl Into<String>, invalid_rows: u64) -> Self {
        let mut issue = Self::new(IssueCode::EnumViolation, Severity::Error);
        issue.column = Some(column.into());
        issue.invalid_rows = Some(invalid_rows);
        issue
    }

    /// Values outside the declared numeric bounds for one column.
    pub fn range_violation(column: impl Into<String>, invalid_rows: u64) -> Self {
        let mut issue = Self::new(IssueCode::RangeViolation, Severity::Error);
        issue.column = Some(column.into());
        issue.invalid_rows = Some(invalid_rows);
        issue
    }

    /// Nulls found in a required column.
    pub fn null_required(column: impl Into<String>, invalid_rows: u64) -> Self {
        let mut issue = Self::new(IssueCode::NullRequired, Severity::Error);
        issue.column = Some(column.into());
        issue.invalid_rows = Some(invalid_rows);
        issue
    }

    /// Duplicate key groups, at the severity the check configured.
    pub fn duplicates(
        keys: Vec<String>,
        examples: Vec<BTreeMap<String, Value>>,
        severity: Severity,
    ) -> Self {
        let mut issue = Self::new(IssueCode::Duplicates, severity);
        issue.keys = Some(keys);
        issue.examples = Some(examples);
        issue
    }
}

/// Metrics collected during validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Null (or null-equivalent) row count per template column present in the
    /// relation; always populated, even for clean runs
    #[serde(default)]
    pub nulls: BTreeMap<String, u64>,

    /// Free-form adapter and staging diagnostics merged in by the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<Value>,
}

/// Aggregated output of one validation run, before report assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub ok: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub metrics: EngineMetrics,
    pub timing_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl EngineResult {
    /// A result with no findings yet.
    pub fn new() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            metrics: EngineMetrics::default(),
            timing_sec: 0.0,
            row_count: None,
        }
    }

    /// Routes an issue to the error or warning list by its severity and keeps
    /// `ok` consistent (warnings never flip it).
    pub fn push(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Error => {
                self.ok = false;
                self.errors.push(issue);
            }
            Severity::Warning | Severity::Info => self.warnings.push(issue),
        }
    }

    /// Folds another result into this one (used when pre-flight issues and
    /// engine output are combined).
    pub fn merge(&mut self, other: EngineResult) {
        self.ok = self.ok && other.ok;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.metrics.nulls.extend(other.metrics.nulls);
        if other.metrics.adapter.is_some() {
            self.metrics.adapter = other.metrics.adapter;
        }
        self.timing_sec += other.timing_sec;
        if other.row_count.is_some() {
            self.row_count = other.row_count;
        }
    }
}

impl Default for EngineResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Template identity carried into the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMeta {
    pub template_id: String,
    pub version: String,
}

/// Input identity carried into the report. `path` is credential-redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMeta {
    pub path: String,
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Tooling provenance for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub tool_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_rev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// The immutable record of one validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub ok: bool,
    pub started_at: String,
    pub finished_at: String,
    pub duration_sec: f64,

    pub template: TemplateMeta,
    pub input: InputMeta,
    pub provenance: Provenance,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub summary: BTreeMap<String, Value>,
    pub metrics: EngineMetrics,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub infos: Vec<Issue>,
}

impl Report {
    /// Freezes an engine result plus metadata into a report. `started_at`
    /// defaults to now when the caller did not record one.
    pub fn build(
        result: EngineResult,
        template: TemplateMeta,
        mut input: InputMeta,
        provenance: Provenance,
        started_at: Option<String>,
    ) -> Self {
        input.path = redact_path(&input.path);
        Self {
            ok: result.ok,
            started_at: started_at.unwrap_or_else(now_iso),
            finished_at: now_iso(),
            duration_sec: result.timing_sec,
            template,
            input,
            provenance,
            row_count: result.row_count,
            summary: BTreeMap::new(),
            metrics: result.metrics,
            errors: result.errors,
            warnings: result.warnings,
            infos: Vec::new(),
        }
    }

    /// Counts per severity, for rendering.
    pub fn severity_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("errors", self.errors.len()),
            ("warnings", self.warnings.len()),
            ("infos", self.infos.len()),
        ])
    }

    /// Deterministic process exit code, by priority over the *error* codes
    /// present. Warnings never raise the exit code.
    pub fn exit_code(&self) -> i32 {
        let has = |code: IssueCode| self.errors.iter().any(|i| i.code == code);
        if has(IssueCode::CorruptedFile) || has(IssueCode::UnpackError) {
            return EXIT_CORRUPTED;
        }
        if has(IssueCode::MissingColumns) {
            return EXIT_SCHEMA;
        }
        if has(IssueCode::DtypeMismatch)
            || has(IssueCode::EnumViolation)
            || has(IssueCode::RangeViolation)
            || has(IssueCode::NullRequired)
        {
            return EXIT_TYPES_OR_VALUES;
        }
        if has(IssueCode::Duplicates) {
            return EXIT_DUPLICATES;
        }
        if self.ok { EXIT_OK } else { EXIT_OTHER }
    }

    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the JSON form to `path`, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Current UTC time, second precision, ISO 8601 with `Z` suffix.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Replaces the userinfo component of a URI with `***` so credentials never
/// reach a report (`s3://key:secret@bucket/x` → `s3://***@bucket/x`).
/// Plain filesystem paths pass through unchanged.
pub fn redact_path(path: &str) -> String {
    match url::Url::parse(path) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            if url.set_username("***").is_ok() {
                let _ = url.set_password(None);
                url.to_string()
            } else {
                path.to_string()
            }
        }
        _ => path.to_string(),
    }
}
