//! Geometry column normalization.
//!
//! Source files name their geometry column inconsistently (`geom`, `gem`,
//! `geometry`, prefixed variants). Normalization derives one view over the
//! raw relation in which the canonical column, when one can be determined,
//! holds engine geometry (WKB bytes) regardless of how the source encoded
//! it. Everything else passes through untouched.

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::geom::{GEOM_FROM_ANY, is_geometry_type};
use crate::session::Session;
use crate::sql::quote_ident;

/// Canonical geometry columns and their accepted source aliases, in
/// precedence order. The canonical name itself is always the first alias.
const ALIAS_TABLE: &[(&str, &[&str])] = &[
    ("lpis_geom", &["lpis_geom", "geom", "geometry"]),
    ("gsa_geom", &["gsa_geom", "gem", "geometry"]),
];

/// Every column name that can feed a canonical geometry column. Loaders that
/// narrow their column selection must keep these so normalization still sees
/// its source.
pub const GEOMETRY_ALIAS_CANDIDATES: &[&str] = &["lpis_geom", "gsa_geom", "geom", "gem", "geometry"];

/// What normalization did, carried into report diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationOutcome {
    /// Whether a coerced geometry column was produced
    pub normalized: bool,
    /// Canonical column name that was targeted, when one was determined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    /// Source column the geometry came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Physical type of the source column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

/// Derives `dst` from `src`, coercing the geometry column when a canonical
/// target applies. With no target, `dst` is a plain pass-through view.
pub async fn normalize_geometry(
    session: &Session,
    src: &str,
    dst: &str,
    explicit_canonical: Option<&str>,
) -> Result<NormalizationOutcome> {
    let cols = session.columns(src).await?;

    let canonical = match explicit_canonical {
        Some(c) => Some(c.to_string()),
        None => guess_canonical(&cols).map(str::to_string),
    };
    let Some(canonical) = canonical else {
        pass_through(session, src, dst).await?;
        return Ok(NormalizationOutcome::default());
    };

    // Canonical column already present: keep it when it is already engine
    // geometry, otherwise rebuild it in place.
    if let Some((name, dtype)) = find_column(&cols, &canonical) {
        if is_geometry_type(dtype) {
            pass_through(session, src, dst).await?;
            return Ok(NormalizationOutcome {
                normalized: false,
                canonical: Some(canonical),
                source: Some(name.clone()),
                source_type: Some(dtype.to_string()),
            });
        }
        let select = rebuild_select(&cols, name, &canonical);
        register_view(session, dst, &format!("SELECT {select} FROM {}", quote_ident(src))).await?;
        debug!(src, dst, canonical, source = %name, "geometry column rebuilt");
        return Ok(NormalizationOutcome {
            normalized: true,
            canonical: Some(canonical),
            source: Some(name.clone()),
            source_type: Some(dtype.to_string()),
        });
    }

    // Otherwise the first present alias feeds an appended canonical column.
    let aliases = ALIAS_TABLE
        .iter()
        .find(|(c, _)| *c == canonical)
        .map(|(_, a)| *a)
        .unwrap_or(&[]);
    for alias in aliases {
        let Some((name, dtype)) = find_column(&cols, alias) else {
            continue;
        };
        let sql = format!(
            "SELECT *, {GEOM_FROM_ANY}({}) AS {} FROM {}",
            quote_ident(name),
            quote_ident(&canonical),
            quote_ident(src)
        );
        register_view(session, dst, &sql).await?;
        debug!(src, dst, canonical, source = %name, "geometry column appended");
        return Ok(NormalizationOutcome {
            normalized: true,
            canonical: Some(canonical),
            source: Some(name.clone()),
            source_type: Some(dtype.to_string()),
        });
    }

    // A target was inferred but no alias exists; schema validation will
    // report the missing column.
    pass_through(session, src, dst).await?;
    Ok(NormalizationOutcome {
        normalized: false,
        canonical: Some(canonical),
        source: None,
        source_type: None,
    })
}

/// Infers the canonical geometry column from the relation's column names.
/// Exact alias hits win over prefix hints.
fn guess_canonical(cols: &[(String, DataType)]) -> Option<&'static str> {
    let lower: Vec<String> = cols.iter().map(|(n, _)| n.to_lowercase()).collect();
    let has = |name: &str| lower.iter().any(|n| n == name);

    if has("lpis_geom") {
        return Some("lpis_geom");
    }
    if has("gsa_geom") || has("gem") {
        return Some("gsa_geom");
    }
    if lower.iter().any(|n| n.starts_with("gsa_")) {
        return Some("gsa_geom");
    }
    if lower.iter().any(|n| n.starts_with("lpis_")) {
        return Some("lpis_geom");
    }
    None
}

fn find_column<'a>(
    cols: &'a [(String, DataType)],
    name: &str,
) -> Option<(&'a String, &'a DataType)> {
    cols.iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(n, t)| (n, t))
}

/// Select list that replaces `source` with a coerced canonical column and
/// keeps every other column verbatim, preserving order.
fn rebuild_select(cols: &[(String, DataType)], source: &str, canonical: &str) -> String {
    cols.iter()
        .map(|(name, _)| {
            if name.as_str() == source {
                format!(
                    "{GEOM_FROM_ANY}({}) AS {}",
                    quote_ident(name),
                    quote_ident(canonical)
                )
            } else {
                quote_ident(name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

async fn pass_through(session: &Session, src: &str, dst: &str) -> Result<()> {
    register_view(session, dst, &format!("SELECT * FROM {}", quote_ident(src))).await
}

async fn register_view(session: &Session, name: &str, sql: &str) -> Result<()> {
    let df = session.ctx().sql(sql).await?;
    session.ctx().register_table(name, df.into_view())?;
    Ok(())
}
