//! Embedded query session.
//!
//! Wraps a DataFusion [`SessionContext`] together with a capability record
//! that is probed once at construction. Adapters consult the capabilities to
//! pick a load strategy instead of sniffing the engine at call sites.

use arrow_array::{Array, Int64Array, RecordBatch};
use arrow_schema::DataType;
use datafusion::prelude::SessionContext;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::geom;
use crate::sql::quote_ident;

/// What the embedded engine can and cannot do, decided once per session.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Whether a foreign SQLite catalog can be attached for zero-copy reads.
    /// When false, SQLite-backed containers are loaded by chunked copy.
    pub sqlite_catalog: bool,

    /// Human-readable reason when `sqlite_catalog` is false; surfaced in
    /// adapter diagnostics so reports explain the slower path.
    pub sqlite_catalog_reason: Option<String>,
}

impl Capabilities {
    /// Probes the engine build. DataFusion has no SQLite table provider, so
    /// the catalog capability is permanently off in this build; the record
    /// keeps the decision and its reason in one place.
    pub fn detect() -> Self {
        Self {
            sqlite_catalog: false,
            sqlite_catalog_reason: Some(
                "no sqlite catalog provider in this engine build".to_string(),
            ),
        }
    }
}

/// One validation run's query context: a DataFusion session with the
/// geometry coercion UDF registered and capabilities probed.
pub struct Session {
    ctx: SessionContext,
    capabilities: Capabilities,
}

impl Session {
    pub fn new() -> Self {
        let ctx = SessionContext::new();
        ctx.register_udf(geom::geom_from_any_udf());
        let capabilities = Capabilities::detect();
        debug!(sqlite_catalog = capabilities.sqlite_catalog, "session ready");
        Self { ctx, capabilities }
    }

    pub fn ctx(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Runs a statement and collects all result batches.
    pub async fn query(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        Ok(self.ctx.sql(sql).await?.collect().await?)
    }

    /// Runs a single-row single-column `COUNT(*)`-shaped statement.
    pub async fn scalar_count(&self, sql: &str) -> Result<u64> {
        let batches = self.query(sql).await?;
        let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
            return Ok(0);
        };
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| {
                EngineError::UnexpectedResult(format!(
                    "count query returned {:?}, expected Int64",
                    batch.column(0).data_type()
                ))
            })?;
        if col.is_null(0) {
            return Ok(0);
        }
        Ok(u64::try_from(col.value(0)).unwrap_or(0))
    }

    /// Row count of a registered relation.
    pub async fn count_rows(&self, relation: &str) -> Result<u64> {
        self.scalar_count(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(relation)
        ))
        .await
    }

    /// Column names and physical types of a registered relation, in schema
    /// order.
    pub async fn columns(&self, relation: &str) -> Result<Vec<(String, DataType)>> {
        let provider = self.ctx.table_provider(relation).await?;
        Ok(provider
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone()))
            .collect())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::register_text_table;
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_count_rows_and_columns() {
        let session = Session::new();
        register_text_table(
            &session,
            "t",
            &[
                ("id", vec![Some("1"), Some("2"), Some("3")]),
                ("name", vec![Some("a"), None, Some("c")]),
            ],
        );

        assert_eq!(session.count_rows("t").await.unwrap(), 3);
        let cols = session.columns("t").await.unwrap();
        assert_eq!(cols[0], ("id".to_string(), DataType::Utf8));
        assert_eq!(cols.len(), 2);
    }

    #[tokio::test]
    async fn test_scalar_count_with_predicate() {
        let session = Session::new();
        register_text_table(&session, "t", &[("v", vec![Some("1"), None, Some("x")])]);

        let n = session
            .scalar_count("SELECT COUNT(*) FROM t WHERE TRY_CAST(\"v\" AS BIGINT) IS NULL")
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_capabilities_record_reason() {
        let caps = Capabilities::detect();
        assert!(!caps.sqlite_catalog);
        assert!(caps.sqlite_catalog_reason.is_some());
    }
}
