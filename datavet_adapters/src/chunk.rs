//! Chunked all-text batch staging.
//!
//! The fallback load paths (SQLite chunked copy, shapefile paging) read
//! sources that have no Arrow representation of their own. They stage rows
//! as all-`Utf8` record batches through this builder, and the relation is
//! registered as one in-memory table at the end. Geometry blobs travel as
//! hex text and are coerced later by normalization.

use std::sync::Arc;
use std::time::Instant;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use datafusion::datasource::MemTable;
use datavet_engine::Session;

use crate::error::{AdapterError, Result};

/// Rows copied per chunk on the fallback load paths.
pub const DEFAULT_BATCH_ROWS: usize = 200_000;

/// Knobs shared by the chunked load paths.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Rows per staged batch
    pub batch_rows: usize,
    /// Absolute deadline checked between chunks
    pub deadline: Option<Instant>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
            deadline: None,
        }
    }
}

impl LoadOptions {
    /// Errors when the deadline has passed. Called between chunks so a copy
    /// never overshoots by more than one batch.
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(AdapterError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Accumulates all-text record batches with a schema fixed by the first
/// non-empty chunk.
pub struct TextBatcher {
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
    rows: u64,
}

impl TextBatcher {
    pub fn new() -> Self {
        Self {
            schema: None,
            batches: Vec::new(),
            rows: 0,
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Appends one chunk. `columns` are parallel per-column value vectors of
    /// equal length; an empty chunk is a no-op.
    pub fn push_chunk(
        &mut self,
        names: &[String],
        columns: Vec<Vec<Option<String>>>,
    ) -> Result<()> {
        let chunk_rows = columns.first().map_or(0, Vec::len);
        if chunk_rows == 0 {
            return Ok(());
        }
        let schema = self
            .schema
            .get_or_insert_with(|| utf8_schema(names))
            .clone();
        let arrays: Vec<ArrayRef> = columns
            .into_iter()
            .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
            .collect();
        let batch = RecordBatch::try_new(schema, arrays)?;
        self.rows += batch.num_rows() as u64;
        self.batches.push(batch);
        Ok(())
    }

    /// Registers the accumulated batches as `relation`. A source with no
    /// rows still yields a relation, with `fallback_columns` as its schema.
    pub fn register(
        self,
        session: &Session,
        relation: &str,
        fallback_columns: &[String],
    ) -> Result<()> {
        let (schema, batches) = match self.schema {
            Some(schema) => (schema, self.batches),
            None => {
                let schema = utf8_schema(fallback_columns);
                (schema.clone(), vec![RecordBatch::new_empty(schema)])
            }
        };
        let table = MemTable::try_new(schema, vec![batches])
            .map_err(datavet_engine::EngineError::from)?;
        session
            .ctx()
            .register_table(relation, Arc::new(table))
            .map_err(datavet_engine::EngineError::from)?;
        Ok(())
    }
}

impl Default for TextBatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// All-nullable-`Utf8` schema over `names`. A source exposing no columns at
/// all still gets a one-column placeholder so the relation is queryable.
pub fn utf8_schema(names: &[String]) -> SchemaRef {
    let fields: Vec<Field> = if names.is_empty() {
        vec![Field::new("_placeholder", DataType::Utf8, true)]
    } else {
        names
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect()
    };
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_chunks_accumulate_and_register() {
        let session = Session::new();
        let cols = names(&["id", "v"]);
        let mut batcher = TextBatcher::new();
        batcher
            .push_chunk(
                &cols,
                vec![
                    vec![Some("1".into()), Some("2".into())],
                    vec![Some("a".into()), None],
                ],
            )
            .unwrap();
        batcher
            .push_chunk(&cols, vec![vec![Some("3".into())], vec![Some("c".into())]])
            .unwrap();
        assert_eq!(batcher.rows(), 3);

        batcher.register(&session, "t", &cols).unwrap();
        assert_eq!(session.count_rows("t").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_source_registers_empty_relation() {
        let session = Session::new();
        let cols = names(&["id", "v"]);
        let batcher = TextBatcher::new();
        batcher.register(&session, "t", &cols).unwrap();

        assert_eq!(session.count_rows("t").await.unwrap(), 0);
        let schema = session.columns("t").await.unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].0, "id");
    }

    #[tokio::test]
    async fn test_empty_source_without_columns_gets_placeholder() {
        let session = Session::new();
        let batcher = TextBatcher::new();
        batcher.register(&session, "t", &[]).unwrap();
        let schema = session.columns("t").await.unwrap();
        assert_eq!(schema[0].0, "_placeholder");
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut batcher = TextBatcher::new();
        batcher.push_chunk(&names(&["a"]), vec![vec![]]).unwrap();
        assert_eq!(batcher.rows(), 0);
    }

    #[test]
    fn test_deadline() {
        let opts = LoadOptions {
            deadline: Some(Instant::now() - std::time::Duration::from_secs(1)),
            ..Default::default()
        };
        assert!(matches!(
            opts.check_deadline(),
            Err(AdapterError::DeadlineExceeded)
        ));
        assert!(LoadOptions::default().check_deadline().is_ok());
    }
}
