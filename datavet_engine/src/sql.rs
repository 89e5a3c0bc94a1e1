//! SQL fragment construction.
//!
//! Every identifier and literal that reaches the engine goes through these
//! helpers, so template content can never change the shape of a statement.

use arrow_schema::DataType;
use serde_json::Value;

/// Double-quotes an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quotes a string literal, escaping embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders a JSON value as its plain text form (unquoted).
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Maps a template logical type to the SQL type used in casts. `geometry`
/// and unrecognized types have no SQL counterpart.
pub fn sql_type(dtype: &str) -> Option<&'static str> {
    match dtype {
        "int64" => Some("BIGINT"),
        "float64" => Some("DOUBLE"),
        "string" => Some("VARCHAR"),
        "bool" => Some("BOOLEAN"),
        "date" => Some("DATE"),
        "timestamp" => Some("TIMESTAMP"),
        _ => None,
    }
}

/// Whether the physical column type is textual. Null-equivalent literals are
/// only compared against text columns.
pub fn is_text_type(dt: &DataType) -> bool {
    matches!(dt, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View)
}

/// Predicate matching rows whose value counts as null.
///
/// Always matches SQL NULL; for text-typed columns it additionally matches
/// each configured null-equivalent literal compared as text.
pub fn null_predicate(column: &str, null_equivalents: &[Value], text_physical: bool) -> String {
    let id = quote_ident(column);
    let mut pred = format!("{id} IS NULL");
    if text_physical {
        for value in null_equivalents {
            pred.push_str(&format!(
                " OR {id} = {}",
                quote_literal(&value_as_text(value))
            ));
        }
    }
    pred
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(sql_type("int64"), Some("BIGINT"));
        assert_eq!(sql_type("timestamp"), Some("TIMESTAMP"));
        assert_eq!(sql_type("geometry"), None);
        assert_eq!(sql_type("uuid"), None);
    }

    #[test]
    fn test_null_predicate_text_column() {
        let pred = null_predicate("v", &[json!(""), json!("NA"), json!(0)], true);
        assert_eq!(
            pred,
            "\"v\" IS NULL OR \"v\" = '' OR \"v\" = 'NA' OR \"v\" = '0'"
        );
    }

    #[test]
    fn test_null_predicate_non_text_column() {
        let pred = null_predicate("v", &[json!("NA")], false);
        assert_eq!(pred, "\"v\" IS NULL");
    }

    #[test]
    fn test_literal_injection_is_inert() {
        let pred = null_predicate("v", &[json!("'; DROP TABLE x; --")], true);
        assert!(pred.contains("'''; DROP TABLE x; --'"));
    }
}
