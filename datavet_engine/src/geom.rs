//! Geometry coercion UDF.
//!
//! `geom_from_any(col)` turns a heterogeneous geometry column into canonical
//! WKB bytes, or NULL when the value is empty or unparseable. Accepted input
//! encodings, tried in order for text values:
//!
//! 1. hex-encoded WKB (the transport used by text-only load paths)
//! 2. WKT
//!
//! Binary input is kept as-is when it parses as WKB. The function never
//! errors on bad values; unparseable rows become NULL so downstream checks
//! can count them.

use std::any::Any;
use std::sync::Arc;

use arrow_array::builder::BinaryBuilder;
use arrow_array::cast::AsArray;
use arrow_array::Array;
use arrow_schema::DataType;
use datafusion::error::{DataFusionError, Result as DfResult};
use datafusion::logical_expr::{
    ColumnarValue, ScalarFunctionArgs, ScalarUDF, ScalarUDFImpl, Signature, Volatility,
};
use geozero::wkb::Wkb;
use geozero::wkt::Wkt;
use geozero::{CoordDimensions, ToGeo, ToWkb};

/// Name the UDF is registered under.
pub const GEOM_FROM_ANY: &str = "geom_from_any";

/// Physical type a normalized geometry column carries.
pub fn is_geometry_type(dt: &DataType) -> bool {
    matches!(dt, DataType::Binary | DataType::LargeBinary | DataType::BinaryView)
}

/// Builds the `geom_from_any` scalar UDF.
pub fn geom_from_any_udf() -> ScalarUDF {
    ScalarUDF::new_from_impl(GeomFromAny::new())
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct GeomFromAny {
    signature: Signature,
}

impl GeomFromAny {
    fn new() -> Self {
        Self {
            signature: Signature::uniform(
                1,
                vec![
                    DataType::Utf8,
                    DataType::LargeUtf8,
                    DataType::Binary,
                    DataType::LargeBinary,
                ],
                Volatility::Immutable,
            ),
        }
    }
}

impl ScalarUDFImpl for GeomFromAny {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        GEOM_FROM_ANY
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> DfResult<DataType> {
        Ok(DataType::Binary)
    }

    fn invoke_with_args(&self, args: ScalarFunctionArgs) -> DfResult<ColumnarValue> {
        let arrays = ColumnarValue::values_to_arrays(&args.args)?;
        let input = &arrays[0];
        let mut builder = BinaryBuilder::new();

        match input.data_type() {
            DataType::Utf8 => {
                for i in 0..input.len() {
                    let arr = input.as_string::<i32>();
                    append(&mut builder, arr.is_null(i), || coerce_text(arr.value(i)));
                }
            }
            DataType::LargeUtf8 => {
                for i in 0..input.len() {
                    let arr = input.as_string::<i64>();
                    append(&mut builder, arr.is_null(i), || coerce_text(arr.value(i)));
                }
            }
            DataType::Binary => {
                for i in 0..input.len() {
                    let arr = input.as_binary::<i32>();
                    append(&mut builder, arr.is_null(i), || coerce_bytes(arr.value(i)));
                }
            }
            DataType::LargeBinary => {
                for i in 0..input.len() {
                    let arr = input.as_binary::<i64>();
                    append(&mut builder, arr.is_null(i), || coerce_bytes(arr.value(i)));
                }
            }
            other => {
                return Err(DataFusionError::Execution(format!(
                    "{GEOM_FROM_ANY}: unsupported input type {other:?}"
                )));
            }
        }

        Ok(ColumnarValue::Array(Arc::new(builder.finish())))
    }
}

fn append<F: FnOnce() -> Option<Vec<u8>>>(builder: &mut BinaryBuilder, is_null: bool, coerce: F) {
    if is_null {
        builder.append_null();
        return;
    }
    match coerce() {
        Some(wkb) => builder.append_value(&wkb),
        None => builder.append_null(),
    }
}

/// Coerces a text value: hex-encoded WKB first, then WKT.
pub(crate) fn coerce_text(value: &str) -> Option<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(bytes) = hex::decode(trimmed)
        && wkb_parses(&bytes)
    {
        return Some(bytes);
    }
    Wkt(trimmed).to_wkb(CoordDimensions::xy()).ok()
}

/// Coerces a binary value: kept verbatim when it parses as WKB.
pub(crate) fn coerce_bytes(value: &[u8]) -> Option<Vec<u8>> {
    if value.is_empty() || !wkb_parses(value) {
        return None;
    }
    Some(value.to_vec())
}

fn wkb_parses(bytes: &[u8]) -> bool {
    Wkb(bytes).to_geo().is_ok()
}
