//! Extraction of row values from Arrow record batches.
//!
//! Columnar formats decode whole batches; the reader hands them out one row
//! at a time by pulling the value at `(column, row)` for every field.

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, LargeBinaryArray, LargeListArray, LargeStringArray,
    ListArray, StringArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType as ArrowType;

use crate::error::MismatchError;
use crate::row::{FieldValue, Value};
use crate::schema::FieldSpec;

/// Read the value of `field` at `row` from `array`.
///
/// Nulls come back as [`FieldValue::Null`]; whether that is acceptable is
/// decided by schema validation.
pub fn read_value(array: &ArrayRef, row: usize, field: &FieldSpec) -> Result<FieldValue, MismatchError> {
    if array.is_null(row) {
        return Ok(FieldValue::Null);
    }

    if !field.multi_valued {
        return Ok(FieldValue::Single(read_scalar(array.as_ref(), row, field)?));
    }

    let elements = match array.data_type() {
        ArrowType::List(_) => downcast::<ListArray>(array.as_ref(), field)?.value(row),
        ArrowType::LargeList(_) => downcast::<LargeListArray>(array.as_ref(), field)?.value(row),
        _ => {
            return Err(MismatchError::Cardinality {
                field: field.name.clone(),
                multi_valued: true,
            })
        }
    };

    let mut values = Vec::with_capacity(elements.len());
    for i in 0..elements.len() {
        if elements.is_null(i) {
            return Err(MismatchError::UnexpectedNull {
                field: field.name.clone(),
            });
        }
        values.push(read_scalar(elements.as_ref(), i, field)?);
    }
    Ok(FieldValue::Multi(values))
}

fn downcast<'a, A: Array + 'static>(
    array: &'a dyn Array,
    field: &FieldSpec,
) -> Result<&'a A, MismatchError> {
    array
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| type_mismatch(array, field))
}

fn type_mismatch(array: &dyn Array, field: &FieldSpec) -> MismatchError {
    MismatchError::TypeMismatch {
        field: field.name.clone(),
        expected: field.data_type.to_string(),
        got: format!("{:?}", array.data_type()),
    }
}

/// Read one non-null scalar, widening integers to `i64` and floats to `f64`.
fn read_scalar(array: &dyn Array, row: usize, field: &FieldSpec) -> Result<Value, MismatchError> {
    let value = match array.data_type() {
        ArrowType::Int8 => Value::Int(downcast::<Int8Array>(array, field)?.value(row).into()),
        ArrowType::Int16 => Value::Int(downcast::<Int16Array>(array, field)?.value(row).into()),
        ArrowType::Int32 => Value::Int(downcast::<Int32Array>(array, field)?.value(row).into()),
        ArrowType::Int64 => Value::Int(downcast::<Int64Array>(array, field)?.value(row)),
        ArrowType::UInt8 => Value::Int(downcast::<UInt8Array>(array, field)?.value(row).into()),
        ArrowType::UInt16 => Value::Int(downcast::<UInt16Array>(array, field)?.value(row).into()),
        ArrowType::UInt32 => Value::Int(downcast::<UInt32Array>(array, field)?.value(row).into()),
        ArrowType::UInt64 => {
            let v = downcast::<UInt64Array>(array, field)?.value(row);
            Value::Int(i64::try_from(v).map_err(|_| MismatchError::Unparseable {
                field: field.name.clone(),
                value: v.to_string(),
                expected: field.data_type.to_string(),
            })?)
        }
        ArrowType::Float32 => {
            Value::Float(downcast::<Float32Array>(array, field)?.value(row).into())
        }
        ArrowType::Float64 => Value::Float(downcast::<Float64Array>(array, field)?.value(row)),
        ArrowType::Utf8 => Value::String(downcast::<StringArray>(array, field)?.value(row).to_string()),
        ArrowType::LargeUtf8 => {
            Value::String(downcast::<LargeStringArray>(array, field)?.value(row).to_string())
        }
        ArrowType::Boolean => Value::Boolean(downcast::<BooleanArray>(array, field)?.value(row)),
        ArrowType::Binary => Value::Bytes(downcast::<BinaryArray>(array, field)?.value(row).to_vec()),
        ArrowType::LargeBinary => {
            Value::Bytes(downcast::<LargeBinaryArray>(array, field)?.value(row).to_vec())
        }
        _ => return Err(type_mismatch(array, field)),
    };

    if value.data_type() != field.data_type {
        return Err(type_mismatch(array, field));
    }
    Ok(value)
}
