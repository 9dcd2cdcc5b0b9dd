//! Compatibility between declared schemas and the structure a source reports.
//!
//! Self-describing formats (Parquet) carry an Arrow schema. This module maps
//! that schema onto field declarations and checks a caller-supplied schema
//! against it:
//!
//! - integer widths collapse to `int`, float widths to `float`
//! - `List`/`LargeList` of a supported scalar becomes a multi-valued field
//! - every supplied field must exist in the source with the same type and
//!   cardinality; source fields the caller did not ask for are ignored

use arrow::datatypes::{DataType as ArrowType, Field, Schema as ArrowSchema};

use super::{DataType, FieldSpec, Schema};
use crate::error::MismatchError;

/// Map a scalar Arrow type to a field data type.
fn scalar_type(data_type: &ArrowType) -> Option<DataType> {
    match data_type {
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32
        | ArrowType::UInt64 => Some(DataType::Int),
        ArrowType::Float32 | ArrowType::Float64 => Some(DataType::Float),
        ArrowType::Utf8 | ArrowType::LargeUtf8 => Some(DataType::String),
        ArrowType::Boolean => Some(DataType::Boolean),
        ArrowType::Binary | ArrowType::LargeBinary => Some(DataType::Bytes),
        _ => None,
    }
}

/// Translate one Arrow field into a field declaration.
pub fn spec_from_arrow(field: &Field) -> Result<FieldSpec, MismatchError> {
    let unsupported = || MismatchError::UnsupportedType {
        field: field.name().clone(),
        data_type: format!("{:?}", field.data_type()),
    };

    let (data_type, multi_valued) = match field.data_type() {
        ArrowType::List(item) | ArrowType::LargeList(item) => {
            (scalar_type(item.data_type()).ok_or_else(unsupported)?, true)
        }
        other => (scalar_type(other).ok_or_else(unsupported)?, false),
    };

    Ok(FieldSpec {
        name: field.name().clone(),
        data_type,
        multi_valued,
        nullable: field.is_nullable(),
    })
}

/// Derive a schema from an Arrow schema.
pub fn schema_from_arrow(schema: &ArrowSchema) -> Result<Schema, MismatchError> {
    let fields = schema
        .fields()
        .iter()
        .map(|f| spec_from_arrow(f))
        .collect::<Result<Vec<_>, _>>()?;

    Schema::new(fields).map_err(|e| MismatchError::InvalidSchema {
        reason: e.to_string(),
    })
}

/// Check a supplied schema against the schema a source derived.
///
/// Succeeds when every expected field is present in `derived` with the same
/// type and cardinality, and the source cannot produce nulls for a field the
/// caller declared as required.
pub fn reconcile(expected: &Schema, derived: &Schema) -> Result<(), MismatchError> {
    for field in expected.fields() {
        let found = derived
            .field(&field.name)
            .ok_or_else(|| MismatchError::MissingField {
                field: field.name.clone(),
            })?;

        let conflict = found.data_type != field.data_type
            || found.multi_valued != field.multi_valued
            || (found.nullable && !field.nullable);

        if conflict {
            return Err(MismatchError::DefinitionConflict {
                field: field.name.clone(),
                expected: field.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    mod arrow_mapping {
        use super::*;

        #[test]
        fn test_integer_widths_collapse() {
            for dt in [ArrowType::Int8, ArrowType::Int32, ArrowType::UInt64] {
                let spec = spec_from_arrow(&Field::new("n", dt, false)).unwrap();
                assert_eq!(spec, FieldSpec::new("n", DataType::Int));
            }
        }

        #[test]
        fn test_list_is_multi_valued() {
            let field = Field::new(
                "tags",
                ArrowType::List(Arc::new(Field::new("item", ArrowType::Utf8, true))),
                true,
            );
            let spec = spec_from_arrow(&field).unwrap();
            assert_eq!(spec, FieldSpec::new("tags", DataType::String).multi_valued().nullable());
        }

        #[test]
        fn test_unsupported_type() {
            let field = Field::new("d", ArrowType::Date32, false);
            assert!(matches!(
                spec_from_arrow(&field),
                Err(MismatchError::UnsupportedType { .. })
            ));
        }

        #[test]
        fn test_nested_list_unsupported() {
            let inner = ArrowType::List(Arc::new(Field::new("item", ArrowType::Int32, true)));
            let field = Field::new(
                "grid",
                ArrowType::List(Arc::new(Field::new("item", inner, true))),
                false,
            );
            assert!(spec_from_arrow(&field).is_err());
        }

        #[test]
        fn test_schema_from_arrow() {
            let arrow = ArrowSchema::new(vec![
                Field::new("id", ArrowType::Int64, false),
                Field::new("name", ArrowType::Utf8, true),
                Field::new("raw", ArrowType::Binary, false),
            ]);
            let schema = schema_from_arrow(&arrow).unwrap();
            assert_eq!(schema.len(), 3);
            assert_eq!(
                schema.field("name"),
                Some(&FieldSpec::new("name", DataType::String).nullable())
            );
            assert_eq!(schema.field("raw").unwrap().data_type, DataType::Bytes);
        }
    }

    mod reconciliation {
        use super::*;

        fn derived() -> Schema {
            Schema::new(vec![
                FieldSpec::new("id", DataType::Int),
                FieldSpec::new("name", DataType::String).nullable(),
                FieldSpec::new("tags", DataType::String).multi_valued(),
            ])
            .unwrap()
        }

        #[test]
        fn test_subset_is_accepted() {
            let expected = Schema::new(vec![FieldSpec::new("id", DataType::Int)]).unwrap();
            assert_eq!(reconcile(&expected, &derived()), Ok(()));
        }

        #[test]
        fn test_missing_field() {
            let expected = Schema::new(vec![FieldSpec::new("age", DataType::Int)]).unwrap();
            assert_eq!(
                reconcile(&expected, &derived()),
                Err(MismatchError::MissingField { field: "age".into() })
            );
        }

        #[test]
        fn test_type_conflict() {
            let expected = Schema::new(vec![FieldSpec::new("id", DataType::String)]).unwrap();
            assert_eq!(
                reconcile(&expected, &derived()),
                Err(MismatchError::DefinitionConflict {
                    field: "id".into(),
                    expected: "string".into(),
                    found: "int".into(),
                })
            );
        }

        #[test]
        fn test_cardinality_conflict() {
            let expected = Schema::new(vec![FieldSpec::new("tags", DataType::String)]).unwrap();
            assert!(reconcile(&expected, &derived()).is_err());
        }

        #[test]
        fn test_nullable_source_needs_nullable_declaration() {
            let required = Schema::new(vec![FieldSpec::new("name", DataType::String)]).unwrap();
            assert!(reconcile(&required, &derived()).is_err());

            let nullable =
                Schema::new(vec![FieldSpec::new("name", DataType::String).nullable()]).unwrap();
            assert_eq!(reconcile(&nullable, &derived()), Ok(()));
        }
    }
}
