//! Field Access
//!
//! Step-by-step traversal of `.field` / `[index]` accessors over typed
//! values. Any undefined step fails with a stable error naming the field and
//! the type it was applied to.

use serde_json::Value;

use crate::ast::types::FieldAccess;
use crate::interpreter::errors::MlldError;
use crate::values::ValueType;

fn type_name(value: &Value) -> String {
    ValueType::of(value).as_str().to_string()
}

/// Apply one accessor to a value.
fn step(value: &Value, field: &FieldAccess) -> Result<Value, MlldError> {
    match field {
        FieldAccess::Field(name) => {
            if let Value::Object(map) = value {
                if let Some(inner) = map.get(name) {
                    return Ok(inner.clone());
                }
            }
            // `.0` on an array is index access written as a field.
            if let (Value::Array(_), Ok(index)) = (value, name.parse::<i64>()) {
                return step(value, &FieldAccess::Index(index));
            }
            Err(MlldError::FieldAccess {
                field: name.clone(),
                value_type: type_name(value),
            })
        }
        FieldAccess::Index(index) => {
            if let Value::Array(items) = value {
                let len = items.len() as i64;
                let resolved = if *index < 0 { len + index } else { *index };
                if resolved >= 0 && resolved < len {
                    return Ok(items[resolved as usize].clone());
                }
            }
            Err(MlldError::FieldAccess {
                field: index.to_string(),
                value_type: type_name(value),
            })
        }
    }
}

/// Traverse a field path over a typed value.
pub fn traverse_fields(value: &Value, fields: &[FieldAccess]) -> Result<Value, MlldError> {
    let mut current = value.clone();
    for field in fields {
        current = step(&current, field)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_field() {
        let value = json!({"user": {"name": "ada"}});
        let fields = vec![
            FieldAccess::Field("user".to_string()),
            FieldAccess::Field("name".to_string()),
        ];
        assert_eq!(traverse_fields(&value, &fields).unwrap(), json!("ada"));
    }

    #[test]
    fn test_array_index() {
        let value = json!([10, 20, 30]);
        assert_eq!(
            traverse_fields(&value, &[FieldAccess::Index(1)]).unwrap(),
            json!(20)
        );
        assert_eq!(
            traverse_fields(&value, &[FieldAccess::Index(-1)]).unwrap(),
            json!(30)
        );
    }

    #[test]
    fn test_numeric_field_on_array() {
        let value = json!(["a", "b"]);
        assert_eq!(
            traverse_fields(&value, &[FieldAccess::Field("0".to_string())]).unwrap(),
            json!("a")
        );
    }

    #[test]
    fn test_undefined_step_fails_with_type() {
        let value = json!(42);
        let err = traverse_fields(&value, &[FieldAccess::Field("foo".to_string())]).unwrap_err();
        assert_eq!(err.to_string(), "Cannot access field foo of number");

        let value = json!({"a": 1});
        let err = traverse_fields(&value, &[FieldAccess::Field("b".to_string())]).unwrap_err();
        assert_eq!(err.to_string(), "Cannot access field b of object");
    }

    #[test]
    fn test_out_of_bounds_index() {
        let value = json!([1]);
        let err = traverse_fields(&value, &[FieldAccess::Index(3)]).unwrap_err();
        assert_eq!(err.to_string(), "Cannot access field 3 of array");
    }
}
