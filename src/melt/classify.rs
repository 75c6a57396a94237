//! Shape classification of JSON values
//!
//! Both the decomposer and the schema synthesizer branch on the shape of a
//! value. Keeping the decision in one exhaustive match means a new variant
//! cannot be silently ignored by either of them.

use serde_json::Value;

/// Structural shape of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    /// Null, boolean, number or string
    Scalar,
    /// A JSON object
    Object,
    /// Array whose elements are mostly objects
    ArrayOfObject,
    /// Array whose elements are mostly scalars (or nested arrays)
    ArrayOfScalar,
    /// Array with no elements (element type unknown)
    EmptyArray,
}

impl ValueShape {
    pub fn is_composite(self) -> bool {
        !matches!(self, ValueShape::Scalar)
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueShape::ArrayOfObject | ValueShape::ArrayOfScalar | ValueShape::EmptyArray
        )
    }

    /// Short human-readable name used in warnings and validation errors
    pub fn describe(self) -> &'static str {
        match self {
            ValueShape::Scalar => "a scalar",
            ValueShape::Object => "an object",
            ValueShape::ArrayOfObject => "an array of objects",
            ValueShape::ArrayOfScalar => "an array of scalars",
            ValueShape::EmptyArray => "an empty array",
        }
    }
}

/// Classify a JSON value. Total: every value has a shape.
pub fn classify(value: &Value) -> ValueShape {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => ValueShape::Scalar,
        Value::Object(_) => ValueShape::Object,
        Value::Array(arr) => classify_array(arr),
    }
}

fn classify_array(arr: &[Value]) -> ValueShape {
    if arr.is_empty() {
        return ValueShape::EmptyArray;
    }

    // If most elements are objects, treat as an array of objects
    let object_count = arr.iter().filter(|v| matches!(v, Value::Object(_))).count();
    if object_count > arr.len() / 2 {
        ValueShape::ArrayOfObject
    } else {
        ValueShape::ArrayOfScalar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        for value in [json!(null), json!(true), json!(1), json!(1.5), json!("x")] {
            assert_eq!(classify(&value), ValueShape::Scalar);
        }
    }

    #[test]
    fn test_arrays() {
        assert_eq!(classify(&json!([])), ValueShape::EmptyArray);
        assert_eq!(classify(&json!([{"a": 1}, {"a": 2}])), ValueShape::ArrayOfObject);
        assert_eq!(classify(&json!([1, 2, 3])), ValueShape::ArrayOfScalar);
        assert_eq!(classify(&json!([[1], [2]])), ValueShape::ArrayOfScalar);
    }

    #[test]
    fn test_mixed_array_majority() {
        assert_eq!(classify(&json!([{"a": 1}, {"a": 2}, 3])), ValueShape::ArrayOfObject);
        assert_eq!(classify(&json!([{"a": 1}, 2])), ValueShape::ArrayOfScalar);
    }

    #[test]
    fn test_object() {
        let shape = classify(&json!({"a": 1}));
        assert_eq!(shape, ValueShape::Object);
        assert!(shape.is_composite());
        assert!(!shape.is_array());
    }
}
