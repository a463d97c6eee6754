//! evaluated values and coercion into the types the extractor needs
//!
//! Module files are evaluated into [hcl::Value]s. The extractor only ever needs three shapes:
//! - string
//! - boolean
//! - list of strings
//!
//! Coercion rules:
//! - `null` is treated as if the key was not declared at all
//! - a string accepts strings, numbers and booleans (their textual form)
//! - a boolean accepts booleans and the strings `"true"`/`"false"`
//! - a list accepts arrays (tuples), each element coerced as a string
use hcl::Value;

/// Evaluated `locals` of one module file, in declaration order
pub type EvaluatedScope = indexmap::IndexMap<String, Value>;

/// Coerce to a string, `None` for `null`
pub fn coerce_string(value: &Value) -> Result<Option<String>, CoercionError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(CoercionError::new("string", other)),
    }
}

/// Coerce to a boolean, `None` for `null`
pub fn coerce_bool(value: &Value) -> Result<Option<bool>, CoercionError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::String(s) if s == "true" => Ok(Some(true)),
        Value::String(s) if s == "false" => Ok(Some(false)),
        other => Err(CoercionError::new("bool", other)),
    }
}

/// Coerce to a list of strings, `None` for `null`
///
/// An empty array stays an empty list; it is not the same as `None`.
pub fn coerce_string_list(value: &Value) -> Result<Option<Vec<String>>, CoercionError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(elements) => elements
            .iter()
            .map(|element| match coerce_string(element)? {
                Some(s) => Ok(s),
                None => Err(CoercionError::new("string", element)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        other => Err(CoercionError::new("list of strings", other)),
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("expected {expected}, found {found}")]
pub struct CoercionError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl CoercionError {
    fn new(expected: &'static str, found: &Value) -> Self {
        Self {
            expected,
            found: type_name(found),
        }
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Convert a JSON value into the value model used for evaluated HCL
pub fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(int), _, _) => Value::Number(hcl::Number::from(int)),
            (None, Some(uint), _) => Value::Number(hcl::Number::from(uint)),
            (None, None, Some(float)) => hcl::Number::from_f64(float)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            (None, None, None) => Value::Null,
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(array) => Value::Array(array.into_iter().map(from_json).collect()),
        serde_json::Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}
