//! Structured Values
//!
//! The common value envelope carried across every pipeline hop: a canonical
//! text form for shell/display, a typed JSON form for field access, a type
//! tag, and a security descriptor. Wrapping primitives is idempotent.

use std::fmt;

use serde_json::Value;

use crate::values::descriptor::SecurityDescriptor;

/// Type tag derived from the typed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Object,
    Array,
    Number,
    Boolean,
    Null,
    Binary,
}

impl ValueType {
    /// Derive the tag for a JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueType::Text,
            Value::Object(_) => ValueType::Object,
            Value::Array(_) => ValueType::Array,
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Boolean,
            Value::Null => ValueType::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Null => "null",
            ValueType::Binary => "binary",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The uniform carrier consumed and produced by every evaluator and stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredValue {
    /// Canonical string form for shell injection and display
    pub text: String,
    /// Structured form for field access and pipeline stages
    pub typed: Value,
    /// Type tag of the typed form
    pub value_type: ValueType,
    /// Labels/taint/sources carried with the value
    pub descriptor: SecurityDescriptor,
}

/// Canonical text form of a JSON value: strings are unquoted, scalars use
/// their literal form, containers serialize compactly.
pub fn canonical_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

impl StructuredValue {
    /// Wrap a typed JSON value.
    pub fn from_json(typed: Value) -> Self {
        let value_type = ValueType::of(&typed);
        Self {
            text: canonical_text(&typed),
            typed,
            value_type,
            descriptor: SecurityDescriptor::new(),
        }
    }

    /// Wrap plain text.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            typed: Value::String(text.clone()),
            text,
            value_type: ValueType::Text,
            descriptor: SecurityDescriptor::new(),
        }
    }

    /// The empty text value.
    pub fn empty() -> Self {
        Self::from_text("")
    }

    /// The null value.
    pub fn null() -> Self {
        Self::from_json(Value::Null)
    }

    pub fn with_descriptor(mut self, descriptor: SecurityDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Union another descriptor into this value's descriptor.
    pub fn merge_descriptor(&mut self, other: &SecurityDescriptor) {
        self.descriptor.merge(other);
    }

    /// Unwrap back to the typed primitive.
    pub fn into_typed(self) -> Value {
        self.typed
    }

    /// Truthiness used by `when`/`if` conditions: null, false, 0, and the
    /// empty string are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match &self.typed {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        self.typed.as_array()
    }
}

impl Default for StructuredValue {
    fn default() -> Self {
        Self::empty()
    }
}
