//! Validation schemas.
//!
//! # Responsibilities
//! - Define the `safe_parse` contract shared by every validated accessor
//! - Report the declared shape of a body schema (text vs. structured)
//! - Provide a JSON Schema backed implementation
//!
//! # Design Decisions
//! - Schemas are compiled once at route registration, shared via `Arc`
//! - Scalar coercion happens before validation so `"5"` satisfies `integer`
//! - Format keywords (`email`, `uri`, ...) are asserted, not annotated

use std::fmt;

use serde_json::Value;

/// Declared shape of a schema, used to pick how a body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// The body is read as text.
    Text,
    /// The body is read as JSON (or flattened form data).
    Structured,
}

/// Why a value failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("schema validation failed: {}", .issues.join("; "))]
pub struct SchemaError {
    pub issues: Vec<String>,
}

impl SchemaError {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

/// A validation schema.
///
/// `safe_parse` returns the (possibly coerced) value on success.
pub trait Schema: Send + Sync + fmt::Debug {
    /// Validate `value`, returning the coerced data.
    fn safe_parse(&self, value: Value) -> Result<Value, SchemaError>;

    /// Declared shape. Defaults to structured.
    fn shape(&self) -> Shape {
        Shape::Structured
    }
}

/// A schema compiled from a JSON Schema document.
pub struct JsonSchema {
    source: Value,
    validator: jsonschema::Validator,
    shape: Shape,
}

impl JsonSchema {
    /// Compile a JSON Schema document.
    pub fn new(source: Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&source)
            .map_err(|e| SchemaError::new(e.to_string()))?;
        let shape = shape_of(&source);

        Ok(Self {
            source,
            validator,
            shape,
        })
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("source", &self.source)
            .field("shape", &self.shape)
            .finish()
    }
}

impl Schema for JsonSchema {
    fn safe_parse(&self, value: Value) -> Result<Value, SchemaError> {
        let value = coerce(value, &self.source);
        let issues: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|e| e.to_string())
            .collect();

        if issues.is_empty() {
            Ok(value)
        } else {
            Err(SchemaError { issues })
        }
    }

    fn shape(&self) -> Shape {
        self.shape
    }
}

/// Determine the shape a body must be read as.
///
/// A schema is text-shaped when it only ever admits strings: `type: string`,
/// string `const`/`enum`, or a union whose members are all text-shaped.
fn shape_of(schema: &Value) -> Shape {
    if is_text(schema) {
        Shape::Text
    } else {
        Shape::Structured
    }
}

fn is_text(schema: &Value) -> bool {
    if schema.get("type").and_then(Value::as_str) == Some("string") {
        return true;
    }
    if let Some(constant) = schema.get("const") {
        return constant.is_string();
    }
    if let Some(variants) = schema.get("enum").and_then(Value::as_array) {
        return !variants.is_empty() && variants.iter().all(Value::is_string);
    }
    for key in ["anyOf", "oneOf"] {
        if let Some(members) = schema.get(key).and_then(Value::as_array) {
            return !members.is_empty() && members.iter().all(is_text);
        }
    }
    false
}

/// Coerce strings into the scalar types the schema declares.
///
/// Object properties and array items are coerced against their own
/// subschemas. Values that do not parse are passed through unchanged so
/// validation reports them.
fn coerce(value: Value, schema: &Value) -> Value {
    if let Value::Array(items) = value {
        let item_schema = schema.get("items").unwrap_or(&Value::Null);
        return Value::Array(items.into_iter().map(|item| coerce(item, item_schema)).collect());
    }

    if let Value::Object(map) = value {
        let properties = schema.get("properties").and_then(Value::as_object);
        return Value::Object(
            map.into_iter()
                .map(|(key, field)| match properties.and_then(|p| p.get(&key)) {
                    Some(property) => {
                        let field = coerce(field, property);
                        (key, field)
                    }
                    None => (key, field),
                })
                .collect(),
        );
    }

    let Value::String(raw) = &value else {
        return value;
    };

    match schema.get("type").and_then(Value::as_str) {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(value),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(value),
        Some("boolean") => raw
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or(value),
        Some("array") => {
            let items = schema.get("items").unwrap_or(&Value::Null);
            Value::Array(
                raw.split(',')
                    .filter(|part| !part.is_empty())
                    .map(|part| coerce(Value::String(part.to_string()), items))
                    .collect(),
            )
        }
        _ => value,
    }
}
