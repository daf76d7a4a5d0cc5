//! JSON Schema validation for tool inputs.
//!
//! Covers the subset tool schemas use in practice:
//!
//! - `type` (single or list), `enum`, `const`
//! - objects: `properties`, `required`, `additionalProperties: false`
//! - arrays: `items`, `minItems`, `maxItems`
//! - strings: `minLength`, `maxLength`
//! - numbers: `minimum`, `maximum`
//!
//! Every violation is collected; validation does not stop at the first one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location of the offending value, e.g. `$.nilai` or `$.items[2]`.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result of validation: all issues found, or `Ok(())`.
pub type ValidationResult = Result<(), Vec<ValidationIssue>>;

/// Validates `value` against `schema`.
///
/// ```
/// use rapormcp_protocol::schema::validate;
/// use serde_json::json;
///
/// let schema = json!({
///     "type": "object",
///     "properties": { "nama": { "type": "string" } },
///     "required": ["nama"]
/// });
///
/// assert!(validate(&schema, &json!({ "nama": "Fisika" })).is_ok());
/// assert!(validate(&schema, &json!({})).is_err());
/// ```
pub fn validate(schema: &Value, value: &Value) -> ValidationResult {
    let mut walker = Walker::default();
    walker.check(schema, value, "$".to_string());
    if walker.issues.is_empty() {
        Ok(())
    } else {
        Err(walker.issues)
    }
}

/// Joins issues into a single line for error messages.
#[must_use]
pub fn describe_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Default)]
struct Walker {
    issues: Vec<ValidationIssue>,
}

impl Walker {
    fn report(&mut self, path: &str, message: String) {
        self.issues.push(ValidationIssue {
            path: path.to_string(),
            message,
        });
    }

    fn check(&mut self, schema: &Value, value: &Value, path: String) {
        let rules = match schema {
            Value::Bool(true) => return,
            Value::Bool(false) => {
                self.report(&path, "no value is allowed here".to_string());
                return;
            }
            Value::Object(rules) => rules,
            // Not a schema; nothing to enforce.
            _ => return,
        };

        if let Some(expected) = rules.get("type") {
            if !type_matches(expected, value) {
                self.report(
                    &path,
                    format!("expected {}, got {}", describe_type(expected), type_name(value)),
                );
                return;
            }
        }

        if let Some(Value::Array(allowed)) = rules.get("enum") {
            if !allowed.contains(value) {
                let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                self.report(&path, format!("must be one of {}", allowed.join(", ")));
            }
        }

        if let Some(expected) = rules.get("const") {
            if expected != value {
                self.report(&path, format!("must equal {expected}"));
            }
        }

        match value {
            Value::Object(fields) => self.check_object(rules, fields, &path),
            Value::Array(items) => self.check_array(rules, items, &path),
            Value::String(text) => self.check_string(rules, text, &path),
            Value::Number(_) => self.check_number(rules, value, &path),
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn check_object(&mut self, rules: &Map<String, Value>, fields: &Map<String, Value>, path: &str) {
        if let Some(Value::Array(required)) = rules.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    self.report(&format!("{path}.{name}"), "is required".to_string());
                }
            }
        }

        let properties = rules.get("properties").and_then(Value::as_object);
        for (name, field) in fields {
            let field_path = format!("{path}.{name}");
            match properties.and_then(|p| p.get(name)) {
                Some(field_schema) => self.check(field_schema, field, field_path),
                None => match rules.get("additionalProperties") {
                    Some(Value::Bool(false)) => {
                        self.report(&field_path, "is not an allowed property".to_string());
                    }
                    Some(extra @ Value::Object(_)) => self.check(extra, field, field_path),
                    _ => {}
                },
            }
        }
    }

    fn check_array(&mut self, rules: &Map<String, Value>, items: &[Value], path: &str) {
        if let Some(min) = rules.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                self.report(path, format!("must contain at least {min} items"));
            }
        }
        if let Some(max) = rules.get("maxItems").and_then(Value::as_u64) {
            if (items.len() as u64) > max {
                self.report(path, format!("must contain at most {max} items"));
            }
        }
        if let Some(item_schema) = rules.get("items") {
            for (index, item) in items.iter().enumerate() {
                self.check(item_schema, item, format!("{path}[{index}]"));
            }
        }
    }

    fn check_string(&mut self, rules: &Map<String, Value>, text: &str, path: &str) {
        let length = text.chars().count() as u64;
        if let Some(min) = rules.get("minLength").and_then(Value::as_u64) {
            if length < min {
                self.report(path, format!("must be at least {min} characters"));
            }
        }
        if let Some(max) = rules.get("maxLength").and_then(Value::as_u64) {
            if length > max {
                self.report(path, format!("must be at most {max} characters"));
            }
        }
    }

    fn check_number(&mut self, rules: &Map<String, Value>, value: &Value, path: &str) {
        let Some(number) = value.as_f64() else {
            return;
        };
        if let Some(min) = rules.get("minimum").and_then(Value::as_f64) {
            if number < min {
                self.report(path, format!("must be >= {min}"));
            }
        }
        if let Some(max) = rules.get("maximum").and_then(Value::as_f64) {
            if number > max {
                self.report(path, format!("must be <= {max}"));
            }
        }
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, value)),
        _ => true,
    }
}

fn single_type_matches(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type keywords accept anything.
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
