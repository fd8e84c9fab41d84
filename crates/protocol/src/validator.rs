//! Schema-checked (de)serialization of command parameters and results.
//!
//! Every dispatchable method registers a schema keyed by `(type tag, method
//! name)`. Parameters are validated before the dispatcher invokes the
//! underlying operation; results are validated on the success path only -
//! domain errors are forwarded as-is, never validated as success payloads.

use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Parameter validation failure, surfaced verbatim to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{method} on {type_tag}: {message}")]
pub struct ValidationError {
    pub type_tag: String,
    pub method: String,
    pub message: String,
}

/// Primitive kind a schema field must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl ParamKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Bool => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

#[derive(Debug, Clone)]
struct MethodSchema {
    required: Vec<(&'static str, ParamKind)>,
    optional: Vec<(&'static str, ParamKind)>,
    /// Kind of the result payload; `None` means opaque / unchecked.
    result: Option<ParamKind>,
}

/// Registry of method schemas per dispatcher type.
pub struct Validator {
    table: HashMap<&'static str, HashMap<&'static str, MethodSchema>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Validator {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Registry covering the built-in dispatcher types.
    pub fn with_defaults() -> Self {
        let mut v = Self::empty();
        v.register("browser", "newContext", &[], &[("options", ParamKind::Object)], Some(ParamKind::Object));
        v.register("browser", "close", &[], &[], None);
        v.register("browserContext", "newPage", &[], &[], Some(ParamKind::Object));
        v.register("browserContext", "close", &[], &[], None);
        v.register("browserContext", "pause", &[], &[], None);
        v.register("browserContext", "resume", &[], &[("stepOnly", ParamKind::Bool)], None);
        v.register(
            "page",
            "click",
            &[("selector", ParamKind::String)],
            &[
                ("button", ParamKind::String),
                ("modifiers", ParamKind::Array),
                ("clickCount", ParamKind::Number),
                ("position", ParamKind::Object),
            ],
            None,
        );
        v.register(
            "page",
            "press",
            &[("selector", ParamKind::String), ("key", ParamKind::String)],
            &[("modifiers", ParamKind::Array)],
            None,
        );
        v.register(
            "page",
            "fill",
            &[("selector", ParamKind::String), ("text", ParamKind::String)],
            &[],
            None,
        );
        v.register("page", "check", &[("selector", ParamKind::String)], &[], None);
        v.register("page", "uncheck", &[("selector", ParamKind::String)], &[], None);
        v.register(
            "page",
            "selectOption",
            &[("selector", ParamKind::String), ("options", ParamKind::Array)],
            &[],
            None,
        );
        v.register("page", "close", &[], &[], None);
        v.register(
            "frame",
            "goto",
            &[("url", ParamKind::String)],
            &[("timeout", ParamKind::Number)],
            Some(ParamKind::Object),
        );
        v
    }

    pub fn register(
        &mut self,
        type_tag: &'static str,
        method: &'static str,
        required: &[(&'static str, ParamKind)],
        optional: &[(&'static str, ParamKind)],
        result: Option<ParamKind>,
    ) {
        self.table.entry(type_tag).or_default().insert(
            method,
            MethodSchema {
                required: required.to_vec(),
                optional: optional.to_vec(),
                result,
            },
        );
    }

    pub fn knows_method(&self, type_tag: &str, method: &str) -> bool {
        self.lookup(type_tag, method).is_some()
    }

    /// Validates `params` against the schema for `(type_tag, method)`.
    ///
    /// `null` is accepted as an empty object when no parameters are
    /// required. Returns the params object on success.
    pub fn validate_params(
        &self,
        type_tag: &str,
        method: &str,
        params: &Value,
    ) -> Result<Value, ValidationError> {
        let schema = self.lookup(type_tag, method).ok_or_else(|| {
            self.error(type_tag, method, format!("unknown method {type_tag}.{method}"))
        })?;

        let empty = Map::new();
        let object = match params {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(self.error(
                    type_tag,
                    method,
                    format!("params must be an object, got {}", kind_of(other)),
                ));
            }
        };

        for (field, kind) in &schema.required {
            match object.get(*field) {
                Some(value) if kind.matches(value) => {}
                Some(value) => {
                    return Err(self.error(
                        type_tag,
                        method,
                        format!(
                            "field '{field}' must be {}, got {}",
                            kind.describe(),
                            kind_of(value)
                        ),
                    ));
                }
                None => {
                    return Err(self.error(
                        type_tag,
                        method,
                        format!("missing required field '{field}'"),
                    ));
                }
            }
        }

        for (field, value) in object {
            let known = schema
                .required
                .iter()
                .chain(&schema.optional)
                .find(|(name, _)| name == field);
            match known {
                Some((_, kind)) if kind.matches(value) || value.is_null() => {}
                Some((_, kind)) => {
                    return Err(self.error(
                        type_tag,
                        method,
                        format!(
                            "field '{field}' must be {}, got {}",
                            kind.describe(),
                            kind_of(value)
                        ),
                    ));
                }
                None => {
                    return Err(self.error(
                        type_tag,
                        method,
                        format!("unexpected field '{field}'"),
                    ));
                }
            }
        }

        Ok(Value::Object(object.clone()))
    }

    /// Validates a successful result payload. Opaque results pass through.
    pub fn validate_result(
        &self,
        type_tag: &str,
        method: &str,
        result: &Value,
    ) -> Result<(), ValidationError> {
        let Some(schema) = self.lookup(type_tag, method) else {
            return Ok(());
        };
        match schema.result {
            Some(kind) if !result.is_null() && !kind.matches(result) => Err(self.error(
                type_tag,
                method,
                format!(
                    "result must be {}, got {}",
                    kind.describe(),
                    kind_of(result)
                ),
            )),
            _ => Ok(()),
        }
    }

    fn lookup(&self, type_tag: &str, method: &str) -> Option<&MethodSchema> {
        self.table.get(type_tag)?.get(method)
    }

    fn error(&self, type_tag: &str, method: &str, message: String) -> ValidationError {
        ValidationError {
            type_tag: type_tag.to_string(),
            method: method.to_string(),
            message,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
