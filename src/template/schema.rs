//! OC-011: Parameter schemas — the `parameter:` block of a template.
//!
//! A schema declares typed parameters. Binding validates caller-supplied
//! values against the declarations and fills defaults, which are validated
//! and bound through nested schemas like any supplied value:
//!
//! ```yaml
//! parameter:
//!   image: string
//!   cmd: { type: array, optional: true }
//!   replicas: { type: int, default: 1, min: 0 }
//! ```

use crate::core::error::TemplateError;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Declared parameter type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Int,
    Number,
    Bool,
    Array,
    Object,
    #[default]
    Any,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Int => write!(f, "int"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl ParameterType {
    fn from_shorthand(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// A single parameter declaration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterField {
    #[serde(rename = "type", default)]
    pub field_type: ParameterType,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub optional: bool,

    #[serde(rename = "enum", default)]
    pub choices: Vec<Value>,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(default)]
    pub description: Option<String>,

    /// Nested declarations for `object` parameters
    #[serde(default)]
    pub properties: Option<Value>,
}

/// Ordered set of parameter declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    fields: IndexMap<String, (ParameterField, Option<ParameterSchema>)>,
}

impl ParameterSchema {
    /// Parse a `parameter:` block.
    pub fn from_value(block: &Value) -> Result<Self, TemplateError> {
        Self::parse(block, "")
    }

    fn parse(block: &Value, prefix: &str) -> Result<Self, TemplateError> {
        let Value::Object(entries) = block else {
            return Err(TemplateError::InvalidSchema {
                name: prefix.trim_end_matches('.').to_string(),
                message: "parameter block must be a map".to_string(),
            });
        };

        let mut fields = IndexMap::new();
        for (name, decl) in entries {
            let qualified = format!("{}{}", prefix, name);
            let field = match decl {
                Value::String(shorthand) => ParameterField {
                    field_type: ParameterType::from_shorthand(shorthand).ok_or_else(|| {
                        TemplateError::InvalidSchema {
                            name: qualified.clone(),
                            message: format!("unknown type '{}'", shorthand),
                        }
                    })?,
                    ..ParameterField::default()
                },
                other => serde_json::from_value::<ParameterField>(other.clone()).map_err(|e| {
                    TemplateError::InvalidSchema {
                        name: qualified.clone(),
                        message: e.to_string(),
                    }
                })?,
            };
            let nested = match &field.properties {
                Some(props) => Some(Self::parse(props, &format!("{}.", qualified))?),
                None => None,
            };
            fields.insert(name.clone(), (field, nested));
        }
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&ParameterField> {
        self.fields.get(name).map(|(f, _)| f)
    }

    /// Validate `provided` and return a fresh tree with defaults filled in.
    pub fn bind(&self, provided: &Value) -> Result<Value, TemplateError> {
        self.bind_at(provided, "")
    }

    fn bind_at(&self, provided: &Value, prefix: &str) -> Result<Value, TemplateError> {
        let empty = Map::new();
        let given = match provided {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                let name = if prefix.is_empty() {
                    "parameter".to_string()
                } else {
                    prefix.trim_end_matches('.').to_string()
                };
                return Err(TemplateError::NotAnObject(name));
            }
        };

        if let Some(unknown) = given.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(TemplateError::UnknownParameter(format!("{}{}", prefix, unknown)));
        }

        let mut bound = Map::new();
        for (name, (field, nested)) in &self.fields {
            let qualified = format!("{}{}", prefix, name);
            // Defaults are held to the same declaration as supplied values
            let value = match (given.get(name).filter(|v| !v.is_null()), &field.default) {
                (Some(v), _) | (None, Some(v)) => v,
                (None, None) if field.optional => continue,
                (None, None) => return Err(TemplateError::MissingParameter(qualified)),
            };

            validate_field(&qualified, field, value)?;
            let value = match nested {
                Some(schema) => schema.bind_at(value, &format!("{}.", qualified))?,
                None => value.clone(),
            };
            bound.insert(name.clone(), value);
        }
        Ok(Value::Object(bound))
    }
}

/// Validate a single value against its declaration.
fn validate_field(name: &str, field: &ParameterField, value: &Value) -> Result<(), TemplateError> {
    if !field.field_type.accepts(value) {
        return Err(TemplateError::ParameterType {
            name: name.to_string(),
            expected: field.field_type.to_string(),
        });
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = field.min {
            if n < min {
                return Err(TemplateError::ParameterRange {
                    name: name.to_string(),
                    bound: format!(">= {}", min),
                });
            }
        }
        if let Some(max) = field.max {
            if n > max {
                return Err(TemplateError::ParameterRange {
                    name: name.to_string(),
                    bound: format!("<= {}", max),
                });
            }
        }
    }

    if !field.choices.is_empty() && !field.choices.contains(value) {
        return Err(TemplateError::ParameterEnum {
            name: name.to_string(),
            choices: field
                .choices
                .iter()
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    Ok(())
}
