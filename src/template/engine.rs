//! OC-012: YAML template engine.
//!
//! Templates are YAML documents with four reserved top-level sections:
//! `parameter` (schema), `output` (primary object), `outputs` (named
//! auxiliary objects) and `patch` + `patchStrategy` (fragment merged into the
//! primary object). Strings may reference `{{ parameter.x }}` and
//! `{{ context.x }}`:
//!
//! - a string made of a single reference takes the referenced value, type included
//! - references inside a longer string are stringified
//! - a whole-value reference to an absent value drops the map key or list item
//! - a map carrying `$if: <path>` is kept only when the path is present and truthy

use super::schema::ParameterSchema;
use super::{Patch, PatchStrategy, RenderedTemplate, TemplateEngine};
use crate::core::error::TemplateError;
use crate::core::value;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

const CONDITION_KEY: &str = "$if";
const ROOTS: [&str; 2] = ["parameter", "context"];

/// The built-in template engine.
#[derive(Debug, Clone)]
pub struct YamlTemplateEngine {
    reference: Regex,
    whole: Regex,
    path: Regex,
}

impl Default for YamlTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl YamlTemplateEngine {
    pub fn new() -> Self {
        // Patterns are literals; compilation cannot fail.
        Self {
            reference: Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid reference pattern"),
            whole: Regex::new(r"^\s*\{\{\s*([^{}]*?)\s*\}\}\s*$").expect("valid whole pattern"),
            path: Regex::new(r"^[A-Za-z_][\w-]*(\.[\w-]+)*$").expect("valid path pattern"),
        }
    }

    /// Resolve a dotted reference against the scope. `Ok(None)` = absent.
    fn resolve<'a>(&self, scope: &'a Value, expr: &str) -> Result<Option<&'a Value>, TemplateError> {
        if !self.path.is_match(expr) {
            return Err(TemplateError::InvalidExpression(expr.to_string()));
        }
        let segments: Vec<&str> = expr.split('.').collect();
        if !ROOTS.contains(&segments[0]) {
            return Err(TemplateError::InvalidExpression(expr.to_string()));
        }
        Ok(value::lookup(scope, &segments))
    }

    fn render_string(&self, s: &str, scope: &Value) -> Result<Option<Value>, TemplateError> {
        if let Some(caps) = self.whole.captures(s) {
            let expr = &caps[1];
            return Ok(self.resolve(scope, expr)?.cloned());
        }
        if !self.reference.is_match(s) {
            return Ok(Some(Value::String(s.to_string())));
        }

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in self.reference.captures_iter(s) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&s[last..whole.start()]);
            let value = self
                .resolve(scope, expr.as_str())?
                .ok_or_else(|| TemplateError::UnresolvedReference(expr.as_str().to_string()))?;
            out.push_str(&stringify(value));
            last = whole.end();
        }
        out.push_str(&s[last..]);
        Ok(Some(Value::String(out)))
    }

    fn condition_holds(&self, condition: &Value, scope: &Value) -> Result<bool, TemplateError> {
        let expr = match condition {
            Value::Bool(b) => return Ok(*b),
            Value::String(s) => match self.whole.captures(s) {
                Some(caps) => caps[1].to_string(),
                None => s.trim().to_string(),
            },
            other => return Err(TemplateError::InvalidExpression(other.to_string())),
        };
        Ok(match self.resolve(scope, &expr)? {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(_) => true,
        })
    }

    /// Render a template fragment. `Ok(None)` means the fragment is omitted.
    fn render(&self, node: &Value, scope: &Value) -> Result<Option<Value>, TemplateError> {
        match node {
            Value::String(s) => self.render_string(s, scope),
            Value::Array(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = self.render(item, scope)? {
                        rendered.push(v);
                    }
                }
                Ok(Some(Value::Array(rendered)))
            }
            Value::Object(map) => {
                if let Some(condition) = map.get(CONDITION_KEY) {
                    if !self.condition_holds(condition, scope)? {
                        return Ok(None);
                    }
                }
                let mut rendered = Map::new();
                for (k, v) in map {
                    if k == CONDITION_KEY {
                        continue;
                    }
                    if let Some(v) = self.render(v, scope)? {
                        rendered.insert(k.clone(), v);
                    }
                }
                Ok(Some(Value::Object(rendered)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    fn render_object(
        &self,
        node: &Value,
        scope: &Value,
        section: &str,
    ) -> Result<Option<Value>, TemplateError> {
        match self.render(node, scope)? {
            Some(v @ Value::Object(_)) => Ok(Some(v)),
            Some(_) => Err(TemplateError::NotAnObject(section.to_string())),
            None => Ok(None),
        }
    }
}

impl TemplateEngine for YamlTemplateEngine {
    fn evaluate(
        &self,
        template: &str,
        parameter: &Value,
        context: &Value,
    ) -> Result<RenderedTemplate, TemplateError> {
        let doc: Value = if template.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_yaml_ng::from_str(template).map_err(|e| TemplateError::Parse(e.to_string()))?
        };
        let Value::Object(sections) = doc else {
            return Err(TemplateError::Parse(
                "template must be a map of sections".to_string(),
            ));
        };

        let bound = match sections.get("parameter") {
            Some(block) => ParameterSchema::from_value(block)?.bind(parameter)?,
            None => match parameter {
                Value::Null => Value::Object(Map::new()),
                Value::Object(_) => parameter.clone(),
                _ => return Err(TemplateError::NotAnObject("parameter".to_string())),
            },
        };

        let mut scope = Map::new();
        scope.insert("parameter".to_string(), bound);
        scope.insert("context".to_string(), context.clone());
        let scope = Value::Object(scope);

        let output = match sections.get("output") {
            Some(node) => self.render_object(node, &scope, "output")?,
            None => None,
        };

        let mut outputs = IndexMap::new();
        if let Some(node) = sections.get("outputs") {
            let Value::Object(named) = node else {
                return Err(TemplateError::NotAnObject("outputs".to_string()));
            };
            for (key, body) in named {
                if let Some(rendered) = self.render_object(body, &scope, &format!("outputs.{}", key))? {
                    outputs.insert(key.clone(), rendered);
                }
            }
        }

        let strategy = match sections.get("patchStrategy") {
            Some(Value::String(s)) => s.parse::<PatchStrategy>()?,
            Some(other) => return Err(TemplateError::InvalidPatchStrategy(other.to_string())),
            None => PatchStrategy::default(),
        };
        let patch = match sections.get("patch") {
            Some(node) => self
                .render_object(node, &scope, "patch")?
                .map(|fragment| Patch { strategy, fragment }),
            None => None,
        };

        Ok(RenderedTemplate {
            output,
            outputs,
            patch,
        })
    }
}

/// Render a value for embedding inside a larger string.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
