//! Template evaluation — the engine contract and the shipped YAML engine.
//!
//! The compiler only depends on [`TemplateEngine`]. An engine receives the
//! template body, the caller-bound `parameter` tree and the ambient `context`
//! tree, and returns the rendered primary output, named auxiliary outputs,
//! and an optional patch for the primary output.

pub mod engine;
pub mod schema;

pub use engine::YamlTemplateEngine;

use crate::core::error::TemplateError;
use crate::core::value;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Evaluates definition templates.
///
/// Implementations must be pure: evaluating the same inputs twice yields the
/// same result and never mutates the caller's trees.
pub trait TemplateEngine: Send + Sync + fmt::Debug {
    fn evaluate(
        &self,
        template: &str,
        parameter: &Value,
        context: &Value,
    ) -> Result<RenderedTemplate, TemplateError>;
}

/// Result of evaluating one template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedTemplate {
    /// Primary output (`output:`)
    pub output: Option<Value>,

    /// Named auxiliary outputs (`outputs.<key>:`), in template order
    pub outputs: IndexMap<String, Value>,

    /// Fragment to merge into the primary output (`patch:`)
    pub patch: Option<Patch>,
}

/// A patch fragment and the strategy used to apply it.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub strategy: PatchStrategy,
    pub fragment: Value,
}

impl Patch {
    /// Apply the fragment to `target` in place.
    pub fn apply(&self, target: &mut Value) {
        match self.strategy {
            PatchStrategy::Merge => value::deep_merge(target, &self.fragment),
            PatchStrategy::Replace => value::replace_keys(target, &self.fragment),
            PatchStrategy::JsonMergePatch => value::json_merge_patch(target, &self.fragment),
        }
    }
}

/// How a trait patch is merged into the primary output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Deep merge of maps; other values replace
    #[default]
    Merge,
    /// Patch keys replace the matching keys wholesale
    Replace,
    /// RFC 7386; `null` deletes
    JsonMergePatch,
}

impl FromStr for PatchStrategy {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" | "strategic" => Ok(Self::Merge),
            "replace" | "retainKeys" => Ok(Self::Replace),
            "jsonMergePatch" | "json-merge-patch" => Ok(Self::JsonMergePatch),
            other => Err(TemplateError::InvalidPatchStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for PatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Replace => write!(f, "replace"),
            Self::JsonMergePatch => write!(f, "jsonMergePatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_oc010_patch_strategy_parse() {
        assert_eq!("merge".parse::<PatchStrategy>().unwrap(), PatchStrategy::Merge);
        assert_eq!(
            "retainKeys".parse::<PatchStrategy>().unwrap(),
            PatchStrategy::Replace
        );
        assert_eq!(
            "jsonMergePatch".parse::<PatchStrategy>().unwrap(),
            PatchStrategy::JsonMergePatch
        );
        assert_eq!(
            "sideways".parse::<PatchStrategy>(),
            Err(TemplateError::InvalidPatchStrategy("sideways".to_string()))
        );
    }

    #[test]
    fn test_oc010_patch_apply_strategies() {
        let base = json!({"spec": {"replicas": 1, "paused": true}});

        let mut merged = base.clone();
        Patch {
            strategy: PatchStrategy::Merge,
            fragment: json!({"spec": {"replicas": 4}}),
        }
        .apply(&mut merged);
        assert_eq!(merged, json!({"spec": {"replicas": 4, "paused": true}}));

        let mut replaced = base.clone();
        Patch {
            strategy: PatchStrategy::Replace,
            fragment: json!({"spec": {"replicas": 4}}),
        }
        .apply(&mut replaced);
        assert_eq!(replaced, json!({"spec": {"replicas": 4}}));

        let mut patched = base;
        Patch {
            strategy: PatchStrategy::JsonMergePatch,
            fragment: json!({"spec": {"paused": null}}),
        }
        .apply(&mut patched);
        assert_eq!(patched, json!({"spec": {"replicas": 1}}));
    }
}
