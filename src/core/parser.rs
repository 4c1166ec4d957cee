//! OC-004: YAML parsing and validation.
//!
//! Parses applications, definitions, and revisions, and validates the
//! structural constraints of an application:
//! - Application name must not be empty
//! - Component names must be non-empty and unique
//! - Component, trait, policy, and workflow step types must not be empty
//! - Workflow step names must be unique

use super::types::*;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A document found in a catalog file.
#[derive(Debug, Clone)]
pub enum CatalogDocument {
    Definition(Box<Definition>),
    Revision(Box<ApplicationRevision>),
}

/// Parse an application file from disk.
pub fn parse_application_file(path: &Path) -> Result<Application, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_application(&content)
}

/// Parse an application from a string.
pub fn parse_application(yaml: &str) -> Result<Application, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Parse a single definition from a string.
pub fn parse_definition(yaml: &str) -> Result<Definition, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("definition parse error: {}", e))
}

/// Parse an application revision file from disk.
pub fn parse_revision_file(path: &Path) -> Result<ApplicationRevision, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_revision(&content)
}

/// Parse an application revision from a string.
pub fn parse_revision(yaml: &str) -> Result<ApplicationRevision, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("revision parse error: {}", e))
}

/// Parse every document of a (possibly multi-document) catalog file.
/// Documents of unrelated kinds are skipped.
pub fn parse_catalog_documents(yaml: &str) -> Result<Vec<CatalogDocument>, String> {
    let mut docs = Vec::new();
    for (index, de) in serde_yaml_ng::Deserializer::from_str(yaml).enumerate() {
        let value = serde_yaml_ng::Value::deserialize(de)
            .map_err(|e| format!("document {}: YAML parse error: {}", index, e))?;
        if value.is_null() {
            continue;
        }
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();

        if kind == "ApplicationRevision" {
            let rev: ApplicationRevision = serde_yaml_ng::from_value(value)
                .map_err(|e| format!("document {}: revision parse error: {}", index, e))?;
            docs.push(CatalogDocument::Revision(Box::new(rev)));
        } else if DefinitionKind::from_object_kind(&kind).is_some() {
            let def: Definition = serde_yaml_ng::from_value(value)
                .map_err(|e| format!("document {}: definition parse error: {}", index, e))?;
            docs.push(CatalogDocument::Definition(Box::new(def)));
        }
    }
    Ok(docs)
}

/// Validate a parsed application. Returns a list of errors (empty = valid).
pub fn validate_application(app: &Application) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if app.metadata.name.is_empty() {
        errors.push(ValidationError {
            message: "application name must not be empty".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for (index, comp) in app.spec.components.iter().enumerate() {
        if comp.name.is_empty() {
            errors.push(ValidationError {
                message: format!("component #{} has no name", index),
            });
        } else if !seen.insert(comp.name.as_str()) {
            errors.push(ValidationError {
                message: format!("duplicate component name '{}'", comp.name),
            });
        }

        if comp.component_type.is_empty() {
            errors.push(ValidationError {
                message: format!("component '{}' has no type", comp.name),
            });
        }

        for (t_index, tr) in comp.traits.iter().enumerate() {
            if tr.trait_type.is_empty() {
                errors.push(ValidationError {
                    message: format!("component '{}' trait #{} has no type", comp.name, t_index),
                });
            }
        }
    }

    for policy in &app.spec.policies {
        if policy.policy_type.is_empty() {
            errors.push(ValidationError {
                message: format!("policy '{}' has no type", policy.name),
            });
        }
    }

    if let Some(ref workflow) = app.spec.workflow {
        let mut names = HashSet::new();
        validate_steps(&workflow.steps, &mut names, &mut errors);
    }

    errors
}

fn validate_steps<'a>(
    steps: &'a [WorkflowStep],
    names: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    for step in steps {
        if step.step_type.is_empty() {
            errors.push(ValidationError {
                message: format!("workflow step '{}' has no type", step.name),
            });
        }
        if !names.insert(step.name.as_str()) {
            errors.push(ValidationError {
                message: format!("duplicate workflow step name '{}'", step.name),
            });
        }
        validate_steps(&step.sub_steps, names, errors);
    }
}
