//! OC-001: Source-level types — Applications, definitions, revisions, manifests.
//!
//! Defines the YAML schema types for applications, the definition catalog,
//! recorded application revisions, and the compiled per-component manifests.
//! All types derive Serialize/Deserialize for YAML roundtripping.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// API version stamped on every document this crate writes.
pub const API_VERSION: &str = "core.oam.dev/v1beta1";

// ============================================================================
// Object metadata
// ============================================================================

/// Metadata shared by applications, definitions, and revisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectMeta {
    /// Object name
    #[serde(default)]
    pub name: String,

    /// Object namespace (empty = compiler default)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

// ============================================================================
// Application
// ============================================================================

/// Root document — the declarative description of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_application_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    pub spec: ApplicationSpec,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_application_kind() -> String {
    "Application".to_string()
}

/// Components, policies, and workflow of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplicationSpec {
    /// Component declarations (order-preserving)
    #[serde(default)]
    pub components: Vec<ApplicationComponent>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<AppPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
}

/// A single component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplicationComponent {
    /// Component name (unique within the application)
    pub name: String,

    /// ComponentDefinition name
    #[serde(rename = "type")]
    pub component_type: String,

    /// Free-form parameters bound into the definition template
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    /// Attached traits (order-preserving)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<ApplicationTrait>,

    /// External grouping resources this component belongs to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<ScopeRef>,
}

/// A trait attached to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplicationTrait {
    /// TraitDefinition name
    #[serde(rename = "type")]
    pub trait_type: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

/// Reference to a scope resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRef {
    pub name: String,
    pub api_version: String,
    pub kind: String,
}

/// An application-level policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppPolicy {
    pub name: String,

    /// PolicyDefinition name
    #[serde(rename = "type")]
    pub policy_type: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

/// Ordered workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Workflow {
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// A workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub name: String,

    /// WorkflowStepDefinition name (or a built-in step type)
    #[serde(rename = "type")]
    pub step_type: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Children of a `step-group` step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<WorkflowStep>,
}

// ============================================================================
// Definitions
// ============================================================================

/// Kind of catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum DefinitionKind {
    #[serde(rename = "ComponentDefinition")]
    Component,
    #[serde(rename = "TraitDefinition")]
    Trait,
    #[serde(rename = "PolicyDefinition")]
    Policy,
    #[serde(rename = "WorkflowStepDefinition")]
    WorkflowStep,
}

impl DefinitionKind {
    /// All kinds, in catalog order.
    pub const ALL: [DefinitionKind; 4] = [
        Self::Component,
        Self::Trait,
        Self::Policy,
        Self::WorkflowStep,
    ];

    /// Catalog object kind, e.g. `TraitDefinition`.
    pub fn object_kind(&self) -> &'static str {
        match self {
            Self::Component => "ComponentDefinition",
            Self::Trait => "TraitDefinition",
            Self::Policy => "PolicyDefinition",
            Self::WorkflowStep => "WorkflowStepDefinition",
        }
    }

    /// Parse a catalog object kind.
    pub fn from_object_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.object_kind() == kind)
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component => write!(f, "component"),
            Self::Trait => write!(f, "trait"),
            Self::Policy => write!(f, "policy"),
            Self::WorkflowStep => write!(f, "workflow step"),
        }
    }
}

/// A catalog entry: a template plus its implicit parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    pub kind: DefinitionKind,

    pub metadata: ObjectMeta,

    pub spec: DefinitionSpec,
}

/// Definition body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DefinitionSpec {
    /// Template source, evaluated by the template engine
    #[serde(default)]
    pub template: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Definition {
    /// Construct a definition from its kind, name, and template body.
    pub fn new(kind: DefinitionKind, name: &str, template: &str) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind,
            metadata: ObjectMeta {
                name: name.to_string(),
                ..ObjectMeta::default()
            },
            spec: DefinitionSpec {
                template: template.to_string(),
                description: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn template(&self) -> &str {
        &self.spec.template
    }
}

// ============================================================================
// Application revisions
// ============================================================================

/// A recorded compilation input: the application plus every definition it used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRevision {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_revision_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    pub spec: ApplicationRevisionSpec,
}

fn default_revision_kind() -> String {
    "ApplicationRevision".to_string()
}

/// Pinned definitions, each keyed by type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRevisionSpec {
    pub application: Application,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub component_definitions: IndexMap<String, Definition>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub trait_definitions: IndexMap<String, Definition>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub policy_definitions: IndexMap<String, Definition>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub workflow_step_definitions: IndexMap<String, Definition>,
}

impl ApplicationRevision {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The definition recorded for `(kind, type_name)`, if any.
    pub fn pinned(&self, kind: DefinitionKind, type_name: &str) -> Option<&Definition> {
        let table = match kind {
            DefinitionKind::Component => &self.spec.component_definitions,
            DefinitionKind::Trait => &self.spec.trait_definitions,
            DefinitionKind::Policy => &self.spec.policy_definitions,
            DefinitionKind::WorkflowStep => &self.spec.workflow_step_definitions,
        };
        table.get(type_name)
    }
}

// ============================================================================
// Compiled output
// ============================================================================

/// Reference to an external object, as handed to the reconciliation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// Final per-component output unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentManifest {
    /// Component name
    pub name: String,

    /// Rendered primary resource
    pub standard_workload: Value,

    /// Rendered auxiliary resources, in trait order
    #[serde(default)]
    pub traits: Vec<Value>,

    #[serde(default)]
    pub scopes: Vec<ObjectReference>,
}
