//! OC-002: Error taxonomy for the compilation pipeline.

use super::types::DefinitionKind;

/// Failure reported by a definition store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} definition {name} not found")]
    NotFound { kind: DefinitionKind, name: String },
    #[error("application revision {0} not found")]
    RevisionNotFound(String),
    #[error("definition store backend error: {0}")]
    Backend(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::RevisionNotFound(_))
    }
}

/// Failure evaluating a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
    #[error("parameter `{0}` is required")]
    MissingParameter(String),
    #[error("parameter `{name}` must be of type {expected}")]
    ParameterType { name: String, expected: String },
    #[error("parameter `{name}` must be {bound}")]
    ParameterRange { name: String, bound: String },
    #[error("parameter `{name}` must be one of: {choices}")]
    ParameterEnum { name: String, choices: String },
    #[error("parameter `{0}` is not declared by the template")]
    UnknownParameter(String),
    #[error("invalid parameter schema for `{name}`: {message}")]
    InvalidSchema { name: String, message: String },
    #[error("reference `{0}` cannot be resolved")]
    UnresolvedReference(String),
    #[error("invalid expression `{0}`")]
    InvalidExpression(String),
    #[error("template produced no primary output")]
    MissingOutput,
    #[error("unknown patch strategy `{0}`")]
    InvalidPatchStrategy(String),
    #[error("{0} must be an object")]
    NotAnObject(String),
    #[error("output `{0}` collides with an earlier auxiliary object of the same component")]
    DuplicateOutput(String),
    #[error("`patch` is only valid in trait templates")]
    UnexpectedPatch,
}

/// Failure of a compilation run. Compilation is all-or-nothing.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to get {kind} definition {type_name}: not found")]
    DefinitionNotFound {
        kind: DefinitionKind,
        type_name: String,
    },
    #[error("failed to render {template_ref}: {source}")]
    TemplateEvaluation {
        template_ref: String,
        #[source]
        source: TemplateError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid application: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl CompileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DefinitionNotFound { .. })
    }

    pub(crate) fn template(template_ref: impl Into<String>, source: TemplateError) -> Self {
        Self::TemplateEvaluation {
            template_ref: template_ref.into(),
            source,
        }
    }
}
