//! OC-006: Compiler configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compilation settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Namespace used when the application does not set one
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Upper bound on concurrent definition fetches per compilation
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Workflow step types that need no definition
    #[serde(default = "default_builtin_workflow_steps")]
    pub builtin_workflow_steps: Vec<String>,

    /// Policy types that may be used without a catalog entry
    #[serde(default = "default_builtin_policies")]
    pub builtin_policies: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            builtin_workflow_steps: default_builtin_workflow_steps(),
            builtin_policies: default_builtin_policies(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_builtin_workflow_steps() -> Vec<String> {
    vec!["suspend".to_string(), "step-group".to_string()]
}

fn default_builtin_policies() -> Vec<String> {
    ["topology", "override", "garbage-collect", "apply-once", "shared-resource"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl CompilerConfig {
    pub fn is_builtin_step(&self, step_type: &str) -> bool {
        self.builtin_workflow_steps.iter().any(|s| s == step_type)
    }

    pub fn is_builtin_policy(&self, policy_type: &str) -> bool {
        self.builtin_policies.iter().any(|s| s == policy_type)
    }
}

/// Parse a TOML config string.
pub fn parse_config(text: &str) -> Result<CompilerConfig, String> {
    let config: CompilerConfig =
        toml::from_str(text).map_err(|e| format!("config parse error: {}", e))?;
    if config.max_concurrent_fetches == 0 {
        return Err("max_concurrent_fetches must be at least 1".to_string());
    }
    Ok(config)
}

/// Load a TOML config file from disk.
pub fn load_config(path: &Path) -> Result<CompilerConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}
