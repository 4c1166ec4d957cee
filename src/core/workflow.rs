//! OC-008: Workflow step resolution.
//!
//! A recorded revision pins workflow-step definitions unconditionally, so a
//! re-parse of an old revision keeps running the step implementations it was
//! created with even after the catalog moves on. Built-in step types carry no
//! definition; `step-group` children are resolved recursively.

use super::error::CompileError;
use super::resolver::DefinitionResolver;
use super::types::{ApplicationRevision, Definition, DefinitionKind, WorkflowStep};
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;

/// Resolves the definitions behind workflow steps.
pub struct WorkflowStepResolver<'r, 'a> {
    resolver: &'r DefinitionResolver<'a>,
    builtins: &'r [String],
}

impl<'r, 'a> WorkflowStepResolver<'r, 'a> {
    pub fn new(resolver: &'r DefinitionResolver<'a>, builtins: &'r [String]) -> Self {
        Self { resolver, builtins }
    }

    pub fn is_builtin(&self, step_type: &str) -> bool {
        self.builtins.iter().any(|b| b == step_type)
    }

    /// Resolve one step. Built-in steps yield `None`.
    pub async fn resolve(
        &self,
        step: &WorkflowStep,
        revision: Option<&ApplicationRevision>,
    ) -> Result<Option<Definition>, CompileError> {
        if let Some(def) =
            revision.and_then(|rev| rev.pinned(DefinitionKind::WorkflowStep, &step.step_type))
        {
            tracing::debug!(step = %step.name, step_type = %step.step_type, "workflow step pinned to revision");
            return Ok(Some(def.clone()));
        }
        if self.is_builtin(&step.step_type) {
            return Ok(None);
        }
        self.resolver
            .resolve(DefinitionKind::WorkflowStep, &step.step_type)
            .await
            .map(Some)
    }

    /// Resolve `steps` and their sub-steps in order, collecting the
    /// definitions keyed by step type.
    pub fn resolve_all<'s>(
        &'s self,
        steps: &'s [WorkflowStep],
        revision: Option<&'s ApplicationRevision>,
        related: &'s mut IndexMap<String, Definition>,
    ) -> BoxFuture<'s, Result<(), CompileError>> {
        async move {
            for step in steps {
                if let Some(def) = self.resolve(step, revision).await? {
                    related.insert(step.step_type.clone(), def);
                }
                if !step.sub_steps.is_empty() {
                    self.resolve_all(&step.sub_steps, revision, related).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Step types that must come from the live store.
    pub fn live_types(
        &self,
        steps: &[WorkflowStep],
        revision: Option<&ApplicationRevision>,
        out: &mut Vec<(DefinitionKind, String)>,
    ) {
        for step in steps {
            let pinned = revision
                .and_then(|rev| rev.pinned(DefinitionKind::WorkflowStep, &step.step_type))
                .is_some();
            if !pinned && !self.is_builtin(&step.step_type) {
                out.push((DefinitionKind::WorkflowStep, step.step_type.clone()));
            }
            self.live_types(&step.sub_steps, revision, out);
        }
    }
}
