//! OC-009: Appfile — the resolved intermediate representation.
//!
//! `AppfileBuilder` turns an Application into an Appfile by resolving every
//! referenced definition. Building is atomic: any failure aborts the whole
//! build and no partial Appfile is observable.

use super::config::CompilerConfig;
use super::error::CompileError;
use super::parser;
use super::resolver::{DefinitionKey, DefinitionResolver};
use super::store::DefinitionStore;
use super::types::*;
use super::workflow::WorkflowStepResolver;
use crate::provenance::{hasher, labels};
use crate::template::{RenderedTemplate, TemplateEngine};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Group, version, and kind of a scope resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Split `group/version` (or a bare core `version`) plus a kind.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// A scope membership carried through to the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub gvk: GroupVersionKind,
}

impl Scope {
    fn from_ref(scope: &ScopeRef) -> Self {
        Self {
            name: scope.name.clone(),
            gvk: GroupVersionKind::from_api_version(&scope.api_version, &scope.kind),
        }
    }

    pub fn to_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: self.gvk.api_version(),
            kind: self.gvk.kind.clone(),
            name: self.name.clone(),
        }
    }
}

/// A resolved trait placement.
#[derive(Debug, Clone)]
pub struct Trait {
    /// Trait type
    pub name: String,
    pub params: Value,
    pub template: String,
    pub engine: Arc<dyn TemplateEngine>,
}

impl Trait {
    pub fn template_ref(&self, component: &str) -> String {
        format!("trait {} of component {}", self.name, component)
    }

    pub fn evaluate(&self, component: &str, context: &Value) -> Result<RenderedTemplate, CompileError> {
        self.engine
            .evaluate(&self.template, &self.params, context)
            .map_err(|e| CompileError::template(self.template_ref(component), e))
    }
}

/// A resolved component.
#[derive(Debug, Clone)]
pub struct Workload {
    pub name: String,
    pub component_type: String,
    pub params: Value,
    pub full_template: String,
    pub traits: Vec<Trait>,
    pub scopes: Vec<Scope>,
    pub engine: Arc<dyn TemplateEngine>,
}

impl Workload {
    pub fn template_ref(&self) -> String {
        format!("component {} (type {})", self.name, self.component_type)
    }

    pub fn evaluate(&self, context: &Value) -> Result<RenderedTemplate, CompileError> {
        self.engine
            .evaluate(&self.full_template, &self.params, context)
            .map_err(|e| CompileError::template(self.template_ref(), e))
    }
}

/// A resolved application policy. Built-in policy types may have no template.
#[derive(Debug, Clone)]
pub struct PolicyWorkload {
    pub name: String,
    pub policy_type: String,
    pub params: Value,
    pub template: Option<String>,
    pub engine: Arc<dyn TemplateEngine>,
}

impl PolicyWorkload {
    /// Render the policy. Policies without a template render to nothing.
    pub fn evaluate(&self, context: &Value) -> Result<Option<RenderedTemplate>, CompileError> {
        let Some(ref template) = self.template else {
            return Ok(None);
        };
        self.engine
            .evaluate(template, &self.params, context)
            .map(Some)
            .map_err(|e| {
                CompileError::template(format!("policy {} (type {})", self.name, self.policy_type), e)
            })
    }
}

/// The fully resolved application.
#[derive(Debug, Clone)]
pub struct Appfile {
    pub name: String,
    pub namespace: String,
    pub app_revision_name: String,
    /// Source application
    pub application: Application,
    pub workloads: Vec<Workload>,
    pub policies: Vec<PolicyWorkload>,
    pub workflow_steps: Vec<WorkflowStep>,
    pub related_component_definitions: IndexMap<String, Definition>,
    pub related_trait_definitions: IndexMap<String, Definition>,
    pub related_policy_definitions: IndexMap<String, Definition>,
    pub related_workflow_step_definitions: IndexMap<String, Definition>,
    /// Revision this Appfile was pinned to, if any
    pub app_revision: Option<Arc<ApplicationRevision>>,
}

impl Appfile {
    /// Snapshot the application and every definition it used.
    pub fn to_revision(&self, name: &str) -> Result<ApplicationRevision, serde_json::Error> {
        let spec = ApplicationRevisionSpec {
            application: self.application.clone(),
            component_definitions: self.related_component_definitions.clone(),
            trait_definitions: self.related_trait_definitions.clone(),
            policy_definitions: self.related_policy_definitions.clone(),
            workflow_step_definitions: self.related_workflow_step_definitions.clone(),
        };
        let fingerprint = hasher::hash_string(&serde_json::to_string(&spec)?);

        let mut metadata = ObjectMeta {
            name: name.to_string(),
            namespace: self.namespace.clone(),
            ..ObjectMeta::default()
        };
        metadata
            .labels
            .insert(labels::LABEL_APP_NAME.to_string(), self.name.clone());
        metadata
            .annotations
            .insert(labels::ANNOTATION_REVISION_HASH.to_string(), fingerprint);

        Ok(ApplicationRevision {
            api_version: API_VERSION.to_string(),
            kind: "ApplicationRevision".to_string(),
            metadata,
            spec,
        })
    }
}

/// Builds Appfiles from Applications.
pub struct AppfileBuilder<'a> {
    store: &'a dyn DefinitionStore,
    engine: Arc<dyn TemplateEngine>,
    config: CompilerConfig,
    revision_name: Option<String>,
}

impl<'a> AppfileBuilder<'a> {
    pub fn new(store: &'a dyn DefinitionStore, engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            store,
            engine,
            config: CompilerConfig::default(),
            revision_name: None,
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Revision name stamped on the output, overriding any recorded one.
    pub fn with_revision_name(mut self, name: impl Into<String>) -> Self {
        self.revision_name = Some(name.into());
        self
    }

    /// Compile a live Application.
    ///
    /// If the application names a recorded revision that the store holds,
    /// workflow steps are pinned to it.
    pub async fn build(&self, app: &Application) -> Result<Appfile, CompileError> {
        let errors = parser::validate_application(app);
        if !errors.is_empty() {
            return Err(CompileError::Validation(
                errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        let revision = self.lookup_revision(app).await?.map(Arc::new);
        self.compile(app, revision, false).await
    }

    /// Compile the Application recorded in `revision` with every definition
    /// kind pinned to it.
    pub async fn build_from_revision(
        &self,
        revision: &ApplicationRevision,
    ) -> Result<Appfile, CompileError> {
        let app = &revision.spec.application;
        let errors = parser::validate_application(app);
        if !errors.is_empty() {
            return Err(CompileError::Validation(
                errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        self.compile(app, Some(Arc::new(revision.clone())), true).await
    }

    async fn lookup_revision(&self, app: &Application) -> Result<Option<ApplicationRevision>, CompileError> {
        let Some(name) = app.metadata.annotations.get(labels::ANNOTATION_APP_REVISION) else {
            return Ok(None);
        };
        match self.store.get_revision(name).await {
            Ok(rev) => {
                tracing::info!(app = %app.metadata.name, revision = %name, "compiling against recorded revision");
                Ok(Some(rev))
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(app = %app.metadata.name, revision = %name, "recorded revision not found; compiling live");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn revision_name(&self, app: &Application, revision: Option<&ApplicationRevision>) -> String {
        self.revision_name
            .clone()
            .or_else(|| revision.map(|r| r.name().to_string()))
            .or_else(|| app.metadata.annotations.get(labels::ANNOTATION_APP_REVISION).cloned())
            .unwrap_or_default()
    }

    async fn compile(
        &self,
        app: &Application,
        revision: Option<Arc<ApplicationRevision>>,
        pin_all: bool,
    ) -> Result<Appfile, CompileError> {
        let rev = revision.as_deref();
        let mut resolver = DefinitionResolver::new(self.store, self.config.max_concurrent_fetches);
        if pin_all {
            if let Some(rev) = rev {
                resolver = resolver.with_pins(rev);
            }
        }
        let steps = app
            .spec
            .workflow
            .as_ref()
            .map(|w| w.steps.as_slice())
            .unwrap_or_default();
        let step_resolver = WorkflowStepResolver::new(&resolver, &self.config.builtin_workflow_steps);

        resolver.prefetch(&self.references(app, &step_resolver, steps, rev)).await?;

        let mut related_component_definitions = IndexMap::new();
        let mut related_trait_definitions = IndexMap::new();
        let mut workloads = Vec::with_capacity(app.spec.components.len());
        for comp in &app.spec.components {
            let def = resolver
                .resolve(DefinitionKind::Component, &comp.component_type)
                .await?;

            let mut traits = Vec::with_capacity(comp.traits.len());
            for tr in &comp.traits {
                let tdef = resolver.resolve(DefinitionKind::Trait, &tr.trait_type).await?;
                traits.push(Trait {
                    name: tr.trait_type.clone(),
                    params: tr.properties.clone(),
                    template: tdef.spec.template.clone(),
                    engine: Arc::clone(&self.engine),
                });
                related_trait_definitions.insert(tr.trait_type.clone(), tdef);
            }

            workloads.push(Workload {
                name: comp.name.clone(),
                component_type: comp.component_type.clone(),
                params: comp.properties.clone(),
                full_template: def.spec.template.clone(),
                traits,
                scopes: comp.scopes.iter().map(Scope::from_ref).collect(),
                engine: Arc::clone(&self.engine),
            });
            related_component_definitions.insert(comp.component_type.clone(), def);
        }

        let mut related_policy_definitions = IndexMap::new();
        let mut policies = Vec::with_capacity(app.spec.policies.len());
        for policy in &app.spec.policies {
            let template = match resolver.resolve(DefinitionKind::Policy, &policy.policy_type).await {
                Ok(def) => {
                    let template = def.spec.template.clone();
                    related_policy_definitions.insert(policy.policy_type.clone(), def);
                    Some(template)
                }
                Err(e) if e.is_not_found() && self.config.is_builtin_policy(&policy.policy_type) => None,
                Err(e) => return Err(e),
            };
            policies.push(PolicyWorkload {
                name: policy.name.clone(),
                policy_type: policy.policy_type.clone(),
                params: policy.properties.clone(),
                template,
                engine: Arc::clone(&self.engine),
            });
        }

        let mut related_workflow_step_definitions = IndexMap::new();
        step_resolver
            .resolve_all(steps, rev, &mut related_workflow_step_definitions)
            .await?;

        let namespace = if app.metadata.namespace.is_empty() {
            self.config.default_namespace.clone()
        } else {
            app.metadata.namespace.clone()
        };

        tracing::info!(
            app = %app.metadata.name,
            workloads = workloads.len(),
            policies = policies.len(),
            steps = steps.len(),
            "built appfile"
        );

        Ok(Appfile {
            name: app.metadata.name.clone(),
            namespace,
            app_revision_name: self.revision_name(app, rev),
            application: app.clone(),
            workloads,
            policies,
            workflow_steps: steps.to_vec(),
            related_component_definitions,
            related_trait_definitions,
            related_policy_definitions,
            related_workflow_step_definitions,
            app_revision: revision.clone(),
        })
    }

    /// Every definition the application needs from the live store, in
    /// declaration order.
    fn references(
        &self,
        app: &Application,
        step_resolver: &WorkflowStepResolver<'_, '_>,
        steps: &[WorkflowStep],
        revision: Option<&ApplicationRevision>,
    ) -> Vec<DefinitionKey> {
        let mut refs = Vec::new();
        for comp in &app.spec.components {
            refs.push((DefinitionKind::Component, comp.component_type.clone()));
            for tr in &comp.traits {
                refs.push((DefinitionKind::Trait, tr.trait_type.clone()));
            }
        }
        for policy in &app.spec.policies {
            if !self.config.is_builtin_policy(&policy.policy_type) {
                refs.push((DefinitionKind::Policy, policy.policy_type.clone()));
            }
        }
        step_resolver.live_types(steps, revision, &mut refs);
        refs
    }
}
