//! OC-010: Manifest generation.
//!
//! Renders every workload of an Appfile into a `ComponentManifest`: the
//! primary object, the auxiliary objects of the component template and of
//! each trait, trait patches applied to the primary in trait order, and the
//! reserved provenance labels. Auxiliary identities are unique per component. Component
//! order is preserved and the output is a pure function of the Appfile.

use super::appfile::{Appfile, Workload};
use super::error::{CompileError, TemplateError};
use super::types::ComponentManifest;
use super::value;
use crate::provenance::hasher::{self, TraitOutputSeed};
use crate::provenance::labels::{self, AppIdentity};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};

impl Appfile {
    pub fn generate_component_manifests(&self) -> Result<Vec<ComponentManifest>, CompileError> {
        generate_component_manifests(self)
    }

    pub fn generate_policy_manifests(&self) -> Result<Vec<Value>, CompileError> {
        generate_policy_manifests(self)
    }

    fn identity(&self) -> AppIdentity<'_> {
        AppIdentity {
            app_name: &self.name,
            namespace: &self.namespace,
            revision: &self.app_revision_name,
        }
    }
}

/// Render one manifest per workload, in component order.
pub fn generate_component_manifests(appfile: &Appfile) -> Result<Vec<ComponentManifest>, CompileError> {
    let manifests = appfile
        .workloads
        .iter()
        .map(|wl| generate_manifest(appfile, wl))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(app = %appfile.name, count = manifests.len(), "generated component manifests");
    Ok(manifests)
}

/// Render policies that produce an object. Policies without a template or
/// without an `output` contribute nothing.
pub fn generate_policy_manifests(appfile: &Appfile) -> Result<Vec<Value>, CompileError> {
    let app = appfile.identity();
    let mut objects = Vec::new();
    for policy in &appfile.policies {
        let context = base_context(appfile, &policy.name);
        let Some(rendered) = policy.evaluate(&context)? else {
            continue;
        };
        let Some(mut object) = rendered.output else {
            continue;
        };
        default_identity(&mut object, &policy.name, &appfile.namespace);
        labels::apply_labels(&mut object, &labels::policy_labels(&app, &policy.policy_type));
        objects.push(object);
    }
    Ok(objects)
}

/// The ambient `context` tree shared by every template of the application.
fn base_context(appfile: &Appfile, name: &str) -> Value {
    let components: Vec<&str> = appfile.workloads.iter().map(|w| w.name.as_str()).collect();
    let mut context = json!({
        "name": name,
        "appName": appfile.name,
        "namespace": appfile.namespace,
        "appRevision": appfile.app_revision_name,
        "components": components,
    });
    if let Some(num) = revision_number(&appfile.app_revision_name) {
        context["appRevisionNum"] = json!(num);
    }
    context
}

/// `app-v3` -> 3
fn revision_number(revision: &str) -> Option<u64> {
    revision.rsplit_once("-v").and_then(|(_, n)| n.parse().ok())
}

/// Fill an empty `metadata.name` / `metadata.namespace`.
fn default_identity(object: &mut Value, name: &str, namespace: &str) {
    let meta = value::object_at(object, &["metadata"]);
    for (key, fallback) in [("name", name), ("namespace", namespace)] {
        let present = matches!(meta.get(key), Some(Value::String(s)) if !s.is_empty());
        if !present {
            meta.insert(key.to_string(), Value::String(fallback.to_string()));
        }
    }
}

/// `(apiVersion, kind, metadata.name)` of an auxiliary object.
type ObjectIdentity = (String, String, String);

fn object_identity(object: &Value) -> ObjectIdentity {
    let field = |path: &[&str]| value::non_empty_str(object, path).unwrap_or_default().to_string();
    (field(&["apiVersion"]), field(&["kind"]), field(&["metadata", "name"]))
}

/// Auxiliary objects of one component, rejecting a second object with the
/// same identity.
#[derive(Default)]
struct Auxiliaries {
    seen: FxHashSet<ObjectIdentity>,
    objects: Vec<Value>,
}

impl Auxiliaries {
    fn push(
        &mut self,
        object: Value,
        template_ref: impl FnOnce() -> String,
        key: &str,
    ) -> Result<(), CompileError> {
        if !self.seen.insert(object_identity(&object)) {
            return Err(CompileError::template(
                template_ref(),
                TemplateError::DuplicateOutput(key.to_string()),
            ));
        }
        self.objects.push(object);
        Ok(())
    }
}

fn generate_manifest(appfile: &Appfile, wl: &Workload) -> Result<ComponentManifest, CompileError> {
    let app = appfile.identity();
    let mut context = base_context(appfile, &wl.name);

    let rendered = wl.evaluate(&context)?;
    if rendered.patch.is_some() {
        return Err(CompileError::template(wl.template_ref(), TemplateError::UnexpectedPatch));
    }
    let mut workload = rendered
        .output
        .ok_or_else(|| CompileError::template(wl.template_ref(), TemplateError::MissingOutput))?;
    default_identity(&mut workload, &wl.name, &appfile.namespace);
    let reserved = labels::workload_labels(&app, &wl.name, &wl.component_type);
    labels::apply_labels(&mut workload, &reserved);

    let mut auxiliaries = Auxiliaries::default();
    for (key, mut object) in rendered.outputs {
        default_identity(&mut object, &format!("{}-{}", wl.name, key), &appfile.namespace);
        labels::apply_labels(
            &mut object,
            &labels::component_output_labels(&app, &wl.name, &wl.component_type, &key),
        );
        auxiliaries.push(object, || wl.template_ref(), &key)?;
    }

    let mut ordinals: FxHashMap<&str, usize> = FxHashMap::default();
    for tr in &wl.traits {
        let ordinal = {
            let next = ordinals.entry(tr.name.as_str()).or_insert(0);
            let current = *next;
            *next += 1;
            current
        };

        // Traits see the primary as patched by the traits before them
        context["output"] = workload.clone();
        let rendered = tr.evaluate(&wl.name, &context)?;

        for (key, mut object) in rendered.outputs {
            if value::non_empty_str(&object, &["metadata", "name"]).is_none() {
                let name = hasher::trait_output_name(&TraitOutputSeed {
                    component: &wl.name,
                    trait_type: &tr.name,
                    ordinal,
                    output_key: &key,
                    api_version: value::non_empty_str(&object, &["apiVersion"]).unwrap_or_default(),
                    kind: value::non_empty_str(&object, &["kind"]).unwrap_or_default(),
                });
                value::object_at(&mut object, &["metadata"])
                    .insert("name".to_string(), Value::String(name));
            }
            default_identity(&mut object, &wl.name, &appfile.namespace);
            labels::apply_labels(&mut object, &labels::trait_labels(&app, &wl.name, &tr.name, &key));
            auxiliaries.push(object, || tr.template_ref(&wl.name), &key)?;
        }

        if let Some(patch) = rendered.patch {
            tracing::debug!(component = %wl.name, trait_type = %tr.name, strategy = %patch.strategy, "patching workload");
            patch.apply(&mut workload);
        }
    }

    // A patch may not strip identity or reserved labels
    default_identity(&mut workload, &wl.name, &appfile.namespace);
    labels::apply_labels(&mut workload, &reserved);

    Ok(ComponentManifest {
        name: wl.name.clone(),
        standard_workload: workload,
        traits: auxiliaries.objects,
        scopes: wl.scopes.iter().map(|s| s.to_reference()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::appfile::tests::{catalog, engine, APP};
    use crate::core::appfile::AppfileBuilder;
    use crate::core::parser::parse_application;
    use crate::core::store::MemoryDefinitionStore;
    use crate::core::types::{Definition, DefinitionKind};
    use crate::provenance::labels::*;

    const LABELER: &str = r#"
parameter:
  tier: string
patch:
  metadata:
    labels:
      tier: "{{ parameter.tier }}"
      app.oam.dev/name: hijacked
  spec:
    template:
      metadata:
        labels:
          tier: "{{ parameter.tier }}"
"#;

    const PAUSER: &str = r#"
patchStrategy: jsonMergePatch
patch:
  spec:
    paused: true
    selector: null
"#;

    const NAMED: &str = r#"
outputs:
  service:
    apiVersion: v1
    kind: Service
    metadata:
      name: "{{ context.name }}-svc"
    spec:
      ports:
        - port: 80
"#;

    async fn compile(store: &MemoryDefinitionStore, yaml: &str) -> Result<Vec<ComponentManifest>, CompileError> {
        let app = parse_application(yaml).unwrap();
        AppfileBuilder::new(store, engine())
            .with_revision_name("application-sample-v1")
            .build(&app)
            .await?
            .generate_component_manifests()
    }

    fn store() -> MemoryDefinitionStore {
        let store = catalog();
        for (name, template) in [("labeler", LABELER), ("pauser", PAUSER), ("named", NAMED)] {
            store
                .insert(Definition::new(DefinitionKind::Trait, name, template))
                .unwrap();
        }
        store
    }

    fn with_traits(traits: &str) -> String {
        APP.replace(
            "      traits:\n        - type: scaler\n          properties:\n            replicas: 10\n",
            traits,
        )
    }

    #[tokio::test]
    async fn test_oc010_worker_with_scaler() {
        let manifests = compile(&store(), APP).await.unwrap();
        assert_eq!(manifests.len(), 1);
        let m = &manifests[0];
        assert_eq!(m.name, "myweb");

        let wl = &m.standard_workload;
        assert_eq!(wl["kind"], "Deployment");
        assert_eq!(wl["metadata"]["name"], "myweb");
        assert_eq!(wl["metadata"]["namespace"], "default");
        let l = &wl["metadata"]["labels"];
        assert_eq!(l[LABEL_WORKLOAD_TYPE], "worker");
        assert_eq!(l[LABEL_APP_COMPONENT], "myweb");
        assert_eq!(l[LABEL_APP_NAME], "application-sample");
        assert_eq!(l[LABEL_APP_NAMESPACE], "default");
        assert_eq!(l[LABEL_APP_REVISION], "application-sample-v1");
        assert_eq!(l[LABEL_RESOURCE_TYPE], "WORKLOAD");
        assert_eq!(
            wl["spec"]["template"]["spec"]["containers"][0]["command"],
            json!(["sleep", "1000"])
        );

        assert_eq!(m.traits.len(), 1);
        let scaler = &m.traits[0];
        assert_eq!(scaler["kind"], "ManualScalerTrait");
        assert_eq!(scaler["spec"]["replicaCount"], 10);
        assert_eq!(scaler["spec"]["workloadRef"]["name"], "myweb");
        assert_eq!(scaler["spec"]["workloadRef"]["kind"], "Deployment");
        let name = scaler["metadata"]["name"].as_str().unwrap();
        assert!(name.starts_with("myweb-scaler-"));
        assert_eq!(name.len(), "myweb-scaler-".len() + hasher::NAME_HASH_LEN);
        let tl = &scaler["metadata"]["labels"];
        assert_eq!(tl[LABEL_TRAIT_TYPE], "scaler");
        assert_eq!(tl[LABEL_TRAIT_RESOURCE], "scaler");
        assert_eq!(tl[LABEL_RESOURCE_TYPE], "TRAIT");
        assert_eq!(tl[LABEL_APP_COMPONENT], "myweb");

        assert_eq!(m.scopes.len(), 1);
        assert_eq!(m.scopes[0].kind, "HealthScope");
        assert_eq!(m.scopes[0].api_version, "core.oam.dev/v1alpha2");
    }

    #[tokio::test]
    async fn test_oc010_deterministic() {
        let store = store();
        let a = compile(&store, APP).await.unwrap();
        let b = compile(&store, APP).await.unwrap();
        assert_eq!(a, b);
        for (x, y) in a.iter().zip(&b) {
            assert!(value::structurally_equal(&x.standard_workload, &y.standard_workload));
        }
    }

    #[tokio::test]
    async fn test_oc010_same_type_traits_get_distinct_names() {
        let yaml = with_traits(
            "      traits:\n        - type: scaler\n          properties: {replicas: 1}\n        - type: scaler\n          properties: {replicas: 2}\n",
        );
        let manifests = compile(&store(), &yaml).await.unwrap();
        let traits = &manifests[0].traits;
        assert_eq!(traits.len(), 2);
        assert_ne!(traits[0]["metadata"]["name"], traits[1]["metadata"]["name"]);
        assert_eq!(traits[0]["spec"]["replicaCount"], 1);
        assert_eq!(traits[1]["spec"]["replicaCount"], 2);
    }

    #[tokio::test]
    async fn test_oc010_template_name_kept() {
        let yaml = with_traits("      traits:\n        - type: named\n");
        let manifests = compile(&store(), &yaml).await.unwrap();
        let svc = &manifests[0].traits[0];
        assert_eq!(svc["metadata"]["name"], "myweb-svc");
        assert_eq!(svc["metadata"]["namespace"], "default");
        assert_eq!(svc["metadata"]["labels"][LABEL_TRAIT_RESOURCE], "service");
    }

    #[tokio::test]
    async fn test_oc010_colliding_trait_outputs_rejected() {
        let yaml = with_traits("      traits:\n        - type: named\n        - type: named\n");
        let err = compile(&store(), &yaml).await.unwrap_err();
        match err {
            CompileError::TemplateEvaluation { template_ref, source } => {
                assert_eq!(template_ref, "trait named of component myweb");
                assert_eq!(source, TemplateError::DuplicateOutput("service".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_oc010_same_name_different_kind_allowed() {
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Trait,
                "named-cm",
                "outputs:\n  config:\n    apiVersion: v1\n    kind: ConfigMap\n    metadata:\n      name: \"{{ context.name }}-svc\"\n",
            ))
            .unwrap();
        let yaml = with_traits("      traits:\n        - type: named\n        - type: named-cm\n");
        let manifests = compile(&store, &yaml).await.unwrap();
        assert_eq!(manifests[0].traits.len(), 2);
    }

    #[tokio::test]
    async fn test_oc010_component_outputs_are_auxiliaries() {
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Component,
                "worker",
                r#"
output:
  apiVersion: apps/v1
  kind: Deployment
outputs:
  service:
    apiVersion: v1
    kind: Service
    spec:
      selector:
        app.oam.dev/component: "{{ context.name }}"
"#,
            ))
            .unwrap();
        let manifests = compile(&store, APP).await.unwrap();
        let traits = &manifests[0].traits;
        assert_eq!(traits.len(), 2);

        // Component outputs come before trait outputs
        let svc = &traits[0];
        assert_eq!(svc["kind"], "Service");
        assert_eq!(svc["metadata"]["name"], "myweb-service");
        assert_eq!(svc["metadata"]["namespace"], "default");
        let l = &svc["metadata"]["labels"];
        assert_eq!(l[LABEL_TRAIT_TYPE], AUXILIARY_WORKLOAD);
        assert_eq!(l[LABEL_TRAIT_RESOURCE], "service");
        assert_eq!(l[LABEL_WORKLOAD_TYPE], "worker");
        assert_eq!(l[LABEL_APP_COMPONENT], "myweb");
        assert_eq!(traits[1]["kind"], "ManualScalerTrait");
    }

    #[tokio::test]
    async fn test_oc010_component_patch_rejected() {
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Component,
                "worker",
                "output:\n  kind: Deployment\npatch:\n  spec:\n    paused: true\n",
            ))
            .unwrap();
        let err = compile(&store, APP).await.unwrap_err();
        assert!(matches!(
            err,
            CompileError::TemplateEvaluation { ref template_ref, source: TemplateError::UnexpectedPatch }
                if template_ref == "component myweb (type worker)"
        ));
    }

    #[tokio::test]
    async fn test_oc010_trait_output_labels_overridden() {
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Trait,
                "spoofer",
                r#"
outputs:
  x:
    apiVersion: v1
    kind: ConfigMap
    metadata:
      labels:
        trait.oam.dev/type: something-else
        app.oam.dev/name: other-app
        team: payments
"#,
            ))
            .unwrap();
        let yaml = with_traits("      traits:\n        - type: spoofer\n");
        let manifests = compile(&store, &yaml).await.unwrap();
        let l = &manifests[0].traits[0]["metadata"]["labels"];
        assert_eq!(l[LABEL_TRAIT_TYPE], "spoofer");
        assert_eq!(l[LABEL_APP_NAME], "application-sample");
        assert_eq!(l[LABEL_TRAIT_RESOURCE], "x");
        assert_eq!(l["team"], "payments");
    }

    #[tokio::test]
    async fn test_oc010_patch_merges_and_reserved_labels_win() {
        let yaml = with_traits("      traits:\n        - type: labeler\n          properties: {tier: backend}\n");
        let manifests = compile(&store(), &yaml).await.unwrap();
        let wl = &manifests[0].standard_workload;
        assert_eq!(wl["metadata"]["labels"]["tier"], "backend");
        assert_eq!(wl["metadata"]["labels"][LABEL_APP_NAME], "application-sample");
        let pod_labels = &wl["spec"]["template"]["metadata"]["labels"];
        assert_eq!(pod_labels["tier"], "backend");
        assert_eq!(pod_labels[LABEL_APP_COMPONENT], "myweb");
        assert!(manifests[0].traits.is_empty());
    }

    #[tokio::test]
    async fn test_oc010_json_merge_patch_deletes() {
        let yaml = with_traits("      traits:\n        - type: pauser\n");
        let manifests = compile(&store(), &yaml).await.unwrap();
        let spec = &manifests[0].standard_workload["spec"];
        assert_eq!(spec["paused"], true);
        assert!(spec.get("selector").is_none());
        assert!(spec.get("template").is_some());
    }

    #[tokio::test]
    async fn test_oc010_patch_visible_to_later_traits() {
        let yaml = with_traits(
            "      traits:\n        - type: labeler\n          properties: {tier: web}\n        - type: scaler\n",
        );
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Trait,
                "scaler",
                "outputs:\n  echo:\n    kind: Echo\n    tier: \"{{ context.output.metadata.labels.tier }}\"\n",
            ))
            .unwrap();
        let manifests = compile(&store, &yaml).await.unwrap();
        assert_eq!(manifests[0].traits[0]["tier"], "web");
    }

    #[tokio::test]
    async fn test_oc010_missing_output_is_template_error() {
        let store = store();
        store
            .insert(Definition::new(DefinitionKind::Component, "worker", "outputs: {}\n"))
            .unwrap();
        let err = compile(&store, APP).await.unwrap_err();
        match err {
            CompileError::TemplateEvaluation { template_ref, source } => {
                assert_eq!(template_ref, "component myweb (type worker)");
                assert_eq!(source, TemplateError::MissingOutput);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_oc010_trait_parameter_error_names_trait() {
        let yaml = APP.replace("replicas: 10", "replicas: ten");
        let err = compile(&store(), &yaml).await.unwrap_err();
        assert!(matches!(
            err,
            CompileError::TemplateEvaluation { ref template_ref, source: TemplateError::ParameterType { .. } }
                if template_ref == "trait scaler of component myweb"
        ));
    }

    #[tokio::test]
    async fn test_oc010_context_carries_revision() {
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Component,
                "worker",
                "output:\n  kind: ConfigMap\n  data:\n    rev: \"{{ context.appRevision }}\"\n    num: \"{{ context.appRevisionNum }}\"\n    peers: \"{{ context.components }}\"\n",
            ))
            .unwrap();
        let manifests = compile(&store, APP).await.unwrap();
        let data = &manifests[0].standard_workload["data"];
        assert_eq!(data["rev"], "application-sample-v1");
        assert_eq!(data["num"], 1);
        assert_eq!(data["peers"], json!(["myweb"]));
    }

    #[tokio::test]
    async fn test_oc010_policy_manifests() {
        let store = store();
        store
            .insert(Definition::new(
                DefinitionKind::Policy,
                "env-binding",
                "parameter:\n  envs: array\noutput:\n  apiVersion: core.oam.dev/v1alpha1\n  kind: EnvBinding\n  spec:\n    envs: \"{{ parameter.envs }}\"\n",
            ))
            .unwrap();
        let yaml = format!(
            "{}  policies:\n    - name: envs\n      type: env-binding\n      properties: {{envs: [prod]}}\n    - name: topo\n      type: topology\n",
            APP
        );
        let app = parse_application(&yaml).unwrap();
        let appfile = AppfileBuilder::new(&store, engine()).build(&app).await.unwrap();
        let policies = appfile.generate_policy_manifests().unwrap();
        assert_eq!(policies.len(), 1);
        let p = &policies[0];
        assert_eq!(p["metadata"]["name"], "envs");
        assert_eq!(p["spec"]["envs"], json!(["prod"]));
        assert_eq!(p["metadata"]["labels"][LABEL_RESOURCE_TYPE], "POLICY");
        assert_eq!(p["metadata"]["labels"][LABEL_POLICY_TYPE], "env-binding");
    }

    #[test]
    fn test_oc010_revision_number() {
        assert_eq!(revision_number("app-v3"), Some(3));
        assert_eq!(revision_number("my-vela-app-v12"), Some(12));
        assert_eq!(revision_number("app"), None);
        assert_eq!(revision_number(""), None);
    }
}
