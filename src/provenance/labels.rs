//! OC-021: Reserved provenance labels.
//!
//! The label keys below are part of the output contract consumed by the
//! reconciliation layer. Generator-applied values always win over labels a
//! template set on the same keys.

use crate::core::value;
use serde_json::Value;

pub const LABEL_APP_NAME: &str = "app.oam.dev/name";
pub const LABEL_APP_NAMESPACE: &str = "app.oam.dev/namespace";
pub const LABEL_APP_REVISION: &str = "app.oam.dev/appRevision";
pub const LABEL_APP_COMPONENT: &str = "app.oam.dev/component";
pub const LABEL_RESOURCE_TYPE: &str = "app.oam.dev/resourceType";
pub const LABEL_WORKLOAD_TYPE: &str = "workload.oam.dev/type";
pub const LABEL_TRAIT_TYPE: &str = "trait.oam.dev/type";
pub const LABEL_TRAIT_RESOURCE: &str = "trait.oam.dev/resource";
pub const LABEL_POLICY_TYPE: &str = "policy.oam.dev/type";

/// `trait.oam.dev/type` of objects a component template emits under `outputs`.
pub const AUXILIARY_WORKLOAD: &str = "AuxiliaryWorkload";

/// Annotation on an Application naming the recorded revision to compile against.
pub const ANNOTATION_APP_REVISION: &str = "app.oam.dev/appRevision";

/// Annotation on a snapshot revision holding the fingerprint of its spec.
pub const ANNOTATION_REVISION_HASH: &str = "app.oam.dev/revisionHash";

/// Role of a rendered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    Workload,
    Trait,
    Policy,
}

impl ResourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workload => "WORKLOAD",
            Self::Trait => "TRAIT",
            Self::Policy => "POLICY",
        }
    }
}

/// Application-level identity stamped on every resource.
#[derive(Debug, Clone, Copy)]
pub struct AppIdentity<'a> {
    pub app_name: &'a str,
    pub namespace: &'a str,
    pub revision: &'a str,
}

impl AppIdentity<'_> {
    fn labels(&self, role: ResourceRole) -> Vec<(&'static str, String)> {
        vec![
            (LABEL_APP_NAME, self.app_name.to_string()),
            (LABEL_APP_NAMESPACE, self.namespace.to_string()),
            (LABEL_APP_REVISION, self.revision.to_string()),
            (LABEL_RESOURCE_TYPE, role.as_str().to_string()),
        ]
    }
}

/// Labels for a component's primary workload.
pub fn workload_labels(
    app: &AppIdentity<'_>,
    component: &str,
    component_type: &str,
) -> Vec<(&'static str, String)> {
    let mut labels = app.labels(ResourceRole::Workload);
    labels.push((LABEL_APP_COMPONENT, component.to_string()));
    labels.push((LABEL_WORKLOAD_TYPE, component_type.to_string()));
    labels
}

/// Labels for a trait's auxiliary output.
pub fn trait_labels(
    app: &AppIdentity<'_>,
    component: &str,
    trait_type: &str,
    output_key: &str,
) -> Vec<(&'static str, String)> {
    let mut labels = app.labels(ResourceRole::Trait);
    labels.push((LABEL_APP_COMPONENT, component.to_string()));
    labels.push((LABEL_TRAIT_TYPE, trait_type.to_string()));
    labels.push((LABEL_TRAIT_RESOURCE, output_key.to_string()));
    labels
}

/// Labels for an auxiliary object emitted by the component template itself.
pub fn component_output_labels(
    app: &AppIdentity<'_>,
    component: &str,
    component_type: &str,
    output_key: &str,
) -> Vec<(&'static str, String)> {
    let mut labels = trait_labels(app, component, AUXILIARY_WORKLOAD, output_key);
    labels.push((LABEL_WORKLOAD_TYPE, component_type.to_string()));
    labels
}

/// Labels for a rendered policy.
pub fn policy_labels(app: &AppIdentity<'_>, policy_type: &str) -> Vec<(&'static str, String)> {
    let mut labels = app.labels(ResourceRole::Policy);
    labels.push((LABEL_POLICY_TYPE, policy_type.to_string()));
    labels
}

/// Write `labels` into `metadata.labels`, overwriting colliding keys.
pub fn apply_labels(object: &mut Value, labels: &[(&'static str, String)]) {
    let target = value::object_at(object, &["metadata", "labels"]);
    for (key, val) in labels {
        target.insert((*key).to_string(), Value::String(val.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> AppIdentity<'static> {
        AppIdentity {
            app_name: "test",
            namespace: "default",
            revision: "test-v1",
        }
    }

    #[test]
    fn test_oc021_workload_labels() {
        let labels = workload_labels(&app(), "myweb", "worker");
        let mut obj = json!({"kind": "Deployment"});
        apply_labels(&mut obj, &labels);
        assert_eq!(
            obj["metadata"]["labels"],
            json!({
                "app.oam.dev/name": "test",
                "app.oam.dev/namespace": "default",
                "app.oam.dev/appRevision": "test-v1",
                "app.oam.dev/resourceType": "WORKLOAD",
                "app.oam.dev/component": "myweb",
                "workload.oam.dev/type": "worker",
            })
        );
    }

    #[test]
    fn test_oc021_trait_labels() {
        let labels = trait_labels(&app(), "myweb", "scaler", "scaler");
        let mut obj = json!({});
        apply_labels(&mut obj, &labels);
        let l = &obj["metadata"]["labels"];
        assert_eq!(l[LABEL_RESOURCE_TYPE], "TRAIT");
        assert_eq!(l[LABEL_TRAIT_TYPE], "scaler");
        assert_eq!(l[LABEL_TRAIT_RESOURCE], "scaler");
        assert_eq!(l[LABEL_APP_COMPONENT], "myweb");
    }

    #[test]
    fn test_oc021_component_output_labels() {
        let labels = component_output_labels(&app(), "myweb", "webservice", "service");
        let mut obj = json!({});
        apply_labels(&mut obj, &labels);
        let l = &obj["metadata"]["labels"];
        assert_eq!(l[LABEL_RESOURCE_TYPE], "TRAIT");
        assert_eq!(l[LABEL_TRAIT_TYPE], AUXILIARY_WORKLOAD);
        assert_eq!(l[LABEL_TRAIT_RESOURCE], "service");
        assert_eq!(l[LABEL_WORKLOAD_TYPE], "webservice");
    }

    #[test]
    fn test_oc021_generator_labels_win() {
        let mut obj = json!({
            "metadata": {"labels": {
                "app.oam.dev/name": "spoofed",
                "team": "payments"
            }}
        });
        apply_labels(&mut obj, &workload_labels(&app(), "myweb", "worker"));
        assert_eq!(obj["metadata"]["labels"]["app.oam.dev/name"], "test");
        assert_eq!(obj["metadata"]["labels"]["team"], "payments");
    }

    #[test]
    fn test_oc021_policy_labels() {
        let mut obj = json!({});
        apply_labels(&mut obj, &policy_labels(&app(), "topology"));
        assert_eq!(obj["metadata"]["labels"][LABEL_RESOURCE_TYPE], "POLICY");
        assert_eq!(obj["metadata"]["labels"][LABEL_POLICY_TYPE], "topology");
    }
}
