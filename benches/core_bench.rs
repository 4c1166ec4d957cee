//! Benchmarks for oamc core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use oamc::core::appfile::AppfileBuilder;
use oamc::core::parser;
use oamc::core::store::MemoryDefinitionStore;
use oamc::core::types::{Definition, DefinitionKind};
use oamc::provenance::hasher::{trait_output_name, TraitOutputSeed};
use oamc::template::{TemplateEngine, YamlTemplateEngine};
use serde_json::json;
use std::sync::Arc;

const WORKER: &str = r#"
parameter:
  image: string
  cmd: { type: array, optional: true }
output:
  apiVersion: apps/v1
  kind: Deployment
  spec:
    template:
      spec:
        containers:
          - name: "{{ context.name }}"
            image: "{{ parameter.image }}"
            command: "{{ parameter.cmd }}"
"#;

const SCALER: &str = r#"
parameter:
  replicas: { type: int, default: 1 }
outputs:
  scaler:
    apiVersion: core.oam.dev/v1alpha2
    kind: ManualScalerTrait
    spec:
      replicaCount: "{{ parameter.replicas }}"
"#;

fn app_yaml(components: usize) -> String {
    let mut yaml = String::from("metadata:\n  name: bench-app\n  namespace: default\nspec:\n  components:\n");
    for i in 0..components {
        yaml.push_str(&format!(
            "    - name: web-{i}\n      type: worker\n      properties:\n        image: nginx\n      traits:\n        - type: scaler\n          properties:\n            replicas: {i}\n"
        ));
    }
    yaml
}

fn bench_template_evaluate(c: &mut Criterion) {
    let engine = YamlTemplateEngine::new();
    let params = json!({"image": "busybox", "cmd": ["sleep", "1000"]});
    let context = json!({"name": "myweb", "appName": "bench-app", "namespace": "default"});
    c.bench_function("template_evaluate_worker", |b| {
        b.iter(|| {
            let rendered = engine
                .evaluate(black_box(WORKER), black_box(&params), black_box(&context))
                .unwrap();
            black_box(rendered);
        });
    });
}

fn bench_trait_output_name(c: &mut Criterion) {
    c.bench_function("trait_output_name", |b| {
        b.iter(|| {
            let name = trait_output_name(black_box(&TraitOutputSeed {
                component: "myweb",
                trait_type: "scaler",
                ordinal: 0,
                output_key: "scaler",
                api_version: "core.oam.dev/v1alpha2",
                kind: "ManualScalerTrait",
            }));
            black_box(name);
        });
    });
}

fn bench_yaml_parse(c: &mut Criterion) {
    let yaml = app_yaml(10);
    c.bench_function("yaml_parse_application", |b| {
        b.iter(|| {
            let app = parser::parse_application(black_box(&yaml)).unwrap();
            black_box(app);
        });
    });
}

fn bench_compile(c: &mut Criterion) {
    let store = MemoryDefinitionStore::with_definitions([
        Definition::new(DefinitionKind::Component, "worker", WORKER),
        Definition::new(DefinitionKind::Trait, "scaler", SCALER),
    ]);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine: Arc<dyn TemplateEngine> = Arc::new(YamlTemplateEngine::new());

    let mut group = c.benchmark_group("compile");
    for n in [1, 10, 50] {
        let app = parser::parse_application(&app_yaml(n)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &app, |b, app| {
            b.iter(|| {
                let builder = AppfileBuilder::new(&store, Arc::clone(&engine));
                let appfile = runtime.block_on(builder.build(black_box(app))).unwrap();
                black_box(appfile.generate_component_manifests().unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_template_evaluate,
    bench_trait_output_name,
    bench_yaml_parse,
    bench_compile
);
criterion_main!(benches);
