//! OC-030: CLI subcommands — render, validate, snapshot, schema, completions.

use crate::core::appfile::{Appfile, AppfileBuilder};
use crate::core::config::{self, CompilerConfig};
use crate::core::store::MemoryDefinitionStore;
use crate::core::types::{Application, ApplicationRevision, ComponentManifest, Definition};
use crate::core::{error::CompileError, parser};
use crate::template::YamlTemplateEngine;
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile an application into component manifests
    Render {
        /// Path to the Application YAML
        #[arg(short, long, required_unless_present = "revision")]
        app: Option<PathBuf>,

        /// Directory of definition YAML files
        #[arg(short, long)]
        definitions: PathBuf,

        /// Compile the application recorded in this ApplicationRevision instead
        #[arg(long)]
        revision: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,

        /// Compiler config (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate an application without resolving definitions
    Validate {
        /// Path to the Application YAML
        #[arg(short, long)]
        app: PathBuf,
    },

    /// Record an ApplicationRevision pinning every definition used
    Snapshot {
        /// Path to the Application YAML
        #[arg(short, long)]
        app: PathBuf,

        /// Directory of definition YAML files
        #[arg(short, long)]
        definitions: PathBuf,

        /// Revision name, e.g. my-app-v1
        #[arg(long)]
        name: String,

        /// Compiler config (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the JSON Schema of a document kind
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    Application,
    Definition,
    Revision,
}

/// Everything `render` emits.
#[derive(Debug, Serialize)]
struct RenderOutput {
    components: Vec<ComponentManifest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    policies: Vec<Value>,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Render {
            app,
            definitions,
            revision,
            output,
            config,
        } => cmd_render(
            app.as_deref(),
            &definitions,
            revision.as_deref(),
            output,
            config.as_deref(),
        ),
        Commands::Validate { app } => cmd_validate(&app),
        Commands::Snapshot {
            app,
            definitions,
            name,
            config,
        } => cmd_snapshot(&app, &definitions, &name, config.as_deref()),
        Commands::Schema { kind } => cmd_schema(kind),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

fn load_compiler_config(path: Option<&Path>) -> Result<CompilerConfig, String> {
    match path {
        Some(p) => config::load_config(p),
        None => Ok(CompilerConfig::default()),
    }
}

/// Block on the async builder from the synchronous CLI.
fn build_appfile(
    definitions: &Path,
    compiler_config: CompilerConfig,
    app: Option<&Application>,
    revision: Option<&ApplicationRevision>,
) -> Result<Appfile, String> {
    let store = MemoryDefinitionStore::load_dir(definitions).map_err(|e| e.to_string())?;
    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to start runtime: {}", e))?;
    let builder = AppfileBuilder::new(&store, Arc::new(YamlTemplateEngine::new()))
        .with_config(compiler_config);

    let result: Result<Appfile, CompileError> = runtime.block_on(async {
        match (revision, app) {
            (Some(rev), _) => builder.build_from_revision(rev).await,
            (None, Some(app)) => builder.build(app).await,
            (None, None) => Err(CompileError::Validation(vec![
                "an application or a revision is required".to_string(),
            ])),
        }
    });
    result.map_err(|e| e.to_string())
}

fn render(
    app_file: Option<&Path>,
    definitions: &Path,
    revision_file: Option<&Path>,
    format: OutputFormat,
    config_file: Option<&Path>,
) -> Result<String, String> {
    let compiler_config = load_compiler_config(config_file)?;
    let revision = revision_file.map(parser::parse_revision_file).transpose()?;
    let app = match (&revision, app_file) {
        (Some(_), _) | (None, None) => None,
        (None, Some(path)) => Some(parser::parse_application_file(path)?),
    };

    let appfile = build_appfile(definitions, compiler_config, app.as_ref(), revision.as_ref())?;
    let output = RenderOutput {
        components: appfile
            .generate_component_manifests()
            .map_err(|e| e.to_string())?,
        policies: appfile.generate_policy_manifests().map_err(|e| e.to_string())?,
    };
    tracing::info!(
        app = %appfile.name,
        components = output.components.len(),
        policies = output.policies.len(),
        "rendered application"
    );

    match format {
        OutputFormat::Yaml => {
            serde_yaml_ng::to_string(&output).map_err(|e| format!("YAML encode error: {}", e))
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(&output).map_err(|e| format!("JSON encode error: {}", e))
        }
    }
}

fn cmd_render(
    app_file: Option<&Path>,
    definitions: &Path,
    revision_file: Option<&Path>,
    format: OutputFormat,
    config_file: Option<&Path>,
) -> Result<(), String> {
    let text = render(app_file, definitions, revision_file, format, config_file)?;
    print!("{}", text);
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let app = parser::parse_application_file(file)?;
    let errors = parser::validate_application(&app);

    if errors.is_empty() {
        println!(
            "OK: {} ({} components, {} policies, {} workflow steps)",
            app.metadata.name,
            app.spec.components.len(),
            app.spec.policies.len(),
            app.spec.workflow.as_ref().map(|w| w.steps.len()).unwrap_or(0)
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn snapshot(
    app_file: &Path,
    definitions: &Path,
    name: &str,
    config_file: Option<&Path>,
) -> Result<String, String> {
    let compiler_config = load_compiler_config(config_file)?;
    let app = parser::parse_application_file(app_file)?;
    let appfile = build_appfile(definitions, compiler_config, Some(&app), None)?;
    let revision = appfile
        .to_revision(name)
        .map_err(|e| format!("failed to fingerprint revision: {}", e))?;
    serde_yaml_ng::to_string(&revision).map_err(|e| format!("YAML encode error: {}", e))
}

fn cmd_snapshot(
    app_file: &Path,
    definitions: &Path,
    name: &str,
    config_file: Option<&Path>,
) -> Result<(), String> {
    print!("{}", snapshot(app_file, definitions, name, config_file)?);
    Ok(())
}

fn schema_json(kind: SchemaKind) -> Result<String, String> {
    let schema = match kind {
        SchemaKind::Application => schemars::schema_for!(Application),
        SchemaKind::Definition => schemars::schema_for!(Definition),
        SchemaKind::Revision => schemars::schema_for!(ApplicationRevision),
    };
    serde_json::to_string_pretty(&schema).map_err(|e| format!("JSON encode error: {}", e))
}

fn cmd_schema(kind: SchemaKind) -> Result<(), String> {
    println!("{}", schema_json(kind)?);
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) -> Result<(), String> {
    let mut command = Commands::augment_subcommands(clap::Command::new("oamc"));
    clap_complete::generate(shell, &mut command, "oamc", &mut std::io::stdout());
    Ok(())
}
