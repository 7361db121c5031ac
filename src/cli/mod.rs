//! SF-019: CLI subcommands — init, validate, order, synth, graph, schema.

use crate::core::artifact::ArtifactKinds;
use crate::core::assembly::{CloudAssembly, Extend};
use crate::core::planner::{self, Selection};
use crate::core::types::{AssemblyManifest, ArtifactKind, DeploymentPlan, Direction, OutputFormat};
use crate::core::{parser, synth};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new assembly project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate assembly.yaml and report every problem
    Validate {
        /// Path to assembly.yaml
        #[arg(short, long, default_value = "assembly.yaml")]
        file: PathBuf,
    },

    /// Show deployment order grouped in waves
    Order {
        /// Path to assembly.yaml
        #[arg(short, long, default_value = "assembly.yaml")]
        file: PathBuf,

        /// Stack id patterns (glob); default: every stack
        stacks: Vec<String>,

        /// Only the matched stacks, without dependencies or dependents
        #[arg(short, long)]
        exclusively: bool,

        /// Show destroy order instead of deploy order
        #[arg(long)]
        destroy: bool,
    },

    /// Render stack templates
    Synth {
        /// Path to assembly.yaml
        #[arg(short, long, default_value = "assembly.yaml")]
        file: PathBuf,

        /// Stack id patterns (glob); default: every stack
        stacks: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = "assembly.out")]
        output: PathBuf,

        /// Template format (default: manifest policy)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the artifact dependency graph in DOT form
    Graph {
        /// Path to assembly.yaml
        #[arg(short, long, default_value = "assembly.yaml")]
        file: PathBuf,
    },

    /// Print the JSON schema of assembly.yaml
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Order {
            file,
            stacks,
            exclusively,
            destroy,
        } => cmd_order(&file, stacks, exclusively, destroy),
        Commands::Synth {
            file,
            stacks,
            output,
            format,
        } => cmd_synth(&file, &stacks, &output, format),
        Commands::Graph { file } => cmd_graph(&file),
        Commands::Schema => cmd_schema(),
    }
}

const STARTER: &str = r#"version: "1.0"
name: my-app
description: "Managed by stackforge"

params:
  env: dev

policy:
  output: yaml
  external_dependencies: false

artifacts:
  - id: Network
    type: stack
    properties:
      resources:
        vpc:
          type: network.vpc
          physical_name: "{{params.env}}-vpc"
      outputs:
        vpc_id: "{{attr.vpc.Id}}"

  - id: App
    type: stack
    properties:
      resources:
        service:
          type: compute.service
          properties:
            vpc: "{{output.Network.vpc_id}}"
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let manifest_path = path.join("assembly.yaml");
    if manifest_path.exists() {
        bail!("{} already exists", manifest_path.display());
    }
    std::fs::create_dir_all(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    std::fs::write(&manifest_path, STARTER)
        .with_context(|| format!("cannot write {}", manifest_path.display()))?;

    println!("Initialized stackforge project at {}", path.display());
    println!("  Created: {}", manifest_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let manifest = parser::parse_manifest_file(file)?;
    let errors = parser::validate_manifest(&manifest, &ArtifactKinds::builtin());
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        bail!("{} validation error(s)", errors.len());
    }

    // Structure is fine; ordering catches cycles.
    let assembly = CloudAssembly::from_manifest(manifest, ".", &ArtifactKinds::builtin())?;
    println!(
        "OK: {} ({} stacks, {} assets)",
        assembly.name,
        assembly.stacks().count(),
        assembly.assets().count()
    );
    Ok(())
}

/// Load and validate, printing each validation error.
fn load(file: &Path) -> Result<CloudAssembly> {
    match CloudAssembly::load(file, &ArtifactKinds::builtin()) {
        Ok(assembly) => Ok(assembly),
        Err(crate::core::error::Error::Invalid(errors)) => {
            for e in &errors {
                eprintln!("  ERROR: {}", e);
            }
            bail!("validation failed")
        }
        Err(e) => Err(e).with_context(|| format!("cannot load {}", file.display())),
    }
}

fn cmd_order(file: &Path, stacks: Vec<String>, exclusively: bool, destroy: bool) -> Result<()> {
    let assembly = load(file)?;
    let selection = Selection {
        patterns: stacks,
        exclusively,
    };
    let direction = if destroy {
        Direction::Destroy
    } else {
        Direction::Deploy
    };
    let plan = planner::plan(&assembly, &selection, direction)?;
    print!("{}", render_plan(&plan));
    Ok(())
}

/// Plan as text, one block per wave.
fn render_plan(plan: &DeploymentPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} ({} artifacts, {} waves)",
        plan.direction,
        plan.name,
        plan.steps.len(),
        plan.waves
    );
    for wave in 0..plan.waves {
        let _ = writeln!(out);
        let _ = writeln!(out, "Wave {}:", wave + 1);
        for step in plan.wave(wave) {
            let symbol = match step.kind {
                ArtifactKind::Stack => "+",
                ArtifactKind::Asset => "*",
            };
            let after = if step.depends_on.is_empty() {
                String::new()
            } else {
                format!(" (after {})", step.depends_on.join(", "))
            };
            let _ = writeln!(out, "  {} {} [{}]{}", symbol, step.artifact, step.kind, after);
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Fingerprint: {}", plan.fingerprint);
    out
}

fn cmd_synth(
    file: &Path,
    stacks: &[String],
    output: &Path,
    format: Option<OutputFormat>,
) -> Result<()> {
    let assembly = load(file)?;
    let format = format.unwrap_or(assembly.policy.output);

    let selected: Vec<&str> = assembly
        .select_stacks(stacks, Extend::None)?
        .into_iter()
        .map(|a| a.id.as_str())
        .collect();
    let rendered: Vec<_> = synth::synth_assembly(&assembly)?
        .into_iter()
        .filter(|s| selected.contains(&s.stack()))
        .collect();

    let written = synth::write_templates(&rendered, output, format)?;
    for (path, stack) in written.iter().zip(&rendered) {
        println!("  {} -> {} ({})", stack.stack(), path.display(), stack.fingerprint);
    }
    println!("Synthesized {} stack(s) into {}", written.len(), output.display());
    Ok(())
}

fn cmd_graph(file: &Path) -> Result<()> {
    let assembly = load(file)?;
    print!("{}", render_dot(&assembly));
    Ok(())
}

/// Dependency graph in Graphviz DOT; edges point from dependent to dependency.
fn render_dot(assembly: &CloudAssembly) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", dot_id(&assembly.name));
    let _ = writeln!(out, "  rankdir=LR;");
    for artifact in assembly.artifacts() {
        let shape = match artifact.kind() {
            ArtifactKind::Stack => "box",
            ArtifactKind::Asset => "folder",
        };
        let _ = writeln!(out, "  {} [shape={}];", dot_id(&artifact.id), shape);
    }
    for artifact in assembly.artifacts() {
        for dep in &artifact.depends_on {
            let style = if assembly.get(dep).is_some() {
                ""
            } else {
                " [style=dashed]"
            };
            let _ = writeln!(out, "  {} -> {}{};", dot_id(&artifact.id), dot_id(dep), style);
        }
    }
    let _ = writeln!(out, "}}");
    out
}

/// Quoted DOT identifier.
fn dot_id(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(AssemblyManifest);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
