//! SF-010: Manifest, artifact, rendered-template and plan types.
//!
//! Everything read from `assembly.yaml` derives Serialize/Deserialize and
//! JsonSchema so the manifest can be validated by editors.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Top-level assembly.yaml
// ============================================================================

/// Root manifest — the artifacts of one assembly and how they relate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyManifest {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable assembly name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Global parameters, referenced as `{{params.NAME}}`
    #[serde(default)]
    pub params: IndexMap<String, serde_json::Value>,

    /// Loading and rendering policy
    #[serde(default)]
    pub policy: Policy,

    /// Artifact declarations
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
}

/// One declared artifact, before its kind-specific properties are interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactSpec {
    /// Unique artifact id
    pub id: String,

    /// Artifact kind, looked up in the kinds table (`stack`, `asset`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Artifacts that must be deployed first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Kind-specific body
    #[serde(default)]
    pub properties: serde_json::Value,
}

// ============================================================================
// Policy
// ============================================================================

/// Loading and rendering policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    /// Template output format
    #[serde(default)]
    pub output: OutputFormat,

    /// Treat `depends_on` entries naming no artifact in this assembly as
    /// already-deployed externals instead of errors
    #[serde(default)]
    pub external_dependencies: bool,
}

/// Rendered template format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

// ============================================================================
// Stack and asset bodies
// ============================================================================

/// Body of a `stack` artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackTemplate {
    #[serde(default)]
    pub description: Option<String>,

    /// Named deferred values, referenced as `{{lazy.NAME}}`
    #[serde(default)]
    pub lazy: IndexMap<String, String>,

    /// Resources keyed by logical id
    #[serde(default)]
    pub resources: IndexMap<String, ResourceSpec>,

    /// Values exported to other stacks as `{{output.STACK.NAME}}`
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// A resource inside a stack.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    /// Provider resource type (opaque to stackforge)
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Explicit physical name; defaults to `<stack>-<id>` lowercased
    #[serde(default)]
    pub physical_name: Option<String>,

    /// Resources in the same stack that must be created first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Provider properties; strings may contain `{{...}}` tokens
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Body of an `asset` artifact.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AssetSource {
    /// File or directory, relative to the manifest
    pub path: String,

    #[serde(default)]
    pub packaging: Packaging,
}

/// How an asset is packaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Packaging {
    #[default]
    File,
    Directory,
}

/// Artifact kind after interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Stack,
    Asset,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stack => write!(f, "stack"),
            Self::Asset => write!(f, "asset"),
        }
    }
}

// ============================================================================
// Rendered templates
// ============================================================================

/// A synthesized stack template, resources in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedTemplate {
    pub stack: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub resources: IndexMap<String, RenderedResource>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
}

/// A resource with every token resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedResource {
    #[serde(rename = "type")]
    pub resource_type: String,

    pub physical_name: String,

    /// Explicit and implicit (token) dependencies inside the stack
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub properties: serde_json::Value,
}

// ============================================================================
// Plan
// ============================================================================

/// Plan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Deploy,
    Destroy,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy => write!(f, "Deploy"),
            Self::Destroy => write!(f, "Destroy"),
        }
    }
}

/// One artifact in a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub artifact: String,

    pub kind: ArtifactKind,

    /// Zero-based wave; artifacts in the same wave are independent
    pub wave: usize,

    /// Dependencies that are part of this plan
    pub depends_on: Vec<String>,

    /// Template fingerprint (stacks) or content hash (assets)
    pub fingerprint: Option<String>,
}

/// Ordered preview of a deploy or destroy.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    pub name: String,

    pub direction: Direction,

    /// Steps in execution order
    pub steps: Vec<PlanStep>,

    /// Number of waves
    pub waves: usize,

    /// Composite hash over every step fingerprint
    pub fingerprint: String,
}

impl DeploymentPlan {
    /// Steps of one wave.
    pub fn wave(&self, wave: usize) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(move |s| s.wave == wave)
    }
}

// ============================================================================
// Value helper
// ============================================================================

/// Convert a parameter value to the string spliced into a template.
pub fn json_value_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
