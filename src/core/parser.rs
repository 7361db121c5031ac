//! SF-014: Manifest parsing and validation.
//!
//! Parses assembly.yaml (JSON manifests parse too) and validates structural
//! constraints, collecting every problem instead of stopping at the first:
//! - Version must be "1.0"
//! - Artifact ids are unique and well-formed
//! - Artifact types exist in the kinds table and their properties parse
//! - depends_on references must exist (unless external dependencies are allowed)
//! - Resource, lazy and output references inside stacks must exist
//! - Param tokens name a declared param; a stack never reads its own outputs

use super::artifact::{Artifact, ArtifactBody, ArtifactKinds};
use super::error::{Error, Result};
use super::stack::Stack;
use super::tokens::TokenRef;
use super::types::*;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn is_valid_id(id: &str) -> bool {
    static ID: OnceLock<Option<Regex>> = OnceLock::new();
    ID.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(id))
}

/// Parse an assembly manifest file from disk.
pub fn parse_manifest_file(path: &Path) -> Result<AssemblyManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_manifest(&content)
}

/// Parse an assembly manifest from a string.
pub fn parse_manifest(yaml: &str) -> Result<AssemblyManifest> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Validate a parsed manifest. Returns a list of errors (empty = valid).
pub fn validate_manifest(manifest: &AssemblyManifest, kinds: &ArtifactKinds) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if manifest.version != "1.0" {
        errors.push(ValidationError::new(format!(
            "version must be \"1.0\", got \"{}\"",
            manifest.version
        )));
    }

    if manifest.name.trim().is_empty() {
        errors.push(ValidationError::new("name must not be empty"));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for spec in &manifest.artifacts {
        if !is_valid_id(&spec.id) {
            errors.push(ValidationError::new(format!(
                "artifact id '{}' must start with a letter and contain only letters, digits, '-' or '_'",
                spec.id
            )));
        }
        if !seen.insert(spec.id.as_str()) {
            errors.push(ValidationError::new(format!("duplicate artifact id '{}'", spec.id)));
        }
    }

    for spec in &manifest.artifacts {
        for dep in &spec.depends_on {
            if dep == &spec.id {
                errors.push(ValidationError::new(format!(
                    "artifact '{}' depends on itself",
                    spec.id
                )));
            } else if !seen.contains(dep.as_str()) && !manifest.policy.external_dependencies {
                errors.push(ValidationError::new(format!(
                    "artifact '{}' depends on unknown artifact '{}'",
                    spec.id, dep
                )));
            }
        }
    }

    let mut built: Vec<Artifact> = Vec::new();
    for spec in &manifest.artifacts {
        if !kinds.contains(&spec.kind) {
            let known = kinds.names().collect::<Vec<_>>().join(", ");
            errors.push(ValidationError::new(format!(
                "artifact '{}' has unknown type '{}' (known: {})",
                spec.id, spec.kind, known
            )));
            continue;
        }
        match kinds.build(spec) {
            Ok(artifact) => built.push(artifact),
            Err(e) => errors.push(ValidationError::new(e.to_string())),
        }
    }

    let kinds_by_id: HashMap<&str, ArtifactKind> =
        built.iter().map(|a| (a.id.as_str(), a.kind())).collect();
    for artifact in &built {
        if let ArtifactBody::Stack(ref stack) = artifact.body {
            validate_stack(stack, &manifest.params, &kinds_by_id, &mut errors);
        }
    }

    errors
}

/// Reference checks inside one stack.
fn validate_stack(
    stack: &Stack,
    params: &IndexMap<String, serde_json::Value>,
    artifacts: &HashMap<&str, ArtifactKind>,
    errors: &mut Vec<ValidationError>,
) {
    let id = &stack.id;
    let resources: HashSet<&str> = stack.resources.iter().map(|r| r.id.as_str()).collect();
    let lazies: HashSet<&str> = stack.lazies.iter().map(|l| l.name.as_str()).collect();

    for lazy in &stack.lazies {
        for token in lazy.value.refs() {
            match token {
                TokenRef::Ref(_) | TokenRef::Attr { .. } => errors.push(ValidationError::new(format!(
                    "stack '{}' lazy value '{}' may not reference resources ({})",
                    id, lazy.name, token
                ))),
                TokenRef::Lazy(name) if !lazies.contains(name.as_str()) => {
                    errors.push(ValidationError::new(format!(
                        "stack '{}' lazy value '{}' references unknown lazy value '{}'",
                        id, lazy.name, name
                    )))
                }
                _ => {}
            }
        }
    }

    for resource in &stack.resources {
        for dep in &resource.depends_on {
            if dep == &resource.id {
                errors.push(ValidationError::new(format!(
                    "stack '{}' resource '{}' depends on itself",
                    id, resource.id
                )));
            } else if !resources.contains(dep.as_str()) {
                errors.push(ValidationError::new(format!(
                    "stack '{}' resource '{}' depends on unknown resource '{}'",
                    id, resource.id, dep
                )));
            }
        }
    }

    let resource_tokens = stack
        .resources
        .iter()
        .flat_map(|r| r.refs().map(move |t| (format!("resource '{}'", r.id), t)));
    let output_tokens = stack
        .outputs
        .iter()
        .flat_map(|(name, o)| o.refs().iter().map(move |t| (format!("output '{}'", name), t)));

    for (site, token) in resource_tokens.chain(output_tokens) {
        match token {
            TokenRef::Ref(r) | TokenRef::Attr { resource: r, .. } if !resources.contains(r.as_str()) => {
                errors.push(ValidationError::new(format!(
                    "stack '{}' {} references unknown resource '{}'",
                    id, site, r
                )));
            }
            TokenRef::Lazy(name) if !lazies.contains(name.as_str()) => {
                errors.push(ValidationError::new(format!(
                    "stack '{}' {} references unknown lazy value '{}'",
                    id, site, name
                )));
            }
            _ => {}
        }
    }

    let mut missing_params = BTreeSet::new();
    let mut self_output = false;
    for token in stack.refs() {
        match token {
            TokenRef::Param(p) if !params.contains_key(p) => {
                missing_params.insert(p.as_str());
            }
            TokenRef::Output { stack: other, .. } if other == id => self_output = true,
            TokenRef::Output { stack: other, .. } => match artifacts.get(other.as_str()) {
                None => errors.push(ValidationError::new(format!(
                    "stack '{}' references outputs of unknown stack '{}'",
                    id, other
                ))),
                Some(ArtifactKind::Asset) => errors.push(ValidationError::new(format!(
                    "stack '{}' references outputs of asset '{}'",
                    id, other
                ))),
                Some(ArtifactKind::Stack) => {}
            },
            _ => {}
        }
    }
    for p in missing_params {
        errors.push(ValidationError::new(format!(
            "stack '{}' references unknown param '{}'",
            id, p
        )));
    }
    if self_output {
        errors.push(ValidationError::new(format!(
            "stack '{}' references its own outputs",
            id
        )));
    }
}
