//! SF-018: Plan generation — selected artifacts grouped into deployment waves.
//!
//! A plan is a preview: no remote calls are made. Deploy waves come straight
//! from `sort_levels`; destroy reverses them. A destroy selection also takes
//! the assets that only the destroyed stacks use.

use super::artifact::{Artifact, ArtifactBody};
use super::assembly::{CloudAssembly, Extend};
use super::error::{Error, Result};
use super::hasher::{composite_hash, fingerprint_asset};
use super::synth::synth_assembly;
use super::types::*;
use crate::graph::sort_levels;
use std::collections::{HashMap, HashSet};

/// Which stacks a plan covers.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Glob patterns over stack ids; empty selects every stack
    pub patterns: Vec<String>,
    /// Skip transitive dependencies (deploy) or dependents (destroy)
    pub exclusively: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of(patterns: &[&str]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            exclusively: false,
        }
    }

    pub fn exclusively(mut self) -> Self {
        self.exclusively = true;
        self
    }

    fn extend(&self, direction: Direction) -> Extend {
        match (self.exclusively, direction) {
            (true, _) => Extend::None,
            (false, Direction::Deploy) => Extend::Upstream,
            (false, Direction::Destroy) => Extend::Downstream,
        }
    }
}

/// Build the ordered plan for `selection`.
pub fn plan(
    assembly: &CloudAssembly,
    selection: &Selection,
    direction: Direction,
) -> Result<DeploymentPlan> {
    let selected = assembly.select_stacks(&selection.patterns, selection.extend(direction))?;
    let in_plan: HashSet<&str> = selected.iter().map(|a| a.id.as_str()).collect();

    let fingerprints = fingerprints(assembly, &selected)?;

    let mut levels = sort_levels(
        selected,
        |a: &&Artifact| a.id.clone(),
        |a: &&Artifact| a.depends_on.clone(),
    )
    .map_err(|e| Error::ordering("plan order", e))?;
    if direction == Direction::Destroy {
        levels.reverse();
    }

    let waves = levels.len();
    let mut steps = Vec::new();
    for (wave, level) in levels.into_iter().enumerate() {
        for artifact in level {
            steps.push(PlanStep {
                artifact: artifact.id.clone(),
                kind: artifact.kind(),
                wave,
                depends_on: artifact
                    .depends_on
                    .iter()
                    .filter(|d| in_plan.contains(d.as_str()))
                    .cloned()
                    .collect(),
                fingerprint: fingerprints.get(artifact.id.as_str()).cloned().flatten(),
            });
        }
    }

    let components: Vec<String> = steps
        .iter()
        .map(|s| format!("{}={}", s.artifact, s.fingerprint.as_deref().unwrap_or("-")))
        .collect();
    let refs: Vec<&str> = components.iter().map(String::as_str).collect();

    tracing::info!(
        assembly = %assembly.name,
        %direction,
        steps = steps.len(),
        waves,
        "plan generated"
    );

    Ok(DeploymentPlan {
        name: assembly.name.clone(),
        direction,
        steps,
        waves,
        fingerprint: composite_hash(&refs),
    })
}

/// Fingerprint per selected artifact. A missing asset gets `None` and a warning.
fn fingerprints<'a>(
    assembly: &CloudAssembly,
    selected: &[&'a Artifact],
) -> Result<HashMap<&'a str, Option<String>>> {
    let mut result = HashMap::new();

    // Every stack is synthesized: selected stacks may consume outputs of
    // stacks outside the selection.
    let templates: HashMap<String, String> = if selected.iter().any(|a| a.as_stack().is_some()) {
        synth_assembly(assembly)?
            .into_iter()
            .map(|s| (s.template.stack, s.fingerprint))
            .collect()
    } else {
        HashMap::new()
    };

    for artifact in selected {
        let fingerprint = match &artifact.body {
            ArtifactBody::Stack(_) => templates.get(&artifact.id).cloned(),
            ArtifactBody::Asset(asset) => {
                match fingerprint_asset(&assembly.base_dir, asset) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        tracing::warn!(asset = %artifact.id, error = %e, "cannot fingerprint asset");
                        None
                    }
                }
            }
        };
        result.insert(artifact.id.as_str(), fingerprint);
    }
    Ok(result)
}
