//! SF-015: Cloud assembly — validated artifacts in deployment order, plus
//! stack selection.

use super::artifact::{Artifact, ArtifactKinds};
use super::error::{Error, Result};
use super::parser::{parse_manifest_file, validate_manifest};
use super::stack::Stack;
use super::types::{AssemblyManifest, AssetSource, Policy};
use crate::graph::sort_dependents;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// How a stack selection grows beyond the stacks that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extend {
    /// Only the matched stacks.
    None,
    /// Matched stacks plus everything they transitively depend on (deploy).
    #[default]
    Upstream,
    /// Matched stacks plus everything that transitively depends on them, and
    /// the assets nothing else uses any more (destroy).
    Downstream,
}

/// A loaded assembly. Artifacts are kept in topological order.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub name: String,
    pub description: Option<String>,
    pub params: IndexMap<String, serde_json::Value>,
    pub policy: Policy,
    /// Directory asset paths are relative to
    pub base_dir: PathBuf,
    artifacts: Vec<Artifact>,
    index: HashMap<String, usize>,
}

impl CloudAssembly {
    /// Parse, validate and order the manifest at `path`.
    pub fn load(path: &Path, kinds: &ArtifactKinds) -> Result<Self> {
        let manifest = parse_manifest_file(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_manifest(manifest, base_dir, kinds)
    }

    /// Validate and order an already-parsed manifest.
    pub fn from_manifest(
        manifest: AssemblyManifest,
        base_dir: impl Into<PathBuf>,
        kinds: &ArtifactKinds,
    ) -> Result<Self> {
        let errors = validate_manifest(&manifest, kinds);
        if !errors.is_empty() {
            return Err(Error::Invalid(errors));
        }

        let built = manifest
            .artifacts
            .iter()
            .map(|spec| kinds.build(spec))
            .collect::<Result<Vec<_>>>()?;

        let ids: HashSet<&str> = built.iter().map(|a| a.id.as_str()).collect();
        for artifact in &built {
            for dep in artifact.depends_on.iter().filter(|d| !ids.contains(d.as_str())) {
                tracing::warn!(
                    artifact = %artifact.id,
                    dependency = %dep,
                    "dependency is not part of this assembly; assuming it is already deployed"
                );
            }
        }

        let artifacts =
            sort_dependents(built).map_err(|e| Error::ordering("artifact order", e))?;
        let index = artifacts
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();

        tracing::debug!(
            assembly = %manifest.name,
            artifacts = artifacts.len(),
            "assembly loaded"
        );

        Ok(Self {
            name: manifest.name,
            description: manifest.description,
            params: manifest.params,
            policy: manifest.policy,
            base_dir: base_dir.into(),
            artifacts,
            index,
        })
    }

    /// Every artifact, dependencies first.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Stacks in deployment order.
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.artifacts.iter().filter_map(Artifact::as_stack)
    }

    /// Assets in deployment order, with their artifact ids.
    pub fn assets(&self) -> impl Iterator<Item = (&str, &AssetSource)> {
        self.artifacts
            .iter()
            .filter_map(|a| a.as_asset().map(|s| (a.id.as_str(), s)))
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.index.get(id).map(|&i| &self.artifacts[i])
    }

    /// Dependencies of `id` that are part of this assembly.
    pub fn dependencies(&self, id: &str) -> Result<Vec<&str>> {
        let artifact = self
            .get(id)
            .ok_or_else(|| Error::UnknownArtifact(id.to_string()))?;
        Ok(artifact
            .depends_on
            .iter()
            .filter(|d| self.index.contains_key(d.as_str()))
            .map(String::as_str)
            .collect())
    }

    /// Artifacts that list `id` as a dependency.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.artifacts
            .iter()
            .filter(|a| a.depends_on.iter().any(|d| d == id))
            .map(|a| a.id.as_str())
            .collect()
    }

    /// Select stacks by glob pattern over stack ids (empty = every stack),
    /// extended per `extend`. The result is in deployment order.
    pub fn select_stacks(&self, patterns: &[String], extend: Extend) -> Result<Vec<&Artifact>> {
        let stack_ids = self
            .artifacts
            .iter()
            .filter(|a| a.as_stack().is_some())
            .map(|a| a.id.as_str());

        let matched: Vec<&str> = if patterns.is_empty() {
            stack_ids.collect()
        } else {
            let compiled = patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p).map_err(|source| Error::Pattern {
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let matched: Vec<&str> = stack_ids
                .filter(|id| compiled.iter().any(|p| p.matches(id)))
                .collect();
            if matched.is_empty() {
                return Err(Error::NoMatch(patterns.join(", ")));
            }
            matched
        };

        let selected = match extend {
            Extend::None => matched.into_iter().collect::<HashSet<_>>(),
            Extend::Upstream => self.closure(matched, |id| {
                self.dependencies(id).unwrap_or_default()
            }),
            Extend::Downstream => {
                let mut selected = self.closure(matched, |id| self.dependents(id));
                let released = self.released_assets(&selected);
                selected.extend(released);
                selected
            }
        };

        tracing::debug!(selected = selected.len(), ?extend, "stack selection");

        Ok(self
            .artifacts
            .iter()
            .filter(|a| selected.contains(a.id.as_str()))
            .collect())
    }

    /// Assets used only by artifacts in `selected`. Removing those artifacts
    /// leaves such an asset unused, so it goes with them.
    fn released_assets(&self, selected: &HashSet<&str>) -> Vec<&str> {
        self.assets()
            .map(|(id, _)| id)
            .filter(|id| !selected.contains(id))
            .filter(|id| {
                let users = self.dependents(id);
                !users.is_empty() && users.iter().all(|u| selected.contains(u))
            })
            .collect()
    }

    /// Transitive closure of `start` along `next`.
    fn closure<'a, F>(&'a self, start: Vec<&'a str>, next: F) -> HashSet<&'a str>
    where
        F: Fn(&str) -> Vec<&'a str>,
    {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = start.into_iter().collect();
        while let Some(id) = queue.pop_front() {
            if seen.insert(id) {
                queue.extend(next(id));
            }
        }
        seen
    }
}
