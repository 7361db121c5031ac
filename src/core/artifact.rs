//! SF-013: Artifacts and the artifact kinds table.
//!
//! The kinds table maps a manifest `type:` string to a factory that interprets
//! the artifact's `properties`. It is an immutable value built at startup and
//! passed to the loader; there is no global registration.

use super::error::{Error, Result};
use super::stack::Stack;
use super::types::{ArtifactKind, ArtifactSpec, AssetSource, StackTemplate};
use crate::graph::{Dependent, Keyed};
use indexmap::IndexMap;

/// Interpreted artifact body.
#[derive(Debug, Clone)]
pub enum ArtifactBody {
    Stack(Stack),
    Asset(AssetSource),
}

/// One artifact of a loaded assembly.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,

    /// Explicit `depends_on` plus stacks referenced through output tokens,
    /// sorted and deduplicated
    pub depends_on: Vec<String>,

    pub body: ArtifactBody,
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self.body {
            ArtifactBody::Stack(_) => ArtifactKind::Stack,
            ArtifactBody::Asset(_) => ArtifactKind::Asset,
        }
    }

    pub fn as_stack(&self) -> Option<&Stack> {
        match &self.body {
            ArtifactBody::Stack(s) => Some(s),
            ArtifactBody::Asset(_) => None,
        }
    }

    pub fn as_asset(&self) -> Option<&AssetSource> {
        match &self.body {
            ArtifactBody::Asset(a) => Some(a),
            ArtifactBody::Stack(_) => None,
        }
    }
}

impl Keyed for Artifact {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Dependent for Artifact {
    fn dependencies(&self) -> Vec<String> {
        self.depends_on.clone()
    }
}

/// Interprets the `properties` of one artifact kind.
pub type ArtifactFactory = fn(id: &str, properties: serde_json::Value) -> Result<ArtifactBody>;

/// Immutable table from manifest type name to factory.
#[derive(Clone)]
pub struct ArtifactKinds {
    factories: IndexMap<String, ArtifactFactory>,
}

impl ArtifactKinds {
    /// A table with no kinds.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// `stack` and `asset`.
    pub fn builtin() -> Self {
        Self::empty()
            .with("stack", stack_factory)
            .with("asset", asset_factory)
    }

    /// Add or replace a kind.
    pub fn with(mut self, name: &str, factory: ArtifactFactory) -> Self {
        self.factories.insert(name.to_string(), factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<ArtifactFactory> {
        self.factories.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Interpret one manifest entry.
    pub fn build(&self, spec: &ArtifactSpec) -> Result<Artifact> {
        let factory = self.get(&spec.kind).ok_or_else(|| Error::UnknownKind {
            id: spec.id.clone(),
            kind: spec.kind.clone(),
        })?;
        let body = factory(&spec.id, spec.properties.clone())?;

        let mut depends_on = spec.depends_on.clone();
        if let ArtifactBody::Stack(ref stack) = body {
            depends_on.extend(stack.stack_dependencies());
        }
        depends_on.sort();
        depends_on.dedup();

        Ok(Artifact {
            id: spec.id.clone(),
            depends_on,
            body,
        })
    }
}

impl Default for ArtifactKinds {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for ArtifactKinds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn properties_error(id: &str, kind: &str, message: impl std::fmt::Display) -> Error {
    Error::Properties {
        id: id.to_string(),
        kind: kind.to_string(),
        message: message.to_string(),
    }
}

/// Missing `properties` means an empty object.
fn object_or_empty(properties: serde_json::Value) -> serde_json::Value {
    if properties.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        properties
    }
}

fn stack_factory(id: &str, properties: serde_json::Value) -> Result<ArtifactBody> {
    let template: StackTemplate = serde_json::from_value(object_or_empty(properties))
        .map_err(|e| properties_error(id, "stack", e))?;
    let stack = Stack::prepare(id, &template).map_err(|e| properties_error(id, "stack", e))?;
    Ok(ArtifactBody::Stack(stack))
}

fn asset_factory(id: &str, properties: serde_json::Value) -> Result<ArtifactBody> {
    let source: AssetSource = serde_json::from_value(object_or_empty(properties))
        .map_err(|e| properties_error(id, "asset", e))?;
    if source.path.trim().is_empty() {
        return Err(properties_error(id, "asset", "path must not be empty"));
    }
    Ok(ArtifactBody::Asset(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(id: &str, kind: &str, depends_on: &[&str], properties: serde_json::Value) -> ArtifactSpec {
        ArtifactSpec {
            id: id.to_string(),
            kind: kind.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            properties,
        }
    }

    #[test]
    fn test_sf013_builtin_kinds() {
        let kinds = ArtifactKinds::builtin();
        assert_eq!(kinds.names().collect::<Vec<_>>(), vec!["stack", "asset"]);
        assert!(kinds.contains("stack"));
        assert!(!kinds.contains("tree"));
    }

    #[test]
    fn test_sf013_build_stack_adds_output_dependencies() {
        let kinds = ArtifactKinds::builtin();
        let art = kinds
            .build(&spec(
                "Web",
                "stack",
                &["Assets", "Assets"],
                json!({"outputs": {"vpc": "{{output.Network.vpc_id}}"}}),
            ))
            .unwrap();
        assert_eq!(art.kind(), ArtifactKind::Stack);
        assert_eq!(art.depends_on, vec!["Assets", "Network"]);
        assert!(art.as_stack().is_some());
        assert!(art.as_asset().is_none());
    }

    #[test]
    fn test_sf013_build_stack_without_properties() {
        let kinds = ArtifactKinds::builtin();
        let art = kinds.build(&spec("Empty", "stack", &[], serde_json::Value::Null)).unwrap();
        assert!(art.as_stack().unwrap().resources.is_empty());
    }

    #[test]
    fn test_sf013_build_asset() {
        let kinds = ArtifactKinds::builtin();
        let art = kinds
            .build(&spec("Site", "asset", &[], json!({"path": "site", "packaging": "directory"})))
            .unwrap();
        assert_eq!(art.kind(), ArtifactKind::Asset);
        assert_eq!(art.as_asset().unwrap().path, "site");
    }

    #[test]
    fn test_sf013_asset_requires_path() {
        let kinds = ArtifactKinds::builtin();
        let err = kinds
            .build(&spec("Site", "asset", &[], json!({"path": " "})))
            .unwrap_err();
        assert!(err.to_string().contains("path must not be empty"));
        assert!(kinds.build(&spec("Site", "asset", &[], serde_json::Value::Null)).is_err());
    }

    #[test]
    fn test_sf013_unknown_kind() {
        let kinds = ArtifactKinds::builtin();
        let err = kinds.build(&spec("T", "tree", &[], json!({}))).unwrap_err();
        assert!(matches!(err, Error::UnknownKind { .. }));
    }

    #[test]
    fn test_sf013_custom_table() {
        fn nested(_id: &str, _props: serde_json::Value) -> Result<ArtifactBody> {
            Ok(ArtifactBody::Stack(Stack::prepare("Nested", &StackTemplate::default()).unwrap()))
        }
        let kinds = ArtifactKinds::empty().with("nested-stack", nested);
        assert!(kinds.build(&spec("N", "stack", &[], json!({}))).is_err());
        let art = kinds.build(&spec("N", "nested-stack", &[], json!({}))).unwrap();
        assert_eq!(art.kind(), ArtifactKind::Stack);
    }
}
