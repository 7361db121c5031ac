//! SF-012: Prepared stack model — every deferred value wrapped in a [`Pending`].

use super::tokens::{Pending, ResolveError, TokenRef};
use super::types::{ResourceSpec, StackTemplate};
use crate::graph::{Dependent, Keyed};
use indexmap::IndexMap;

/// A named lazy value of a stack.
#[derive(Debug, Clone)]
pub struct LazyValue {
    pub name: String,
    pub value: Pending<String>,
}

impl Keyed for LazyValue {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Dependent for LazyValue {
    fn dependencies(&self) -> Vec<String> {
        self.value
            .refs()
            .iter()
            .filter_map(|t| match t {
                TokenRef::Lazy(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A resource of a stack, ready to resolve.
#[derive(Debug, Clone)]
pub struct StackResource {
    pub id: String,
    pub resource_type: String,
    pub physical_name: Option<Pending<String>>,
    /// Explicit `depends_on` entries only
    pub depends_on: Vec<String>,
    pub properties: Pending<serde_json::Value>,
}

impl StackResource {
    fn prepare(id: &str, spec: &ResourceSpec) -> Result<Self, ResolveError> {
        Ok(Self {
            id: id.to_string(),
            resource_type: spec.resource_type.clone(),
            physical_name: spec.physical_name.clone().map(Pending::new).transpose()?,
            depends_on: spec.depends_on.clone(),
            properties: Pending::new(spec.properties.clone())?,
        })
    }

    /// Every token of this resource.
    pub fn refs(&self) -> impl Iterator<Item = &TokenRef> {
        self.physical_name
            .iter()
            .flat_map(|p| p.refs())
            .chain(self.properties.refs())
    }

    /// Resources referenced through `ref`/`attr` tokens, sorted and deduplicated.
    pub fn implicit_dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = self
            .refs()
            .filter_map(|t| t.resource().map(str::to_string))
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }
}

impl Keyed for StackResource {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Dependent for StackResource {
    fn dependencies(&self) -> Vec<String> {
        let mut deps = self.depends_on.clone();
        deps.extend(self.implicit_dependencies());
        deps.sort();
        deps.dedup();
        deps
    }
}

/// A stack whose deferred values are recorded but not yet resolved.
#[derive(Debug, Clone)]
pub struct Stack {
    pub id: String,
    pub description: Option<String>,
    pub lazies: Vec<LazyValue>,
    pub resources: Vec<StackResource>,
    pub outputs: IndexMap<String, Pending<String>>,
}

impl Stack {
    /// First phase: scan every template string of `template`.
    pub fn prepare(id: &str, template: &StackTemplate) -> Result<Self, ResolveError> {
        let lazies = template
            .lazy
            .iter()
            .map(|(name, raw)| -> Result<LazyValue, ResolveError> {
                Ok(LazyValue {
                    name: name.clone(),
                    value: Pending::new(raw.clone())?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let resources = template
            .resources
            .iter()
            .map(|(rid, spec)| StackResource::prepare(rid, spec))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs = IndexMap::new();
        for (name, raw) in &template.outputs {
            outputs.insert(name.clone(), Pending::new(raw.clone())?);
        }

        Ok(Self {
            id: id.to_string(),
            description: template.description.clone(),
            lazies,
            resources,
            outputs,
        })
    }

    /// Every token anywhere in the stack.
    pub fn refs(&self) -> impl Iterator<Item = &TokenRef> {
        self.lazies
            .iter()
            .flat_map(|l| l.value.refs())
            .chain(self.resources.iter().flat_map(|r| r.refs()))
            .chain(self.outputs.values().flat_map(|o| o.refs()))
    }

    /// Stacks whose outputs this stack consumes, sorted and deduplicated.
    pub fn stack_dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = self
            .refs()
            .filter_map(|t| match t {
                TokenRef::Output { stack, .. } => Some(stack.clone()),
                _ => None,
            })
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }

    pub fn resource(&self, id: &str) -> Option<&StackResource> {
        self.resources.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::sort_dependents;

    fn template(yaml: &str) -> StackTemplate {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn test_sf012_prepare() {
        let t = template(
            r#"
lazy:
  prefix: "{{params.env}}-web"
  bucket_name: "{{lazy.prefix}}-assets"
resources:
  bucket:
    type: storage.bucket
    physical_name: "{{lazy.bucket_name}}"
  site:
    type: cdn.site
    depends_on: [bucket]
    properties:
      origin: "{{attr.bucket.DomainName}}"
      vpc: "{{output.Network.vpc_id}}"
outputs:
  url: "{{attr.site.Url}}"
"#,
        );
        let stack = Stack::prepare("Web", &t).unwrap();
        assert_eq!(stack.lazies.len(), 2);
        assert_eq!(stack.lazies[1].dependencies(), vec!["prefix"]);
        assert_eq!(stack.resources.len(), 2);
        assert_eq!(stack.resource("site").unwrap().implicit_dependencies(), vec!["bucket"]);
        assert_eq!(stack.stack_dependencies(), vec!["Network"]);
        assert_eq!(stack.outputs.len(), 1);
    }

    #[test]
    fn test_sf012_resource_dependencies_merge_explicit_and_implicit() {
        let t = template(
            r#"
resources:
  a:
    type: t
  b:
    type: t
  c:
    type: t
    depends_on: [b]
    properties:
      x: ["{{ref.a}}", "{{ref.b}}", "{{attr.a.Id}}"]
"#,
        );
        let stack = Stack::prepare("S", &t).unwrap();
        assert_eq!(stack.resource("c").unwrap().dependencies(), vec!["a", "b"]);
    }

    #[test]
    fn test_sf012_lazy_order() {
        let t = template(
            r#"
lazy:
  z: "{{lazy.a}}!"
  a: "{{lazy.m}}"
  m: "base"
"#,
        );
        let stack = Stack::prepare("S", &t).unwrap();
        let order: Vec<_> = sort_dependents(stack.lazies.iter().cloned())
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(order, vec!["m", "a", "z"]);
    }

    #[test]
    fn test_sf012_prepare_rejects_bad_token() {
        let t = template(
            r#"
outputs:
  broken: "{{nope.x}}"
"#,
        );
        assert!(Stack::prepare("S", &t).is_err());
    }
}
