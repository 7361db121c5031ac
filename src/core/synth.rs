//! SF-016: Synthesis — resolve every deferred value of a stack and render
//! its template.
//!
//! Order inside one stack: lazy values (by `lazy.*` references), then
//! resources (by `depends_on` plus `ref`/`attr` references), then outputs.

use super::assembly::CloudAssembly;
use super::error::{Error, Result};
use super::hasher::fingerprint_template;
use super::stack::Stack;
use super::tokens::ResolveContext;
use super::types::{OutputFormat, RenderedResource, RenderedTemplate};
use crate::graph::{sort_dependents, Dependent};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Stack outputs already produced, keyed by stack id.
pub type StackOutputs = HashMap<String, IndexMap<String, String>>;

/// A rendered stack with its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub template: RenderedTemplate,
    pub fingerprint: String,
}

impl SynthesizedStack {
    pub fn stack(&self) -> &str {
        &self.template.stack
    }

    /// `<stack>.template.<ext>`
    pub fn file_name(&self, format: OutputFormat) -> String {
        format!("{}.template.{}", self.template.stack, format.extension())
    }

    /// Serialize the template.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Yaml => serde_yaml_ng::to_string(&self.template)?,
            OutputFormat::Json => serde_json::to_string_pretty(&self.template)? + "\n",
        })
    }
}

/// Physical name used when a resource does not set one.
pub fn default_physical_name(stack: &str, resource: &str) -> String {
    format!("{}-{}", stack, resource).to_lowercase()
}

/// Synthesize one stack. `outputs` must hold every stack it consumes.
pub fn synth_stack(
    stack: &Stack,
    params: &IndexMap<String, serde_json::Value>,
    outputs: &StackOutputs,
) -> Result<SynthesizedStack> {
    let id = stack.id.as_str();
    let mut ctx = ResolveContext::new(id, params).with_outputs(outputs);

    let lazies = sort_dependents(stack.lazies.iter())
        .map_err(|e| Error::ordering(format!("stack '{}' lazy values", id), e))?;
    for lazy in lazies {
        let value = lazy.value.resolve(&ctx).map_err(|e| Error::resolve(id, e))?;
        tracing::trace!(stack = id, lazy = %lazy.name, %value, "lazy value resolved");
        ctx.define_lazy(&lazy.name, value);
    }

    let ordered = sort_dependents(stack.resources.iter())
        .map_err(|e| Error::ordering(format!("stack '{}' resources", id), e))?;
    let mut resources = IndexMap::with_capacity(ordered.len());
    for resource in ordered {
        let physical_name = match &resource.physical_name {
            Some(pending) => pending.resolve(&ctx).map_err(|e| Error::resolve(id, e))?,
            None => default_physical_name(id, &resource.id),
        };
        ctx.define_resource(&resource.id, physical_name.clone());

        let properties = resource
            .properties
            .resolve(&ctx)
            .map_err(|e| Error::resolve(id, e))?;
        resources.insert(
            resource.id.clone(),
            RenderedResource {
                resource_type: resource.resource_type.clone(),
                physical_name,
                depends_on: resource.dependencies(),
                properties,
            },
        );
    }

    let mut rendered_outputs = IndexMap::with_capacity(stack.outputs.len());
    for (name, pending) in &stack.outputs {
        let value = pending.resolve(&ctx).map_err(|e| Error::resolve(id, e))?;
        rendered_outputs.insert(name.clone(), value);
    }

    let template = RenderedTemplate {
        stack: stack.id.clone(),
        description: stack.description.clone(),
        resources,
        outputs: rendered_outputs,
    };
    let fingerprint = fingerprint_template(&template)?;
    tracing::debug!(stack = id, resources = template.resources.len(), %fingerprint, "stack synthesized");

    Ok(SynthesizedStack {
        template,
        fingerprint,
    })
}

/// Synthesize every stack of the assembly, in deployment order.
pub fn synth_assembly(assembly: &CloudAssembly) -> Result<Vec<SynthesizedStack>> {
    let mut outputs = StackOutputs::new();
    let mut synthesized = Vec::new();
    for stack in assembly.stacks() {
        let result = synth_stack(stack, &assembly.params, &outputs)?;
        outputs.insert(stack.id.clone(), result.template.outputs.clone());
        synthesized.push(result);
    }
    Ok(synthesized)
}

/// Write each template to `<out_dir>/<stack>.template.<ext>`.
pub fn write_templates(
    stacks: &[SynthesizedStack],
    out_dir: &Path,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    let mut written = Vec::with_capacity(stacks.len());
    for stack in stacks {
        let path = out_dir.join(stack.file_name(format));
        std::fs::write(&path, stack.render(format)?).map_err(|e| Error::io(&path, e))?;
        tracing::info!(path = %path.display(), "template written");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::ArtifactKinds;
    use crate::core::parser::parse_manifest;
    use crate::core::tokens::ResolveError;
    use crate::core::types::StackTemplate;
    use serde_json::json;

    fn stack(id: &str, yaml: &str) -> Stack {
        let template: StackTemplate = serde_yaml_ng::from_str(yaml).unwrap();
        Stack::prepare(id, &template).unwrap()
    }

    fn params() -> IndexMap<String, serde_json::Value> {
        IndexMap::from([
            ("env".to_string(), json!("prod")),
            ("replicas".to_string(), json!(3)),
        ])
    }

    #[test]
    fn test_sf016_resources_in_dependency_order() {
        let s = stack(
            "Web",
            r#"
lazy:
  name: "{{lazy.prefix}}-site"
  prefix: "{{params.env}}"
resources:
  site:
    type: cdn.site
    physical_name: "{{lazy.name}}"
    properties:
      origin: "{{attr.bucket.DomainName}}"
      replicas: "{{params.replicas}}"
  bucket:
    type: storage.bucket
  alarm:
    type: monitor.alarm
    depends_on: [site]
outputs:
  url: "https://{{ref.site}}"
"#,
        );
        let out = synth_stack(&s, &params(), &StackOutputs::new()).unwrap();
        let t = &out.template;
        let order: Vec<_> = t.resources.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["bucket", "site", "alarm"]);
        assert_eq!(t.resources["bucket"].physical_name, "web-bucket");
        assert_eq!(t.resources["site"].physical_name, "prod-site");
        assert_eq!(t.resources["site"].depends_on, vec!["bucket"]);
        assert_eq!(
            t.resources["site"].properties,
            json!({"origin": "${web-bucket.DomainName}", "replicas": 3})
        );
        assert_eq!(t.outputs["url"], "https://prod-site");
        assert!(out.fingerprint.starts_with("blake3:"));
    }

    #[test]
    fn test_sf016_resource_cycle() {
        let s = stack(
            "S",
            r#"
resources:
  a:
    type: t
    properties: { peer: "{{ref.b}}" }
  b:
    type: t
    depends_on: [a]
"#,
        );
        let err = synth_stack(&s, &params(), &StackOutputs::new()).unwrap_err();
        assert_eq!(err.cycle_members().unwrap(), ["a", "b"]);
        assert!(err.to_string().starts_with("stack 'S' resources: circular dependency"));
    }

    #[test]
    fn test_sf016_lazy_cycle() {
        let s = stack("S", "lazy:\n  a: \"{{lazy.b}}\"\n  b: \"{{lazy.a}}\"\n");
        let err = synth_stack(&s, &params(), &StackOutputs::new()).unwrap_err();
        assert_eq!(err.cycle_members().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_sf016_unknown_param() {
        let s = stack("S", "outputs:\n  x: \"{{params.region}}\"\n");
        let err = synth_stack(&s, &params(), &StackOutputs::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolve { source: ResolveError::UnknownParam(ref p), .. } if p == "region"
        ));
    }

    #[test]
    fn test_sf016_resolution_is_repeatable() {
        let s = stack("S", "resources:\n  r:\n    type: t\n    properties: { env: \"{{params.env}}\" }\n");
        let first = synth_stack(&s, &params(), &StackOutputs::new()).unwrap();
        let second = synth_stack(&s, &params(), &StackOutputs::new()).unwrap();
        assert_eq!(first, second);

        let mut staging = params();
        staging.insert("env".into(), json!("staging"));
        let third = synth_stack(&s, &staging, &StackOutputs::new()).unwrap();
        assert_eq!(third.template.resources["r"].properties, json!({"env": "staging"}));
        assert_ne!(first.fingerprint, third.fingerprint);
    }

    const CROSS: &str = r#"
version: "1.0"
name: cross
params:
  env: dev
artifacts:
  - id: Web
    type: stack
    properties:
      resources:
        app:
          type: compute.service
          properties:
            vpc: "{{output.Network.vpc_id}}"
  - id: Network
    type: stack
    properties:
      resources:
        vpc:
          type: network.vpc
          physical_name: "{{params.env}}-vpc"
      outputs:
        vpc_id: "{{attr.vpc.Id}}"
"#;

    #[test]
    fn test_sf016_synth_assembly_passes_outputs() {
        let manifest = parse_manifest(CROSS).unwrap();
        let asm = CloudAssembly::from_manifest(manifest, ".", &ArtifactKinds::builtin()).unwrap();
        let stacks = synth_assembly(&asm).unwrap();
        assert_eq!(stacks.iter().map(|s| s.stack()).collect::<Vec<_>>(), vec!["Network", "Web"]);
        assert_eq!(
            stacks[1].template.resources["app"].properties,
            json!({"vpc": "${dev-vpc.Id}"})
        );
    }

    #[test]
    fn test_sf016_render_and_write() {
        let manifest = parse_manifest(CROSS).unwrap();
        let asm = CloudAssembly::from_manifest(manifest, ".", &ArtifactKinds::builtin()).unwrap();
        let stacks = synth_assembly(&asm).unwrap();

        let yaml = stacks[0].render(OutputFormat::Yaml).unwrap();
        let back: RenderedTemplate = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, stacks[0].template);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cdk.out");
        let written = write_templates(&stacks, &out, OutputFormat::Json).unwrap();
        assert_eq!(written.len(), 2);
        assert!(out.join("Network.template.json").exists());
        let json = std::fs::read_to_string(out.join("Web.template.json")).unwrap();
        let back: RenderedTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stacks[1].template);
    }
}
