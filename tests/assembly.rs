//! End-to-end: load an assembly from disk, order it, plan it, synthesize it.

use stackforge::core::artifact::ArtifactKinds;
use stackforge::core::assembly::{CloudAssembly, Extend};
use stackforge::core::planner::{plan, Selection};
use stackforge::core::synth::{synth_assembly, write_templates};
use stackforge::core::types::{Direction, OutputFormat, RenderedTemplate};
use stackforge::graph::topological_sort;

const MANIFEST: &str = r#"
version: "1.0"
name: storefront
params:
  env: prod
  replicas: 2
artifacts:
  - id: cdn
    type: stack
    depends_on: [web, cache]
    properties:
      resources:
        distribution:
          type: cdn.distribution
          properties:
            origin: "{{output.web.url}}"
  - id: web
    type: stack
    properties:
      lazy:
        prefix: "{{params.env}}-web"
      resources:
        service:
          type: compute.service
          physical_name: "{{lazy.prefix}}"
          properties:
            replicas: "{{params.replicas}}"
            database: "{{output.db.endpoint}}"
      outputs:
        url: "https://{{ref.service}}"
  - id: cache
    type: stack
    depends_on: [db]
  - id: db
    type: stack
    properties:
      resources:
        cluster:
          type: db.cluster
      outputs:
        endpoint: "{{attr.cluster.Endpoint}}"
"#;

fn load(dir: &std::path::Path) -> CloudAssembly {
    let path = dir.join("assembly.yaml");
    std::fs::write(&path, MANIFEST).unwrap();
    CloudAssembly::load(&path, &ArtifactKinds::builtin()).unwrap()
}

#[test]
fn test_sf020_scenario_order_matches_plain_sort() {
    let dir = tempfile::tempdir().unwrap();
    let assembly = load(dir.path());
    let order: Vec<_> = assembly.artifacts().iter().map(|a| a.id.as_str()).collect();
    assert_eq!(order, vec!["db", "cache", "web", "cdn"]);

    let plain = topological_sort(
        [
            ("web", vec!["db"]),
            ("db", vec![]),
            ("cache", vec!["db"]),
            ("cdn", vec!["web", "cache"]),
        ],
        |(k, _)| *k,
        |(_, deps)| deps.clone(),
    )
    .unwrap();
    let plain: Vec<_> = plain.into_iter().map(|(k, _)| k).collect();
    assert_eq!(order, plain);
}

#[test]
fn test_sf020_plan_and_synth() {
    let dir = tempfile::tempdir().unwrap();
    let assembly = load(dir.path());

    let deploy = plan(&assembly, &Selection::of(&["web"]), Direction::Deploy).unwrap();
    let ids: Vec<_> = deploy.steps.iter().map(|s| s.artifact.as_str()).collect();
    assert_eq!(ids, vec!["db", "web"]);

    let destroy = plan(&assembly, &Selection::of(&["db"]), Direction::Destroy).unwrap();
    let ids: Vec<_> = destroy.steps.iter().map(|s| s.artifact.as_str()).collect();
    assert_eq!(ids, vec!["cdn", "cache", "web", "db"]);

    let selected = assembly.select_stacks(&["c*".to_string()], Extend::None).unwrap();
    assert_eq!(selected.len(), 2);

    let stacks = synth_assembly(&assembly).unwrap();
    let out = dir.path().join("assembly.out");
    write_templates(&stacks, &out, OutputFormat::Yaml).unwrap();

    let cdn: RenderedTemplate =
        serde_yaml_ng::from_str(&std::fs::read_to_string(out.join("cdn.template.yaml")).unwrap())
            .unwrap();
    assert_eq!(
        cdn.resources["distribution"].properties,
        serde_json::json!({"origin": "https://prod-web"})
    );

    let web = &stacks.iter().find(|s| s.stack() == "web").unwrap().template;
    assert_eq!(
        web.resources["service"].properties,
        serde_json::json!({"replicas": 2, "database": "${db-cluster.Endpoint}"})
    );
}
