use std::collections::BTreeMap;

use arazzo_runner::openapi::{load_arazzo_file, load_sources, LoadError};
use tempfile::TempDir;

const ARAZZO: &str = r#"
arazzo: 1.0.1
info: {title: Shop flows, version: "1"}
sourceDescriptions:
  - {name: shop, url: specs/shop.yaml, type: openapi}
  - {name: other, url: other.arazzo.yaml, type: arazzo}
workflows:
  - workflowId: browse
    steps:
      - {stepId: list, operationId: listItems}
"#;

const SHOP_YAML: &str = r#"
openapi: 3.0.3
info: {title: Shop API, version: "1"}
paths:
  /items:
    get: {operationId: listItems}
"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("specs")).unwrap();
    std::fs::write(dir.path().join("specs/shop.yaml"), SHOP_YAML).unwrap();
    std::fs::write(dir.path().join("flows.yaml"), ARAZZO).unwrap();
    dir
}

#[tokio::test]
async fn sources_resolve_relative_to_the_arazzo_file() {
    let dir = workspace();
    let path = dir.path().join("flows.yaml");
    let doc = load_arazzo_file(&path).unwrap();

    let sources = load_sources(
        &reqwest::Client::new(),
        &doc,
        Some(&path.to_string_lossy()),
        &BTreeMap::new(),
    )
    .await
    .unwrap();

    // Arazzo-typed descriptions are not loaded as OpenAPI.
    assert_eq!(sources.keys().collect::<Vec<_>>(), vec!["shop"]);
    let shop = &sources["shop"];
    assert_eq!(shop.title(), Some("Shop API"));
    assert!(shop.source_url.ends_with("shop.yaml"), "{}", shop.source_url);
    assert_eq!(shop.raw["paths"]["/items"]["get"]["operationId"], "listItems");
}

#[tokio::test]
async fn overrides_win_over_the_declared_url() {
    let dir = workspace();
    let elsewhere = dir.path().join("moved.json");
    std::fs::write(
        &elsewhere,
        r#"{"openapi": "3.1.0", "info": {"title": "Moved Shop", "version": "2"}, "paths": {}}"#,
    )
    .unwrap();
    std::fs::remove_file(dir.path().join("specs/shop.yaml")).unwrap();

    let path = dir.path().join("flows.yaml");
    let doc = load_arazzo_file(&path).unwrap();
    let base = path.to_string_lossy().into_owned();

    let err = load_sources(&reqwest::Client::new(), &doc, Some(&base), &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }), "{err}");

    let overrides = BTreeMap::from([("shop".to_string(), elsewhere.to_string_lossy().into_owned())]);
    let sources = load_sources(&reqwest::Client::new(), &doc, Some(&base), &overrides)
        .await
        .unwrap();
    assert_eq!(sources["shop"].title(), Some("Moved Shop"));
}

#[test]
fn unparseable_arazzo_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "workflows: [\n").unwrap();
    assert!(matches!(load_arazzo_file(&path), Err(LoadError::Parse { .. })));
    assert!(matches!(
        load_arazzo_file(&dir.path().join("missing.yaml")),
        Err(LoadError::Io { .. })
    ));
}
