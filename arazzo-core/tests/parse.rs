use arazzo_core::types::{KnownCriterionType, ParameterLocation, ParameterOrReusable, StepTarget};
use arazzo_core::{parse_document_str, parse_value_str, DocumentFormat, ParseError};

fn minimal_yaml() -> &'static str {
    r#"
arazzo: 1.0.1
info:
  title: Example
  version: 0.0.1
sourceDescriptions:
  - name: petStoreDescription
    url: https://example.com/openapi.yaml
    type: openapi
workflows:
  - workflowId: loginUser
    dependsOn: [bootstrap]
    steps:
      - stepId: loginStep
        operationId: loginUser
        parameters:
          - name: username
            in: query
            value: $inputs.username
          - name: tenant
            in: body
            value: acme
          - reference: $components.parameters.page
            value: 2
        successCriteria:
          - condition: $statusCode == 200
          - context: $response.body
            condition: $.token
            type:
              type: jsonpath
              version: draft-goessner-dispatch-jsonpath-00
      - stepId: nested
        workflowId: bootstrap
  - workflowId: bootstrap
    steps:
      - stepId: ping
        operationPath: '{$sourceDescriptions.petStoreDescription.url}#/paths/~1ping/get'
"#
}

#[test]
fn parse_yaml_document() {
    let parsed = parse_document_str(minimal_yaml(), DocumentFormat::Auto).unwrap();
    assert_eq!(parsed.format, DocumentFormat::Yaml);

    let doc = parsed.document;
    let wf = doc.workflow("loginUser").unwrap();
    assert_eq!(wf.depends_on(), ["bootstrap".to_string()]);
    assert_eq!(wf.step_index("nested"), Some(1));

    let login = wf.step("loginStep").unwrap();
    assert_eq!(login.target(), StepTarget::OperationId("loginUser"));
    assert_eq!(wf.step("nested").unwrap().target(), StepTarget::Workflow("bootstrap"));

    let params = login.parameters();
    match &params[1] {
        ParameterOrReusable::Parameter(p) => assert_eq!(p.r#in, Some(ParameterLocation::Other)),
        other => panic!("unexpected {other:?}"),
    }
    match &params[2] {
        ParameterOrReusable::Reusable(r) => assert_eq!(r.component_name("parameters"), Some("page")),
        other => panic!("unexpected {other:?}"),
    }

    let kinds: Vec<_> = login.success_criteria().iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec![KnownCriterionType::Simple, KnownCriterionType::Jsonpath]);

    let boot = doc.workflow("bootstrap").unwrap();
    assert!(matches!(boot.steps[0].target(), StepTarget::OperationPath(_)));
    assert!(doc.source_description("petStoreDescription").unwrap().is_openapi());
}

#[test]
fn parse_json_document() {
    let json = r#"{ "arazzo": "1.0.1", "info": { "title": "Example", "version": "0.0.1" }, "sourceDescriptions": [ { "name": "src1", "url": "https://example.com/openapi.yaml" } ], "workflows": [ { "workflowId": "w1", "steps": [ { "stepId": "s1", "operationId": "op1" } ] } ] }"#;
    let parsed = parse_document_str(json, DocumentFormat::Auto).unwrap();
    assert_eq!(parsed.format, DocumentFormat::Json);
    assert!(parsed.document.workflow("missing").is_none());
}

#[test]
fn parse_openapi_value_from_yaml() {
    let yaml = "openapi: 3.0.0\ninfo:\n  title: Pets\n  version: '1'\npaths: {}\n";
    let v = parse_value_str(yaml, DocumentFormat::Auto).unwrap();
    assert_eq!(v["info"]["title"], "Pets");

    let err = parse_value_str("- a\n- b\n", DocumentFormat::Yaml).unwrap_err();
    assert!(matches!(err, ParseError::NotAMapping));
}
