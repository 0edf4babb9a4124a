mod common;

use std::sync::Arc;

use arazzo_runner::{MapEnv, RunnerError, RuntimeParams, StepRunResult, StepStatus, WorkflowStatus};
use common::{arazzo, body_json, header, runner, sources, MockHttp};
use serde_json::{json, Value as JsonValue};

fn petstore() -> JsonValue {
    json!({
        "openapi": "3.0.3",
        "info": {"title": "Petstore API", "version": "1.0.0"},
        "servers": [{
            "url": "https://{region}.pets.test/v1",
            "variables": {"region": {"default": "eu", "enum": ["eu", "us"]}}
        }],
        "components": {
            "securitySchemes": {"bearerAuth": {"type": "http", "scheme": "bearer"}}
        },
        "paths": {
            "/login": {
                "post": {
                    "operationId": "login",
                    "requestBody": {"content": {"application/json": {"schema": {"type": "object"}}}}
                }
            },
            "/pets": {
                "get": {
                    "operationId": "listPets",
                    "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer"}}],
                    "security": [{"bearerAuth": []}]
                }
            },
            "/pets/{petId}": {
                "get": {
                    "operationId": "getPet",
                    "parameters": [{"name": "petId", "in": "path", "required": true}]
                }
            }
        }
    })
}

const WORKFLOWS: &str = r#"
arazzo: 1.0.1
info:
  title: Pet flows
  version: 1.0.0
sourceDescriptions:
  - name: petstore
    url: petstore.json
    type: openapi
workflows:
  - workflowId: listWithLogin
    steps:
      - stepId: login
        operationId: login
        requestBody:
          payload:
            username: $inputs.username
            password: $inputs.password
        successCriteria:
          - condition: $statusCode == 200
        outputs:
          token: $response.body#/token
      - stepId: list
        operationId: listPets
        parameters:
          - name: Authorization
            in: header
            value: Bearer {$steps.login.outputs.token}
          - name: limit
            in: query
            value: $inputs.limit
        successCriteria:
          - condition: $statusCode == 200
        outputs:
          names: $response.body#/names
    outputs:
      petNames: $steps.list.outputs.names
      token: $steps.login.outputs.token

  - workflowId: authenticate
    summary: Log in and return a session token
    steps:
      - stepId: login
        operationId: login
        requestBody:
          payload:
            username: $inputs.username
            password: $inputs.password
        successCriteria:
          - condition: $statusCode == 200
        outputs:
          token: $response.body#/token
    outputs:
      token: $steps.login.outputs.token

  - workflowId: listAfterAuth
    dependsOn:
      - authenticate
    steps:
      - stepId: list
        operationId: listPets
        parameters:
          - name: Authorization
            in: header
            value: Bearer {$dependencies.authenticate.token}
        successCriteria:
          - condition: $statusCode == 200
        outputs:
          names: $response.body#/names
    outputs:
      petNames: $steps.list.outputs.names

  - workflowId: fetchWithRetry
    steps:
      - stepId: fetch
        operationId: getPet
        parameters:
          - name: petId
            in: path
            value: $inputs.petId
        successCriteria:
          - condition: $statusCode == 200
        onFailure:
          - name: again
            type: retry
            retryAfter: 0
            retryLimit: 2
        outputs:
          name: $response.body#/name
    outputs:
      name: $steps.fetch.outputs.name

  - workflowId: recheckPet
    steps:
      - stepId: fetch
        operationId: getPet
        parameters:
          - name: petId
            in: path
            value: 7
        successCriteria:
          - condition: $statusCode == 200
        onFailure:
          - name: again
            type: retry
            retryAfter: 0
            retryLimit: 1
        outputs:
          name: $response.body#/name
      - stepId: check
        operationId: listPets
        onSuccess:
          - name: fetchAgain
            type: goto
            stepId: fetch
            criteria:
              - condition: $statusCode == 200
    outputs:
      name: $steps.fetch.outputs.name

  - workflowId: recoverMissing
    steps:
      - stepId: missing
        operationId: getPet
        parameters:
          - name: petId
            in: path
            value: 404
        successCriteria:
          - condition: $statusCode == 200
        onFailure:
          - name: skipAhead
            type: goto
            stepId: list
      - stepId: list
        operationId: listPets
        successCriteria:
          - condition: $statusCode == 200
        outputs:
          names: $response.body#/names
    outputs:
      petNames: $steps.list.outputs.names

  - workflowId: outerRecover
    steps:
      - stepId: runRecover
        workflowId: recoverMissing

  - workflowId: jumpAhead
    steps:
      - stepId: first
        operationId: listPets
        successCriteria:
          - condition: $statusCode == 200
        onSuccess:
          - name: skipMiddle
            type: goto
            stepId: last
      - stepId: middle
        operationId: getPet
        parameters:
          - name: petId
            in: path
            value: 5
      - stepId: last
        operationId: listPets
        successCriteria:
          - condition: $statusCode == 200

  - workflowId: outerJump
    steps:
      - stepId: runJump
        workflowId: jumpAhead

  - workflowId: petName
    steps:
      - stepId: get
        operationId: getPet
        parameters:
          - name: petId
            in: path
            value: $inputs.petId
        successCriteria:
          - condition: $statusCode == 200
        outputs:
          name: $response.body#/name
    outputs:
      name: $steps.get.outputs.name

  - workflowId: describePet
    steps:
      - stepId: lookup
        workflowId: petName
        parameters:
          - name: petId
            value: $inputs.id
      - stepId: list
        operationId: listPets
        successCriteria:
          - condition: $statusCode == 200
    outputs:
      petName: $steps.lookup.outputs.name

  - workflowId: handOff
    steps:
      - stepId: check
        operationId: listPets
        successCriteria:
          - condition: $statusCode == 200
        onSuccess:
          - name: toPetName
            type: goto
            workflowId: petName
"#;

fn logged_in_http() -> MockHttp {
    MockHttp::new()
        .on("POST", "/v1/login", 200, json!({"token": "abc123"}))
        .on("GET", "/v1/pets", 200, json!({"names": ["Rex", "Fido"]}))
}

#[tokio::test]
async fn login_token_flows_into_the_next_step() {
    let http = Arc::new(logged_in_http());
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let result = runner
        .execute_workflow(
            "listWithLogin",
            json!({"username": "ann", "password": "pw", "limit": 5}),
            RuntimeParams::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::WorkflowComplete, "{:?}", result.error);
    assert_eq!(result.outputs["petNames"], json!(["Rex", "Fido"]));
    assert_eq!(result.outputs["token"], json!("abc123"));
    assert_eq!(result.step_outputs["login"]["token"], json!("abc123"));

    let login = &http.requests_to("/v1/login")[0];
    assert_eq!(login.url.host_str(), Some("eu.pets.test"));
    assert_eq!(body_json(login), json!({"username": "ann", "password": "pw"}));
    assert_eq!(header(login, "content-type"), Some("application/json"));

    let list = &http.requests_to("/v1/pets")[0];
    assert_eq!(header(list, "authorization"), Some("Bearer abc123"));
    assert_eq!(list.url.query(), Some("limit=5"));
}

#[tokio::test]
async fn steps_can_be_driven_one_at_a_time() {
    let http = Arc::new(logged_in_http());
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let id = runner
        .start_workflow(
            "listWithLogin",
            json!({"username": "ann", "password": "pw"}),
            RuntimeParams::default(),
        )
        .await
        .unwrap();
    let state = runner.execution_state(&id).unwrap();
    assert_eq!(state.step_status("login"), Some(StepStatus::Pending));

    let first = runner.execute_next_step(&id).await.unwrap();
    assert_eq!(
        first,
        StepRunResult::StepComplete {
            step_id: "login".into(),
            success: true,
            outputs: json!({"token": "abc123"}).as_object().unwrap().clone(),
            next_step_id: Some("list".into()),
        }
    );
    assert_eq!(runner.execution_state(&id).unwrap().workflow_outputs["token"], json!("abc123"));

    let second = runner.execute_next_step(&id).await.unwrap();
    assert!(matches!(second, StepRunResult::WorkflowComplete { .. }));
    let outputs_after = runner.execution_state(&id).unwrap().workflow_outputs.clone();

    // Stepping a finished execution repeats its terminal result without new calls.
    let again = runner.execute_next_step(&id).await.unwrap();
    assert_eq!(again, second);
    assert_eq!(runner.execution_state(&id).unwrap().workflow_outputs, outputs_after);
    assert_eq!(http.requests().len(), 2);

    let state = runner.finish_execution(&id).unwrap();
    assert_eq!(state.step_status("list"), Some(StepStatus::Success));
    assert!(matches!(
        runner.execute_next_step(&id).await,
        Err(RunnerError::ExecutionNotFound(_))
    ));
}

#[tokio::test]
async fn unknown_workflow_is_an_error() {
    let http = Arc::new(MockHttp::new());
    let mut runner = runner(arazzo(WORKFLOWS), sources(&[("petstore", petstore())]), http, MapEnv::new());
    let err = runner
        .execute_workflow("nope", json!({}), RuntimeParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::WorkflowNotFound(id) if id == "nope"));
}

#[tokio::test]
async fn dependency_outputs_are_visible_to_the_dependent() {
    let http = Arc::new(logged_in_http());
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let result = runner
        .execute_workflow("listAfterAuth", json!({"username": "ann", "password": "pw"}), RuntimeParams::default())
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.outputs["petNames"], json!(["Rex", "Fido"]));
    let list = &http.requests_to("/v1/pets")[0];
    assert_eq!(header(list, "authorization"), Some("Bearer abc123"));
}

#[tokio::test]
async fn failing_dependency_prevents_the_start() {
    let http = Arc::new(
        MockHttp::new()
            .on("POST", "/v1/login", 401, json!({"error": "bad credentials"}))
            .on("GET", "/v1/pets", 200, json!({"names": []})),
    );
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let err = runner
        .start_workflow("listAfterAuth", json!({}), RuntimeParams::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunnerError::DependencyFailed { ref dependency, .. } if dependency == "authenticate"
    ));

    let result = runner
        .execute_workflow("listAfterAuth", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    assert_eq!(result.status, WorkflowStatus::Error);
    assert!(result.error.unwrap().contains("authenticate"));
    assert!(http.requests_to("/v1/pets").is_empty());
}

#[tokio::test]
async fn retry_action_repeats_the_step_until_it_succeeds() {
    let http = Arc::new(
        MockHttp::new()
            .on_with_headers("GET", "/v1/pets/7", 503, &[("Retry-After", "1")], json!({}))
            .on("GET", "/v1/pets/7", 503, json!({}))
            .on("GET", "/v1/pets/7", 200, json!({"name": "Rex"})),
    );
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let id = runner
        .start_workflow("fetchWithRetry", json!({"petId": 7}), RuntimeParams::default())
        .await
        .unwrap();
    let first = runner.execute_next_step(&id).await.unwrap();
    assert_eq!(
        first,
        StepRunResult::Retry {
            step_id: "fetch".into(),
            attempt: 1,
            retry_limit: 2,
            retry_after: Some(0.0),
            server_retry_after: Some(1.0),
        }
    );
    assert_eq!(runner.execution_state(&id).unwrap().step_status("fetch"), Some(StepStatus::Pending));
    runner.finish_execution(&id);

    let result = runner
        .execute_workflow("fetchWithRetry", json!({"petId": 7}), RuntimeParams::default())
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.outputs["name"], json!("Rex"));
    // One call from the manual step, two from the full run.
    assert_eq!(http.requests_to("/v1/pets/7").len(), 3);
}

#[tokio::test]
async fn retry_limit_bounds_attempts() {
    let http = Arc::new(MockHttp::new().on("GET", "/v1/pets/7", 503, json!({})));
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let result = runner
        .execute_workflow("fetchWithRetry", json!({"petId": 7}), RuntimeParams::default())
        .await
        .unwrap();
    assert_eq!(result.status, WorkflowStatus::Error);
    assert!(result.error.unwrap().contains("fetch"));
    // The first attempt plus two retries.
    assert_eq!(http.requests_to("/v1/pets/7").len(), 3);
}

#[tokio::test]
async fn revisiting_a_step_renews_its_retry_budget() {
    let http = Arc::new(
        MockHttp::new()
            .on("GET", "/v1/pets/7", 503, json!({}))
            .on("GET", "/v1/pets/7", 200, json!({"name": "Rex"}))
            .on("GET", "/v1/pets/7", 503, json!({}))
            .on("GET", "/v1/pets/7", 200, json!({"name": "Kit"}))
            .on("GET", "/v1/pets", 200, json!({"names": []}))
            .on("GET", "/v1/pets", 202, json!({"names": []})),
    );
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let result = runner
        .execute_workflow("recheckPet", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.outputs["name"], json!("Kit"));
    assert_eq!(http.requests_to("/v1/pets/7").len(), 4);
    assert_eq!(http.requests_to("/v1/pets").len(), 2);
}

#[tokio::test]
async fn root_and_nested_runs_judge_success_differently() {
    let http = Arc::new(
        MockHttp::new()
            .on("GET", "/v1/pets/404", 404, json!({"error": "not found"}))
            .on("GET", "/v1/pets", 200, json!({"names": ["Rex"]})),
    );
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    // As a root workflow the recovered failure does not matter: the last step succeeded.
    let root = runner
        .execute_workflow("recoverMissing", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    assert!(root.is_success(), "{:?}", root.error);
    assert_eq!(root.outputs["petNames"], json!(["Rex"]));

    // Nested, every executed step must have succeeded.
    let nested = runner
        .execute_workflow("outerRecover", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    assert_eq!(nested.status, WorkflowStatus::Error);
    assert!(nested.error.unwrap().contains("runRecover"));

    // A step jumped over stays PENDING: fine at the root, a failure when nested.
    let root = runner
        .execute_workflow("jumpAhead", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    assert!(root.is_success(), "{:?}", root.error);

    let nested = runner
        .execute_workflow("outerJump", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    assert_eq!(nested.status, WorkflowStatus::Error);
    assert!(nested.error.unwrap().contains("runJump"));
    assert!(http.requests_to("/v1/pets/5").is_empty());
}

#[tokio::test]
async fn nested_workflow_receives_inputs_and_returns_outputs() {
    let http = Arc::new(
        MockHttp::new()
            .on("GET", "/v1/pets/3", 200, json!({"name": "Tom"}))
            .on("GET", "/v1/pets", 200, json!({"names": ["Tom"]})),
    );
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let result = runner
        .execute_workflow("describePet", json!({"id": 3}), RuntimeParams::default())
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.outputs["petName"], json!("Tom"));
    assert_eq!(result.step_outputs["lookup"]["name"], json!("Tom"));
    assert_eq!(http.requests_to("/v1/pets/3").len(), 1);
}

#[tokio::test]
async fn goto_workflow_hands_the_run_over() {
    let http = Arc::new(
        MockHttp::new()
            .on("GET", "/v1/pets", 200, json!({"names": []}))
            .on("GET", "/v1/pets/9", 200, json!({"name": "Kit"})),
    );
    let mut runner = runner(
        arazzo(WORKFLOWS),
        sources(&[("petstore", petstore())]),
        Arc::clone(&http),
        MapEnv::new(),
    );

    let id = runner
        .start_workflow("handOff", json!({"petId": 9}), RuntimeParams::default())
        .await
        .unwrap();
    let step = runner.execute_next_step(&id).await.unwrap();
    assert_eq!(
        step,
        StepRunResult::GotoWorkflow {
            step_id: "check".into(),
            workflow_id: "petName".into(),
        }
    );
    runner.finish_execution(&id);

    let result = runner
        .execute_workflow("handOff", json!({"petId": 9}), RuntimeParams::default())
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.workflow_id, "petName");
    assert_eq!(result.outputs["name"], json!("Kit"));
}

#[tokio::test]
async fn server_variables_follow_runtime_then_env_then_default() {
    let http = Arc::new(logged_in_http());
    let doc = arazzo(WORKFLOWS);
    let inputs = json!({"username": "ann", "password": "pw"});

    let mut with_default = runner(doc.clone(), sources(&[("petstore", petstore())]), Arc::clone(&http), MapEnv::new());
    with_default
        .execute_workflow("authenticate", inputs.clone(), RuntimeParams::default())
        .await
        .unwrap();

    let env = MapEnv::new().with("PETSTORE_OAK_SERVER_REGION", "us");
    let mut with_env = runner(doc, sources(&[("petstore", petstore())]), Arc::clone(&http), env);
    with_env
        .execute_workflow("authenticate", inputs.clone(), RuntimeParams::default())
        .await
        .unwrap();
    with_env
        .execute_workflow(
            "authenticate",
            inputs,
            RuntimeParams::default().with_server_var("PETSTORE_OAK_SERVER_REGION", "ap"),
        )
        .await
        .unwrap();

    let hosts: Vec<String> = http
        .requests_to("/v1/login")
        .iter()
        .map(|r| r.url.host_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(hosts, vec!["eu.pets.test", "us.pets.test", "ap.pets.test"]);
}

#[tokio::test]
async fn missing_server_variable_is_a_step_error() {
    let mut api = petstore();
    api["servers"][0]["variables"]["region"] = json!({"enum": ["eu", "us"]});
    let http = Arc::new(logged_in_http());
    let mut runner = runner(arazzo(WORKFLOWS), sources(&[("petstore", api)]), Arc::clone(&http), MapEnv::new());

    let id = runner
        .start_workflow("authenticate", json!({}), RuntimeParams::default())
        .await
        .unwrap();
    let result = runner.execute_next_step(&id).await.unwrap();
    match result {
        StepRunResult::StepError { step_id, error } => {
            assert_eq!(step_id, "login");
            assert!(error.contains("PETSTORE_OAK_SERVER_REGION"), "{error}");
        }
        other => panic!("expected a step error, got {other:?}"),
    }
    assert_eq!(runner.execution_state(&id).unwrap().step_status("login"), Some(StepStatus::Failure));
    assert!(http.requests().is_empty());
}
