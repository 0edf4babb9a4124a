use arazzo_core::types::{ArazzoDocument, Workflow};

const AUTH_KEYWORDS: &[&str] = &[
    "auth", "login", "log in", "signin", "sign in", "sign-in", "token", "oauth", "session", "credential",
];

const TOKEN_OUTPUT_HINTS: &[&str] = &["token", "jwt", "bearer", "session", "apikey", "api_key", "credential"];

/// A workflow that looks like it obtains credentials for other workflows.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuthWorkflow {
    pub workflow_id: String,
    /// Outputs that look like they carry a credential.
    pub token_outputs: Vec<String>,
}

/// Workflows whose id, summary or description mention authentication and
/// which expose at least one token-like output.
pub fn identify_auth_workflows(doc: &ArazzoDocument) -> Vec<AuthWorkflow> {
    doc.workflows.iter().filter_map(auth_workflow).collect()
}

fn auth_workflow(wf: &Workflow) -> Option<AuthWorkflow> {
    let text = [Some(wf.workflow_id.as_str()), wf.summary.as_deref(), wf.description.as_deref()]
        .into_iter()
        .flatten()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    if !AUTH_KEYWORDS.iter().any(|k| text.contains(k)) {
        return None;
    }
    let token_outputs: Vec<String> = wf
        .outputs
        .iter()
        .flatten()
        .map(|(name, _)| name)
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            TOKEN_OUTPUT_HINTS.iter().any(|h| lower.contains(h))
        })
        .cloned()
        .collect();
    if token_outputs.is_empty() {
        return None;
    }
    Some(AuthWorkflow {
        workflow_id: wf.workflow_id.clone(),
        token_outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arazzo_core::parse_document_str;
    use arazzo_core::DocumentFormat;

    #[test]
    fn detects_login_workflow_with_token_output() {
        let yaml = r#"
arazzo: 1.0.0
info: {title: Shop, version: "1"}
sourceDescriptions:
  - {name: shop, url: shop.yaml, type: openapi}
workflows:
  - workflowId: loginUser
    summary: Log in and obtain an access token
    steps:
      - {stepId: login, operationId: login}
    outputs:
      accessToken: $steps.login.outputs.token
  - workflowId: listOrders
    steps:
      - {stepId: list, operationId: listOrders}
    outputs:
      orders: $steps.list.outputs.orders
"#;
        let doc = parse_document_str(yaml, DocumentFormat::Yaml).unwrap().document;
        let found = identify_auth_workflows(&doc);
        assert_eq!(
            found,
            vec![AuthWorkflow {
                workflow_id: "loginUser".into(),
                token_outputs: vec!["accessToken".into()],
            }]
        );
    }
}
