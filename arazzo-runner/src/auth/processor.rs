use arazzo_core::types::ArazzoDocument;

use crate::auth::env_mapping::EnvMappings;
use crate::auth::model::AuthRequirement;
use crate::auth::parser::extract_auth_requirements;
use crate::auth::workflows::{identify_auth_workflows, AuthWorkflow};
use crate::openapi::OpenApiSources;

/// Everything known about authentication for a set of documents.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AuthReport {
    pub requirements: Vec<AuthRequirement>,
    pub env_mappings: EnvMappings,
    pub auth_workflows: Vec<AuthWorkflow>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthProcessor;

impl AuthProcessor {
    pub fn process(&self, sources: &OpenApiSources, documents: &[&ArazzoDocument]) -> AuthReport {
        let requirements: Vec<AuthRequirement> = sources
            .iter()
            .flat_map(|(source, doc)| extract_auth_requirements(source, doc))
            .collect();
        let auth_workflows = documents
            .iter()
            .flat_map(|doc| identify_auth_workflows(doc))
            .collect();
        tracing::debug!(
            sources = sources.len(),
            requirements = requirements.len(),
            "processed authentication requirements"
        );
        AuthReport {
            requirements,
            env_mappings: EnvMappings::build(sources),
            auth_workflows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::OpenApiDoc;
    use serde_json::json;

    #[test]
    fn two_sources_sharing_a_scheme_name_nest_by_source() {
        let mut sources = OpenApiSources::new();
        for (name, title) in [("petstore", "Petstore API"), ("weather", "Weather Service")] {
            sources.insert(
                name.into(),
                OpenApiDoc::new(
                    format!("{name}.yaml"),
                    json!({
                        "openapi": "3.0.0",
                        "info": {"title": title},
                        "components": {"securitySchemes": {
                            "api_key": {"type": "apiKey", "name": "X-API-Key", "in": "header"}
                        }}
                    }),
                ),
            );
        }
        let report = AuthProcessor.process(&sources, &[]);
        assert_eq!(report.requirements.len(), 2);
        assert_eq!(
            report.env_mappings.auth,
            json!({
                "petstore": {"api_key": {"api_key": "PETSTORE_API_KEY_API_KEY"}},
                "weather": {"api_key": {"api_key": "WEATHER_API_KEY_API_KEY"}}
            })
        );
    }
}
