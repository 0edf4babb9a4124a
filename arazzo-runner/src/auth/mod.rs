//! Security requirement extraction, credential environment mappings and
//! credential resolution.

mod env_mapping;
mod model;
mod oauth2;
mod parser;
mod processor;
mod provider;
mod workflows;

pub use env_mapping::{
    api_title_prefix, credential_env_var, credential_kinds, sanitize_env_name, CredentialKind,
    EnvMappings,
};
pub use model::{
    AuthLocation, AuthRequirement, AuthType, AuthValue, HttpAuthScheme, OAuth2Flow, OAuth2FlowType,
    OAuth2Flows, RequestAuthValue, SecurityOption, SecurityRequirement, SecurityScheme,
};
pub use oauth2::{fetch_client_credentials_token, AccessToken, TokenError};
pub use parser::{
    extract_auth_requirements, normalize_security_schemes, parse_security_scheme,
    parse_security_schemes,
};
pub use processor::{AuthProcessor, AuthReport};
pub use provider::{CredentialProvider, DefaultCredentialProvider};
pub use workflows::{identify_auth_workflows, AuthWorkflow};
