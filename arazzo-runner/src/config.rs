use std::collections::BTreeMap;
use std::time::Duration;

/// Tunables for a [`Runner`](crate::Runner).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    pub max_response_bytes: usize,
    pub user_agent: String,
    /// Maximum number of simultaneously active workflow frames (dependencies
    /// and nested `workflowId` steps included).
    pub max_call_depth: usize,
    /// When false, `execute_workflow` retries immediately instead of sleeping.
    pub honor_retry_after: bool,
    pub max_retry_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            max_response_bytes: 4 * 1024 * 1024,
            user_agent: concat!("arazzo-runner/", env!("CARGO_PKG_VERSION")).to_string(),
            max_call_depth: 32,
            honor_retry_after: true,
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

/// Per-execution parameters supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeParams {
    /// Server variable overrides, keyed by the derived environment variable
    /// name (`<PREFIX>_OAK_SERVER_<VAR>`) or by the bare variable name.
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
}

impl RuntimeParams {
    pub fn with_server_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.servers.insert(name.into(), value.into());
        self
    }
}
