/// Exit codes for CI/automation.
pub const SUCCESS: i32 = 0;
/// The workflow ran but ended in an error.
pub const WORKFLOW_FAILED: i32 = 1;
/// Bad arguments or an unreadable/invalid document.
pub const USAGE_ERROR: i32 = 2;
pub const RUNTIME_ERROR: i32 = 3;
