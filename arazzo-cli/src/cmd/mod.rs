pub mod config;
pub mod env_mappings;
pub mod execute;
pub mod operation;
pub mod workflows;
