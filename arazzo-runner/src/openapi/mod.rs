mod finder;
mod loader;
mod model;
mod op_path;
mod refs;
mod server;

pub use finder::{FinderError, OperationFinder, OperationInfo};
pub use loader::{load_arazzo_file, load_openapi, load_sources, resolve_location, LoadError};
pub use model::{
    OpenApiDoc, OpenApiParam, OpenApiParamLocation, OpenApiSources, RequestBodySpec,
};
pub use op_path::{parse_operation_path, OperationPathRef, SourceRef};
pub use refs::{deref, RefError};
pub use server::{
    server_env_vars, ServerConfiguration, ServerError, ServerProcessor, ServerVariable,
};
