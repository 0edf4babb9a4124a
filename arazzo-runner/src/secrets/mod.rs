mod redact;
mod value;

pub use redact::{redact_headers, RedactedHeaders, RedactionPolicy};
pub use value::SecretValue;
