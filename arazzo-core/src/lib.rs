#![forbid(unsafe_code)]

//! Arazzo 1.0.x document model, parsing, and runtime-expression syntax.

pub mod error;
pub mod expressions;
pub mod parser;
pub mod types;

pub use crate::error::ParseError;
pub use crate::parser::{parse_document_str, parse_value_str, DocumentFormat, ParsedDocument};
pub use crate::types::ArazzoDocument;
