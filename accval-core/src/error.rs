//! accval-core error types
//!
//! Re-exports accval-error and provides core-specific conveniences.

pub use accval_error::{Error, ErrorKind, ErrorStatus, Result};

/// Create a RetrievalUnavailable error for an empty reference document
pub fn empty_document() -> Error {
    Error::retrieval_unavailable("reference document is empty")
        .with_operation("retriever::build")
}

/// Create a RetrievalUnavailable error for an index that has no windows
pub fn empty_index() -> Error {
    Error::retrieval_unavailable("context index holds no passages")
        .with_operation("retriever::query")
}

/// Create a RetrievalUnavailable error for a failed embedding call
pub fn embedding_failed(reason: impl Into<String>) -> Error {
    Error::retrieval_unavailable(reason).with_operation("retriever::embed")
}

/// Create a ParseFailed error tied to a line of an input file
pub fn parse_line_failed(path: &str, line: usize, reason: impl Into<String>) -> Error {
    Error::parse_failed(reason)
        .with_operation("input::read_instructions")
        .with_context("path", path)
        .with_context("line", line.to_string())
}

/// Create an IoFailed error with a path attached
pub fn io_error(path: &std::path::Path, err: std::io::Error) -> Error {
    Error::from(err).with_context("path", path.display().to_string())
}
