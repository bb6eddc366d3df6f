//! Error kinds for accval operations

use std::fmt;

/// The kind of error that occurred.
///
/// The first group mirrors the failure taxonomy of the generate/validate
/// loop. Only [`ErrorKind::RetrievalUnavailable`] and
/// [`ErrorKind::UnsupportedSourceType`] may abort a whole run; the other
/// loop kinds are folded into an execution result and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // Generate/validate loop
    // =========================================================================
    /// Embedding service unreachable or reference document empty
    RetrievalUnavailable,

    /// No fenced code region in a completion
    ExtractionNotFound,

    /// The compiler exited with a nonzero status
    CompileFailure,

    /// The compiled test binary exited with a nonzero status
    RuntimeFailure,

    /// Spawning or waiting on a child process failed at the OS level
    ToolInvocationFault,

    /// Source extension has no known toolchain
    UnsupportedSourceType,

    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    /// An operation exceeded its time budget
    Timeout,

    // =========================================================================
    // Completion service errors
    // =========================================================================
    /// Completion request failed
    InferenceFailed,

    /// Completion service not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // Loop
            ErrorKind::RetrievalUnavailable => "RetrievalUnavailable",
            ErrorKind::ExtractionNotFound => "ExtractionNotFound",
            ErrorKind::CompileFailure => "CompileFailure",
            ErrorKind::RuntimeFailure => "RuntimeFailure",
            ErrorKind::ToolInvocationFault => "ToolInvocationFault",
            ErrorKind::UnsupportedSourceType => "UnsupportedSourceType",

            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Timeout => "Timeout",

            // Completion service
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
                | ErrorKind::Timeout
        )
    }

    /// Whether this kind aborts the whole run instead of a single attempt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::RetrievalUnavailable | ErrorKind::UnsupportedSourceType
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
