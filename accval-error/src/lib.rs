//! # accval-error
//!
//! Unified error handling for accval, modelled on OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g. RetrievalUnavailable, CompileFailure)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use accval_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::UnsupportedSourceType, "no toolchain for '.rs'")
//!         .with_operation("harness::run")
//!         .with_context("source", "parsedTest.rs"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, accval_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using accval Error
pub type Result<T> = std::result::Result<T, Error>;
