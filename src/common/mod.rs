//! Common utilities shared across the codebase.
//!
//! - Error types for unified error handling

pub mod error;

pub use error::ServiceError;
