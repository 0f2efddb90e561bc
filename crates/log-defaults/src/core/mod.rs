//! Core components shared by every part of the pipeline.
//!
//! ### [`error`] - Error handling
//! [`ConfigurationError`] for the two failures of the default configuration
//! entry point, [`LogError`] for everything else.
//!
//! ### [`result`] - Result helpers
//! Extension traits for mapping foreign errors into [`LogError`].

pub mod error;
pub mod result;

// Re-export core types
pub use error::{ConfigurationError, LogError, LogResult};
pub use result::LogResultExt;
