//! regcite core library
//!
//! This crate provides the foundational utilities shared by the workspace:
//! - Error handling (`AppError`, `AppResult`, `ErrorClass`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, CitationPolicy, IndexBackend, RetrievalConfig};
pub use error::{AppError, AppResult, ErrorClass};
