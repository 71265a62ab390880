//! # bulwark-core
//!
//! Core types for the Bulwark resilience layer.
//!
//! Bulwark wraps every outbound call an automation job makes (GitHub API,
//! AI provider API, `git`) so that failures are classified before anyone
//! decides to retry, and so that nothing credential-shaped ever leaves the
//! process.
//!
//! ## Contents
//!
//! - Dependency and outcome types shared by every crate
//! - Unified error type
//! - Repository configuration (`.bulwark/config.toml` + environment)
//! - Secret sanitization for every outward text boundary
//! - Sanitized artifact writing

pub mod artifact;
pub mod config;
mod error;
pub mod fail_open;
pub mod sanitize;
mod types;

pub use artifact::write_sanitized_artifact;
pub use config::BulwarkConfig;
pub use error::{BulwarkError, Result};
pub use sanitize::SecretSanitizer;
pub use types::*;
