//! Shared types for Wayfarer microservices
//!
//! Provides the common error type and configuration loading used by every
//! service crate in the workspace.

pub mod config;
pub mod error;

pub use error::{Error, Result};
