//! Shared types and error definitions used by the server and client.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its gRPC status mapping.
//! - [`types`] - Path type enumeration and header generation.

pub mod error;
pub mod types;

pub use error::{Error, Result};
