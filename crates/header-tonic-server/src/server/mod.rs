//! Server-side modules for the `header-tonic-server` binary.
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - The `ExampleService` implementation.
//! - [`telemetry`] - Logging, tracing, and metrics setup.

pub mod config;
pub mod service;
pub mod telemetry;
