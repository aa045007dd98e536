//! gRPC service implementation for header generation.
//!
//! This module defines [`HeaderService`], the concrete implementation of the
//! [`ExampleService`] gRPC service defined in `api.proto`. It exposes a single
//! unary endpoint that proxies call once for each side of an exchange to
//! obtain a fresh correlation header.
//!
//! ## Responsibilities
//!
//! - Log each inbound `path_type` and `id`.
//! - Resolve `path_type` into a [`PathType`], rejecting anything else with
//!   `INVALID_ARGUMENT`.
//! - Generate a `REQ`/`RES`-prefixed UUID header for the matched path.
//!
//! The service holds no state. Every call is independent, so tonic may run
//! any number of them concurrently.

use crate::server::telemetry::{record_header_generated, record_rejected, record_request};
use header_tonic_core::{
    proto::{
        Request as HeaderRequest, Response as HeaderResponse, example_service_server::ExampleService,
    },
    types::{PathType, generate_header},
};
use tonic::{Request, Response, Status};

/// Stateless gRPC service that issues request and response headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderService;

impl HeaderService {
    pub fn new() -> Self {
        Self
    }
}

#[tonic::async_trait]
impl ExampleService for HeaderService {
    /// Handles a `GenerateHeader` call.
    ///
    /// If `tracing` is enabled, each call gets its own span carrying the
    /// request's `path_type` and `id`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip_all,
            fields(path_type = %req.get_ref().path_type, id = %req.get_ref().id)
        )
    )]
    async fn generate_header(
        &self,
        req: Request<HeaderRequest>,
    ) -> Result<Response<HeaderResponse>, Status> {
        let req = req.into_inner();
        tracing::info!(
            path_type = %req.path_type,
            id = %req.id,
            "GenerateHeader invoked"
        );
        record_request();

        match PathType::try_from(&req) {
            Ok(path_type) => {
                record_header_generated(path_type);
                Ok(Response::new(HeaderResponse {
                    path_type: path_type.as_str().to_string(),
                    header: generate_header(path_type),
                }))
            }
            Err(e) => {
                record_rejected();
                tracing::warn!("Rejected request: {}", e);
                Err(e.into())
            }
        }
    }
}
