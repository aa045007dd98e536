//! Error types for the header generation service.
//!
//! This module defines the central `Error` enum and implements
//! `From<Error>` for `tonic::Status` so handler failures propagate to clients
//! with the appropriate status code.
//!
//! ## Error Cases
//! - `InvalidPathType`: The request's `path_type` is neither `REQUEST_PATH`
//!   nor `RESPONSE_PATH`.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the header generation service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The request named a path type the service does not recognize.
    #[error("invalid path type {path_type:?} for request id {id:?}")]
    InvalidPathType { path_type: String, id: String },
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidPathType { .. } => Status::invalid_argument(err.to_string()),
        }
    }
}
