//! # Path Types and Header Generation
//!
//! A proxy calls `GenerateHeader` twice per exchange: once while it holds the
//! downstream request headers and once while it holds the upstream response
//! headers. [`PathType`] names those two sides and is the only input the
//! service branches on.
//!
//! ## Overview
//!
//! - [`PathType`] - closed enum of the two accepted wire labels
//! - [`generate_header`] - builds `REQ`/`RES` + a random hyphenated UUID
//!
//! ## Constants
//!
//! - [`HEADER_PREFIX_LEN`] - length of the `REQ`/`RES` prefix
//! - [`HEADER_LEN`] - total length of a generated header

use crate::{Error, Result, proto};
use core::fmt;
use uuid::Uuid;

/// Length of the prefix that precedes the UUID in every generated header.
pub const HEADER_PREFIX_LEN: usize = 3;

/// Length of a generated header: the prefix plus a hyphenated UUID.
pub const HEADER_LEN: usize = HEADER_PREFIX_LEN + uuid::fmt::Hyphenated::LENGTH;

/// The side of a proxied exchange a header is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathType {
    /// Downstream request headers (`REQUEST_PATH`).
    RequestPath,
    /// Upstream response headers (`RESPONSE_PATH`).
    ResponsePath,
}

impl PathType {
    /// Every accepted path type, in wire order.
    pub const ALL: [PathType; 2] = [PathType::RequestPath, PathType::ResponsePath];

    /// Matches a wire label exactly. Case and surrounding whitespace are
    /// significant.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "REQUEST_PATH" => Some(Self::RequestPath),
            "RESPONSE_PATH" => Some(Self::ResponsePath),
            _ => None,
        }
    }

    /// The wire label, as echoed back in `Response::path_type`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestPath => "REQUEST_PATH",
            Self::ResponsePath => "RESPONSE_PATH",
        }
    }

    /// The prefix prepended to generated headers.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::RequestPath => "REQ",
            Self::ResponsePath => "RES",
        }
    }

    /// The HTTP header a proxy attaches the generated value to.
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::RequestPath => "x-request-header",
            Self::ResponsePath => "x-response-header",
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&proto::Request> for PathType {
    type Error = Error;

    fn try_from(req: &proto::Request) -> Result<Self> {
        Self::from_label(&req.path_type).ok_or_else(|| Error::InvalidPathType {
            path_type: req.path_type.clone(),
            id: req.id.clone(),
        })
    }
}

/// Generates a header for `path_type`: its prefix followed by a fresh v4 UUID
/// in lowercase hyphenated form.
///
/// Every call draws a new UUID, so repeated calls never return the same value.
pub fn generate_header(path_type: PathType) -> String {
    let mut header = String::with_capacity(HEADER_LEN);
    header.push_str(path_type.prefix());
    header.push_str(
        Uuid::new_v4()
            .hyphenated()
            .encode_lower(&mut Uuid::encode_buffer()),
    );
    header
}
