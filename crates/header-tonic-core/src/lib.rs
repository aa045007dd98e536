#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// gRPC service and message definitions generated from `proto/api.proto`.
///
/// ## Service
///
/// - `ExampleService::GenerateHeader` - Returns a freshly generated header for
///   the request or response side of a proxied exchange.
///
/// ## Messages
///
/// - [`Request`](proto::Request) - `path_type` and a caller-supplied `id`.
/// - [`Response`](proto::Response) - the matched `path_type` and the generated
///   `header`.
pub mod proto {
    tonic::include_proto!("api");

    /// Encoded `FileDescriptorSet` for `api.proto`, registered with the
    /// reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("api_descriptor");
}
