/// Builds the gRPC client and server code for the `api.proto` definition using
/// `tonic-prost-build`.
///
/// The Protocol Buffer definitions in `proto/` are compiled into Rust modules
/// with gRPC bindings in the crate's `OUT_DIR`. An encoded file descriptor set
/// is written next to them so the server can advertise its schema through gRPC
/// reflection.
///
/// # Files and Paths
///
/// - Proto file: `proto/api.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/api_descriptor.bin`
///
/// # Panics
///
/// Panics if `OUT_DIR` is unset or code generation fails (for example when
/// `protoc` is not installed).
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("api");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("api_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/api.proto");

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/api.proto"], &["proto"])
        .unwrap();
}
