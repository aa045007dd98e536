//! Command-line caller for `api.ExampleService/GenerateHeader`.
//!
//! Performs the same call a proxy filter makes while handling request or
//! response headers, and prints the header it would attach:
//!
//! ```text
//! $ header-tonic-client --path-type REQUEST_PATH
//! x-request-header: REQ8d0f6c1e-2b7a-4c55-9a0e-3f1d2c4b5a69
//! ```
//!
//! The path type is sent as given so that server-side rejection of unknown
//! values can be observed.

use anyhow::Context;
use clap::Parser;
use header_tonic_core::{
    proto::{Request, Response, example_service_client::ExampleServiceClient},
    types::PathType,
};
use std::time::Duration;
use tonic::{codec::CompressionEncoding, transport::Endpoint};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "header-tonic-client",
    version,
    about = "Requests a generated header from a header-tonic server"
)]
struct ClientArgs {
    /// Server URI.
    ///
    /// Environment variable: `HEADER_ENDPOINT`
    #[arg(long, env = "HEADER_ENDPOINT", default_value_t = String::from("http://127.0.0.1:50051"))]
    endpoint: String,

    /// `REQUEST_PATH` or `RESPONSE_PATH`. Other values are sent unchanged.
    #[arg(long, default_value_t = String::from(PathType::RequestPath.as_str()))]
    path_type: String,

    /// Caller-supplied identifier, logged by the server.
    #[arg(long, default_value_t = String::from("123456789"))]
    id: String,

    /// Deadline for the call, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = ClientArgs::parse();
    let timeout = Duration::from_millis(args.timeout_ms);

    let channel = Endpoint::from_shared(args.endpoint.clone())
        .with_context(|| format!("invalid endpoint `{}`", args.endpoint))?
        .timeout(timeout)
        .connect_timeout(timeout)
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.endpoint))?;

    let mut client = ExampleServiceClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    tracing::debug!(path_type = %args.path_type, id = %args.id, "Dispatching GenerateHeader");
    let res = client
        .generate_header(Request {
            path_type: args.path_type,
            id: args.id,
        })
        .await
        .context("GenerateHeader failed")?
        .into_inner();

    println!("{}", format_header_line(&res)?);
    Ok(())
}

/// Renders `res` as the `name: value` header line a proxy would attach.
fn format_header_line(res: &Response) -> anyhow::Result<String> {
    let path_type = PathType::from_label(&res.path_type)
        .with_context(|| format!("server returned unknown path type {:?}", res.path_type))?;
    Ok(format!("{}: {}", path_type.header_name(), res.header))
}
