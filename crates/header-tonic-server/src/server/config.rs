use anyhow::{Context, bail};
use clap::Parser;
use std::net::SocketAddr;

/// Runtime configuration for the `header-tonic-server` binary.
///
/// Values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first). With nothing set, the server listens for TCP on
/// every interface at port 50051.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "header-tonic-server",
    version,
    about = "A gRPC service that generates request and response headers"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/header-tonic.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Uds(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: ListenAddr,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let listen_addr = if args.uds {
            if args.server_addr.trim().is_empty() {
                bail!("SERVER_ADDR must be a socket file path when --uds is set");
            }
            ListenAddr::Uds(args.server_addr)
        } else {
            let addr = args
                .server_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("invalid SERVER_ADDR `{}`", args.server_addr))?;
            ListenAddr::Tcp(addr)
        };

        Ok(Self { listen_addr })
    }
}
