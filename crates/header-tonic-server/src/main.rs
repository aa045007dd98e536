#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use futures::Stream;
use header_tonic_core::proto::{FILE_DESCRIPTOR_SET, example_service_server::ExampleServiceServer};
use server::config::{CliArgs, ListenAddr, ServerConfig};
use server::service::handler::HeaderService;
use server::telemetry::init_telemetry;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let res = match &config.listen_addr {
        ListenAddr::Uds(_uds_path) => {
            #[cfg(unix)]
            {
                use tokio::net::UnixListener;
                use tokio_stream::wrappers::UnixListenerStream;
                let uds = UnixListener::bind(_uds_path)?;
                let incoming = UnixListenerStream::new(uds);
                log_startup_info(_uds_path, &config);
                let res = run_server_with_incoming(incoming, shutdown_signal()).await;
                // The socket file is left behind if the server panics.
                let _ = std::fs::remove_file(_uds_path);
                res
            }
            #[cfg(not(unix))]
            {
                anyhow::bail!("Unix domain sockets are not supported on this platform");
            }
        }
        ListenAddr::Tcp(addr) => {
            let tcp = TcpListener::bind(addr).await?;
            let incoming = TcpListenerStream::new(tcp);
            log_startup_info(&addr.to_string(), &config);
            run_server_with_incoming(incoming, shutdown_signal()).await
        }
    };

    providers.shutdown();
    res
}

/// Serves the header service, health checks, and reflection on `incoming`
/// until `signal` resolves.
async fn run_server_with_incoming<I, IO, IE, S>(incoming: I, signal: S) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    S: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ExampleServiceServer<HeaderService>>()
        .await;

    // Register both reflection protocol versions so older tools that only
    // speak v1alpha can still discover the schema.
    let reflection_v1 = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    let reflection_v1alpha = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1alpha()?;

    let shutdown = async move {
        signal.await;
        tracing::info!("Shutdown signal received, terminating gracefully...");
        health_reporter
            .set_not_serving::<ExampleServiceServer<HeaderService>>()
            .await;
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection_v1)
        .add_service(reflection_v1alpha)
        .add_service(build_header_service(HeaderService::new()))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting header service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!("gRPC service listening on {}", addr);
    }
}

fn build_header_service(service: HeaderService) -> ExampleServiceServer<HeaderService> {
    ExampleServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use header_tonic_core::proto::{Request, example_service_client::ExampleServiceClient};
    use std::net::SocketAddr;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tonic::Code;
    use tonic::transport::Channel;
    use tonic::server::NamedService;
    use tonic_health::pb::{
        HealthCheckRequest, health_check_response::ServingStatus, health_client::HealthClient,
    };

    struct TestServer {
        addr: SocketAddr,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<anyhow::Result<()>>,
    }

    impl TestServer {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (stop, stopped) = oneshot::channel::<()>();
            let handle = tokio::spawn(run_server_with_incoming(
                TcpListenerStream::new(listener),
                async move {
                    let _ = stopped.await;
                },
            ));
            Self { addr, stop, handle }
        }

        async fn channel(&self) -> Channel {
            Channel::from_shared(format!("http://{}", self.addr))
                .unwrap()
                .connect()
                .await
                .unwrap()
        }

        /// Signals shutdown without waiting for the server to drain.
        fn begin_stop(self) -> JoinHandle<anyhow::Result<()>> {
            let _ = self.stop.send(());
            self.handle
        }

        async fn stop(self) {
            self.begin_stop().await.unwrap().unwrap();
        }
    }

    fn health_request() -> HealthCheckRequest {
        HealthCheckRequest {
            service: <ExampleServiceServer<HeaderService> as NamedService>::NAME.to_string(),
        }
    }

    /// Issues a `ListServices` reflection call with the client and message
    /// types of the given protocol version.
    macro_rules! list_services {
        ($version:ident, $channel:expr) => {{
            use tonic_reflection::pb::$version::{
                ServerReflectionRequest, server_reflection_client::ServerReflectionClient,
                server_reflection_request::MessageRequest,
                server_reflection_response::MessageResponse,
            };

            let mut client = ServerReflectionClient::new($channel);
            let req = ServerReflectionRequest {
                host: String::new(),
                message_request: Some(MessageRequest::ListServices(String::new())),
            };
            let mut replies = client
                .server_reflection_info(tokio_stream::once(req))
                .await
                .unwrap()
                .into_inner();
            match replies.message().await.unwrap().unwrap().message_response {
                Some(MessageResponse::ListServicesResponse(list)) => list
                    .service
                    .into_iter()
                    .map(|service| service.name)
                    .collect::<Vec<_>>(),
                other => panic!("unexpected reflection reply: {other:?}"),
            }
        }};
    }

    fn request(path_type: &str, id: &str) -> Request {
        Request {
            path_type: path_type.to_string(),
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn serves_generate_header_over_tcp() {
        let server = TestServer::start().await;
        let mut client = ExampleServiceClient::new(server.channel().await)
            .send_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Zstd);

        let req = client
            .generate_header(request("REQUEST_PATH", "123456789"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(req.path_type, "REQUEST_PATH");
        assert!(req.header.starts_with("REQ"), "{}", req.header);

        let res = client
            .generate_header(request("RESPONSE_PATH", "123456789"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(res.path_type, "RESPONSE_PATH");
        assert!(res.header.starts_with("RES"), "{}", res.header);
        assert_ne!(&req.header[3..], &res.header[3..]);

        let status = client
            .generate_header(request("BOGUS", "4"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(status.message().contains("BOGUS"), "{}", status.message());

        server.stop().await;
    }

    #[tokio::test]
    async fn reports_serving_health() {
        let server = TestServer::start().await;
        let mut health = HealthClient::new(server.channel().await);

        let status = health
            .check(health_request())
            .await
            .unwrap()
            .into_inner()
            .status;
        assert_eq!(status, ServingStatus::Serving as i32);

        server.stop().await;
    }

    #[tokio::test]
    async fn health_turns_not_serving_on_shutdown() {
        let server = TestServer::start().await;
        let mut health = HealthClient::new(server.channel().await);
        let mut updates = health.watch(health_request()).await.unwrap().into_inner();

        let first = updates.message().await.unwrap().unwrap();
        assert_eq!(first.status, ServingStatus::Serving as i32);

        let handle = server.begin_stop();
        let next = updates.message().await.unwrap().unwrap();
        assert_eq!(next.status, ServingStatus::NotServing as i32);

        drop(updates);
        drop(health);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reflection_v1_lists_example_service() {
        let server = TestServer::start().await;
        let services = list_services!(v1, server.channel().await);
        assert!(
            services.iter().any(|name| name == "api.ExampleService"),
            "{services:?}"
        );
        server.stop().await;
    }

    #[tokio::test]
    async fn reflection_v1alpha_lists_example_service() {
        let server = TestServer::start().await;
        let services = list_services!(v1alpha, server.channel().await);
        assert!(
            services.iter().any(|name| name == "api.ExampleService"),
            "{services:?}"
        );
        server.stop().await;
    }

    #[test]
    fn service_name_matches_schema() {
        assert_eq!(
            <ExampleServiceServer<HeaderService> as NamedService>::NAME,
            "api.ExampleService"
        );
    }
}
